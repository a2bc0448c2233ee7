use serde::Deserialize;
use tracing::info;

use super::{RowBuilder, SourceAdapter, SourceKind, SourceLoad};
use crate::error::AuditError;
use crate::model::Field;
use crate::normalize::Normalizer;

const PAGE_PATH: &str = "pagePath";

/// Body of a GA4 `runReport` response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsResponse {
    #[serde(default)]
    pub dimension_headers: Vec<Header>,
    #[serde(default)]
    pub metric_headers: Vec<Header>,
    #[serde(default)]
    pub rows: Vec<AnalyticsRow>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Header {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsRow {
    #[serde(default)]
    pub dimension_values: Vec<Cell>,
    #[serde(default)]
    pub metric_values: Vec<Cell>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Cell {
    #[serde(default)]
    pub value: String,
}

fn metric_field(name: &str) -> Option<Field> {
    match name {
        "sessions" => Some(Field::Sessions),
        "engagedSessions" => Some(Field::EngagedSessions),
        _ => None,
    }
}

/// GA4 page paths are already host-relative, so no base domain applies.
#[derive(Debug, Clone, Default)]
pub struct AnalyticsAdapter {
    pub normalizer: Normalizer,
}

impl AnalyticsAdapter {
    pub fn new(normalizer: Normalizer) -> Self {
        AnalyticsAdapter { normalizer }
    }
}

impl SourceAdapter for AnalyticsAdapter {
    type Payload = AnalyticsResponse;

    fn kind(&self) -> SourceKind {
        SourceKind::Analytics
    }

    fn load(&self, payload: AnalyticsResponse) -> Result<SourceLoad, AuditError> {
        let mut builder = RowBuilder::new(self.kind(), self.normalizer, None);
        if payload.rows.is_empty() {
            return Ok(builder.finish());
        }

        let path_idx = payload
            .dimension_headers
            .iter()
            .position(|h| h.name == PAGE_PATH)
            .ok_or_else(|| AuditError::malformed(self.kind(), "report has no pagePath dimension"))?;
        let metrics: Vec<(usize, &str, Option<Field>)> = payload
            .metric_headers
            .iter()
            .enumerate()
            .map(|(i, h)| (i, h.name.as_str(), metric_field(&h.name)))
            .collect();
        for (_, _, field) in &metrics {
            if let Some(f) = field {
                builder.declare(*f);
            }
        }

        for (i, r) in payload.rows.iter().enumerate() {
            let path = r
                .dimension_values
                .get(path_idx)
                .map(|c| c.value.as_str())
                .unwrap_or_default();
            let Some(mut row) = builder.row(i, path) else {
                continue;
            };
            for (idx, name, field) in &metrics {
                let Some(cell) = r.metric_values.get(*idx) else {
                    continue;
                };
                match field {
                    Some(f) => builder.set(&mut row, i, *f, &cell.value),
                    None if !cell.value.is_empty() => {
                        row.extras.insert(name.to_string(), cell.value.clone());
                    }
                    None => {}
                }
            }
            builder.push(row);
        }

        let load = builder.finish();
        info!("{}: {} rows, {} warnings", load.kind, load.rows.len(), load.warnings.len());
        Ok(load)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;

    #[test]
    fn fixture_rows() {
        let json = std::fs::read_to_string("tests/fixtures/ga4.json").unwrap();
        let payload: AnalyticsResponse = serde_json::from_str(&json).unwrap();
        let load = AnalyticsAdapter::default().load(payload).unwrap();
        assert_eq!(load.rows.len(), 3);
        assert_eq!(load.rows[0].key, "/");
        assert_eq!(load.rows[1].key, "/blog/launch");
        assert_eq!(load.rows[1].fields.get(&Field::Sessions), Some(&Value::Count(120)));
        assert_eq!(load.rows[1].fields.get(&Field::EngagedSessions), Some(&Value::Count(80)));
        assert_eq!(load.rows[1].extras.get("bounceRate").map(String::as_str), Some("0.33"));
        assert!(load.fields.contains(&Field::Sessions));
        assert!(load.fields.contains(&Field::EngagedSessions));
    }

    #[test]
    fn missing_page_path_is_malformed() {
        let payload: AnalyticsResponse = serde_json::from_value(serde_json::json!({
            "dimensionHeaders": [{ "name": "country" }],
            "metricHeaders": [{ "name": "sessions" }],
            "rows": [{ "dimensionValues": [{ "value": "IT" }], "metricValues": [{ "value": "3" }] }]
        }))
        .unwrap();
        let err = AnalyticsAdapter::default().load(payload).unwrap_err();
        assert!(matches!(err, AuditError::MalformedPayload { source_kind: SourceKind::Analytics, .. }));
    }

    #[test]
    fn no_rows_is_empty_not_error() {
        let load = AnalyticsAdapter::default().load(AnalyticsResponse::default()).unwrap();
        assert!(load.rows.is_empty());
    }

    #[test]
    fn bad_metric_is_a_warning() {
        let payload: AnalyticsResponse = serde_json::from_value(serde_json::json!({
            "dimensionHeaders": [{ "name": "pagePath" }],
            "metricHeaders": [{ "name": "sessions" }, { "name": "engagedSessions" }],
            "rows": [{ "dimensionValues": [{ "value": "/a/" }], "metricValues": [{ "value": "x" }, { "value": "2" }] }]
        }))
        .unwrap();
        let load = AnalyticsAdapter::default().load(payload).unwrap();
        assert_eq!(load.rows[0].key, "/a");
        assert_eq!(load.rows[0].fields.get(&Field::Sessions), None);
        assert_eq!(load.rows[0].fields.get(&Field::EngagedSessions), Some(&Value::Count(2)));
        assert_eq!(load.warnings.len(), 1);
    }
}
