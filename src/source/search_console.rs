use serde::Deserialize;
use tracing::info;

use super::{RowBuilder, SourceAdapter, SourceKind, SourceLoad};
use crate::error::AuditError;
use crate::model::Field;
use crate::normalize::Normalizer;

/// Body of a `searchAnalytics/query` response with the `page` dimension.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchConsoleResponse {
    #[serde(default)]
    pub rows: Vec<SearchConsoleRow>,
}

/// Metrics stay untyped so one bad value costs a field, not the payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchConsoleRow {
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub clicks: serde_json::Value,
    #[serde(default)]
    pub impressions: serde_json::Value,
    #[serde(default)]
    pub ctr: serde_json::Value,
    #[serde(default)]
    pub position: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct SearchConsoleAdapter {
    pub normalizer: Normalizer,
    /// Property the report was pulled for, e.g. `https://www.example.com/`
    /// or `sc-domain:example.com`. Used as the base domain for page keys.
    pub property_url: String,
}

impl SearchConsoleAdapter {
    pub fn new(normalizer: Normalizer, property_url: impl Into<String>) -> Self {
        SearchConsoleAdapter {
            normalizer,
            property_url: property_url.into(),
        }
    }
}

impl SourceAdapter for SearchConsoleAdapter {
    type Payload = SearchConsoleResponse;

    fn kind(&self) -> SourceKind {
        SourceKind::SearchConsole
    }

    fn load(&self, payload: SearchConsoleResponse) -> Result<SourceLoad, AuditError> {
        let base = Some(self.property_url.as_str()).filter(|p| !p.trim().is_empty());
        let mut builder = RowBuilder::new(self.kind(), self.normalizer, base);
        for field in [Field::Clicks, Field::Impressions, Field::Ctr, Field::Position] {
            builder.declare(field);
        }

        for (i, r) in payload.rows.iter().enumerate() {
            let page = r.keys.first().map(String::as_str).unwrap_or_default();
            let Some(mut row) = builder.row(i, page) else {
                continue;
            };
            builder.set_json(&mut row, i, Field::Clicks, &r.clicks);
            builder.set_json(&mut row, i, Field::Impressions, &r.impressions);
            builder.set_json(&mut row, i, Field::Ctr, &r.ctr);
            builder.set_json(&mut row, i, Field::Position, &r.position);
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

    fn adapter() -> SearchConsoleAdapter {
        SearchConsoleAdapter::new(Normalizer::default(), "https://www.example.com/")
    }

    #[test]
    fn fixture_rows() {
        let json = std::fs::read_to_string("tests/fixtures/search_console.json").unwrap();
        let payload: SearchConsoleResponse = serde_json::from_str(&json).unwrap();
        let load = adapter().load(payload).unwrap();
        assert_eq!(load.rows.len(), 3);
        assert_eq!(load.rows[0].key, "/");
        assert_eq!(load.rows[1].key, "/about");
        assert_eq!(load.rows[1].fields.get(&Field::Clicks), Some(&Value::Count(4)));
        assert_eq!(load.rows[1].fields.get(&Field::Ctr), Some(&Value::Decimal(0.002)));
        // "n/a" impressions on the last row
        assert_eq!(load.rows[2].fields.get(&Field::Impressions), None);
        assert_eq!(load.rows[2].fields.get(&Field::Clicks), Some(&Value::Count(0)));
        assert_eq!(load.warnings.len(), 1);
    }

    #[test]
    fn empty_response_is_not_an_error() {
        let payload: SearchConsoleResponse = serde_json::from_str("{}").unwrap();
        let load = adapter().load(payload).unwrap();
        assert!(load.rows.is_empty());
        assert!(load.warnings.is_empty());
    }

    #[test]
    fn domain_property_keys() {
        let payload: SearchConsoleResponse = serde_json::from_value(serde_json::json!({
            "rows": [{ "keys": ["https://blog.example.com/post/"], "clicks": 1.0 }]
        }))
        .unwrap();
        let load = SearchConsoleAdapter::new(Normalizer::default(), "sc-domain:example.com")
            .load(payload)
            .unwrap();
        assert_eq!(load.rows[0].key, "/post");
    }

    #[test]
    fn row_without_page_is_dropped() {
        let payload: SearchConsoleResponse = serde_json::from_value(serde_json::json!({
            "rows": [{ "keys": [], "clicks": 1 }, { "keys": ["/b"], "clicks": 2 }]
        }))
        .unwrap();
        let load = adapter().load(payload).unwrap();
        assert_eq!(load.rows.len(), 1);
        assert_eq!(load.warnings.len(), 1);
    }
}
