use std::io::Read;

use tracing::{info, warn};

use super::{RowBuilder, SourceAdapter, SourceKind, SourceLoad};
use crate::error::AuditError;
use crate::model::Field;
use crate::normalize::Normalizer;

// Header spellings seen in crawler exports, compared after `column_key`.
const KEY_COLUMNS: &[&str] = &[
    "url",
    "key",
    "address",
    "page",
    "toppages",
    "landingpage",
    "pagepath",
];
const IGNORED_COLUMNS: &[&str] = &["findings"];
const FIELD_COLUMNS: &[(&str, Field)] = &[
    ("title", Field::Title),
    ("title1", Field::Title),
    ("pagetitle", Field::Title),
    ("metadescription", Field::MetaDescription),
    ("metadescription1", Field::MetaDescription),
    ("description", Field::MetaDescription),
    ("h1", Field::H1),
    ("h11", Field::H1),
    ("clicks", Field::Clicks),
    ("impressions", Field::Impressions),
    ("ctr", Field::Ctr),
    ("position", Field::Position),
    ("averageposition", Field::Position),
    ("sessions", Field::Sessions),
    ("engagedsessions", Field::EngagedSessions),
];

/// A delimited file already split into cells.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetadataTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl MetadataTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        MetadataTable { headers, rows }
    }

    /// Parse CSV with a header row. Ragged rows are accepted.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, AuditError> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);
        let headers = rdr
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();
        let rows = rdr
            .records()
            .map(|r| r.map(|rec| rec.iter().map(str::to_string).collect()))
            .collect::<Result<Vec<Vec<String>>, _>>()?;
        Ok(MetadataTable { headers, rows })
    }
}

#[derive(Debug, Clone, Copy)]
enum Column {
    Key,
    Field(Field),
    Extra,
    Ignored,
}

fn column_key(header: &str) -> String {
    header
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Maps page-metadata exports (and re-imported audit reports) onto rows.
#[derive(Debug, Clone, Default)]
pub struct MetadataTableAdapter {
    pub normalizer: Normalizer,
    pub base_domain: Option<String>,
}

impl MetadataTableAdapter {
    pub fn new(normalizer: Normalizer, base_domain: Option<String>) -> Self {
        MetadataTableAdapter {
            normalizer,
            base_domain,
        }
    }

    fn classify(&self, headers: &[String]) -> Result<Vec<Column>, AuditError> {
        let mut columns = Vec::with_capacity(headers.len());
        let mut seen_key = false;
        let mut seen_fields = Vec::new();
        let mut seen_extras: Vec<&str> = Vec::new();
        for header in headers {
            let k = column_key(header);
            let col = if KEY_COLUMNS.contains(&k.as_str()) && !seen_key {
                seen_key = true;
                Column::Key
            } else if IGNORED_COLUMNS.contains(&k.as_str()) {
                Column::Ignored
            } else if let Some((_, field)) = FIELD_COLUMNS.iter().find(|(name, _)| *name == k) {
                if seen_fields.contains(field) {
                    Column::Extra
                } else {
                    seen_fields.push(*field);
                    Column::Field(*field)
                }
            } else if seen_extras.contains(&header.trim()) {
                warn!("repeated column {:?}; keeping the first", header.trim());
                Column::Ignored
            } else {
                seen_extras.push(header.trim());
                Column::Extra
            };
            columns.push(col);
        }
        if !seen_key {
            return Err(AuditError::malformed(
                self.kind(),
                format!("no url column among {:?}", headers),
            ));
        }
        if ![Field::Title, Field::MetaDescription, Field::H1]
            .iter()
            .any(|f| seen_fields.contains(f))
        {
            warn!("metadata table has no title, meta_description or h1 column; content rules are off");
        }
        Ok(columns)
    }
}

impl SourceAdapter for MetadataTableAdapter {
    type Payload = MetadataTable;

    fn kind(&self) -> SourceKind {
        SourceKind::MetadataTable
    }

    fn load(&self, table: MetadataTable) -> Result<SourceLoad, AuditError> {
        let columns = self.classify(&table.headers)?;
        let mut builder = RowBuilder::new(self.kind(), self.normalizer, self.base_domain.as_deref());
        for col in &columns {
            if let Column::Field(f) = col {
                builder.declare(*f);
            }
        }

        for (i, cells) in table.rows.iter().enumerate() {
            let key_cell = columns
                .iter()
                .position(|c| matches!(c, Column::Key))
                .and_then(|idx| cells.get(idx))
                .map(String::as_str)
                .unwrap_or_default();
            let Some(mut row) = builder.row(i, key_cell) else {
                continue;
            };
            for ((col, header), cell) in columns.iter().zip(&table.headers).zip(cells) {
                match col {
                    Column::Field(field) => builder.set(&mut row, i, *field, cell),
                    Column::Extra if !cell.is_empty() => {
                        row.extras.insert(header.trim().to_string(), cell.clone());
                    }
                    _ => {}
                }
            }
            builder.push(row);
        }

        let load = builder.finish();
        info!(
            "{}: {} rows, {} fields, {} warnings",
            load.kind,
            load.rows.len(),
            load.fields.len(),
            load.warnings.len()
        );
        Ok(load)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;

    fn load(csv: &str) -> SourceLoad {
        let table = MetadataTable::from_reader(csv.as_bytes()).unwrap();
        MetadataTableAdapter::new(Normalizer::default(), Some("https://www.example.com".into()))
            .load(table)
            .unwrap()
    }

    #[test]
    fn screaming_frog_headers() {
        let table = std::fs::read_to_string("tests/fixtures/crawl.csv").unwrap();
        let l = load(&table);
        assert_eq!(l.rows.len(), 4);
        assert_eq!(l.rows[0].key, "/");
        assert_eq!(l.rows[1].key, "/about");
        assert_eq!(l.rows[1].raw_key, "https://www.example.com/about/");
        assert!(l.fields.contains(&Field::Title));
        assert!(l.fields.contains(&Field::MetaDescription));
        assert!(l.fields.contains(&Field::H1));
        assert_eq!(l.rows[1].extras.get("Status Code").map(String::as_str), Some("200"));
    }

    #[test]
    fn blank_cells_stay_undefined() {
        let l = load("url,title,h1\n/a,,X\n");
        assert_eq!(l.rows[0].fields.get(&Field::Title), None);
        assert_eq!(l.rows[0].fields.get(&Field::H1), Some(&Value::Text("X".into())));
        assert!(l.fields.contains(&Field::Title));
    }

    #[test]
    fn numeric_columns_are_coerced() {
        let l = load("page,clicks,ctr\n/a,12,3.5%\n/b,oops,0.1\n");
        assert_eq!(l.rows[0].fields.get(&Field::Clicks), Some(&Value::Count(12)));
        assert_eq!(l.rows[0].fields.get(&Field::Ctr), Some(&Value::Decimal(0.035)));
        assert_eq!(l.rows[1].fields.get(&Field::Clicks), None);
        assert_eq!(l.rows.len(), 2);
        assert_eq!(l.warnings.len(), 1);
    }

    #[test]
    fn findings_column_is_not_reingested() {
        let l = load("url,title,findings\n/a,T,missing-h1\n");
        assert!(l.rows[0].extras.is_empty());
        assert_eq!(l.rows[0].fields.len(), 1);
    }

    #[test]
    fn missing_url_column_is_malformed() {
        let table = MetadataTable::from_reader("title,h1\nT,H\n".as_bytes()).unwrap();
        let err = MetadataTableAdapter::default().load(table).unwrap_err();
        assert!(matches!(err, AuditError::MalformedPayload { .. }));
    }

    #[test]
    fn blank_url_drops_row_only() {
        let l = load("url,title\n,T\n/b,U\n");
        assert_eq!(l.rows.len(), 1);
        assert_eq!(l.rows[0].key, "/b");
        assert_eq!(l.warnings.len(), 1);
    }

    #[test]
    fn search_console_top_pages_export() {
        let l = load("Top pages,Clicks,Impressions,CTR,Position\nhttps://www.example.com/a/,3,1200,0.25%,8.1\n");
        assert_eq!(l.rows[0].key, "/a");
        assert_eq!(l.rows[0].fields.get(&Field::Impressions), Some(&Value::Count(1200)));
        assert_eq!(l.rows[0].fields.get(&Field::Ctr), Some(&Value::Decimal(0.0025)));
        assert!(l.warnings.is_empty());
    }

    #[test]
    fn repeated_extra_column_keeps_first() {
        let l = load("url,Status,Status\n/a,200,301\n");
        assert_eq!(l.rows[0].extras.get("Status").map(String::as_str), Some("200"));
        assert_eq!(l.rows[0].extras.len(), 1);
    }

    #[test]
    fn ragged_rows_are_tolerated() {
        let l = load("url,title,h1\n/a,T\n");
        assert_eq!(l.rows[0].fields.len(), 1);
    }
}
