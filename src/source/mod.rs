pub mod analytics;
pub mod coerce;
pub mod search_console;
pub mod table;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::warn;

use crate::error::{AuditError, CoercionWarning, LoadWarning};
use crate::model::{Field, FieldKind, FieldMap, Value};
use crate::normalize::Normalizer;

pub use analytics::{AnalyticsAdapter, AnalyticsResponse};
pub use search_console::{SearchConsoleAdapter, SearchConsoleResponse};
pub use table::{MetadataTable, MetadataTableAdapter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceKind {
    MetadataTable,
    SearchConsole,
    Analytics,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::MetadataTable => "metadata-table",
            SourceKind::SearchConsole => "search-console",
            SourceKind::Analytics => "ga4",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One adapter row before joining.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceRow {
    /// Key as it appeared in the payload.
    pub raw_key: String,
    /// Canonical key.
    pub key: String,
    pub fields: FieldMap,
    pub extras: BTreeMap<String, String>,
}

/// Everything one adapter produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLoad {
    pub kind: SourceKind,
    pub rows: Vec<SourceRow>,
    /// Fields the payload carried as columns, whether or not any cell was filled.
    pub fields: BTreeSet<Field>,
    pub warnings: Vec<LoadWarning>,
}

impl SourceLoad {
    pub fn empty(kind: SourceKind) -> Self {
        SourceLoad {
            kind,
            rows: Vec::new(),
            fields: BTreeSet::new(),
            warnings: Vec::new(),
        }
    }
}

/// Converts one external payload into `SourceRow`s. Adapters never merge
/// rows; a payload of the wrong shape is the only error.
pub trait SourceAdapter {
    type Payload;

    fn kind(&self) -> SourceKind;

    fn load(&self, payload: Self::Payload) -> Result<SourceLoad, AuditError>;
}

/// Shared row assembly: key normalization, coercion and warning bookkeeping.
pub(crate) struct RowBuilder<'a> {
    load: SourceLoad,
    normalizer: Normalizer,
    base_domain: Option<&'a str>,
}

impl<'a> RowBuilder<'a> {
    pub fn new(kind: SourceKind, normalizer: Normalizer, base_domain: Option<&'a str>) -> Self {
        RowBuilder {
            load: SourceLoad::empty(kind),
            normalizer,
            base_domain,
        }
    }

    pub fn declare(&mut self, field: Field) {
        self.load.fields.insert(field);
    }

    /// Start a row. Returns `None` (and records a warning) if the key is blank.
    pub fn row(&mut self, index: usize, raw_key: &str) -> Option<SourceRow> {
        match self.normalizer.normalize(raw_key, self.base_domain) {
            Ok(key) => Some(SourceRow {
                raw_key: raw_key.to_string(),
                key,
                ..Default::default()
            }),
            Err(error) => {
                warn!(source = %self.load.kind, row = index, "dropping row: {}", error);
                self.load.warnings.push(LoadWarning::InvalidKey {
                    source_kind: self.load.kind,
                    row: index,
                    error,
                });
                None
            }
        }
    }

    /// Set a field from raw text. Blank cells leave the field undefined.
    pub fn set(&mut self, row: &mut SourceRow, index: usize, field: Field, raw: &str) {
        if raw.is_empty() {
            return;
        }
        let value = match field.kind() {
            FieldKind::Text => Some(Value::Text(raw.to_string())),
            FieldKind::Count => coerce::count(raw).map(Value::Count),
            FieldKind::Decimal => coerce::decimal(field, raw).map(Value::Decimal),
        };
        match value {
            Some(v) => {
                row.fields.insert(field, v);
            }
            None => self.coercion_failed(row, index, field, raw),
        }
    }

    /// Set a field from a JSON value as returned by the reporting APIs.
    pub fn set_json(&mut self, row: &mut SourceRow, index: usize, field: Field, raw: &serde_json::Value) {
        match raw {
            serde_json::Value::Null => {}
            serde_json::Value::String(s) => self.set(row, index, field, s),
            other => {
                let value = match (field.kind(), other.as_f64()) {
                    (FieldKind::Count, Some(x)) => coerce::count_from_f64(x).map(Value::Count),
                    (FieldKind::Decimal, Some(x)) if x.is_finite() => Some(Value::Decimal(x)),
                    (FieldKind::Text, _) => Some(Value::Text(other.to_string())),
                    _ => None,
                };
                match value {
                    Some(v) => {
                        row.fields.insert(field, v);
                    }
                    None => self.coercion_failed(row, index, field, &other.to_string()),
                }
            }
        }
    }

    fn coercion_failed(&mut self, row: &SourceRow, index: usize, field: Field, raw: &str) {
        let warning = CoercionWarning {
            source_kind: self.load.kind,
            row: index,
            key: row.key.clone(),
            field,
            raw: raw.to_string(),
        };
        warn!("{}", warning);
        self.load.warnings.push(LoadWarning::Coercion(warning));
    }

    pub fn push(&mut self, row: SourceRow) {
        self.load.rows.push(row);
    }

    pub fn finish(self) -> SourceLoad {
        self.load
    }
}
