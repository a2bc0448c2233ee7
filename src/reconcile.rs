use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info, warn};

use crate::error::{FieldConflictNotice, LoadWarning, SourceUnavailableError};
use crate::model::{AuditEntry, AuditReport, Field, PageRecord};
use crate::source::{SourceKind, SourceLoad};

/// One source's contribution: its rows, or the reason it has none.
pub type SourceOutcome = (SourceKind, Result<SourceLoad, SourceUnavailableError>);

/// Output of `merge`. Findings are not attached yet.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub report: AuditReport,
    pub conflicts: Vec<FieldConflictNotice>,
    pub unavailable: Vec<SourceUnavailableError>,
    pub warnings: Vec<LoadWarning>,
}

/// Accumulating table. Records keep their first-appearance position, and the
/// first source to set a field owns it.
struct Table {
    index: HashMap<String, usize>,
    records: Vec<PageRecord>,
    owners: Vec<HashMap<String, SourceKind>>,
    conflicts: Vec<FieldConflictNotice>,
}

impl Table {
    fn new() -> Self {
        Table {
            index: HashMap::new(),
            records: Vec::new(),
            owners: Vec::new(),
            conflicts: Vec::new(),
        }
    }

    fn slot(&mut self, key: &str) -> usize {
        if let Some(&i) = self.index.get(key) {
            return i;
        }
        let i = self.records.len();
        self.index.insert(key.to_string(), i);
        self.records.push(PageRecord::new(key));
        self.owners.push(HashMap::new());
        i
    }

    fn conflict(&mut self, i: usize, column: &str, kept: String, rejected: String, from: SourceKind) {
        let notice = FieldConflictNotice {
            key: self.records[i].key.clone(),
            column: column.to_string(),
            kept,
            kept_from: self.owners[i].get(column).copied().unwrap_or(from),
            rejected,
            rejected_from: from,
        };
        debug!("conflict: {}", notice);
        self.conflicts.push(notice);
    }

    fn absorb(&mut self, kind: SourceKind, load: SourceLoad) {
        for row in load.rows {
            let i = self.slot(&row.key);
            for (field, value) in row.fields {
                match self.records[i].fields.get(&field) {
                    None => {
                        self.records[i].fields.insert(field, value);
                        self.owners[i].insert(field.column().to_string(), kind);
                    }
                    Some(existing) if *existing != value => {
                        let kept = existing.to_string();
                        self.conflict(i, field.column(), kept, value.to_string(), kind);
                    }
                    Some(_) => {}
                }
            }
            for (name, value) in row.extras {
                match self.records[i].extras.get(&name) {
                    None => {
                        self.owners[i].insert(name.clone(), kind);
                        self.records[i].extras.insert(name, value);
                    }
                    Some(existing) if *existing != value => {
                        let kept = existing.clone();
                        self.conflict(i, &name, kept, value, kind);
                    }
                    Some(_) => {}
                }
            }
        }
    }
}

/// Full outer join of every source on the canonical key.
///
/// Sources are consumed in the order given. A failed source is recorded and
/// skipped; it never removes rows that other sources supplied.
pub fn merge(sources: Vec<SourceOutcome>) -> Reconciliation {
    let mut table = Table::new();
    let mut available: BTreeSet<Field> = BTreeSet::new();
    let mut unavailable = Vec::new();
    let mut warnings = Vec::new();

    for (kind, outcome) in sources {
        match outcome {
            Ok(mut load) => {
                let before = table.records.len();
                let rows = load.rows.len();
                available.extend(load.fields.iter().copied());
                warnings.append(&mut load.warnings);
                table.absorb(kind, load);
                info!(
                    "merged {}: {} rows, {} new pages",
                    kind,
                    rows,
                    table.records.len() - before
                );
            }
            Err(e) => {
                warn!("skipping source: {}", e);
                unavailable.push(e);
            }
        }
    }

    let entries = table
        .records
        .into_iter()
        .map(|record| AuditEntry {
            record,
            findings: Vec::new(),
        })
        .collect();

    Reconciliation {
        report: AuditReport::new(entries, available),
        conflicts: table.conflicts,
        unavailable,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Unavailable;
    use crate::model::Value;
    use crate::source::SourceRow;

    fn row(key: &str, fields: &[(Field, Value)]) -> SourceRow {
        SourceRow {
            raw_key: key.to_string(),
            key: key.to_string(),
            fields: fields.iter().cloned().collect(),
            ..Default::default()
        }
    }

    fn load(kind: SourceKind, rows: Vec<SourceRow>) -> SourceOutcome {
        let fields = rows.iter().flat_map(|r| r.fields.keys().copied()).collect();
        (
            kind,
            Ok(SourceLoad {
                kind,
                rows,
                fields,
                warnings: Vec::new(),
            }),
        )
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn outer_join_keeps_single_source_keys() {
        let r = merge(vec![
            load(SourceKind::MetadataTable, vec![row("/a", &[(Field::Title, text("A"))])]),
            load(SourceKind::SearchConsole, vec![row("/b", &[(Field::Clicks, Value::Count(1))])]),
            load(SourceKind::Analytics, vec![row("/a", &[(Field::Sessions, Value::Count(5))])]),
        ]);
        let keys: Vec<&str> = r.report.records().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["/a", "/b"]);
        let a = &r.report.get("/a").unwrap().record;
        assert_eq!(a.get(Field::Title), Some(&text("A")));
        assert_eq!(a.get(Field::Sessions), Some(&Value::Count(5)));
        assert_eq!(a.get(Field::Clicks), None);
        assert!(r.conflicts.is_empty());
    }

    #[test]
    fn no_duplicate_keys() {
        let r = merge(vec![
            load(SourceKind::MetadataTable, vec![row("/a", &[]), row("/a", &[]), row("/", &[])]),
            load(SourceKind::SearchConsole, vec![row("/", &[]), row("/a", &[])]),
        ]);
        assert_eq!(r.report.len(), 2);
    }

    #[test]
    fn absence_is_not_a_disagreement() {
        let r = merge(vec![
            load(SourceKind::MetadataTable, vec![row("/a", &[(Field::Title, text("Foo"))])]),
            load(SourceKind::SearchConsole, vec![row("/a", &[(Field::Clicks, Value::Count(2))])]),
            load(SourceKind::Analytics, vec![]),
        ]);
        assert!(r.conflicts.is_empty());
    }

    #[test]
    fn first_writer_wins_and_conflict_is_recorded() {
        let r = merge(vec![load(
            SourceKind::SearchConsole,
            vec![
                row("/a", &[(Field::Ctr, Value::Decimal(0.01))]),
                row("/a", &[(Field::Ctr, Value::Decimal(0.02))]),
            ],
        )]);
        assert_eq!(r.conflicts.len(), 1);
        let c = &r.conflicts[0];
        assert_eq!(c.key, "/a");
        assert_eq!(c.column, "ctr");
        assert_eq!(c.kept, "0.01");
        assert_eq!(c.rejected, "0.02");
        assert_eq!(c.kept_from, SourceKind::SearchConsole);
        assert_eq!(
            r.report.get("/a").unwrap().record.get(Field::Ctr),
            Some(&Value::Decimal(0.01))
        );
    }

    #[test]
    fn equal_values_are_not_conflicts() {
        let r = merge(vec![
            load(SourceKind::MetadataTable, vec![row("/a", &[(Field::Clicks, Value::Count(3))])]),
            load(SourceKind::SearchConsole, vec![row("/a", &[(Field::Clicks, Value::Count(3))])]),
        ]);
        assert!(r.conflicts.is_empty());
    }

    #[test]
    fn unavailable_source_degrades_gracefully() {
        let r = merge(vec![
            (
                SourceKind::SearchConsole,
                Err(SourceUnavailableError::new(SourceKind::SearchConsole, Unavailable::Quota, "429")),
            ),
            load(SourceKind::Analytics, vec![row("/a", &[(Field::Sessions, Value::Count(9))])]),
        ]);
        assert_eq!(r.report.len(), 1);
        assert_eq!(r.unavailable.len(), 1);
        assert_eq!(r.unavailable[0].kind, Unavailable::Quota);
        let a = &r.report.get("/a").unwrap().record;
        assert_eq!(a.fields.len(), 1);
    }

    #[test]
    fn nothing_in_nothing_out() {
        let r = merge(Vec::new());
        assert!(r.report.is_empty());
        assert!(r.conflicts.is_empty());
    }

    #[test]
    fn root_key_is_distinct() {
        let r = merge(vec![load(
            SourceKind::MetadataTable,
            vec![row("/", &[(Field::Title, text("Home"))]), row("/a", &[])],
        )]);
        assert_eq!(r.report.get("/").unwrap().record.text(Field::Title), Some("Home"));
        assert_eq!(r.report.len(), 2);
    }
}
