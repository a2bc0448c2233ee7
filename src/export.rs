use std::io::Write;

use itertools::Itertools;

use crate::error::AuditError;
use crate::model::{AuditReport, Field, Finding, RuleId, Severity};

pub const KEY_COLUMN: &str = "url";
pub const FINDINGS_COLUMN: &str = "findings";
const FINDINGS_SEPARATOR: &str = ";";

/// Named row filters for the CLI. Any `Fn(&[Finding]) -> bool` works with `export`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFilter {
    #[default]
    All,
    Flagged,
    Severity(Severity),
    Rule(RuleId),
}

impl ExportFilter {
    pub fn accepts(&self, findings: &[Finding]) -> bool {
        match self {
            ExportFilter::All => true,
            ExportFilter::Flagged => !findings.is_empty(),
            ExportFilter::Severity(s) => findings.iter().any(|f| f.severity == *s),
            ExportFilter::Rule(r) => findings.iter().any(|f| f.rule == *r),
        }
    }
}

/// Column order: key, known fields, extras by first appearance, findings.
/// Computed from the whole report so a filtered export keeps the same header.
fn columns(report: &AuditReport) -> (Vec<Field>, Vec<String>) {
    let fields = Field::ALL
        .iter()
        .copied()
        .filter(|f| report.has_field(*f) || report.records().any(|r| r.fields.contains_key(f)))
        .collect();
    let extras = report
        .records()
        .flat_map(|r| r.extras.keys())
        .unique()
        .cloned()
        .collect();
    (fields, extras)
}

/// Write the report as CSV and return the number of data rows written.
pub fn export<W, F>(report: &AuditReport, writer: W, filter: F) -> Result<usize, AuditError>
where
    W: Write,
    F: Fn(&[Finding]) -> bool,
{
    let (fields, extras) = columns(report);
    let mut wtr = csv::Writer::from_writer(writer);

    let header = std::iter::once(KEY_COLUMN)
        .chain(fields.iter().map(|f| f.column()))
        .chain(extras.iter().map(String::as_str))
        .chain(std::iter::once(FINDINGS_COLUMN));
    wtr.write_record(header)?;

    let mut written = 0;
    for entry in report.entries().iter().filter(|e| filter(&e.findings)) {
        let record = &entry.record;
        let mut cells = Vec::with_capacity(fields.len() + extras.len() + 2);
        cells.push(record.key.clone());
        cells.extend(
            fields
                .iter()
                .map(|f| record.get(*f).map(|v| v.to_string()).unwrap_or_default()),
        );
        cells.extend(
            extras
                .iter()
                .map(|name| record.extras.get(name).cloned().unwrap_or_default()),
        );
        cells.push(entry.findings.iter().map(|f| f.rule.as_str()).join(FINDINGS_SEPARATOR));
        wtr.write_record(&cells)?;
        written += 1;
    }
    wtr.flush()?;
    Ok(written)
}

pub fn export_all<W: Write>(report: &AuditReport, writer: W) -> Result<usize, AuditError> {
    export(report, writer, |_| true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AuditEntry, PageRecord, Value};
    use crate::normalize::Normalizer;
    use crate::reconcile::merge;
    use crate::rules::{evaluate, tests::thresholds};
    use crate::source::{MetadataTable, MetadataTableAdapter, SourceAdapter, SourceKind};

    fn sample() -> AuditReport {
        let mut a = PageRecord::new("/a");
        a.fields.insert(Field::Title, Value::Text("Hello, \"world\"".into()));
        a.fields.insert(Field::Ctr, Value::Decimal(0.015));
        a.fields.insert(Field::Clicks, Value::Count(3));
        a.extras.insert("Status Code".into(), "200".into());
        let mut b = PageRecord::new("/b");
        b.fields.insert(Field::Title, Value::Text("Second\nline".into()));
        let c = PageRecord::new("/");
        let entries = vec![a, b, c]
            .into_iter()
            .map(|record| AuditEntry { record, findings: Vec::new() })
            .collect();
        let available = [Field::Title, Field::Ctr, Field::Clicks, Field::H1].into_iter().collect();
        evaluate(AuditReport::new(entries, available), &thresholds())
    }

    fn to_string(report: &AuditReport, filter: ExportFilter) -> String {
        let mut buf = Vec::new();
        export(report, &mut buf, |f| filter.accepts(f)).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn header_and_findings_cell() {
        let out = to_string(&sample(), ExportFilter::All);
        let mut lines = out.lines();
        assert_eq!(lines.next(), Some("url,title,h1,clicks,ctr,Status Code,findings"));
        assert_eq!(
            lines.next(),
            Some("/a,\"Hello, \"\"world\"\"\",,3,0.015,200,missing-h1;low-ctr")
        );
    }

    #[test]
    fn filtered_export_keeps_columns_and_order() {
        let report = sample();
        let full = to_string(&report, ExportFilter::All);
        let filtered = to_string(&report, ExportFilter::Rule(RuleId::MissingTitle));
        assert_eq!(full.lines().next(), filtered.lines().next());
        let mut rdr = csv::Reader::from_reader(filtered.as_bytes());
        let keys: Vec<String> = rdr.records().map(|r| r.unwrap()[0].to_string()).collect();
        assert_eq!(keys, vec!["/"]);

        let flagged = to_string(&report, ExportFilter::Flagged);
        let mut rdr = csv::Reader::from_reader(flagged.as_bytes());
        let keys: Vec<String> = rdr.records().map(|r| r.unwrap()[0].to_string()).collect();
        assert_eq!(keys, vec!["/a", "/b", "/"]);
    }

    #[test]
    fn empty_report_is_a_header() {
        let mut buf = Vec::new();
        let n = export_all(&AuditReport::default(), &mut buf).unwrap();
        assert_eq!(n, 0);
        assert_eq!(String::from_utf8(buf).unwrap(), "url,findings\n");
    }

    #[test]
    fn round_trip_through_metadata_table() {
        let report = sample();
        let mut buf = Vec::new();
        export_all(&report, &mut buf).unwrap();

        let table = MetadataTable::from_reader(buf.as_slice()).unwrap();
        let load = MetadataTableAdapter::new(Normalizer::default(), Some("https://www.example.com".into()))
            .load(table)
            .unwrap();
        let again = merge(vec![(SourceKind::MetadataTable, Ok(load))]);

        assert_eq!(again.report.len(), report.len());
        for original in report.records() {
            let back = &again.report.get(&original.key).unwrap().record;
            assert_eq!(back.fields, original.fields, "key {}", original.key);
            assert_eq!(back.extras, original.extras, "key {}", original.key);
        }
        assert!(again.warnings.is_empty());
    }
}
