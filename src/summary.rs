use std::collections::BTreeMap;
use std::fmt;

use crate::model::{AuditReport, RuleId};
use crate::rules::active_rules;

/// Per-rule page counts for the end-of-run printout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub pages: usize,
    pub flagged: usize,
    /// Only rules that were active in the run; inactive ones are absent.
    pub by_rule: BTreeMap<RuleId, usize>,
}

impl Summary {
    pub fn of(report: &AuditReport) -> Self {
        let mut by_rule: BTreeMap<RuleId, usize> = active_rules(report.available_fields())
            .into_iter()
            .map(|r| (r, 0))
            .collect();
        for finding in report.findings() {
            *by_rule.entry(finding.rule).or_default() += 1;
        }
        Summary {
            pages: report.len(),
            flagged: report.entries().iter().filter(|e| !e.findings.is_empty()).count(),
            by_rule,
        }
    }
}

fn label(rule: RuleId) -> &'static str {
    match rule {
        RuleId::MissingTitle => "Missing title",
        RuleId::MissingH1 => "Missing H1",
        RuleId::MissingMetaDescription => "Missing meta description",
        RuleId::DuplicateMetaDescription => "Duplicate meta description",
        RuleId::DuplicateH1 => "Duplicate H1",
        RuleId::LowCtr => "Low CTR",
        RuleId::HighImpressionLowClick => "High impressions, low clicks",
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<30} | {:>6}", "Rule", "Pages")?;
        writeln!(f, "{}", "-".repeat(39))?;
        for (rule, count) in &self.by_rule {
            writeln!(f, "{:<30} | {:>6}", label(*rule), count)?;
        }
        write!(f, "\n{} pages, {} flagged", self.pages, self.flagged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AuditEntry, Field, PageRecord, Value};
    use crate::rules::{evaluate, tests::thresholds};

    #[test]
    fn counts_active_rules_only() {
        let mut a = PageRecord::new("/a");
        a.fields.insert(Field::H1, Value::Text("Same".into()));
        let mut b = PageRecord::new("/b");
        b.fields.insert(Field::H1, Value::Text("Same".into()));
        let c = PageRecord::new("/c");
        let entries = vec![a, b, c]
            .into_iter()
            .map(|record| AuditEntry { record, findings: Vec::new() })
            .collect();
        let available = [Field::H1].into_iter().collect();
        let report = evaluate(AuditReport::new(entries, available), &thresholds());

        let s = Summary::of(&report);
        assert_eq!(s.pages, 3);
        assert_eq!(s.flagged, 3);
        assert_eq!(s.by_rule.get(&RuleId::DuplicateH1), Some(&2));
        assert_eq!(s.by_rule.get(&RuleId::MissingH1), Some(&1));
        assert_eq!(s.by_rule.get(&RuleId::MissingTitle), None);
        assert!(s.to_string().contains("Duplicate H1"));
    }
}
