pub mod content;
pub mod performance;

use std::collections::{BTreeSet, HashSet};

use tracing::info;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::model::{AuditEntry, AuditReport, Field, Finding, PageRecord, RuleId};

/// Performance cut-offs. The engine has no opinion on their values.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize)]
pub struct RuleThresholds {
    /// `low-ctr` fires below this click-through rate (a fraction, 0.02 = 2%).
    pub max_ctr: f64,
    /// With impressions known, `low-ctr` only fires at or above this volume.
    pub min_impressions_for_ctr: u64,
    /// `high-impression-low-click`: impressions strictly above this...
    pub impressions_floor: u64,
    /// ...and clicks strictly below this.
    pub clicks_ceiling: u64,
}

/// Fields a rule reads. A rule whose inputs no source supplied is skipped.
pub fn inputs(rule: RuleId) -> &'static [Field] {
    match rule {
        RuleId::MissingTitle => &[Field::Title],
        RuleId::MissingH1 | RuleId::DuplicateH1 => &[Field::H1],
        RuleId::MissingMetaDescription | RuleId::DuplicateMetaDescription => {
            &[Field::MetaDescription]
        }
        RuleId::LowCtr => &[Field::Ctr],
        RuleId::HighImpressionLowClick => &[Field::Impressions, Field::Clicks],
    }
}

pub fn active_rules(available: &BTreeSet<Field>) -> Vec<RuleId> {
    RuleId::all()
        .iter()
        .copied()
        .filter(|r| inputs(*r).iter().all(|f| available.contains(f)))
        .collect()
}

/// Table-wide facts computed once before the per-page pass.
struct Context<'a> {
    rules: Vec<RuleId>,
    thresholds: &'a RuleThresholds,
    duplicate_descriptions: HashSet<usize>,
    duplicate_h1s: HashSet<usize>,
}

impl Context<'_> {
    fn fires(&self, rule: RuleId, idx: usize, record: &PageRecord) -> bool {
        match rule {
            RuleId::MissingTitle => content::is_missing(record, Field::Title),
            RuleId::MissingH1 => content::is_missing(record, Field::H1),
            RuleId::MissingMetaDescription => content::is_missing(record, Field::MetaDescription),
            RuleId::DuplicateMetaDescription => self.duplicate_descriptions.contains(&idx),
            RuleId::DuplicateH1 => self.duplicate_h1s.contains(&idx),
            RuleId::LowCtr => performance::low_ctr(record, self.thresholds),
            RuleId::HighImpressionLowClick => {
                performance::high_impression_low_click(record, self.thresholds)
            }
        }
    }

    fn annotate(&self, idx: usize, entry: AuditEntry) -> AuditEntry {
        let findings = self
            .rules
            .iter()
            .filter(|r| self.fires(**r, idx, &entry.record))
            .map(|r| Finding::new(&entry.record.key, *r))
            .collect();
        AuditEntry {
            record: entry.record,
            findings,
        }
    }
}

#[cfg(feature = "rayon")]
fn annotate_all(ctx: &Context<'_>, entries: Vec<AuditEntry>) -> Vec<AuditEntry> {
    entries
        .into_par_iter()
        .enumerate()
        .map(|(i, e)| ctx.annotate(i, e))
        .collect()
}

#[cfg(not(feature = "rayon"))]
fn annotate_all(ctx: &Context<'_>, entries: Vec<AuditEntry>) -> Vec<AuditEntry> {
    entries
        .into_iter()
        .enumerate()
        .map(|(i, e)| ctx.annotate(i, e))
        .collect()
}

/// Attach findings to every page. Raw fields are left untouched and any
/// findings from an earlier evaluation are replaced.
pub fn evaluate(report: AuditReport, thresholds: &RuleThresholds) -> AuditReport {
    let (entries, available) = report.into_parts();
    let rules = active_rules(&available);

    let ctx = {
        let records: Vec<&PageRecord> = entries.iter().map(|e| &e.record).collect();
        Context {
            duplicate_descriptions: content::duplicate_members(&records, Field::MetaDescription),
            duplicate_h1s: content::duplicate_members(&records, Field::H1),
            rules,
            thresholds,
        }
    };

    let entries = annotate_all(&ctx, entries);
    let flagged = entries.iter().filter(|e| !e.findings.is_empty()).count();
    info!(
        "evaluated {} rules over {} pages, {} flagged",
        ctx.rules.len(),
        entries.len(),
        flagged
    );
    AuditReport::new(entries, available)
}
