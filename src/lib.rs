//! Reconciles page metadata, Search Console and GA4 exports into one
//! audited table keyed by canonical URL.
//!
//! Pipeline: source adapters -> `reconcile::merge` -> `rules::evaluate` ->
//! `export::export`. `run_audit` strings the middle together.

pub mod config;
pub mod error;
pub mod export;
pub mod fetch;
pub mod model;
pub mod normalize;
pub mod reconcile;
pub mod rules;
pub mod source;
pub mod summary;

use crate::error::{FieldConflictNotice, LoadWarning, SourceUnavailableError};
use crate::model::AuditReport;
use crate::reconcile::SourceOutcome;
use crate::rules::RuleThresholds;
use crate::source::{SourceKind, SourceLoad};

pub type SourceResult = Result<SourceLoad, SourceUnavailableError>;

/// Adapter output per source. `None` means the source was not configured.
#[derive(Debug, Clone, Default)]
pub struct AuditInputs {
    pub metadata: Option<SourceResult>,
    pub search_console: Option<SourceResult>,
    pub analytics: Option<SourceResult>,
}

#[derive(Debug, Clone, Default)]
pub struct AuditOutcome {
    pub report: AuditReport,
    pub conflicts: Vec<FieldConflictNotice>,
    pub unavailable: Vec<SourceUnavailableError>,
    pub warnings: Vec<LoadWarning>,
}

/// Merge whatever the sources produced and evaluate the rules. Never fails:
/// missing or broken sources only shrink the report.
pub fn run_audit(inputs: AuditInputs, thresholds: &RuleThresholds) -> AuditOutcome {
    let sources: Vec<SourceOutcome> = [
        (SourceKind::MetadataTable, inputs.metadata),
        (SourceKind::SearchConsole, inputs.search_console),
        (SourceKind::Analytics, inputs.analytics),
    ]
    .into_iter()
    .filter_map(|(kind, outcome)| outcome.map(|o| (kind, o)))
    .collect();

    let merged = reconcile::merge(sources);
    AuditOutcome {
        report: rules::evaluate(merged.report, thresholds),
        conflicts: merged.conflicts,
        unavailable: merged.unavailable,
        warnings: merged.warnings,
    }
}
