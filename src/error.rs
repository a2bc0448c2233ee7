use std::fmt;

use thiserror::Error;

use crate::model::Field;
use crate::source::SourceKind;

/// Fatal errors: a payload that cannot be read at all.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error(transparent)]
    InvalidUrl(#[from] InvalidUrlError),
    #[error("{source_kind} payload is malformed: {reason}")]
    MalformedPayload {
        source_kind: SourceKind,
        reason: String,
    },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AuditError {
    pub fn malformed(source_kind: SourceKind, reason: impl Into<String>) -> Self {
        AuditError::MalformedPayload {
            source_kind,
            reason: reason.into(),
        }
    }
}

/// Raised by the normalizer for empty or whitespace-only input only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid url: {raw:?} is empty")]
pub struct InvalidUrlError {
    pub raw: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unavailable {
    Auth,
    Quota,
    Transport,
    Payload,
    NotConfigured,
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Unavailable::Auth => "authentication failed",
            Unavailable::Quota => "quota exceeded",
            Unavailable::Transport => "transport error",
            Unavailable::Payload => "unreadable payload",
            Unavailable::NotConfigured => "not configured",
        };
        f.write_str(s)
    }
}

/// A whole source failed to load. The run carries on without it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{source_kind} unavailable ({kind}): {reason}")]
pub struct SourceUnavailableError {
    pub source_kind: SourceKind,
    pub kind: Unavailable,
    pub reason: String,
}

impl SourceUnavailableError {
    pub fn new(source_kind: SourceKind, kind: Unavailable, reason: impl Into<String>) -> Self {
        SourceUnavailableError {
            source_kind,
            kind,
            reason: reason.into(),
        }
    }
}

/// A numeric cell that could not be coerced. The field is dropped, the row kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoercionWarning {
    pub source_kind: SourceKind,
    pub row: usize,
    pub key: String,
    pub field: Field,
    pub raw: String,
}

impl fmt::Display for CoercionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} row {} ({}): dropped {} value {:?}",
            self.source_kind, self.row, self.key, self.field, self.raw
        )
    }
}

/// Per-row problems collected while loading a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadWarning {
    InvalidKey {
        source_kind: SourceKind,
        row: usize,
        error: InvalidUrlError,
    },
    Coercion(CoercionWarning),
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadWarning::InvalidKey {
                source_kind,
                row,
                error,
            } => write!(f, "{} row {}: row dropped, {}", source_kind, row, error),
            LoadWarning::Coercion(w) => w.fmt(f),
        }
    }
}

/// Two sources (or two rows of one source) disagree on a field.
/// The first value stays on the record; both are reported here.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldConflictNotice {
    pub key: String,
    pub column: String,
    pub kept: String,
    pub kept_from: SourceKind,
    pub rejected: String,
    pub rejected_from: SourceKind,
}

impl fmt::Display for FieldConflictNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: kept {:?} ({}), ignored {:?} ({})",
            self.key, self.column, self.kept, self.kept_from, self.rejected, self.rejected_from
        )
    }
}
