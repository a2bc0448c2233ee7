use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Title,
    MetaDescription,
    H1,
    Clicks,
    Impressions,
    Ctr,
    Position,
    Sessions,
    EngagedSessions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// Non-negative integer.
    Count,
    Decimal,
}

impl Field {
    pub const ALL: [Field; 9] = [
        Field::Title,
        Field::MetaDescription,
        Field::H1,
        Field::Clicks,
        Field::Impressions,
        Field::Ctr,
        Field::Position,
        Field::Sessions,
        Field::EngagedSessions,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::MetaDescription => "meta_description",
            Field::H1 => "h1",
            Field::Clicks => "clicks",
            Field::Impressions => "impressions",
            Field::Ctr => "ctr",
            Field::Position => "position",
            Field::Sessions => "sessions",
            Field::EngagedSessions => "engagedSessions",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Field::Title | Field::MetaDescription | Field::H1 => FieldKind::Text,
            Field::Clicks | Field::Impressions | Field::Sessions | Field::EngagedSessions => {
                FieldKind::Count
            }
            Field::Ctr | Field::Position => FieldKind::Decimal,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Count(u64),
    Decimal(f64),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Count(n) => Some(*n as f64),
            Value::Decimal(x) => Some(*x),
            Value::Text(_) => None,
        }
    }
}

/// Numbers use the shortest representation that parses back to the same value.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Count(n) => write!(f, "{}", n),
            Value::Decimal(x) => write!(f, "{}", x),
        }
    }
}

pub type FieldMap = BTreeMap<Field, Value>;

/// One page after reconciliation. Fields no source supplied are absent from `fields`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PageRecord {
    pub key: String,
    pub fields: FieldMap,
    pub extras: BTreeMap<String, String>,
}

impl PageRecord {
    pub fn new(key: impl Into<String>) -> Self {
        PageRecord {
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn get(&self, field: Field) -> Option<&Value> {
        self.fields.get(&field)
    }

    pub fn text(&self, field: Field) -> Option<&str> {
        self.get(field).and_then(Value::as_text)
    }

    pub fn number(&self, field: Field) -> Option<f64> {
        self.get(field).and_then(Value::as_f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Missing,
    Duplicate,
    LowPerformance,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Missing => "missing",
            Severity::Duplicate => "duplicate",
            Severity::LowPerformance => "low-performance",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "missing" => Ok(Severity::Missing),
            "duplicate" => Ok(Severity::Duplicate),
            "low-performance" | "low_performance" => Ok(Severity::LowPerformance),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// Declaration order is the order findings are listed in on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleId {
    MissingTitle,
    MissingH1,
    MissingMetaDescription,
    DuplicateMetaDescription,
    DuplicateH1,
    LowCtr,
    HighImpressionLowClick,
}

impl RuleId {
    pub fn all() -> &'static [RuleId] {
        &[
            RuleId::MissingTitle,
            RuleId::MissingH1,
            RuleId::MissingMetaDescription,
            RuleId::DuplicateMetaDescription,
            RuleId::DuplicateH1,
            RuleId::LowCtr,
            RuleId::HighImpressionLowClick,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RuleId::MissingTitle => "missing-title",
            RuleId::MissingH1 => "missing-h1",
            RuleId::MissingMetaDescription => "missing-meta-description",
            RuleId::DuplicateMetaDescription => "duplicate-meta-description",
            RuleId::DuplicateH1 => "duplicate-h1",
            RuleId::LowCtr => "low-ctr",
            RuleId::HighImpressionLowClick => "high-impression-low-click",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            RuleId::MissingTitle | RuleId::MissingH1 | RuleId::MissingMetaDescription => {
                Severity::Missing
            }
            RuleId::DuplicateMetaDescription | RuleId::DuplicateH1 => Severity::Duplicate,
            RuleId::LowCtr | RuleId::HighImpressionLowClick => Severity::LowPerformance,
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        RuleId::all()
            .iter()
            .copied()
            .find(|r| r.as_str() == wanted)
            .ok_or_else(|| format!("unknown rule '{}'", s.trim()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Finding {
    pub key: String,
    pub rule: RuleId,
    pub severity: Severity,
}

impl Finding {
    pub fn new(key: &str, rule: RuleId) -> Self {
        Finding {
            key: key.to_string(),
            rule,
            severity: rule.severity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub record: PageRecord,
    pub findings: Vec<Finding>,
}

impl AuditEntry {
    pub fn has(&self, rule: RuleId) -> bool {
        self.findings.iter().any(|f| f.rule == rule)
    }
}

/// Reconciled pages in first-appearance order, plus the fields the run had
/// data for. Read-only once built.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AuditReport {
    entries: Vec<AuditEntry>,
    available_fields: BTreeSet<Field>,
}

impl AuditReport {
    pub(crate) fn new(entries: Vec<AuditEntry>, available_fields: BTreeSet<Field>) -> Self {
        AuditReport {
            entries,
            available_fields,
        }
    }

    pub(crate) fn into_parts(self) -> (Vec<AuditEntry>, BTreeSet<Field>) {
        (self.entries, self.available_fields)
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn records(&self) -> impl Iterator<Item = &PageRecord> {
        self.entries.iter().map(|e| &e.record)
    }

    pub fn get(&self, key: &str) -> Option<&AuditEntry> {
        self.entries.iter().find(|e| e.record.key == key)
    }

    pub fn available_fields(&self) -> &BTreeSet<Field> {
        &self.available_fields
    }

    pub fn has_field(&self, field: Field) -> bool {
        self.available_fields.contains(&field)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.entries.iter().flat_map(|e| e.findings.iter())
    }
}
