use std::collections::HashSet;

use itertools::Itertools;

use crate::model::{Field, PageRecord};

/// Undefined, or blank once read as text.
pub fn is_missing(record: &PageRecord, field: Field) -> bool {
    match record.get(field) {
        None => true,
        Some(value) => value.to_string().trim().is_empty(),
    }
}

/// Non-blank text of `field`; blanks never group with each other.
fn present_text(record: &PageRecord, field: Field) -> Option<String> {
    record
        .get(field)
        .map(|v| v.to_string())
        .filter(|s| !s.trim().is_empty())
}

/// Positions of every record whose `field` value is shared with at least one
/// other record. All members of a group are returned, not just repeats.
pub fn duplicate_members(records: &[&PageRecord], field: Field) -> HashSet<usize> {
    records
        .iter()
        .enumerate()
        .filter_map(|(i, r)| present_text(r, field).map(|text| (text, i)))
        .into_group_map()
        .into_values()
        .filter(|members| members.len() > 1)
        .flatten()
        .collect()
}
