use crate::model::{Field, PageRecord};

use super::RuleThresholds;

/// CTR below `max_ctr`. When impressions are known the page also needs enough
/// volume for the rate to mean something.
pub fn low_ctr(record: &PageRecord, t: &RuleThresholds) -> bool {
    let Some(ctr) = record.number(Field::Ctr) else {
        return false;
    };
    if ctr >= t.max_ctr {
        return false;
    }
    match record.number(Field::Impressions) {
        Some(impressions) => impressions >= t.min_impressions_for_ctr as f64,
        None => true,
    }
}

pub fn high_impression_low_click(record: &PageRecord, t: &RuleThresholds) -> bool {
    match (record.number(Field::Impressions), record.number(Field::Clicks)) {
        (Some(impressions), Some(clicks)) => {
            impressions > t.impressions_floor as f64 && clicks < t.clicks_ceiling as f64
        }
        _ => false,
    }
}
