use crate::model::Field;

/// Non-negative integer. Accepts thousands separators and a zero fraction (`12.0`).
pub fn count(raw: &str) -> Option<u64> {
    let cleaned = strip_separators(raw.trim());
    if let Ok(n) = cleaned.parse::<u64>() {
        return Some(n);
    }
    count_from_f64(cleaned.parse::<f64>().ok()?)
}

pub fn count_from_f64(x: f64) -> Option<u64> {
    if x.is_finite() && x >= 0.0 && x.fract() == 0.0 && x <= u64::MAX as f64 {
        Some(x as u64)
    } else {
        None
    }
}

/// Finite decimal. `ctr` may carry a percent sign (`3.5%` -> 0.035).
pub fn decimal(field: Field, raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let (number, scale) = match trimmed.strip_suffix('%') {
        Some(n) if field == Field::Ctr => (n.trim_end(), 100.0),
        Some(_) => return None,
        None => (trimmed, 1.0),
    };
    let x = strip_separators(number).parse::<f64>().ok()? / scale;
    x.is_finite().then_some(x)
}

fn strip_separators(s: &str) -> String {
    s.chars().filter(|c| *c != ',' && *c != '_').collect()
}
