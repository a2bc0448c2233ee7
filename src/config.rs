use std::path::Path;

use chrono::{Days, NaiveDate};
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use crate::normalize::Normalizer;
use crate::rules::RuleThresholds;

const DEFAULT_FILE: &str = "seo-audit";
const ENV_PREFIX: &str = "SEO_AUDIT";
const DEFAULT_RANGE_DAYS: u64 = 28;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchConsoleSettings {
    /// `https://www.example.com/` or `sc-domain:example.com`.
    pub property_url: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyticsSettings {
    pub property_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Run settings: defaults, then `seo-audit.toml`, then `SEO_AUDIT_*` env vars
/// (`__` separates nested keys, e.g. `SEO_AUDIT_THRESHOLDS__MAX_CTR`).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub base_domain: Option<String>,
    #[serde(default)]
    pub drop_query: bool,
    #[serde(default)]
    pub drop_fragment: bool,
    pub thresholds: RuleThresholds,
    #[serde(default)]
    pub search_console: SearchConsoleSettings,
    #[serde(default)]
    pub analytics: AnalyticsSettings,
    /// OAuth bearer token for the Google reporting APIs.
    #[serde(default)]
    pub access_token: Option<String>,
}

/// `SEO_AUDIT_` then `__` between nested keys.
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    Config::builder()
        .set_default("thresholds.max_ctr", 0.02_f64)?
        .set_default("thresholds.min_impressions_for_ctr", 100_i64)?
        .set_default("thresholds.impressions_floor", 1000_i64)?
        .set_default("thresholds.clicks_ceiling", 10_i64)
}

impl Settings {
    /// Load from an explicit file (must exist) or the optional default one.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_FILE).required(false),
        };
        defaults()?
            .add_source(file)
            .add_source(environment())
            .build()?
            .try_deserialize()
    }

    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    pub fn normalizer(&self) -> Normalizer {
        Normalizer {
            drop_query: self.drop_query,
            drop_fragment: self.drop_fragment,
        }
    }
}

/// Fill in an open-ended date range: `end` defaults to yesterday, `start` to
/// 28 days ending at `end`.
pub fn date_range(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    today: NaiveDate,
) -> (NaiveDate, NaiveDate) {
    let end = end.unwrap_or_else(|| today.checked_sub_days(Days::new(1)).unwrap_or(today));
    let start = start.unwrap_or_else(|| {
        end.checked_sub_days(Days::new(DEFAULT_RANGE_DAYS - 1))
            .unwrap_or(end)
    });
    (start, end)
}
