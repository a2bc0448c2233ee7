//! Google reporting API collaborators. These do the network I/O the core never
//! does, and turn every failure into a `SourceUnavailableError`.

use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{info, warn};

use crate::error::{SourceUnavailableError, Unavailable};
use crate::source::{AnalyticsResponse, SearchConsoleResponse, SourceKind};

const SEARCH_CONSOLE_API: &str = "https://www.googleapis.com/webmasters/v3/sites";
const ANALYTICS_API: &str = "https://analyticsdata.googleapis.com/v1beta/properties";
const SEARCH_CONSOLE_PAGE_SIZE: usize = 25_000;
const ANALYTICS_PAGE_SIZE: usize = 100_000;
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct SearchConsoleQuery {
    pub property_url: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct AnalyticsQuery {
    pub property_id: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

pub struct GoogleClient {
    http: reqwest::Client,
    token: String,
}

fn unavailable(kind: SourceKind, why: Unavailable, reason: impl Into<String>) -> SourceUnavailableError {
    SourceUnavailableError::new(kind, why, reason)
}

/// Property URLs contain `:` and `/`, so they go in the path encoded.
fn search_console_endpoint(property_url: &str) -> String {
    format!(
        "{}/{}/searchAnalytics/query",
        SEARCH_CONSOLE_API,
        urlencoding::encode(property_url)
    )
}

fn analytics_endpoint(property_id: &str) -> String {
    format!("{}/{}:runReport", ANALYTICS_API, urlencoding::encode(property_id))
}

impl GoogleClient {
    pub fn new(token: impl Into<String>) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(GoogleClient {
            http,
            token: token.into(),
        })
    }

    /// Every `page` row for the range. Zero rows is a normal, successful answer.
    pub async fn search_console(
        &self,
        q: &SearchConsoleQuery,
    ) -> Result<SearchConsoleResponse, SourceUnavailableError> {
        let kind = SourceKind::SearchConsole;
        let url = search_console_endpoint(&q.property_url);
        let mut all = SearchConsoleResponse::default();
        loop {
            let body = json!({
                "startDate": q.start.to_string(),
                "endDate": q.end.to_string(),
                "dimensions": ["page"],
                "rowLimit": SEARCH_CONSOLE_PAGE_SIZE,
                "startRow": all.rows.len(),
            });
            let page: SearchConsoleResponse = self.post_with_retry(kind, &url, &body).await?;
            let got = page.rows.len();
            all.rows.extend(page.rows);
            if got < SEARCH_CONSOLE_PAGE_SIZE {
                break;
            }
        }
        info!("{}: fetched {} rows for {}", kind, all.rows.len(), q.property_url);
        Ok(all)
    }

    pub async fn analytics(
        &self,
        q: &AnalyticsQuery,
    ) -> Result<AnalyticsResponse, SourceUnavailableError> {
        let kind = SourceKind::Analytics;
        let url = analytics_endpoint(&q.property_id);
        let mut all = AnalyticsResponse::default();
        loop {
            let body = json!({
                "dateRanges": [{ "startDate": q.start.to_string(), "endDate": q.end.to_string() }],
                "dimensions": [{ "name": "pagePath" }],
                "metrics": [{ "name": "sessions" }, { "name": "engagedSessions" }],
                "limit": ANALYTICS_PAGE_SIZE,
                "offset": all.rows.len(),
            });
            let page: AnalyticsResponse = self.post_with_retry(kind, &url, &body).await?;
            let got = page.rows.len();
            if all.dimension_headers.is_empty() {
                all.dimension_headers = page.dimension_headers;
                all.metric_headers = page.metric_headers;
            }
            all.rows.extend(page.rows);
            if got < ANALYTICS_PAGE_SIZE {
                break;
            }
        }
        info!("{}: fetched {} rows for property {}", kind, all.rows.len(), q.property_id);
        Ok(all)
    }

    async fn post_with_retry<T: DeserializeOwned>(
        &self,
        kind: SourceKind,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T, SourceUnavailableError> {
        let mut attempt = 0;
        loop {
            match self.post_once(kind, url, body).await {
                Err(e) if e.kind == Unavailable::Transport && attempt < MAX_RETRIES => {
                    let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
                    warn!(
                        "{} request failed (attempt {}/{}), backing off {:.1}s: {}",
                        kind,
                        attempt + 1,
                        MAX_RETRIES,
                        backoff.as_secs_f64(),
                        e.reason
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn post_once<T: DeserializeOwned>(
        &self,
        kind: SourceKind,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T, SourceUnavailableError> {
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| unavailable(kind, Unavailable::Transport, e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let why = match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Unavailable::Auth,
                StatusCode::TOO_MANY_REQUESTS => Unavailable::Quota,
                s if s.is_server_error() => Unavailable::Transport,
                _ => Unavailable::Payload,
            };
            return Err(unavailable(kind, why, format!("HTTP {}: {}", status, text.trim())));
        }
        resp.json::<T>()
            .await
            .map_err(|e| unavailable(kind, Unavailable::Payload, e.to_string()))
    }
}

/// Read a saved API response from disk in place of a live call.
pub fn read_json<T: DeserializeOwned>(kind: SourceKind, path: &Path) -> Result<T, SourceUnavailableError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        unavailable(kind, Unavailable::Transport, format!("{}: {}", path.display(), e))
    })?;
    serde_json::from_str(&text).map_err(|e| {
        unavailable(kind, Unavailable::Payload, format!("{}: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_urls_are_path_safe() {
        assert_eq!(
            search_console_endpoint("https://www.example.com/"),
            "https://www.googleapis.com/webmasters/v3/sites/https%3A%2F%2Fwww.example.com%2F/searchAnalytics/query"
        );
        assert_eq!(
            search_console_endpoint("sc-domain:example.com"),
            "https://www.googleapis.com/webmasters/v3/sites/sc-domain%3Aexample.com/searchAnalytics/query"
        );
        assert_eq!(
            analytics_endpoint("123456"),
            "https://analyticsdata.googleapis.com/v1beta/properties/123456:runReport"
        );
    }

    #[test]
    fn saved_responses_load() {
        let gsc: SearchConsoleResponse =
            read_json(SourceKind::SearchConsole, Path::new("tests/fixtures/search_console.json"))
                .unwrap();
        assert_eq!(gsc.rows.len(), 3);
        let ga4: AnalyticsResponse =
            read_json(SourceKind::Analytics, Path::new("tests/fixtures/ga4.json")).unwrap();
        assert_eq!(ga4.rows.len(), 3);
    }

    #[test]
    fn unreadable_file_is_unavailable_not_fatal() {
        let err = read_json::<SearchConsoleResponse>(
            SourceKind::SearchConsole,
            Path::new("tests/fixtures/does-not-exist.json"),
        )
        .unwrap_err();
        assert_eq!(err.kind, Unavailable::Transport);
        let err = read_json::<AnalyticsResponse>(
            SourceKind::Analytics,
            Path::new("tests/fixtures/crawl.csv"),
        )
        .unwrap_err();
        assert_eq!(err.kind, Unavailable::Payload);
    }
}
