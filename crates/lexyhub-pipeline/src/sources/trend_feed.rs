//! HTTP JSON trend feeds.
//!
//! A feed answers `GET <url>` with either a bare array of items or an object
//! wrapping the array under `items`, `data` or `trends`. Item fields are
//! matched leniently (`keyword`/`term`, `velocity`/`momentum`,
//! `growth_30d`/`expected_growth_30d`); unknown fields are kept as extras.
//! `date` may be a plain date or an RFC 3339 timestamp. An item that still
//! does not decode is skipped on its own; only an unreadable body fails the
//! feed.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use lexyhub_core::{normalize_score, normalize_term, DEFAULT_FALLBACK};
use reqwest::{Client, Url};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use super::{MetricSource, SourceBatch, SourceKind, TrendObservation};
use crate::error::SourceError;
use crate::retry::retry_with_backoff;
use crate::window::TelemetryWindow;

/// HTTP client settings shared by every feed of a run.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

pub struct TrendFeedSource {
    name: String,
    url: Url,
    client: Client,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl TrendFeedSource {
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidUrl`] if `url` does not parse or has no
    /// host, or [`SourceError::Http`] if the client cannot be built.
    pub fn new(url: &str, settings: &HttpSettings) -> Result<Self, SourceError> {
        let parsed = Url::parse(url).map_err(|e| SourceError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let host = parsed
            .host_str()
            .ok_or_else(|| SourceError::InvalidUrl {
                url: url.to_string(),
                reason: "missing host".to_string(),
            })?
            .to_string();
        let name = match parsed.port() {
            Some(port) => format!("feed:{host}:{port}"),
            None => format!("feed:{host}"),
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(settings.user_agent.clone())
            .build()?;

        Ok(Self {
            name,
            url: parsed,
            client,
            max_retries: settings.max_retries,
            backoff_base_ms: settings.backoff_base_ms,
        })
    }

    async fn request_body(&self) -> Result<String, SourceError> {
        let response = self.client.get(self.url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url: self.url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl MetricSource for TrendFeedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::TrendFeed
    }

    async fn fetch(&self, window: &TelemetryWindow) -> Result<SourceBatch, SourceError> {
        let body = retry_with_backoff(&self.name, self.max_retries, self.backoff_base_ms, || {
            self.request_body()
        })
        .await?;

        let items = parse_feed(&body).map_err(|e| SourceError::Deserialize {
            context: format!("trend feed {}", self.url),
            source: e,
        })?;

        Ok(SourceBatch::Trends(to_observations(&self.name, window, items)))
    }
}

#[derive(Debug, Deserialize)]
struct FeedItem {
    #[serde(alias = "term")]
    keyword: String,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default, alias = "momentum")]
    velocity: Option<f64>,
    #[serde(default, alias = "expected_growth_30d")]
    growth_30d: Option<f64>,
    #[serde(default, deserialize_with = "lenient_date")]
    date: Option<NaiveDate>,
    #[serde(default)]
    source: Option<String>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Ok(date) = NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        return Ok(Some(date));
    }
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| Some(ts.with_timezone(&Utc).date_naive()))
        .map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeedBody {
    List(Vec<Value>),
    Wrapped {
        #[serde(alias = "data", alias = "trends")]
        items: Vec<Value>,
    },
}

fn parse_feed(body: &str) -> Result<Vec<FeedItem>, serde_json::Error> {
    let raw = match serde_json::from_str::<FeedBody>(body)? {
        FeedBody::List(items) | FeedBody::Wrapped { items } => items,
    };

    Ok(raw
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<FeedItem>(item) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed feed item");
                None
            }
        })
        .collect())
}

/// Undated items are taken as observed today; items outside the window
/// and blank terms are dropped.
fn to_observations(
    feed_name: &str,
    window: &TelemetryWindow,
    items: Vec<FeedItem>,
) -> Vec<TrendObservation> {
    items
        .into_iter()
        .filter_map(|item| {
            let term = normalize_term(&item.keyword);
            let recorded_on = item.date.unwrap_or_else(|| window.end_date());
            if term.is_empty() || !window.contains(recorded_on) {
                tracing::debug!(
                    source = feed_name,
                    term = %item.keyword,
                    %recorded_on,
                    "dropping feed item outside window"
                );
                return None;
            }

            Some(TrendObservation {
                term,
                source: item.source.unwrap_or_else(|| feed_name.to_string()),
                recorded_on,
                trend_score: item.score.map(|s| normalize_score(Some(s), DEFAULT_FALLBACK)),
                velocity: item.velocity.filter(|v| v.is_finite()),
                expected_growth_30d: item.growth_30d.filter(|g| g.is_finite()),
                extras: Value::Object(item.rest),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn window() -> TelemetryWindow {
        TelemetryWindow::new(Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap(), 7)
    }

    #[test]
    fn parses_bare_list_and_wrapped_shapes() {
        let bare = r#"[{"keyword": "a", "score": 0.5}]"#;
        let wrapped = r#"{"data": [{"term": "b", "momentum": 0.7}]}"#;

        assert_eq!(parse_feed(bare).unwrap()[0].keyword, "a");
        let items = parse_feed(wrapped).unwrap();
        assert_eq!(items[0].keyword, "b");
        assert_eq!(items[0].velocity, Some(0.7));
    }

    #[test]
    fn malformed_items_are_skipped_individually() {
        let body = r#"[
            {"keyword": "a", "velocity": 0.5},
            {"keyword": "b", "date": "2024-01-05T10:00:00Z"},
            {"score": 3},
            {"keyword": "c", "date": "next tuesday"}
        ]"#;

        let items = parse_feed(body).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].keyword, "a");
        assert_eq!(items[1].keyword, "b");
        assert_eq!(items[1].date, NaiveDate::from_ymd_opt(2024, 1, 5));
    }

    #[test]
    fn unreadable_body_still_fails() {
        assert!(parse_feed(r#"{"status": "ok"}"#).is_err());
        assert!(parse_feed("<html>").is_err());
    }

    #[test]
    fn observations_normalize_and_filter() {
        let body = r#"{"items": [
            {"keyword": "Boho Wall Art", "score": 0.82, "velocity": 0.4, "growth_30d": 0.1,
             "date": "2024-01-05", "region": "US"},
            {"keyword": "old", "velocity": 0.9, "date": "2023-12-01"},
            {"keyword": "  ", "velocity": 0.9},
            {"keyword": "today", "velocity": 0.3, "source": "pinterest_trends"}
        ]}"#;

        let obs = to_observations("feed:trends.test", &window(), parse_feed(body).unwrap());

        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].term, "boho wall art");
        assert_eq!(obs[0].trend_score, Some(82.0));
        assert_eq!(obs[0].source, "feed:trends.test");
        assert_eq!(obs[0].extras["region"], "US");
        assert_eq!(obs[1].recorded_on, window().end_date());
        assert_eq!(obs[1].source, "pinterest_trends");
    }

    #[test]
    fn invalid_url_is_rejected() {
        let settings = HttpSettings {
            timeout_secs: 5,
            user_agent: "test".to_string(),
            max_retries: 0,
            backoff_base_ms: 0,
        };
        assert!(matches!(
            TrendFeedSource::new("not a url", &settings),
            Err(SourceError::InvalidUrl { .. })
        ));
    }
}
