use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use lexyhub_core::{normalize_score, normalize_term, round4, DEFAULT_FALLBACK};
use rust_decimal::Decimal;
use serde_json::json;

use super::{MetricRow, MetricSource, SourceBatch, SourceKind};
use crate::error::SourceError;
use crate::store::{EventType, KeywordEvent, SignalFeed};
use crate::window::TelemetryWindow;

pub const SEARCH_TELEMETRY_SOURCE: &str = "extension";

/// Daily rollups of the browser extension's search telemetry.
pub struct SearchTelemetrySource {
    feed: Arc<dyn SignalFeed>,
}

impl SearchTelemetrySource {
    #[must_use]
    pub fn new(feed: Arc<dyn SignalFeed>) -> Self {
        Self { feed }
    }
}

#[async_trait]
impl MetricSource for SearchTelemetrySource {
    fn name(&self) -> &'static str {
        SEARCH_TELEMETRY_SOURCE
    }

    fn kind(&self) -> SourceKind {
        SourceKind::SearchTelemetry
    }

    async fn fetch(&self, window: &TelemetryWindow) -> Result<SourceBatch, SourceError> {
        let events = self.feed.list_keyword_events(window.start()).await?;
        Ok(SourceBatch::Metrics(rollup_events(window, &events)))
    }
}

#[derive(Default)]
struct Tally {
    searches: i64,
    impressions: i64,
    clicks: i64,
    conversions: i64,
    cost: Option<Decimal>,
    best_rank: Option<i32>,
}

impl Tally {
    fn add(&mut self, event: &KeywordEvent) {
        match event.event_type {
            EventType::Search => self.searches += 1,
            EventType::Impression => self.impressions += 1,
            EventType::Click => self.clicks += 1,
            EventType::Conversion => self.conversions += 1,
        }
        if let Some(cost) = event.cost {
            self.cost = Some(self.cost.unwrap_or_default() + cost);
        }
        if let Some(rank) = event.rank {
            self.best_rank = Some(self.best_rank.map_or(rank, |best| best.min(rank)));
        }
    }
}

#[allow(clippy::cast_precision_loss)]
/// Capped at `1.0`: conversions and clicks are logged independently, so a
/// day can see more of the numerator than the denominator.
fn ratio(numerator: i64, denominator: i64) -> Option<f64> {
    (denominator > 0).then(|| round4((numerator as f64 / denominator as f64).min(1.0)))
}

/// One row per (normalized term, market, day).
///
/// `ctr` is clicks over impressions and `conversion_rate` conversions over
/// clicks; each is `None` when its denominator is zero and never above `1.0`.
pub(crate) fn rollup_events(window: &TelemetryWindow, events: &[KeywordEvent]) -> Vec<MetricRow> {
    let mut tallies: BTreeMap<(String, String, NaiveDate), Tally> = BTreeMap::new();
    for event in events {
        let term = normalize_term(&event.term);
        let day = event.occurred_at.date_naive();
        if term.is_empty() || !window.contains(day) {
            continue;
        }
        tallies
            .entry((term, event.market.clone(), day))
            .or_default()
            .add(event);
    }

    tallies
        .into_iter()
        .map(|((term, market, recorded_on), tally)| {
            let ctr = ratio(tally.clicks, tally.impressions);
            MetricRow {
                term,
                market,
                source: SEARCH_TELEMETRY_SOURCE.to_string(),
                recorded_on,
                search_volume: Some(tally.searches),
                impressions: Some(tally.impressions),
                clicks: Some(tally.clicks),
                ctr,
                conversion_rate: ratio(tally.conversions, tally.clicks),
                cost: tally.cost,
                rank: tally.best_rank,
                engagement: ctr.map(|c| normalize_score(Some(c), DEFAULT_FALLBACK)),
                metadata: json!({ "conversions": tally.conversions }),
            }
        })
        .collect()
}
