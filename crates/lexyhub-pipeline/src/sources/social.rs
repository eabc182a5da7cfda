use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use lexyhub_core::{normalize_score, normalize_term, round4, DEFAULT_FALLBACK};
use serde_json::json;

use super::{mean, MetricRow, MetricSource, SourceBatch, SourceKind};
use crate::error::SourceError;
use crate::store::{SignalFeed, SocialMention};
use crate::window::TelemetryWindow;

/// Daily mention rollups for one social platform.
pub struct SocialPlatformSource {
    platform: String,
    market: String,
    feed: Arc<dyn SignalFeed>,
}

impl SocialPlatformSource {
    #[must_use]
    pub fn new(platform: &str, market: &str, feed: Arc<dyn SignalFeed>) -> Self {
        Self {
            platform: platform.to_string(),
            market: market.to_string(),
            feed,
        }
    }
}

#[async_trait]
impl MetricSource for SocialPlatformSource {
    fn name(&self) -> &str {
        &self.platform
    }

    fn kind(&self) -> SourceKind {
        SourceKind::SocialPlatform
    }

    async fn fetch(&self, window: &TelemetryWindow) -> Result<SourceBatch, SourceError> {
        let mentions = self
            .feed
            .list_social_mentions(&self.platform, window.start())
            .await?;
        Ok(SourceBatch::Metrics(rollup_mentions(
            &self.platform,
            &self.market,
            window,
            &mentions,
        )))
    }
}

/// One row per (normalized term, day): mentions summed, engagement and
/// sentiment averaged.
pub(crate) fn rollup_mentions(
    platform: &str,
    market: &str,
    window: &TelemetryWindow,
    mentions: &[SocialMention],
) -> Vec<MetricRow> {
    let mut groups: BTreeMap<(String, NaiveDate), Vec<&SocialMention>> = BTreeMap::new();
    for mention in mentions {
        let term = normalize_term(&mention.term);
        let day = mention.observed_at.date_naive();
        if term.is_empty() || !window.contains(day) {
            continue;
        }
        groups.entry((term, day)).or_default().push(mention);
    }

    groups
        .into_iter()
        .map(|((term, recorded_on), group)| {
            let total: i64 = group.iter().map(|m| m.mentions.max(0)).sum();
            let avg_engagement = mean(group.iter().map(|m| m.engagement_score));
            let avg_sentiment = mean(group.iter().map(|m| m.sentiment));

            MetricRow {
                term,
                market: market.to_string(),
                source: platform.to_string(),
                recorded_on,
                search_volume: Some(total),
                impressions: None,
                clicks: None,
                ctr: None,
                conversion_rate: None,
                cost: None,
                rank: None,
                engagement: avg_engagement.map(|e| normalize_score(Some(e), DEFAULT_FALLBACK)),
                metadata: json!({
                    "mentions": total,
                    "observations": group.len(),
                    "avg_engagement": avg_engagement.map(round4),
                    "avg_sentiment": avg_sentiment.map(round4),
                }),
            }
        })
        .collect()
}
