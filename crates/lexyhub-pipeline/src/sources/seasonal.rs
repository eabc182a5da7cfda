use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use lexyhub_core::SeasonalPeriod;

use super::{MetricSource, SourceBatch, SourceKind};
use crate::error::SourceError;
use crate::store::SignalFeed;
use crate::window::TelemetryWindow;

/// Seasonal periods active for a country between today and a lookahead
/// horizon.
pub struct SeasonalCalendar {
    country: String,
    lookahead_days: u32,
    feed: Arc<dyn SignalFeed>,
}

impl SeasonalCalendar {
    #[must_use]
    pub fn new(country: &str, lookahead_days: u32, feed: Arc<dyn SignalFeed>) -> Self {
        Self {
            country: country.to_string(),
            lookahead_days,
            feed,
        }
    }
}

#[async_trait]
impl MetricSource for SeasonalCalendar {
    fn name(&self) -> &'static str {
        "seasonal_calendar"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::SeasonalCalendar
    }

    async fn fetch(&self, window: &TelemetryWindow) -> Result<SourceBatch, SourceError> {
        let periods = self.feed.list_seasonal_periods().await?;
        Ok(SourceBatch::Periods(active_periods(
            periods,
            &self.country,
            window.end_date(),
            self.lookahead_days,
        )))
    }
}

/// Periods scoped to `country` (or global) whose occurrence intersects
/// `[today, today + lookahead_days]`.
pub(crate) fn active_periods(
    periods: Vec<SeasonalPeriod>,
    country: &str,
    today: NaiveDate,
    lookahead_days: u32,
) -> Vec<SeasonalPeriod> {
    let horizon = today + Duration::days(i64::from(lookahead_days));
    periods
        .into_iter()
        .filter(|p| p.applies_to(country) && p.overlaps(today, horizon))
        .collect()
}
