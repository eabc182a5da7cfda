//! Trailing N-day aggregation window and the existing-key filter.

use std::collections::HashSet;
use std::future::Future;
use std::hash::Hash;

use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use lexyhub_core::{NewKeywordStat, NewTrendPoint, StatKey, TrendKey};

use crate::error::StoreError;

/// The trailing range `[now - lookback_days, now]` a job aggregates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryWindow {
    now: DateTime<Utc>,
    lookback_days: u32,
}

impl TelemetryWindow {
    /// A lookback of zero is treated as one day.
    #[must_use]
    pub fn new(now: DateTime<Utc>, lookback_days: u32) -> Self {
        Self {
            now,
            lookback_days: lookback_days.max(1),
        }
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    #[must_use]
    pub fn lookback_days(&self) -> u32 {
        self.lookback_days
    }

    #[must_use]
    pub fn start(&self) -> DateTime<Utc> {
        self.now - Duration::days(i64::from(self.lookback_days))
    }

    #[must_use]
    pub fn start_iso(&self) -> String {
        self.start().to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    #[must_use]
    pub fn start_date(&self) -> NaiveDate {
        self.start().date_naive()
    }

    #[must_use]
    pub fn end_date(&self) -> NaiveDate {
        self.now.date_naive()
    }

    /// Whether `date` falls on a calendar day covered by the window.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date() && date <= self.end_date()
    }
}

/// A record with a natural uniqueness key.
pub trait Keyed {
    type Key: Eq + Hash + Clone;

    fn natural_key(&self) -> Self::Key;
}

impl Keyed for NewKeywordStat {
    type Key = StatKey;

    fn natural_key(&self) -> StatKey {
        self.key()
    }
}

impl Keyed for NewTrendPoint {
    type Key = TrendKey;

    fn natural_key(&self) -> TrendKey {
        self.key()
    }
}

/// Candidates whose key is not in `existing`, in their original order.
///
/// This is a set difference, not a merge: a candidate whose key exists is
/// dropped even if its values differ from the stored row.
pub fn filter_new<R: Keyed>(existing: &HashSet<R::Key>, candidates: Vec<R>) -> Vec<R> {
    candidates
        .into_iter()
        .filter(|c| !existing.contains(&c.natural_key()))
        .collect()
}

/// Result of [`dedupe_against_store`].
#[derive(Debug, Clone, PartialEq)]
pub struct Deduped<R> {
    pub fresh: Vec<R>,
    pub skipped_existing: usize,
}

/// Load the existing keys with `load_existing` and drop candidates that
/// already have a row.
///
/// With no candidates the store is not queried at all.
///
/// # Errors
///
/// Returns the [`StoreError`] from `load_existing`.
pub async fn dedupe_against_store<R, F, Fut>(
    candidates: Vec<R>,
    load_existing: F,
) -> Result<Deduped<R>, StoreError>
where
    R: Keyed,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<HashSet<R::Key>, StoreError>>,
{
    if candidates.is_empty() {
        return Ok(Deduped {
            fresh: Vec::new(),
            skipped_existing: 0,
        });
    }

    let existing = load_existing().await?;
    let total = candidates.len();
    let fresh = filter_new(&existing, candidates);
    let skipped_existing = total - fresh.len();

    tracing::debug!(
        candidates = total,
        existing = existing.len(),
        skipped_existing,
        "filtered candidates against stored keys"
    );

    Ok(Deduped {
        fresh,
        skipped_existing,
    })
}
