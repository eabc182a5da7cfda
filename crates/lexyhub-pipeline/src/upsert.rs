//! Conflict-safe writes into the keyword store.
//!
//! Stat rows are insert-only per `(keyword_id, source, recorded_on)`; trend
//! points are updated in place per `(term, source, recorded_on)`. Keyword
//! records are changed by read-merge-write of a single extras section, and
//! the write is skipped entirely when nothing differs from what is stored.
//! Every write is grouped per keyword or term so one bad group is logged,
//! counted and skipped without failing the batch.

use std::collections::{BTreeMap, HashMap, HashSet};

use lexyhub_core::{
    normalize_term, CoreError, DerivedScalars, ExtrasSection, NewKeywordStat, NewTrendPoint,
    SectionKind, TrendKey,
};

use crate::error::StoreError;
use crate::report::{FailureScope, WriteReport};
use crate::sources::{MetricRow, TrendObservation};
use crate::store::{KeywordRecord, KeywordStore};
use crate::window::{dedupe_against_store, TelemetryWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Written,
    Unchanged,
}

/// Keywords resolved for a batch of metric rows, by `(term, market)`.
pub type KeywordIndex = HashMap<(String, String), KeywordRecord>;

pub struct UpsertCoordinator<'a> {
    store: &'a dyn KeywordStore,
}

impl<'a> UpsertCoordinator<'a> {
    #[must_use]
    pub fn new(store: &'a dyn KeywordStore) -> Self {
        Self { store }
    }

    /// Ensure a keyword exists for every distinct `(term, market)` in `rows`.
    ///
    /// A term that cannot be resolved is recorded in `report` and its rows
    /// are left out of the index.
    pub async fn resolve_keywords(
        &self,
        rows: &[MetricRow],
        report: &mut WriteReport,
    ) -> KeywordIndex {
        let mut index = KeywordIndex::new();
        for row in rows {
            let key = (row.term.clone(), row.market.clone());
            if index.contains_key(&key) {
                continue;
            }
            match self
                .store
                .ensure_keyword(&row.term, &row.market, &row.source)
                .await
            {
                Ok(record) => {
                    index.insert(key, record);
                }
                Err(e) => {
                    tracing::warn!(
                        term = %row.term,
                        market = %row.market,
                        error = %e,
                        "keyword resolve failed"
                    );
                    report.fail(FailureScope::Term, row.term.clone(), &e);
                }
            }
        }
        index
    }

    /// Attach keyword ids to metric rows; rows with no resolved keyword are dropped.
    #[must_use]
    pub fn stage_stats(rows: &[MetricRow], index: &KeywordIndex) -> Vec<NewKeywordStat> {
        rows.iter()
            .filter_map(|row| {
                let keyword = index.get(&(row.term.clone(), row.market.clone()))?;
                Some(NewKeywordStat {
                    keyword_id: keyword.id,
                    source: row.source.clone(),
                    recorded_on: row.recorded_on,
                    search_volume: row.search_volume,
                    impressions: row.impressions,
                    clicks: row.clicks,
                    ctr: row.ctr,
                    conversion_rate: row.conversion_rate,
                    cost: row.cost,
                    rank: row.rank,
                    metadata: row.metadata.clone(),
                })
            })
            .collect()
    }

    /// Insert stat rows not already stored within `window`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] only if the existing keys cannot be loaded.
    /// Per-keyword write failures are reported, not returned.
    pub async fn write_stats(
        &self,
        window: &TelemetryWindow,
        rows: Vec<NewKeywordStat>,
    ) -> Result<WriteReport, StoreError> {
        let mut report = WriteReport::default();
        let deduped = dedupe_against_store(rows, || {
            self.store.select_existing_stat_keys(window.start_date())
        })
        .await?;
        report.skipped_existing = deduped.skipped_existing as u64;

        let mut groups: BTreeMap<i64, Vec<NewKeywordStat>> = BTreeMap::new();
        for row in deduped.fresh {
            groups.entry(row.keyword_id).or_default().push(row);
        }

        for (keyword_id, group) in groups {
            match self.store.upsert_keyword_stats(&group).await {
                Ok(inserted) => {
                    report.written += inserted;
                    // Rows a concurrent run inserted first hit the conflict clause.
                    report.skipped_existing += (group.len() as u64).saturating_sub(inserted);
                }
                Err(e) => {
                    tracing::warn!(
                        keyword_id,
                        rows = group.len(),
                        error = %e,
                        "stat upsert failed"
                    );
                    report.fail(FailureScope::Keyword, keyword_id.to_string(), &e);
                }
            }
        }

        Ok(report)
    }

    /// Upsert trend points, one statement per term.
    ///
    /// Repeated keys within `points` collapse to the last one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] only if the existing keys cannot be loaded.
    pub async fn write_trend_series(
        &self,
        window: &TelemetryWindow,
        points: Vec<NewTrendPoint>,
    ) -> Result<WriteReport, StoreError> {
        let mut report = WriteReport::default();
        if points.is_empty() {
            return Ok(report);
        }

        let existing: HashSet<TrendKey> = self
            .store
            .select_existing_trend_keys(window.start_date())
            .await?;

        let mut by_key: BTreeMap<TrendKey, NewTrendPoint> = BTreeMap::new();
        for point in points {
            by_key.insert(point.key(), point);
        }
        let mut groups: BTreeMap<String, Vec<NewTrendPoint>> = BTreeMap::new();
        for (key, point) in by_key {
            groups.entry(key.term).or_default().push(point);
        }

        for (term, group) in groups {
            let refreshed = group.iter().filter(|p| existing.contains(&p.key())).count() as u64;
            match self.store.upsert_trend_series(&group).await {
                Ok(written) => {
                    report.written += written;
                    report.refreshed += refreshed;
                }
                Err(e) => {
                    tracing::warn!(
                        term = %term,
                        rows = group.len(),
                        error = %e,
                        "trend upsert failed"
                    );
                    report.fail(FailureScope::Term, term, &e);
                }
            }
        }

        Ok(report)
    }

    /// Load (or create) the keyword and merge one section and/or scalars.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the term is blank or a store call fails.
    pub async fn merge_keyword_section(
        &self,
        term: &str,
        market: &str,
        source: &str,
        section: Option<ExtrasSection>,
        scalars: DerivedScalars,
    ) -> Result<MergeOutcome, StoreError> {
        if normalize_term(term).is_empty() {
            return Err(CoreError::EmptyTerm.into());
        }
        let record = match self.store.select_keyword(term, market).await? {
            Some(record) => record,
            None => self.store.ensure_keyword(term, market, source).await?,
        };
        self.merge_into_record(record, section, scalars).await
    }

    /// Merge into an already-loaded keyword, writing only if something changed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the update fails.
    pub async fn merge_into_record(
        &self,
        mut record: KeywordRecord,
        section: Option<ExtrasSection>,
        scalars: DerivedScalars,
    ) -> Result<MergeOutcome, StoreError> {
        let touched = section.as_ref().map(ExtrasSection::kind);
        let section_changed = section.is_some_and(|s| record.extras.merge(s));
        let scalars = changed_scalars(&record.scores, &scalars);

        if !section_changed && scalars.is_empty() {
            tracing::debug!(
                keyword_id = record.id,
                term = %record.term_normalized,
                "keyword unchanged, skipping write"
            );
            return Ok(MergeOutcome::Unchanged);
        }

        self.store
            .update_keyword_extras(
                record.id,
                &record.extras,
                touched.filter(|_| section_changed),
                &scalars,
            )
            .await?;
        Ok(MergeOutcome::Written)
    }

    /// Remove one section from an already-loaded keyword and apply `scalars`,
    /// writing only if either changes what is stored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the update fails.
    pub async fn clear_section(
        &self,
        mut record: KeywordRecord,
        kind: SectionKind,
        scalars: DerivedScalars,
    ) -> Result<MergeOutcome, StoreError> {
        let removed = record.extras.remove(kind);
        let scalars = changed_scalars(&record.scores, &scalars);

        if !removed && scalars.is_empty() {
            return Ok(MergeOutcome::Unchanged);
        }

        self.store
            .update_keyword_extras(record.id, &record.extras, removed.then_some(kind), &scalars)
            .await?;
        Ok(MergeOutcome::Written)
    }
}

/// The subset of `next` that differs from `current`.
fn changed_scalars(current: &DerivedScalars, next: &DerivedScalars) -> DerivedScalars {
    fn diff(current: Option<f64>, next: Option<f64>) -> Option<f64> {
        next.filter(|n| current != Some(*n))
    }
    DerivedScalars {
        demand_index: diff(current.demand_index, next.demand_index),
        competition_score: diff(current.competition_score, next.competition_score),
        engagement_score: diff(current.engagement_score, next.engagement_score),
        trend_momentum: diff(current.trend_momentum, next.trend_momentum),
    }
}

impl WriteReport {
    /// Count one keyword merge, logging and recording a failure.
    pub fn record_merge(&mut self, key: &str, result: Result<MergeOutcome, StoreError>) {
        match result {
            Ok(MergeOutcome::Written) => self.written += 1,
            Ok(MergeOutcome::Unchanged) => self.unchanged += 1,
            Err(e) => {
                tracing::warn!(term = key, error = %e, "keyword merge failed");
                self.fail(FailureScope::Keyword, key, &e);
            }
        }
    }
}

/// Convert observations into trend rows for `trend_series`.
#[must_use]
pub fn trend_points(observations: &[TrendObservation]) -> Vec<NewTrendPoint> {
    observations
        .iter()
        .map(|obs| NewTrendPoint {
            term: obs.term.clone(),
            source: obs.source.clone(),
            recorded_on: obs.recorded_on,
            trend_score: obs.trend_score,
            velocity: obs.velocity,
            expected_growth_30d: obs.expected_growth_30d,
            extras: obs.extras.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{NaiveDate, TimeZone, Utc};
    use lexyhub_core::{
        Classification, KeywordIntent, SectionKind, TrendDetail, TrendIndicator,
    };
    use serde_json::{json, Value};

    fn window() -> TelemetryWindow {
        TelemetryWindow::new(Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap(), 7)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn stat(keyword_id: i64, source: &str, recorded_on: NaiveDate) -> NewKeywordStat {
        NewKeywordStat {
            keyword_id,
            source: source.to_string(),
            recorded_on,
            search_volume: Some(3),
            impressions: None,
            clicks: None,
            ctr: None,
            conversion_rate: None,
            cost: None,
            rank: None,
            metadata: json!({}),
        }
    }

    fn trend_detail(momentum: f64) -> TrendDetail {
        TrendDetail {
            momentum,
            expected_growth_30d: 0.0,
            indicator: TrendIndicator::from_momentum(Some(momentum)),
            sources: vec!["feed:a".to_string()],
            latest_recorded_on: day(7),
            observations: 1,
        }
    }

    #[tokio::test]
    async fn rerun_writes_only_new_keys() {
        let store = MemoryStore::new();
        let coordinator = UpsertCoordinator::new(&store);

        let first = coordinator
            .write_stats(&window(), vec![stat(1, "socialA", day(1))])
            .await
            .unwrap();
        assert_eq!(first.written, 1);

        let second = coordinator
            .write_stats(
                &window(),
                vec![stat(1, "socialA", day(1)), stat(1, "socialA", day(2))],
            )
            .await
            .unwrap();

        assert_eq!(second.written, 1);
        assert_eq!(second.skipped_existing, 1);
        assert_eq!(store.stats().len(), 2);
    }

    #[tokio::test]
    async fn failing_keyword_group_is_isolated() {
        let store = MemoryStore::new();
        store.fail_stat_writes_for(2);
        let coordinator = UpsertCoordinator::new(&store);

        let report = coordinator
            .write_stats(
                &window(),
                vec![
                    stat(1, "reddit", day(1)),
                    stat(2, "reddit", day(1)),
                    stat(3, "reddit", day(1)),
                ],
            )
            .await
            .unwrap();

        assert_eq!(report.written, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].key, "2");
    }

    #[tokio::test]
    async fn trend_rerun_refreshes_in_place() {
        let store = MemoryStore::new();
        let coordinator = UpsertCoordinator::new(&store);
        let point = |velocity: f64| NewTrendPoint {
            term: "apron".to_string(),
            source: "feed:a".to_string(),
            recorded_on: day(3),
            trend_score: None,
            velocity: Some(velocity),
            expected_growth_30d: None,
            extras: Value::Object(serde_json::Map::new()),
        };

        coordinator.write_trend_series(&window(), vec![point(0.2)]).await.unwrap();
        let report = coordinator
            .write_trend_series(&window(), vec![point(0.3), point(0.5)])
            .await
            .unwrap();

        assert_eq!(report.written, 1);
        assert_eq!(report.refreshed, 1);
        let stored = store.trend_points();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].velocity, Some(0.5));
    }

    #[tokio::test]
    async fn classification_survives_trend_merge() {
        let store = MemoryStore::new();
        let coordinator = UpsertCoordinator::new(&store);
        let classification = Classification {
            intent: KeywordIntent::Transactional,
            confidence: 0.9,
            category: Some("home decor".to_string()),
            model: "intent-lexicon-v1".to_string(),
            classified_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        };

        coordinator
            .merge_keyword_section(
                "Boho Wall Art",
                "etsy",
                "test",
                Some(ExtrasSection::Classification(classification.clone())),
                DerivedScalars::default(),
            )
            .await
            .unwrap();
        let outcome = coordinator
            .merge_keyword_section(
                "boho wall art",
                "etsy",
                "test",
                Some(ExtrasSection::Trend(trend_detail(0.7))),
                DerivedScalars {
                    trend_momentum: Some(70.0),
                    ..DerivedScalars::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome, MergeOutcome::Written);
        let stored = store.keyword("boho wall art", "etsy").unwrap();
        assert_eq!(stored.extras.classification, Some(classification));
        assert!(stored.extras.has(SectionKind::Trend));
        assert_eq!(stored.scores.trend_momentum, Some(70.0));
    }

    #[tokio::test]
    async fn identical_merge_skips_the_write() {
        let store = MemoryStore::new();
        let coordinator = UpsertCoordinator::new(&store);
        let merge = || {
            coordinator.merge_keyword_section(
                "apron",
                "etsy",
                "test",
                Some(ExtrasSection::Trend(trend_detail(0.5))),
                DerivedScalars {
                    trend_momentum: Some(50.0),
                    ..DerivedScalars::default()
                },
            )
        };

        assert_eq!(merge().await.unwrap(), MergeOutcome::Written);
        assert_eq!(merge().await.unwrap(), MergeOutcome::Unchanged);
        assert_eq!(store.keyword_writes(), 1);
    }

    #[tokio::test]
    async fn blank_term_is_rejected() {
        let store = MemoryStore::new();
        let err = UpsertCoordinator::new(&store)
            .merge_keyword_section("  ", "etsy", "test", None, DerivedScalars::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(CoreError::EmptyTerm)));
        assert!(store.keywords().is_empty());
    }

    #[test]
    fn changed_scalars_keeps_only_differences() {
        let current = DerivedScalars {
            engagement_score: Some(40.0),
            trend_momentum: Some(60.0),
            ..DerivedScalars::default()
        };
        let next = DerivedScalars {
            engagement_score: Some(40.0),
            trend_momentum: Some(65.0),
            ..DerivedScalars::default()
        };

        let diff = changed_scalars(&current, &next);
        assert_eq!(diff.engagement_score, None);
        assert_eq!(diff.trend_momentum, Some(65.0));
    }
}
