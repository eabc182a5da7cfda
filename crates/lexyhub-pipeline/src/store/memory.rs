use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use lexyhub_core::{
    normalize_term, DerivedScalars, JobName, JobStatus, KeywordExtras, NewKeywordStat,
    NewTrendPoint, SeasonalPeriod, SectionKind, StatKey, TrendKey,
};
use serde_json::{json, Value};

use super::{JobRunRecord, KeywordEvent, KeywordRecord, KeywordStore, SignalFeed, SocialMention};
use crate::error::StoreError;

/// In-process [`KeywordStore`] and [`SignalFeed`].
///
/// Mirrors the Postgres semantics the jobs rely on (conflict-skipping stat
/// inserts, in-place trend upserts, section-scoped extras writes, finalize
/// only from `running`) and can be told to fail specific operations.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    next_keyword_id: i64,
    next_run_id: i64,
    keywords: BTreeMap<i64, KeywordRecord>,
    stats: BTreeMap<StatKey, NewKeywordStat>,
    trends: BTreeMap<TrendKey, NewTrendPoint>,
    runs: BTreeMap<i64, JobRunRecord>,
    flags: HashMap<String, bool>,
    events: Vec<KeywordEvent>,
    mentions: Vec<SocialMention>,
    periods: Vec<SeasonalPeriod>,
    keyword_writes: u64,
    faults: Faults,
}

#[derive(Debug, Default)]
struct Faults {
    stat_writes_for: HashSet<i64>,
    keyword_updates_for: HashSet<String>,
    mention_platforms: HashSet<String>,
    keyword_events: bool,
    keyword_listing: bool,
    seasonal_periods: bool,
    flag_reads: bool,
    finalize: bool,
}

fn injected(what: &str) -> StoreError {
    StoreError::Unavailable(format!("injected failure: {what}"))
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -- seeding -------------------------------------------------------------

    pub fn set_flag(&self, key: &str, enabled: bool) {
        self.lock().flags.insert(key.to_string(), enabled);
    }

    pub fn push_keyword_event(&self, event: KeywordEvent) {
        self.lock().events.push(event);
    }

    pub fn push_social_mention(&self, mention: SocialMention) {
        self.lock().mentions.push(mention);
    }

    pub fn push_seasonal_period(&self, period: SeasonalPeriod) {
        self.lock().periods.push(period);
    }

    /// Backdate a run, e.g. to make it eligible for reaping.
    pub fn set_run_started_at(&self, run_id: i64, started_at: DateTime<Utc>) {
        if let Some(run) = self.lock().runs.get_mut(&run_id) {
            run.started_at = started_at;
        }
    }

    // -- fault injection -----------------------------------------------------

    pub fn fail_stat_writes_for(&self, keyword_id: i64) {
        self.lock().faults.stat_writes_for.insert(keyword_id);
    }

    pub fn fail_keyword_updates_for(&self, term: &str) {
        self.lock()
            .faults
            .keyword_updates_for
            .insert(normalize_term(term));
    }

    pub fn fail_mentions_for(&self, platform: &str) {
        self.lock()
            .faults
            .mention_platforms
            .insert(platform.to_string());
    }

    pub fn fail_keyword_events(&self) {
        self.lock().faults.keyword_events = true;
    }

    pub fn fail_keyword_listing(&self) {
        self.lock().faults.keyword_listing = true;
    }

    pub fn fail_seasonal_periods(&self) {
        self.lock().faults.seasonal_periods = true;
    }

    pub fn fail_flag_reads(&self) {
        self.lock().faults.flag_reads = true;
    }

    pub fn fail_finalize(&self) {
        self.lock().faults.finalize = true;
    }

    // -- inspection ----------------------------------------------------------

    #[must_use]
    pub fn stats(&self) -> Vec<NewKeywordStat> {
        self.lock().stats.values().cloned().collect()
    }

    #[must_use]
    pub fn trend_points(&self) -> Vec<NewTrendPoint> {
        self.lock().trends.values().cloned().collect()
    }

    #[must_use]
    pub fn keyword(&self, term: &str, market: &str) -> Option<KeywordRecord> {
        let normalized = normalize_term(term);
        self.lock()
            .keywords
            .values()
            .find(|k| k.term_normalized == normalized && k.market == market)
            .cloned()
    }

    #[must_use]
    pub fn keywords(&self) -> Vec<KeywordRecord> {
        self.lock().keywords.values().cloned().collect()
    }

    /// Number of successful `update_keyword_extras` calls.
    #[must_use]
    pub fn keyword_writes(&self) -> u64 {
        self.lock().keyword_writes
    }

    #[must_use]
    pub fn job_runs(&self) -> Vec<JobRunRecord> {
        self.lock().runs.values().cloned().collect()
    }

    #[must_use]
    pub fn job_run(&self, run_id: i64) -> Option<JobRunRecord> {
        self.lock().runs.get(&run_id).cloned()
    }
}

impl Inner {
    fn open_run(&mut self, job: JobName, status: JobStatus, metadata: Value) -> i64 {
        self.next_run_id += 1;
        let id = self.next_run_id;
        let now = Utc::now();
        self.runs.insert(
            id,
            JobRunRecord {
                id,
                job_name: job.as_str().to_string(),
                status,
                started_at: now,
                finished_at: status.is_terminal().then_some(now),
                records_processed: 0,
                metadata,
            },
        );
        id
    }
}

fn apply_scalars(scores: &mut DerivedScalars, scalars: &DerivedScalars) {
    if let Some(v) = scalars.demand_index {
        scores.demand_index = Some(v);
    }
    if let Some(v) = scalars.competition_score {
        scores.competition_score = Some(v);
    }
    if let Some(v) = scalars.engagement_score {
        scores.engagement_score = Some(v);
    }
    if let Some(v) = scalars.trend_momentum {
        scores.trend_momentum = Some(v);
    }
}

fn copy_section(stored: &mut KeywordExtras, merged: &KeywordExtras, kind: SectionKind) {
    stored.other.remove(kind.key());
    match kind {
        SectionKind::Trend => stored.trend.clone_from(&merged.trend),
        SectionKind::Classification => stored.classification.clone_from(&merged.classification),
        SectionKind::Seasonal => stored.seasonal.clone_from(&merged.seasonal),
    }
}

#[async_trait]
impl KeywordStore for MemoryStore {
    async fn select_existing_stat_keys(
        &self,
        since: NaiveDate,
    ) -> Result<HashSet<StatKey>, StoreError> {
        Ok(self
            .lock()
            .stats
            .keys()
            .filter(|k| k.recorded_on >= since)
            .cloned()
            .collect())
    }

    async fn select_existing_trend_keys(
        &self,
        since: NaiveDate,
    ) -> Result<HashSet<TrendKey>, StoreError> {
        Ok(self
            .lock()
            .trends
            .keys()
            .filter(|k| k.recorded_on >= since)
            .cloned()
            .collect())
    }

    async fn select_trend_points_since(
        &self,
        since: NaiveDate,
    ) -> Result<Vec<NewTrendPoint>, StoreError> {
        Ok(self
            .lock()
            .trends
            .values()
            .filter(|p| p.recorded_on >= since)
            .cloned()
            .collect())
    }

    async fn upsert_keyword_stats(&self, rows: &[NewKeywordStat]) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        if let Some(row) = rows
            .iter()
            .find(|r| inner.faults.stat_writes_for.contains(&r.keyword_id))
        {
            return Err(injected(&format!("stat write for keyword {}", row.keyword_id)));
        }

        let mut inserted = 0;
        for row in rows {
            if !inner.stats.contains_key(&row.key()) {
                inner.stats.insert(row.key(), row.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn upsert_trend_series(&self, rows: &[NewTrendPoint]) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        for row in rows {
            match inner.trends.get_mut(&row.key()) {
                Some(existing) => {
                    let mut extras = existing.extras.clone();
                    if let (Value::Object(stored), Value::Object(incoming)) =
                        (&mut extras, &row.extras)
                    {
                        stored.extend(incoming.clone());
                    } else {
                        extras = row.extras.clone();
                    }
                    *existing = NewTrendPoint {
                        extras,
                        ..row.clone()
                    };
                }
                None => {
                    inner.trends.insert(row.key(), row.clone());
                }
            }
        }
        Ok(rows.len() as u64)
    }

    async fn ensure_keyword(
        &self,
        term: &str,
        market: &str,
        source: &str,
    ) -> Result<KeywordRecord, StoreError> {
        let normalized = normalize_term(term);
        let mut inner = self.lock();
        if let Some(existing) = inner
            .keywords
            .values()
            .find(|k| k.term_normalized == normalized && k.market == market)
        {
            return Ok(existing.clone());
        }

        inner.next_keyword_id += 1;
        let record = KeywordRecord {
            id: inner.next_keyword_id,
            term: term.trim().to_string(),
            term_normalized: normalized,
            market: market.to_string(),
            source: source.to_string(),
            scores: DerivedScalars::default(),
            extras: KeywordExtras::default(),
        };
        inner.keywords.insert(record.id, record.clone());
        Ok(record)
    }

    async fn select_keyword(
        &self,
        term: &str,
        market: &str,
    ) -> Result<Option<KeywordRecord>, StoreError> {
        Ok(self.keyword(term, market))
    }

    async fn update_keyword_extras(
        &self,
        id: i64,
        merged: &KeywordExtras,
        touched: Option<SectionKind>,
        scalars: &DerivedScalars,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let failing = inner.keywords.get(&id).is_some_and(|k| {
            inner.faults.keyword_updates_for.contains(&k.term_normalized)
        });
        if failing {
            return Err(injected(&format!("keyword update for {id}")));
        }

        let record = inner
            .keywords
            .get_mut(&id)
            .ok_or(StoreError::KeywordNotFound(id))?;
        if let Some(kind) = touched {
            copy_section(&mut record.extras, merged, kind);
        }
        apply_scalars(&mut record.scores, scalars);
        inner.keyword_writes += 1;
        Ok(())
    }

    async fn list_keywords_missing_section(
        &self,
        section: SectionKind,
        limit: u32,
    ) -> Result<Vec<KeywordRecord>, StoreError> {
        let inner = self.lock();
        if inner.faults.keyword_listing {
            return Err(injected("keyword listing"));
        }
        Ok(inner
            .keywords
            .values()
            .filter(|k| !k.extras.has(section) && !k.extras.other.contains_key(section.key()))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn list_keywords(
        &self,
        market: Option<&str>,
        after_id: Option<i64>,
        limit: u32,
    ) -> Result<Vec<KeywordRecord>, StoreError> {
        let inner = self.lock();
        if inner.faults.keyword_listing {
            return Err(injected("keyword listing"));
        }
        let from = after_id.map_or(i64::MIN, |id| id.saturating_add(1));
        Ok(inner
            .keywords
            .range(from..)
            .map(|(_, k)| k)
            .filter(|k| market.is_none_or(|m| k.market == m))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn insert_job_run(&self, job: JobName) -> Result<i64, StoreError> {
        Ok(self.lock().open_run(job, JobStatus::Running, json!({})))
    }

    async fn insert_skipped_job_run(
        &self,
        job: JobName,
        reason: &str,
    ) -> Result<i64, StoreError> {
        Ok(self
            .lock()
            .open_run(job, JobStatus::Skipped, json!({ "reason": reason })))
    }

    async fn finalize_job_run(
        &self,
        run_id: i64,
        status: JobStatus,
        records_processed: u64,
        metadata: &Value,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.faults.finalize {
            return Err(injected("finalize"));
        }

        let run = inner
            .runs
            .get_mut(&run_id)
            .filter(|run| run.status == JobStatus::Running && status.is_terminal())
            .ok_or(StoreError::RunNotRunning(run_id))?;
        run.status = status;
        run.finished_at = Some(Utc::now());
        run.records_processed = records_processed;
        run.metadata = metadata.clone();
        Ok(())
    }

    async fn list_job_runs(&self, limit: u32) -> Result<Vec<JobRunRecord>, StoreError> {
        let mut runs: Vec<JobRunRecord> = self.lock().runs.values().cloned().collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        runs.truncate(limit as usize);
        Ok(runs)
    }

    async fn reap_stale_runs(&self, older_than: DateTime<Utc>) -> Result<Vec<i64>, StoreError> {
        let mut reaped = Vec::new();
        let now = Utc::now();
        for run in self.lock().runs.values_mut() {
            if run.status == JobStatus::Running && run.started_at < older_than {
                run.status = JobStatus::Failed;
                run.finished_at = Some(now);
                if let Value::Object(map) = &mut run.metadata {
                    map.insert("error".to_string(), json!("stale run reaped"));
                }
                reaped.push(run.id);
            }
        }
        Ok(reaped)
    }

    async fn read_feature_flag(&self, key: &str) -> Result<bool, StoreError> {
        let inner = self.lock();
        if inner.faults.flag_reads {
            return Err(injected(&format!("flag read for {key}")));
        }
        Ok(inner.flags.get(key).copied().unwrap_or(false))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl SignalFeed for MemoryStore {
    async fn list_keyword_events(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<KeywordEvent>, StoreError> {
        let inner = self.lock();
        if inner.faults.keyword_events {
            return Err(injected("keyword events"));
        }
        Ok(inner
            .events
            .iter()
            .filter(|e| e.occurred_at >= since)
            .cloned()
            .collect())
    }

    async fn list_social_mentions(
        &self,
        platform: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<SocialMention>, StoreError> {
        let inner = self.lock();
        if inner.faults.mention_platforms.contains(platform) {
            return Err(injected(&format!("{platform} mentions")));
        }
        Ok(inner
            .mentions
            .iter()
            .filter(|m| m.platform == platform && m.observed_at >= since)
            .cloned()
            .collect())
    }

    async fn list_seasonal_periods(&self) -> Result<Vec<SeasonalPeriod>, StoreError> {
        let inner = self.lock();
        if inner.faults.seasonal_periods {
            return Err(injected("seasonal periods"));
        }
        Ok(inner.periods.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexyhub_core::{ExtrasSection, KeywordIntent};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn stat(keyword_id: i64, recorded_on: NaiveDate, volume: i64) -> NewKeywordStat {
        NewKeywordStat {
            keyword_id,
            source: "reddit".to_string(),
            recorded_on,
            search_volume: Some(volume),
            impressions: None,
            clicks: None,
            ctr: None,
            conversion_rate: None,
            cost: None,
            rank: None,
            metadata: json!({}),
        }
    }

    #[tokio::test]
    async fn stat_inserts_skip_existing_keys() {
        let store = MemoryStore::new();
        assert_eq!(store.upsert_keyword_stats(&[stat(1, day(1), 10)]).await.unwrap(), 1);
        let inserted = store
            .upsert_keyword_stats(&[stat(1, day(1), 99), stat(1, day(2), 5)])
            .await
            .unwrap();

        assert_eq!(inserted, 1);
        let stats = store.stats();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].search_volume, Some(10));
    }

    #[tokio::test]
    async fn ensure_keyword_reuses_normalized_term() {
        let store = MemoryStore::new();
        let a = store.ensure_keyword("Boho  Wall Art", "etsy", "reddit").await.unwrap();
        let b = store.ensure_keyword("boho wall art", "etsy", "tiktok").await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.source, "reddit");
    }

    #[tokio::test]
    async fn section_write_leaves_other_sections() {
        let store = MemoryStore::new();
        let kw = store.ensure_keyword("linen apron", "etsy", "reddit").await.unwrap();

        let mut with_class = KeywordExtras::default();
        with_class.merge(ExtrasSection::Classification(lexyhub_core::Classification {
            intent: KeywordIntent::Commercial,
            confidence: 0.6,
            category: None,
            model: "m".to_string(),
            classified_at: Utc::now(),
        }));
        store
            .update_keyword_extras(
                kw.id,
                &with_class,
                Some(SectionKind::Classification),
                &DerivedScalars::default(),
            )
            .await
            .unwrap();

        // A stale copy without classification must not erase it.
        store
            .update_keyword_extras(
                kw.id,
                &KeywordExtras::default(),
                None,
                &DerivedScalars {
                    engagement_score: Some(40.0),
                    ..DerivedScalars::default()
                },
            )
            .await
            .unwrap();

        let stored = store.keyword("linen apron", "etsy").unwrap();
        assert!(stored.extras.classification.is_some());
        assert_eq!(stored.scores.engagement_score, Some(40.0));
        assert_eq!(store.keyword_writes(), 2);
    }

    #[tokio::test]
    async fn finalize_only_from_running() {
        let store = MemoryStore::new();
        let id = store.insert_job_run(JobName::SocialMetrics).await.unwrap();
        store
            .finalize_job_run(id, JobStatus::Succeeded, 3, &json!({}))
            .await
            .unwrap();

        let err = store
            .finalize_job_run(id, JobStatus::Failed, 0, &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RunNotRunning(run) if run == id));
        assert_eq!(store.job_run(id).unwrap().status, JobStatus::Succeeded);
    }

    #[tokio::test]
    async fn missing_flag_reads_as_disabled() {
        let store = MemoryStore::new();
        assert!(!store.read_feature_flag("user_telemetry_enabled").await.unwrap());
        store.set_flag("user_telemetry_enabled", true);
        assert!(store.read_feature_flag("user_telemetry_enabled").await.unwrap());
    }
}
