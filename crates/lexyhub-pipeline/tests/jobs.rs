//! End-to-end job runs against the in-memory store.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use lexyhub_core::{
    DerivedScalars, JobName, JobStatus, KeywordExtras, KeywordIntent, SeasonalPeriod,
};
use lexyhub_pipeline::store::{EventType, KeywordEvent, SocialMention};
use lexyhub_pipeline::{
    run_named_job_at, FailureScope, JobContext, JobSettings, KeywordStore, MemoryStore,
    SummaryStatus,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 8, 12, 0, 0).unwrap()
}

fn context(store: &Arc<MemoryStore>) -> JobContext {
    JobContext::new(store.clone(), store.clone(), JobSettings::default())
}

fn mention(platform: &str, term: &str, engagement: f64) -> SocialMention {
    SocialMention {
        platform: platform.to_string(),
        term: term.to_string(),
        observed_at: Utc.with_ymd_and_hms(2024, 1, 5, 9, 0, 0).unwrap(),
        mentions: 4,
        engagement_score: Some(engagement),
        sentiment: Some(0.2),
    }
}

fn seed_mentions(store: &MemoryStore) {
    store.push_social_mention(mention("reddit", "Linen Apron", 0.4));
    store.push_social_mention(mention("pinterest", "linen apron", 0.6));
    store.push_social_mention(mention("tiktok", "linen apron", 0.9));
}

#[tokio::test]
async fn one_failing_platform_makes_the_run_partial() {
    let store = Arc::new(MemoryStore::new());
    seed_mentions(&store);
    store.fail_mentions_for("tiktok");

    let summary = run_named_job_at(&context(&store), JobName::SocialMetrics, now())
        .await
        .unwrap();

    assert_eq!(summary.status, SummaryStatus::Partial);
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].scope, FailureScope::Source);
    assert_eq!(summary.failures[0].key, "tiktok");
    assert_eq!(store.stats().len(), 2);

    let keyword = store.keyword("linen apron", "etsy").unwrap();
    assert_eq!(keyword.scores.engagement_score, Some(50.0));

    let run = store.job_run(summary.run_id).unwrap();
    assert_eq!(run.status, JobStatus::Succeeded);
    assert_eq!(run.metadata["errors"], 1);
}

#[tokio::test]
async fn rerunning_social_metrics_writes_nothing_new() {
    let store = Arc::new(MemoryStore::new());
    seed_mentions(&store);
    let ctx = context(&store);

    let first = run_named_job_at(&ctx, JobName::SocialMetrics, now()).await.unwrap();
    let writes_after_first = store.keyword_writes();
    let second = run_named_job_at(&ctx, JobName::SocialMetrics, now()).await.unwrap();

    assert_eq!(first.processed, 3);
    assert_eq!(second.status, SummaryStatus::Succeeded);
    assert_eq!(second.processed, 0);
    assert_eq!(second.metadata["skipped_existing"], 3);
    assert_eq!(second.metadata["keywords_unchanged"], 1);
    assert_eq!(store.stats().len(), 3);
    assert_eq!(store.keyword_writes(), writes_after_first);
}

#[tokio::test]
async fn telemetry_job_honours_its_flag() {
    let store = Arc::new(MemoryStore::new());
    for event_type in [EventType::Search, EventType::Impression, EventType::Click] {
        store.push_keyword_event(KeywordEvent {
            term: "boho wall art".to_string(),
            market: "etsy".to_string(),
            event_type,
            occurred_at: Utc.with_ymd_and_hms(2024, 1, 6, 10, 0, 0).unwrap(),
            cost: None,
            rank: Some(4),
        });
    }
    let ctx = context(&store);

    let skipped = run_named_job_at(&ctx, JobName::KeywordTelemetry, now()).await.unwrap();
    assert_eq!(skipped.status, SummaryStatus::Skipped);
    assert!(store.stats().is_empty());

    store.set_flag("user_telemetry_enabled", true);
    let ran = run_named_job_at(&ctx, JobName::KeywordTelemetry, now()).await.unwrap();

    assert_eq!(ran.status, SummaryStatus::Succeeded);
    let stats = store.stats();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].source, "extension");
    assert_eq!(stats[0].ctr, Some(1.0));
    let keyword = store.keyword("boho wall art", "etsy").unwrap();
    assert_eq!(keyword.scores.engagement_score, Some(100.0));
}

#[tokio::test]
async fn unreadable_flag_leaves_no_ledger_row() {
    let store = Arc::new(MemoryStore::new());
    store.fail_flag_reads();

    let result = run_named_job_at(&context(&store), JobName::KeywordTelemetry, now()).await;

    assert!(result.is_err());
    assert!(store.job_runs().is_empty());
}

#[tokio::test]
async fn classification_labels_only_unclassified_keywords() {
    let store = Arc::new(MemoryStore::new());
    store.set_flag("ai_classification_enabled", true);
    store.ensure_keyword("buy silver ring", "etsy", "test").await.unwrap();
    store.ensure_keyword("how to knit a scarf", "etsy", "test").await.unwrap();
    let ctx = context(&store);

    let first = run_named_job_at(&ctx, JobName::KeywordClassification, now())
        .await
        .unwrap();
    let second = run_named_job_at(&ctx, JobName::KeywordClassification, now())
        .await
        .unwrap();

    assert_eq!(first.processed, 2);
    assert_eq!(second.processed, 0);
    assert_eq!(second.metadata["candidates"], 0);

    let ring = store.keyword("buy silver ring", "etsy").unwrap();
    let classification = ring.extras.classification.unwrap();
    assert_eq!(classification.intent, KeywordIntent::Transactional);
    assert_eq!(classification.category.as_deref(), Some("jewelry"));
}

#[tokio::test]
async fn seasonal_tagging_boosts_demand_once() {
    let store = Arc::new(MemoryStore::new());
    store.push_seasonal_period(SeasonalPeriod {
        id: 1,
        name: "Valentine's Day".to_string(),
        starts_on: NaiveDate::from_ymd_opt(2023, 2, 1).unwrap(),
        ends_on: NaiveDate::from_ymd_opt(2023, 2, 14).unwrap(),
        weight: 1.5,
        country: None,
        tags: vec!["valentine".to_string()],
        recurring: true,
    });
    let card = store.ensure_keyword("valentine card", "etsy", "test").await.unwrap();
    store.ensure_keyword("linen apron", "etsy", "test").await.unwrap();
    store
        .update_keyword_extras(
            card.id,
            &KeywordExtras::default(),
            None,
            &DerivedScalars {
                demand_index: Some(40.0),
                ..DerivedScalars::default()
            },
        )
        .await
        .unwrap();
    let ctx = context(&store);
    let at = Utc.with_ymd_and_hms(2024, 1, 20, 6, 0, 0).unwrap();

    let first = run_named_job_at(&ctx, JobName::SeasonalTagging, at).await.unwrap();
    let second = run_named_job_at(&ctx, JobName::SeasonalTagging, at).await.unwrap();

    assert_eq!(first.processed, 1);
    assert_eq!(first.metadata["unmatched_keywords"], 1);
    assert_eq!(second.processed, 0);
    let card = store.keyword("valentine card", "etsy").unwrap();
    assert_eq!(card.scores.demand_index, Some(60.0));
    let label = card.extras.seasonal.unwrap();
    assert_eq!(label.period, "Valentine's Day");
    assert_eq!(label.starts_on, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
}

#[tokio::test]
async fn expired_seasonal_label_restores_clamped_demand() {
    let store = Arc::new(MemoryStore::new());
    store.push_seasonal_period(SeasonalPeriod {
        id: 1,
        name: "Valentine's Day".to_string(),
        starts_on: NaiveDate::from_ymd_opt(2023, 2, 1).unwrap(),
        ends_on: NaiveDate::from_ymd_opt(2023, 2, 14).unwrap(),
        weight: 2.0,
        country: None,
        tags: vec!["valentine".to_string()],
        recurring: true,
    });
    let card = store.ensure_keyword("valentine card", "etsy", "test").await.unwrap();
    store
        .update_keyword_extras(
            card.id,
            &KeywordExtras::default(),
            None,
            &DerivedScalars {
                demand_index: Some(80.0),
                ..DerivedScalars::default()
            },
        )
        .await
        .unwrap();
    let ctx = context(&store);
    let in_season = Utc.with_ymd_and_hms(2024, 1, 20, 6, 0, 0).unwrap();
    let after_season = Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap();

    run_named_job_at(&ctx, JobName::SeasonalTagging, in_season).await.unwrap();
    let tagged = store.keyword("valentine card", "etsy").unwrap();
    assert_eq!(tagged.scores.demand_index, Some(100.0));
    assert_eq!(tagged.extras.seasonal.unwrap().base_demand, Some(80.0));

    let expired = run_named_job_at(&ctx, JobName::SeasonalTagging, after_season)
        .await
        .unwrap();
    let again = run_named_job_at(&ctx, JobName::SeasonalTagging, after_season)
        .await
        .unwrap();

    assert_eq!(expired.metadata["labels_expired"], 1);
    assert_eq!(again.metadata["labels_expired"], 0);
    assert_eq!(again.processed, 0);
    let card = store.keyword("valentine card", "etsy").unwrap();
    assert_eq!(card.scores.demand_index, Some(80.0));
    assert!(card.extras.seasonal.is_none());
}

#[tokio::test]
async fn seasonal_tagging_pages_through_every_keyword() {
    let store = Arc::new(MemoryStore::new());
    store.push_seasonal_period(SeasonalPeriod {
        id: 1,
        name: "Valentine's Day".to_string(),
        starts_on: NaiveDate::from_ymd_opt(2023, 2, 1).unwrap(),
        ends_on: NaiveDate::from_ymd_opt(2023, 2, 14).unwrap(),
        weight: 1.2,
        country: None,
        tags: vec!["valentine".to_string()],
        recurring: true,
    });
    for i in 0..1_203 {
        store
            .ensure_keyword(&format!("apron {i}"), "etsy", "test")
            .await
            .unwrap();
    }
    store.ensure_keyword("valentine mug", "etsy", "test").await.unwrap();
    let at = Utc.with_ymd_and_hms(2024, 1, 20, 6, 0, 0).unwrap();

    let summary = run_named_job_at(&context(&store), JobName::SeasonalTagging, at)
        .await
        .unwrap();

    assert_eq!(summary.metadata["keywords_scanned"], 1_204);
    assert_eq!(summary.metadata["unmatched_keywords"], 1_203);
    let mug = store.keyword("valentine mug", "etsy").unwrap();
    assert_eq!(mug.extras.seasonal.unwrap().period, "Valentine's Day");
}

#[tokio::test]
async fn seasonal_calendar_failure_is_reported() {
    let store = Arc::new(MemoryStore::new());
    store.fail_seasonal_periods();

    let summary = run_named_job_at(&context(&store), JobName::SeasonalTagging, now())
        .await
        .unwrap();

    assert_eq!(summary.status, SummaryStatus::Partial);
    assert_eq!(summary.failures[0].key, "seasonal_calendar");
}

#[tokio::test]
async fn reaper_fails_abandoned_runs() {
    let store = Arc::new(MemoryStore::new());
    let stale = store.insert_job_run(JobName::TrendAggregation).await.unwrap();
    let fresh = store.insert_job_run(JobName::SocialMetrics).await.unwrap();
    let at = Utc::now();
    store.set_run_started_at(stale, at - Duration::hours(3));

    let summary = run_named_job_at(&context(&store), JobName::ReapStaleRuns, at)
        .await
        .unwrap();

    assert_eq!(summary.processed, 1);
    let stale_run = store.job_run(stale).unwrap();
    assert_eq!(stale_run.status, JobStatus::Failed);
    assert_eq!(stale_run.metadata["error"], "stale run reaped");
    assert_eq!(store.job_run(fresh).unwrap().status, JobStatus::Running);
    assert_eq!(
        store.job_run(summary.run_id).unwrap().status,
        JobStatus::Succeeded
    );
}

#[tokio::test]
async fn every_invocation_ends_in_one_terminal_row() {
    let store = Arc::new(MemoryStore::new());
    seed_mentions(&store);
    let ctx = context(&store);

    let mut run_ids = Vec::new();
    for job in [
        JobName::SocialMetrics,
        JobName::KeywordTelemetry,
        JobName::KeywordClassification,
        JobName::SeasonalTagging,
    ] {
        run_ids.push(run_named_job_at(&ctx, job, now()).await.unwrap().run_id);
    }

    let runs = store.job_runs();
    assert_eq!(runs.len(), run_ids.len());
    assert!(runs.iter().all(|run| run.status.is_terminal()));
    assert!(runs.iter().all(|run| run.finished_at.is_some()));
}
