//! `keyword-classification`: label keywords that have no classification yet.

use chrono::{DateTime, Utc};
use lexyhub_core::{DerivedScalars, ExtrasSection, SectionKind};

use super::JobContext;
use crate::error::PipelineError;
use crate::report::{JobReport, WriteReport};
use crate::upsert::UpsertCoordinator;

pub(super) async fn classify_keywords(
    ctx: &JobContext,
    now: DateTime<Utc>,
) -> Result<JobReport, PipelineError> {
    let pending = ctx
        .store
        .list_keywords_missing_section(
            SectionKind::Classification,
            ctx.settings.classification_batch,
        )
        .await?;
    let coordinator = UpsertCoordinator::new(ctx.store.as_ref());

    let mut writes = WriteReport::default();
    let candidates = pending.len();
    for record in pending {
        let term = record.term_normalized.clone();
        let classification = ctx.classifier.classify(&term, now);
        tracing::debug!(
            term = %term,
            intent = classification.intent.as_str(),
            confidence = classification.confidence,
            "classified keyword"
        );
        let result = coordinator
            .merge_into_record(
                record,
                Some(ExtrasSection::Classification(classification)),
                DerivedScalars::default(),
            )
            .await;
        writes.record_merge(&term, result);
    }

    let mut report = JobReport::from_writes(writes);
    report.set("candidates", candidates);
    report.set("model", ctx.classifier.model());
    Ok(report)
}
