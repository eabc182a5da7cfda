//! `seasonal-tagging`: label keywords that match an upcoming seasonal period
//! and boost their demand index by the period weight.
//!
//! The label remembers the unboosted demand, so a later run can re-weight or
//! expire it without drift. Labels are only expired when the calendar was
//! read successfully.

use chrono::{DateTime, NaiveDate, Utc};
use lexyhub_core::{DerivedScalars, ExtrasSection, SeasonalLabel, SeasonalPeriod, SectionKind};

use super::JobContext;
use crate::error::PipelineError;
use crate::report::{JobReport, WriteReport};
use crate::sources::{collect_from_sources, MetricSource};
use crate::store::KeywordRecord;
use crate::upsert::UpsertCoordinator;
use crate::window::TelemetryWindow;

const KEYWORD_PAGE_SIZE: u32 = 500;

/// `base` scaled by `weight`, rounded and clamped to `[0, 100]`.
#[must_use]
pub fn boosted_demand(base: Option<f64>, weight: f64) -> Option<f64> {
    base.filter(|d| d.is_finite())
        .map(|d| (d * weight).round().clamp(0.0, 100.0))
}

/// Demand index with any seasonal boost taken back out.
///
/// If the stored value no longer equals what `label` produced, it was
/// rewritten since tagging and is itself the new base.
#[must_use]
pub fn base_demand(stored: Option<f64>, label: Option<&SeasonalLabel>) -> Option<f64> {
    let stored = stored.filter(|d| d.is_finite());
    match label {
        Some(label) if boosted_demand(label.base_demand, label.weight) == stored => {
            label.base_demand
        }
        _ => stored,
    }
}

/// The heaviest period matching `term`; on equal weight the earlier one wins.
fn best_period<'a>(periods: &'a [SeasonalPeriod], term: &str) -> Option<&'a SeasonalPeriod> {
    periods
        .iter()
        .filter(|p| p.matches_term(term))
        .fold(None, |best: Option<&SeasonalPeriod>, p| match best {
            Some(b) if b.weight >= p.weight => Some(b),
            _ => Some(p),
        })
}

#[derive(Debug, Default)]
struct TagTally {
    writes: WriteReport,
    scanned: u64,
    unmatched: u64,
    expired: u64,
}

pub(super) async fn tag_seasonal(
    ctx: &JobContext,
    sources: &[Box<dyn MetricSource>],
    now: DateTime<Utc>,
) -> Result<JobReport, PipelineError> {
    let window = TelemetryWindow::new(now, 1);
    let today = window.end_date();
    let collected = collect_from_sources(sources, &window).await;
    let coordinator = UpsertCoordinator::new(ctx.store.as_ref());
    let calendar_read = collected.failures.is_empty();

    let mut tally = TagTally::default();
    if calendar_read || !collected.periods.is_empty() {
        let mut after_id = None;
        loop {
            let page = ctx
                .store
                .list_keywords(None, after_id, KEYWORD_PAGE_SIZE)
                .await?;
            let full_page = page.len() == KEYWORD_PAGE_SIZE as usize;
            after_id = page.last().map(|k| k.id);
            for record in page {
                tally.scanned += 1;
                match best_period(&collected.periods, &record.term_normalized) {
                    Some(period) => {
                        tag_keyword(&coordinator, record, period, today, &mut tally).await;
                    }
                    None if calendar_read && record.extras.seasonal.is_some() => {
                        expire_label(&coordinator, record, &mut tally).await;
                    }
                    None => tally.unmatched += 1,
                }
            }
            if !full_page {
                break;
            }
        }
    }

    let mut report = JobReport::from_writes(tally.writes);
    report.set(
        "active_periods",
        collected
            .periods
            .iter()
            .map(|p| p.name.clone())
            .collect::<Vec<_>>(),
    );
    report.set("keywords_scanned", tally.scanned);
    report.set("unmatched_keywords", tally.unmatched);
    report.set("labels_expired", tally.expired);
    report.add_source_failures(collected.failures);
    Ok(report)
}

async fn tag_keyword(
    coordinator: &UpsertCoordinator<'_>,
    record: KeywordRecord,
    period: &SeasonalPeriod,
    today: NaiveDate,
    tally: &mut TagTally,
) {
    let base = base_demand(record.scores.demand_index, record.extras.seasonal.as_ref());
    let mut label = period.to_label(today);
    label.base_demand = base;
    let scalars = DerivedScalars {
        demand_index: boosted_demand(base, period.weight),
        ..DerivedScalars::default()
    };
    let term = record.term_normalized.clone();
    let result = coordinator
        .merge_into_record(record, Some(ExtrasSection::Seasonal(label)), scalars)
        .await;
    tally.writes.record_merge(&term, result);
}

async fn expire_label(
    coordinator: &UpsertCoordinator<'_>,
    record: KeywordRecord,
    tally: &mut TagTally,
) {
    let scalars = DerivedScalars {
        demand_index: base_demand(record.scores.demand_index, record.extras.seasonal.as_ref()),
        ..DerivedScalars::default()
    };
    let term = record.term_normalized.clone();
    let result = coordinator
        .clear_section(record, SectionKind::Seasonal, scalars)
        .await;
    if result.is_ok() {
        tally.expired += 1;
        tracing::debug!(term = %term, "seasonal label expired");
    }
    tally.writes.record_merge(&term, result);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(weight: f64, base_demand: Option<f64>) -> SeasonalLabel {
        SeasonalLabel {
            period: "Valentine's Day".to_string(),
            weight,
            starts_on: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            ends_on: NaiveDate::from_ymd_opt(2024, 2, 14).unwrap(),
            tags: vec![],
            base_demand,
        }
    }

    fn period(id: i64, name: &str, weight: f64) -> SeasonalPeriod {
        SeasonalPeriod {
            id,
            name: name.to_string(),
            starts_on: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            ends_on: NaiveDate::from_ymd_opt(2024, 2, 14).unwrap(),
            weight,
            country: None,
            tags: vec!["valentine".to_string()],
            recurring: true,
        }
    }

    #[test]
    fn boost_applies_weight_once() {
        let first = boosted_demand(base_demand(Some(40.0), None), 1.5);
        assert_eq!(first, Some(60.0));

        let base = base_demand(first, Some(&label(1.5, Some(40.0))));
        assert_eq!(base, Some(40.0));
        assert_eq!(boosted_demand(base, 1.5), Some(60.0));
    }

    #[test]
    fn clamped_boost_still_recovers_base() {
        let boosted = boosted_demand(Some(80.0), 1.5);
        assert_eq!(boosted, Some(100.0));

        let base = base_demand(boosted, Some(&label(1.5, Some(80.0))));
        assert_eq!(base, Some(80.0));
        assert_eq!(boosted_demand(base, 1.0), Some(80.0));
    }

    #[test]
    fn rewritten_demand_becomes_the_new_base() {
        assert_eq!(base_demand(Some(30.0), Some(&label(1.5, Some(40.0)))), Some(30.0));
        assert_eq!(base_demand(Some(30.0), Some(&label(1.5, None))), Some(30.0));
        assert_eq!(base_demand(None, Some(&label(1.5, None))), None);
    }

    #[test]
    fn boost_is_clamped_and_needs_stored_demand() {
        assert_eq!(boosted_demand(Some(90.0), 2.0), Some(100.0));
        assert_eq!(boosted_demand(None, 2.0), None);
        assert_eq!(boosted_demand(Some(f64::NAN), 2.0), None);
    }

    #[test]
    fn heaviest_matching_period_wins() {
        let mut black_friday = period(3, "Black Friday", 3.0);
        black_friday.tags = vec!["doorbuster".to_string()];
        let periods = vec![
            period(1, "Galentine", 1.1),
            period(2, "Valentine's Day", 1.8),
            black_friday,
        ];
        let best = best_period(&periods, "valentine card").unwrap();
        assert_eq!(best.id, 2);
        assert!(best_period(&periods, "linen apron").is_none());
    }
}
