//! Running-average blend of per-term trend observations across sources.
//!
//! The update is order-sensitive, so [`TrendBlender::fold`] always applies a
//! term's observations sorted by `recorded_on` then source name. Two runs
//! over the same observations therefore produce identical momentum.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use lexyhub_core::{round4, TrendDetail, TrendIndicator};

use crate::sources::TrendObservation;

/// Blended state for one term.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlendEntry {
    pub momentum: Option<f64>,
    pub expected_growth: Option<f64>,
    pub sources: BTreeSet<String>,
    pub latest_recorded_on: Option<NaiveDate>,
    pub observations: u32,
}

impl BlendEntry {
    fn apply(&mut self, obs: &TrendObservation) {
        self.momentum = blend(self.momentum, obs.velocity);
        self.expected_growth = blend(self.expected_growth, obs.expected_growth_30d);
        self.sources.insert(obs.source.clone());
        self.latest_recorded_on = self.latest_recorded_on.max(Some(obs.recorded_on));
        self.observations += 1;
    }

    #[must_use]
    pub fn indicator(&self) -> TrendIndicator {
        TrendIndicator::from_momentum(self.momentum)
    }

    /// The `extras.trend` section for this entry, or `None` until at least
    /// one dated observation with a velocity has been applied.
    #[must_use]
    pub fn to_detail(&self) -> Option<TrendDetail> {
        let momentum = self.momentum?;
        let latest_recorded_on = self.latest_recorded_on?;
        Some(TrendDetail {
            momentum,
            expected_growth_30d: self.expected_growth.unwrap_or(0.0),
            indicator: self.indicator(),
            sources: self.sources.iter().cloned().collect(),
            latest_recorded_on,
            observations: self.observations,
        })
    }
}

/// `(current + next) / 2` rounded to four places; the first value seeds.
fn blend(current: Option<f64>, next: Option<f64>) -> Option<f64> {
    match (current, next.filter(|v| v.is_finite())) {
        (Some(c), Some(n)) => Some(round4((c + n) / 2.0)),
        (None, Some(n)) => Some(round4(n)),
        (c, None) => c,
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrendBlender {
    entries: BTreeMap<String, BlendEntry>,
}

impl TrendBlender {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply observations, grouped per term, in `(recorded_on, source)` order.
    pub fn fold(&mut self, observations: &[TrendObservation]) {
        let mut ordered: Vec<&TrendObservation> = observations.iter().collect();
        ordered.sort_by(|a, b| {
            a.term
                .cmp(&b.term)
                .then(a.recorded_on.cmp(&b.recorded_on))
                .then(a.source.cmp(&b.source))
        });
        for obs in ordered {
            self.entries.entry(obs.term.clone()).or_default().apply(obs);
        }
    }

    #[must_use]
    pub fn get(&self, term: &str) -> Option<&BlendEntry> {
        self.entries.get(term)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &BlendEntry)> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn obs(term: &str, source: &str, day: u32, velocity: Option<f64>) -> TrendObservation {
        TrendObservation {
            term: term.to_string(),
            source: source.to_string(),
            recorded_on: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            trend_score: None,
            velocity,
            expected_growth_30d: Some(0.1),
            extras: Value::Null,
        }
    }

    #[test]
    fn running_average_across_folds() {
        let mut blender = TrendBlender::new();
        blender.fold(&[obs("linen apron", "a", 1, Some(0.4))]);

        blender.fold(&[obs("linen apron", "a", 2, Some(0.8))]);
        assert_eq!(blender.get("linen apron").unwrap().momentum, Some(0.6));

        blender.fold(&[obs("linen apron", "a", 3, Some(0.2))]);
        assert_eq!(blender.get("linen apron").unwrap().momentum, Some(0.4));
    }

    #[test]
    fn first_observation_seeds_the_entry() {
        let mut blender = TrendBlender::new();
        blender.fold(&[
            obs("apron", "b", 1, Some(0.8)),
            obs("apron", "a", 1, Some(0.4)),
        ]);

        // (recorded_on, source) order: "a" 0.4 seeds, then "b" 0.8.
        let entry = blender.get("apron").unwrap();
        assert_eq!(entry.momentum, Some(0.6));
        assert_eq!(entry.observations, 2);
        assert_eq!(
            entry.sources.iter().cloned().collect::<Vec<_>>(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn fold_order_does_not_depend_on_input_order() {
        let observations = vec![
            obs("apron", "a", 3, Some(0.9)),
            obs("apron", "b", 1, Some(0.1)),
            obs("apron", "a", 2, Some(0.5)),
        ];
        let mut reversed = observations.clone();
        reversed.reverse();

        let mut first = TrendBlender::new();
        first.fold(&observations);
        let mut second = TrendBlender::new();
        second.fold(&reversed);

        assert_eq!(first.get("apron"), second.get("apron"));
        // ((0.1 + 0.5) / 2 + 0.9) / 2
        assert_eq!(first.get("apron").unwrap().momentum, Some(0.6));
    }

    #[test]
    fn missing_velocity_keeps_momentum() {
        let mut blender = TrendBlender::new();
        blender.fold(&[obs("apron", "a", 1, Some(0.7)), obs("apron", "a", 2, None)]);

        let entry = blender.get("apron").unwrap();
        assert_eq!(entry.momentum, Some(0.7));
        assert_eq!(entry.observations, 2);
        assert_eq!(
            entry.latest_recorded_on,
            NaiveDate::from_ymd_opt(2024, 1, 2)
        );
    }

    #[test]
    fn detail_carries_indicator() {
        let mut blender = TrendBlender::new();
        blender.fold(&[obs("apron", "a", 1, Some(0.7))]);

        let detail = blender.get("apron").unwrap().to_detail().unwrap();
        assert_eq!(detail.indicator, TrendIndicator::Up);
        assert_eq!(detail.sources, vec!["a".to_string()]);

        let mut empty = TrendBlender::new();
        empty.fold(&[obs("apron", "a", 1, None)]);
        assert!(empty.get("apron").unwrap().to_detail().is_none());
    }
}
