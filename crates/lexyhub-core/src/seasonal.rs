use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::extras::SeasonalLabel;
use crate::keyword::normalize_term;

/// A named calendar window ("Black Friday", "Mother's Day") used as context
/// for keyword demand. Read-only to the aggregation jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalPeriod {
    pub id: i64,
    pub name: String,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    /// Importance multiplier; `1.0` is neutral.
    pub weight: f64,
    /// ISO country code, or `None` for a global period.
    pub country: Option<String>,
    pub tags: Vec<String>,
    /// When set, `starts_on`/`ends_on` describe one occurrence and the
    /// window repeats every calendar year.
    pub recurring: bool,
}

impl SeasonalPeriod {
    /// The occurrence that ends on or after `on`.
    ///
    /// Non-recurring periods always return their stored dates.
    #[must_use]
    pub fn occurrence_for(&self, on: NaiveDate) -> (NaiveDate, NaiveDate) {
        if !self.recurring {
            return (self.starts_on, self.ends_on);
        }

        let span = self.ends_on - self.starts_on;
        let year = on.year();
        for candidate in [year - 1, year, year + 1] {
            let start = with_year_clamped(self.starts_on, candidate);
            let end = start + span;
            if end >= on {
                return (start, end);
            }
        }
        let start = with_year_clamped(self.starts_on, year + 1);
        (start, start + span)
    }

    /// Whether the relevant occurrence intersects `[from, to]`.
    #[must_use]
    pub fn overlaps(&self, from: NaiveDate, to: NaiveDate) -> bool {
        let (start, end) = self.occurrence_for(from);
        start <= to && end >= from
    }

    #[must_use]
    pub fn applies_to(&self, country: &str) -> bool {
        self.country
            .as_deref()
            .is_none_or(|c| c.eq_ignore_ascii_case(country))
    }

    /// Whether the period's name or any of its tags appears in the
    /// normalized term as a whole-word phrase.
    #[must_use]
    pub fn matches_term(&self, term_normalized: &str) -> bool {
        let haystack = format!(" {term_normalized} ");
        std::iter::once(self.name.as_str())
            .chain(self.tags.iter().map(String::as_str))
            .map(normalize_term)
            .filter(|needle| !needle.is_empty())
            .any(|needle| haystack.contains(&format!(" {needle} ")))
    }

    #[must_use]
    pub fn to_label(&self, on: NaiveDate) -> SeasonalLabel {
        let (starts_on, ends_on) = self.occurrence_for(on);
        SeasonalLabel {
            period: self.name.clone(),
            weight: self.weight,
            starts_on,
            ends_on,
            tags: self.tags.clone(),
            base_demand: None,
        }
    }
}

/// `date` moved to `year`; Feb 29 becomes Feb 28 in non-leap years.
fn with_year_clamped(date: NaiveDate, year: i32) -> NaiveDate {
    date.with_year(year)
        .or_else(|| NaiveDate::from_ymd_opt(year, date.month(), 28))
        .unwrap_or(date)
}
