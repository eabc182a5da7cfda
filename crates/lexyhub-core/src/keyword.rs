use serde::{Deserialize, Serialize};

/// Market assumed when a source does not say which marketplace a term belongs to.
pub const DEFAULT_MARKET: &str = "etsy";

/// Canonical form of a keyword term: trimmed, lowercased, with internal
/// whitespace runs collapsed to a single space.
///
/// `(normalize_term(term), market)` is the keyword's natural key.
#[must_use]
pub fn normalize_term(term: &str) -> String {
    term.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Denormalized keyword columns a job may refresh alongside an extras section.
///
/// `None` leaves the stored column untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedScalars {
    pub demand_index: Option<f64>,
    pub competition_score: Option<f64>,
    pub engagement_score: Option<f64>,
    pub trend_momentum: Option<f64>,
}

impl DerivedScalars {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.demand_index.is_none()
            && self.competition_score.is_none()
            && self.engagement_score.is_none()
            && self.trend_momentum.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_term_lowercases_and_collapses_whitespace() {
        assert_eq!(normalize_term("  Handmade   Jewelry\t"), "handmade jewelry");
        assert_eq!(normalize_term("Boho\nWall  Art"), "boho wall art");
    }

    #[test]
    fn normalize_term_of_blank_is_empty() {
        assert_eq!(normalize_term("   "), "");
    }

    #[test]
    fn derived_scalars_default_is_empty() {
        assert!(DerivedScalars::default().is_empty());
        let scalars = DerivedScalars {
            trend_momentum: Some(60.0),
            ..DerivedScalars::default()
        };
        assert!(!scalars.is_empty());
    }
}
