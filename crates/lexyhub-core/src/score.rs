//! Canonical 0–100 score scale and the trend indicator buckets.
//!
//! Upstream sources disagree on whether a ratio is encoded as `0.42` or
//! `42`. [`normalize_score`] accepts both without re-scaling values that are
//! already percentages.

use serde::{Deserialize, Serialize};

/// Returned by [`normalize_score`] when the raw value is missing or `NaN`.
pub const DEFAULT_FALLBACK: f64 = 50.0;

const UP_THRESHOLD: f64 = 0.6;
const DOWN_THRESHOLD: f64 = 0.4;

/// Map a raw metric onto the canonical `[0, 100]` display scale.
///
/// - `None` or `NaN` → `fallback`
/// - `[0, 1]` → scaled ×100 and rounded
/// - `(1, 100]` → rounded as-is
/// - anything else → rounded, then clamped into `[0, 100]`
#[must_use]
pub fn normalize_score(raw: Option<f64>, fallback: f64) -> f64 {
    let Some(value) = raw.filter(|v| !v.is_nan()) else {
        return fallback;
    };

    if (0.0..=1.0).contains(&value) {
        (value * 100.0).round()
    } else if (0.0..=100.0).contains(&value) {
        value.round()
    } else {
        value.round().clamp(0.0, 100.0)
    }
}

/// Round to four decimal places.
#[must_use]
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Coarse direction bucket shown next to a keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendIndicator {
    Up,
    Down,
    Flat,
    Unknown,
}

impl TrendIndicator {
    /// Bucket a blended momentum: `> 0.6` up, `< 0.4` down, otherwise flat.
    #[must_use]
    pub fn from_momentum(momentum: Option<f64>) -> Self {
        match momentum {
            None => Self::Unknown,
            Some(m) if m.is_nan() => Self::Unknown,
            Some(m) if m > UP_THRESHOLD => Self::Up,
            Some(m) if m < DOWN_THRESHOLD => Self::Down,
            Some(_) => Self::Flat,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Flat => "flat",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for TrendIndicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
