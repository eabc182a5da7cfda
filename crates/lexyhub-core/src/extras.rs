//! Typed `keywords.extras` document.
//!
//! Several jobs annotate the same keyword row. Each owns exactly one named
//! section and changes it through [`KeywordExtras::merge`], which never
//! touches the other sections. Keys this crate does not model are carried in
//! [`KeywordExtras::other`] so a round-trip through Rust never drops them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::score::TrendIndicator;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendDetail {
    /// Running-average blend of observed velocities (source units, not 0–100).
    pub momentum: f64,
    pub expected_growth_30d: f64,
    pub indicator: TrendIndicator,
    /// Sorted names of the sources that contributed observations.
    pub sources: Vec<String>,
    pub latest_recorded_on: NaiveDate,
    pub observations: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordIntent {
    Transactional,
    Commercial,
    Informational,
    Navigational,
}

impl KeywordIntent {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transactional => "transactional",
            Self::Commercial => "commercial",
            Self::Informational => "informational",
            Self::Navigational => "navigational",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub intent: KeywordIntent,
    /// In `[0, 1]`.
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub model: String,
    pub classified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalLabel {
    pub period: String,
    pub weight: f64,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    #[serde(default)]
    pub tags: Vec<String>,
    /// `demand_index` as it was before `weight` was applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_demand: Option<f64>,
}

/// Discriminant for [`ExtrasSection`], used when querying by section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Trend,
    Classification,
    Seasonal,
}

impl SectionKind {
    /// JSON key under which the section is stored.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Trend => "trend",
            Self::Classification => "classification",
            Self::Seasonal => "seasonal",
        }
    }
}

/// One named section, as written by a single job.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtrasSection {
    Trend(TrendDetail),
    Classification(Classification),
    Seasonal(SeasonalLabel),
}

impl ExtrasSection {
    #[must_use]
    pub fn kind(&self) -> SectionKind {
        match self {
            Self::Trend(_) => SectionKind::Trend,
            Self::Classification(_) => SectionKind::Classification,
            Self::Seasonal(_) => SectionKind::Seasonal,
        }
    }

    /// Serialized section body, without the enclosing key.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if a float in the section is not finite.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Trend(t) => serde_json::to_value(t),
            Self::Classification(c) => serde_json::to_value(c),
            Self::Seasonal(s) => serde_json::to_value(s),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordExtras {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<TrendDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seasonal: Option<SeasonalLabel>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl KeywordExtras {
    /// Decode a stored extras document.
    ///
    /// Never fails: a section whose shape does not match its type is kept
    /// verbatim in [`Self::other`] rather than discarded, and a non-object
    /// document yields empty extras.
    #[must_use]
    pub fn from_json(value: Value) -> Self {
        let Value::Object(mut map) = value else {
            return Self::default();
        };

        let mut extras = Self::default();
        extras.trend = take_section(&mut map, SectionKind::Trend.key(), &mut extras.other);
        extras.classification =
            take_section(&mut map, SectionKind::Classification.key(), &mut extras.other);
        extras.seasonal = take_section(&mut map, SectionKind::Seasonal.key(), &mut extras.other);
        extras.other.extend(map);
        extras
    }

    /// Replace one named section, leaving every other key untouched.
    ///
    /// Returns `true` if the stored value changed.
    pub fn merge(&mut self, section: ExtrasSection) -> bool {
        // A malformed copy parked in `other` would shadow the typed section.
        let displaced = self.other.remove(section.kind().key()).is_some();
        let changed = match section {
            ExtrasSection::Trend(t) => replace_if_changed(&mut self.trend, t),
            ExtrasSection::Classification(c) => replace_if_changed(&mut self.classification, c),
            ExtrasSection::Seasonal(s) => replace_if_changed(&mut self.seasonal, s),
        };
        changed || displaced
    }

    /// Drop one named section, including a malformed copy in [`Self::other`].
    ///
    /// Returns `true` if anything was removed.
    pub fn remove(&mut self, kind: SectionKind) -> bool {
        let displaced = self.other.remove(kind.key()).is_some();
        let removed = match kind {
            SectionKind::Trend => self.trend.take().is_some(),
            SectionKind::Classification => self.classification.take().is_some(),
            SectionKind::Seasonal => self.seasonal.take().is_some(),
        };
        removed || displaced
    }

    #[must_use]
    pub fn has(&self, kind: SectionKind) -> bool {
        match kind {
            SectionKind::Trend => self.trend.is_some(),
            SectionKind::Classification => self.classification.is_some(),
            SectionKind::Seasonal => self.seasonal.is_some(),
        }
    }

    /// Serialize back to the stored JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if a float in a section is not finite.
    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

fn take_section<T>(
    map: &mut Map<String, Value>,
    key: &str,
    other: &mut Map<String, Value>,
) -> Option<T>
where
    T: serde::de::DeserializeOwned,
{
    let raw = map.remove(key)?;
    if raw.is_null() {
        return None;
    }
    match serde_json::from_value::<T>(raw.clone()) {
        Ok(section) => Some(section),
        Err(_) => {
            other.insert(key.to_string(), raw);
            None
        }
    }
}

fn replace_if_changed<T: PartialEq>(slot: &mut Option<T>, next: T) -> bool {
    if slot.as_ref() == Some(&next) {
        return false;
    }
    *slot = Some(next);
    true
}
