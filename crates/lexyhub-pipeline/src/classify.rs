//! Keyword intent classification.
//!
//! [`LexiconClassifier`] is a deterministic word-list model: every word of
//! the normalized term votes for at most one intent and one category.

use chrono::{DateTime, Utc};
use lexyhub_core::{normalize_term, round4, Classification, KeywordIntent};

pub trait Classifier: Send + Sync {
    /// Model identifier stored with every classification.
    fn model(&self) -> &str;

    fn classify(&self, term: &str, classified_at: DateTime<Utc>) -> Classification;
}

pub const LEXICON_MODEL: &str = "intent-lexicon-v1";

const BASE_CONFIDENCE: f64 = 0.3;

/// Intent word lists in tie-break order: the earlier intent wins a tie.
const INTENTS: &[(KeywordIntent, &[&str])] = &[
    (
        KeywordIntent::Transactional,
        &[
            "buy", "order", "shop", "sale", "discount", "coupon", "cheap", "deal", "price",
            "purchase", "custom", "personalized",
        ],
    ),
    (
        KeywordIntent::Commercial,
        &[
            "best", "top", "review", "reviews", "vs", "compare", "handmade", "unique",
            "premium", "ideas", "affordable",
        ],
    ),
    (
        KeywordIntent::Informational,
        &[
            "how", "what", "why", "diy", "tutorial", "guide", "tips", "meaning", "history",
            "pattern", "instructions",
        ],
    ),
    (
        KeywordIntent::Navigational,
        &["etsy", "amazon", "ebay", "login", "store", "official", "website"],
    ),
];

const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "jewelry",
        &[
            "jewelry", "ring", "rings", "necklace", "bracelet", "earrings", "pendant", "charm",
        ],
    ),
    (
        "home decor",
        &[
            "decor", "vase", "wall", "art", "pillow", "candle", "rug", "print", "planter",
        ],
    ),
    (
        "clothing",
        &[
            "shirt", "tshirt", "dress", "hoodie", "sweater", "apron", "scarf", "hat", "socks",
        ],
    ),
    ("wedding", &["wedding", "bridal", "bride", "bridesmaid", "groom", "engagement"]),
    ("party", &["party", "birthday", "balloon", "banner", "shower", "invitation"]),
    ("gifts", &["gift", "gifts", "present", "stocking", "keepsake"]),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct LexiconClassifier;

impl LexiconClassifier {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn words(term: &str) -> Vec<String> {
    normalize_term(term)
        .split(' ')
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Index and hit count of the list with the most hits; the first wins ties.
fn best_match<T>(lists: &[(T, &[&str])], words: &[String]) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    for (i, (_, list)) in lists.iter().enumerate() {
        let hits = words.iter().filter(|w| list.contains(&w.as_str())).count();
        if hits > 0 && best.is_none_or(|(_, top)| hits > top) {
            best = Some((i, hits));
        }
    }
    best
}

impl Classifier for LexiconClassifier {
    fn model(&self) -> &str {
        LEXICON_MODEL
    }

    /// Terms with no intent word default to commercial at base confidence.
    /// Otherwise confidence grows with the winner's share of all hits.
    fn classify(&self, term: &str, classified_at: DateTime<Utc>) -> Classification {
        let words = words(term);
        let total: usize = INTENTS
            .iter()
            .map(|(_, list)| words.iter().filter(|w| list.contains(&w.as_str())).count())
            .sum();

        let (intent, confidence) = match best_match(INTENTS, &words) {
            Some((index, hits)) => {
                #[allow(clippy::cast_precision_loss)]
                let share = hits as f64 / (total + 1) as f64;
                (
                    INTENTS[index].0,
                    round4(BASE_CONFIDENCE + (1.0 - BASE_CONFIDENCE) * share),
                )
            }
            None => (KeywordIntent::Commercial, BASE_CONFIDENCE),
        };

        Classification {
            intent,
            confidence,
            category: best_match(CATEGORIES, &words).map(|(i, _)| CATEGORIES[i].0.to_string()),
            model: LEXICON_MODEL.to_string(),
            classified_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn classify(term: &str) -> Classification {
        LexiconClassifier::new().classify(term, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn tie_prefers_transactional() {
        let c = classify("Buy Handmade Silver Ring");
        assert_eq!(c.intent, KeywordIntent::Transactional);
        // 0.3 + 0.7 * 1 / 3
        assert!((c.confidence - 0.5333).abs() < 1e-9);
        assert_eq!(c.category.as_deref(), Some("jewelry"));
    }

    #[test]
    fn how_to_is_informational() {
        let c = classify("how to knit a scarf");
        assert_eq!(c.intent, KeywordIntent::Informational);
        assert!((c.confidence - 0.65).abs() < 1e-9);
        assert_eq!(c.category.as_deref(), Some("clothing"));
    }

    #[test]
    fn unmatched_term_defaults_to_commercial() {
        let c = classify("blue ceramic");
        assert_eq!(c.intent, KeywordIntent::Commercial);
        assert!((c.confidence - 0.3).abs() < f64::EPSILON);
        assert_eq!(c.category, None);
        assert_eq!(c.model, LEXICON_MODEL);
    }

    #[test]
    fn punctuation_is_ignored() {
        let c = classify("etsy, wedding!");
        assert_eq!(c.intent, KeywordIntent::Navigational);
        assert_eq!(c.category.as_deref(), Some("wedding"));
    }

    #[test]
    fn classification_is_deterministic() {
        assert_eq!(classify("best birthday gift ideas"), classify("best birthday gift ideas"));
    }
}
