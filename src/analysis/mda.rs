use serde::{Deserialize, Serialize};

use crate::extract::ExtractedSection;

/// Lexicon for management-tone scoring. Deliberately small and generic;
/// this is a coarse signal, not a financial model.
const POSITIVE_KEYWORDS: &[&str] = &[
    "growth",
    "increase",
    "increased",
    "improvement",
    "improved",
    "strong",
    "record",
    "favorable",
    "exceeded",
    "momentum",
    "expansion",
    "profitable",
];

const NEGATIVE_KEYWORDS: &[&str] = &[
    "decline",
    "declined",
    "decrease",
    "decreased",
    "weak",
    "unfavorable",
    "loss",
    "impairment",
    "restructuring",
    "headwind",
    "shortfall",
    "deterioration",
];

/// Bucket thresholds on the normalized score.
const SENTIMENT_THRESHOLD: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

/// Read-only aggregate over an extracted MD&A section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MdaAnalysis {
    pub section_name: String,
    pub positive_hits: usize,
    pub negative_hits: usize,
    /// (pos − neg) / (pos + neg), in [-1, 1]; 0 when neither appears.
    pub sentiment_score: f64,
    pub label: SentimentLabel,
}

pub fn analyze(section: &ExtractedSection) -> MdaAnalysis {
    let text_lower = section.text.to_lowercase();

    let positive_hits: usize = POSITIVE_KEYWORDS
        .iter()
        .map(|k| count_word(&text_lower, k))
        .sum();
    let negative_hits: usize = NEGATIVE_KEYWORDS
        .iter()
        .map(|k| count_word(&text_lower, k))
        .sum();

    let total = positive_hits + negative_hits;
    let sentiment_score = if total == 0 {
        0.0
    } else {
        (positive_hits as f64 - negative_hits as f64) / total as f64
    };

    let label = if sentiment_score > SENTIMENT_THRESHOLD {
        SentimentLabel::Positive
    } else if sentiment_score < -SENTIMENT_THRESHOLD {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    };

    MdaAnalysis {
        section_name: section.section_name.clone(),
        positive_hits,
        negative_hits,
        sentiment_score,
        label,
    }
}

/// Whole-word occurrence count, so "loss" does not count inside "glossary".
fn count_word(text_lower: &str, keyword: &str) -> usize {
    text_lower
        .match_indices(keyword)
        .filter(|(pos, matched)| {
            let before = text_lower[..*pos].chars().next_back();
            let after = text_lower[pos + matched.len()..].chars().next();
            !before.is_some_and(|c| c.is_alphanumeric())
                && !after.is_some_and(|c| c.is_alphanumeric())
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ExtractionMethod;

    fn section(text: &str) -> ExtractedSection {
        ExtractedSection::new("Item 7", text.to_string(), ExtractionMethod::Regex)
    }

    #[test]
    fn positive_tone_is_labeled_positive() {
        let analysis = analyze(&section(
            "Revenue growth was strong, with record margins and improved cash flow, \
             despite one restructuring charge.",
        ));
        assert!(analysis.positive_hits > analysis.negative_hits);
        assert_eq!(analysis.label, SentimentLabel::Positive);
        assert!(analysis.sentiment_score > 0.2 && analysis.sentiment_score <= 1.0);
    }

    #[test]
    fn balanced_tone_is_neutral() {
        let analysis = analyze(&section("Growth in one segment, decline in another."));
        assert_eq!(analysis.positive_hits, 1);
        assert_eq!(analysis.negative_hits, 1);
        assert_eq!(analysis.label, SentimentLabel::Neutral);
        assert_eq!(analysis.sentiment_score, 0.0);
    }

    #[test]
    fn no_lexicon_hits_scores_zero() {
        let analysis = analyze(&section("The company makes widgets."));
        assert_eq!(analysis.sentiment_score, 0.0);
        assert_eq!(analysis.label, SentimentLabel::Neutral);
    }

    #[test]
    fn substrings_do_not_count() {
        assert_eq!(count_word("glossary of terms", "loss"), 0);
        assert_eq!(count_word("a loss was recorded", "loss"), 1);
    }
}
