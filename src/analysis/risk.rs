use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::extract::ExtractedSection;

/// Risk vocabulary counted in Item 1A text. Fixed list; matching is
/// case-insensitive and non-overlapping.
pub const RISK_KEYWORDS: &[&str] = &[
    "competition",
    "regulation",
    "litigation",
    "cybersecurity",
    "data breach",
    "supply chain",
    "pandemic",
    "interest rate",
    "inflation",
    "liquidity",
    "impairment",
    "climate",
    "intellectual property",
    "tariff",
    "recession",
    "default",
    "covenant",
    "foreign currency",
    "geopolitical",
    "concentration",
];

/// How many characters one density unit covers: mentions per 10K characters.
const DENSITY_UNIT: f64 = 10_000.0;

/// Material year-over-year frequency change; smaller deltas are noise.
const MATERIAL_DELTA: i64 = 2;

/// Read-only aggregate over one extracted risk section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAnalysis {
    pub section_name: String,
    /// Keywords that appear at least once, with their counts.
    pub keyword_counts: BTreeMap<String, usize>,
    pub total_mentions: usize,
    /// Mentions per 10K characters of section text.
    pub density: f64,
    pub text_length: usize,
}

/// Symmetric vocabulary diff between a current and a prior year's risk
/// section, plus material per-keyword frequency deltas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YearOverYearComparison {
    pub new_risk_keywords: Vec<String>,
    pub removed_risk_keywords: Vec<String>,
    /// current − prior, for keywords both years mention with |Δ| ≥ 2.
    pub frequency_deltas: BTreeMap<String, i64>,
}

/// Non-overlapping, case-insensitive occurrence count.
pub fn count_occurrences(text_lower: &str, keyword: &str) -> usize {
    text_lower.matches(&keyword.to_lowercase()).count()
}

pub fn analyze(section: &ExtractedSection) -> RiskAnalysis {
    let text_lower = section.text.to_lowercase();
    let mut keyword_counts = BTreeMap::new();
    let mut total_mentions = 0;

    for keyword in RISK_KEYWORDS {
        let count = count_occurrences(&text_lower, keyword);
        if count > 0 {
            total_mentions += count;
            keyword_counts.insert((*keyword).to_string(), count);
        }
    }

    let density = if section.length == 0 {
        0.0
    } else {
        total_mentions as f64 * DENSITY_UNIT / section.length as f64
    };

    RiskAnalysis {
        section_name: section.section_name.clone(),
        keyword_counts,
        total_mentions,
        density,
        text_length: section.length,
    }
}

/// Diff of the current year against the prior year.
pub fn compare(current: &RiskAnalysis, prior: &RiskAnalysis) -> YearOverYearComparison {
    let new_risk_keywords = current
        .keyword_counts
        .keys()
        .filter(|k| !prior.keyword_counts.contains_key(*k))
        .cloned()
        .collect();
    let removed_risk_keywords = prior
        .keyword_counts
        .keys()
        .filter(|k| !current.keyword_counts.contains_key(*k))
        .cloned()
        .collect();

    let mut frequency_deltas = BTreeMap::new();
    for (keyword, &current_count) in &current.keyword_counts {
        if let Some(&prior_count) = prior.keyword_counts.get(keyword) {
            let delta = current_count as i64 - prior_count as i64;
            if delta.abs() >= MATERIAL_DELTA {
                frequency_deltas.insert(keyword.clone(), delta);
            }
        }
    }

    YearOverYearComparison {
        new_risk_keywords,
        removed_risk_keywords,
        frequency_deltas,
    }
}

/// Comparison over filings ordered by filing year descending: the first two
/// entries are diffed. `None` when fewer than two years are available.
pub fn compare_years(analyses: &[RiskAnalysis]) -> Option<YearOverYearComparison> {
    match analyses {
        [current, prior, ..] => Some(compare(current, prior)),
        _ => None,
    }
}
