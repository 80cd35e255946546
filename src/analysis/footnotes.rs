use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::edgar::section::floor_char_boundary;

/// Default amount of surrounding text returned with each match.
pub const DEFAULT_CONTEXT_WINDOW: usize = 300;

pub const DEBT_COVENANT_KEYWORDS: &[&str] = &[
    "covenant",
    "credit agreement",
    "revolving credit",
    "leverage ratio",
    "interest coverage",
    "event of default",
    "restricted payment",
];

pub const RELATED_PARTY_KEYWORDS: &[&str] = &[
    "related party",
    "related-party",
    "affiliate transaction",
    "transactions with related persons",
    "officer loan",
];

pub const OFF_BALANCE_SHEET_KEYWORDS: &[&str] = &[
    "off-balance sheet",
    "off balance sheet",
    "variable interest entity",
    "unconsolidated",
    "guarantee",
    "operating lease commitment",
];

/// Named keyword presets, so callers (and the CLI) pick a set by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordSet {
    DebtCovenants,
    RelatedParty,
    OffBalanceSheet,
}

impl KeywordSet {
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            KeywordSet::DebtCovenants => DEBT_COVENANT_KEYWORDS,
            KeywordSet::RelatedParty => RELATED_PARTY_KEYWORDS,
            KeywordSet::OffBalanceSheet => OFF_BALANCE_SHEET_KEYWORDS,
        }
    }
}

impl FromStr for KeywordSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().replace(['-', '_'], " ").as_str() {
            "debt covenants" | "covenants" => Ok(KeywordSet::DebtCovenants),
            "related party" => Ok(KeywordSet::RelatedParty),
            "off balance sheet" => Ok(KeywordSet::OffBalanceSheet),
            other => Err(format!(
                "unknown keyword set '{}' (expected debt-covenants, related-party, off-balance-sheet)",
                other
            )),
        }
    }
}

/// One keyword hit with its surrounding context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordContext {
    pub keyword: String,
    /// Byte offset of the match within the searched text.
    pub position: usize,
    pub context: String,
}

/// Generic keyword-context search: every case-insensitive match of every
/// keyword, with `window` characters of context on each side. The same
/// primitive serves debt covenants, related-party transactions, and
/// off-balance-sheet mining — only the keyword set differs.
pub fn find_keyword_contexts(text: &str, keywords: &[&str], window: usize) -> Vec<KeywordContext> {
    let text_lower = text.to_lowercase();
    let mut matches = Vec::new();

    for keyword in keywords {
        let needle = keyword.to_lowercase();
        for (position, _) in text_lower.match_indices(&needle) {
            let from = floor_char_boundary(text, position.saturating_sub(window));
            let to = floor_char_boundary(text, (position + needle.len() + window).min(text.len()));
            matches.push(KeywordContext {
                keyword: (*keyword).to_string(),
                position,
                context: text[from..to].to_string(),
            });
        }
    }

    matches.sort_by_key(|m| m.position);
    matches
}
