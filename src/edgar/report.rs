use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use strum::{EnumIter, IntoEnumIterator};

/// SEC form types the pipeline knows how to locate.
///
/// Unrecognized forms pass through as `Other` so callers can still request
/// them by their literal EDGAR form string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
#[serde(try_from = "String", into = "String")]
pub enum FilingType {
    Form10K,
    Form10Q,
    Form8K,
    Form20F,
    FormS1,
    FormS4,
    FormDEF14A,
    FormSC13D,
    FormSC13G,
    FormSCTO,
    Other(String),
}

impl TryFrom<String> for FilingType {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        FilingType::from_str(&s)
    }
}

impl From<FilingType> for String {
    fn from(t: FilingType) -> String {
        t.to_string()
    }
}

impl fmt::Display for FilingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilingType::Form10K => write!(f, "10-K"),
            FilingType::Form10Q => write!(f, "10-Q"),
            FilingType::Form8K => write!(f, "8-K"),
            FilingType::Form20F => write!(f, "20-F"),
            FilingType::FormS1 => write!(f, "S-1"),
            FilingType::FormS4 => write!(f, "S-4"),
            FilingType::FormDEF14A => write!(f, "DEF 14A"),
            FilingType::FormSC13D => write!(f, "SC 13D"),
            FilingType::FormSC13G => write!(f, "SC 13G"),
            FilingType::FormSCTO => write!(f, "SC TO"),
            FilingType::Other(s) => write!(f, "{}", s),
        }
    }
}

impl FromStr for FilingType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<FilingType, String> {
        match s.trim().to_uppercase().as_str() {
            "10-K" => Ok(FilingType::Form10K),
            "10-Q" => Ok(FilingType::Form10Q),
            "8-K" => Ok(FilingType::Form8K),
            "20-F" => Ok(FilingType::Form20F),
            "S-1" => Ok(FilingType::FormS1),
            "S-4" => Ok(FilingType::FormS4),
            "DEF 14A" => Ok(FilingType::FormDEF14A),
            "SC 13D" => Ok(FilingType::FormSC13D),
            "SC 13G" => Ok(FilingType::FormSC13G),
            "SC TO" | "SC TO-T" | "SC TO-I" => Ok(FilingType::FormSCTO),
            other => Ok(FilingType::Other(other.to_string())),
        }
    }
}

static FILING_TYPES: Lazy<String> = Lazy::new(|| {
    FilingType::iter()
        .filter(|t| !matches!(t, FilingType::Other(_)))
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
});

impl FilingType {
    pub fn list_types() -> &'static str {
        &FILING_TYPES
    }

    /// Whether an EDGAR form string (feed row or index table cell) denotes
    /// this filing type. Amended filings ("10-K/A") count as their base form.
    pub fn matches(&self, form: &str) -> bool {
        let form = form.trim().to_uppercase();
        let wanted = self.to_string().to_uppercase();
        form == wanted || form.starts_with(&format!("{}/", wanted))
    }
}
