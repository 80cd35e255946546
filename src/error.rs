use thiserror::Error;

use crate::llm::LlmError;

/// Failure taxonomy for the extraction subsystem.
///
/// Tiered extraction swallows its own per-tier failures and only surfaces
/// `SectionNotFound` once every tier has been exhausted. Network failures are
/// never retried here beyond the 429 backoff in the fetch layer; retry policy
/// belongs to the caller.
#[derive(Debug, Error)]
pub enum EdgarError {
    #[error("no CIK found for ticker {0}")]
    UnknownTicker(String),

    #[error("request to {url} failed: {reason}")]
    Fetch { url: String, reason: String },

    #[error("no {filing_type} filing found for {ticker}")]
    FilingNotFound {
        ticker: String,
        filing_type: String,
        year: Option<i32>,
    },

    #[error("section '{0}' not found after exhausting all extraction tiers")]
    SectionNotFound(String),

    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl EdgarError {
    pub fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        EdgarError::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EdgarError>;
