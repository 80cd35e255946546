use anyhow::{anyhow, Result};
use std::collections::HashSet;
use std::time::Duration;

/// Runtime configuration for the extraction pipeline.
///
/// Everything except the SEC user agent has a sensible default. The user
/// agent must carry a contact email — the filing host rejects anonymous
/// clients, so we refuse to start without one.
#[derive(Clone, Debug)]
pub struct ExtractorConfig {
    /// Descriptive client identifier sent on every EDGAR request.
    pub user_agent: String,
    pub openai_api_key: String,
    pub openai_api_base: String,
    pub openai_model: String,
    /// Maximum simultaneous chunk-extraction LLM calls.
    pub max_concurrent_chunks: usize,
    /// Timeout applied to each individual chunk's LLM call.
    pub chunk_timeout: Duration,
    /// Sections at or below this size go straight to single-shot extraction.
    pub single_shot_threshold: usize,
    /// Upper bound on the text window handed to one LLM extraction call.
    pub window_limit: usize,
    /// Minimum delay between consecutive requests to the filing host.
    pub edgar_request_delay: Duration,
    /// Whole-section timeout for a standard filer.
    pub standard_section_timeout: Duration,
    /// Whole-section timeout for filers known to produce very large filings.
    pub large_filer_timeout: Duration,
    pub large_filers: HashSet<String>,
}

impl ExtractorConfig {
    pub fn from_env() -> Result<Self> {
        let user_agent = std::env::var("EDGAR_USER_AGENT")
            .map_err(|_| anyhow!("EDGAR_USER_AGENT environment variable not set"))?;
        if !user_agent.contains('@') {
            return Err(anyhow!(
                "EDGAR_USER_AGENT must include a contact email address (SEC policy)"
            ));
        }

        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let openai_api_base = std::env::var("OPENAI_API_BASE")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        let openai_model =
            std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        Ok(Self {
            user_agent,
            openai_api_key,
            openai_api_base,
            openai_model,
            ..Self::offline()
        })
    }

    /// Defaults for code paths that never talk to the network (tests, local
    /// analysis over pre-fetched filings).
    pub fn offline() -> Self {
        Self {
            user_agent: "edgar-sections test@example.com".to_string(),
            openai_api_key: String::new(),
            openai_api_base: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            max_concurrent_chunks: 5,
            chunk_timeout: Duration::from_secs(30),
            single_shot_threshold: 15_000,
            window_limit: 150_000,
            edgar_request_delay: Duration::from_millis(150),
            standard_section_timeout: Duration::from_secs(120),
            large_filer_timeout: Duration::from_secs(400),
            large_filers: ["BRK-A", "BRK-B", "JPM", "BAC", "C", "WFC", "GS"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    pub fn section_timeout_for(&self, ticker: &str) -> Duration {
        if self.large_filers.contains(ticker) {
            self.large_filer_timeout
        } else {
            self.standard_section_timeout
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_filers_get_the_long_timeout() {
        let config = ExtractorConfig::offline();
        assert_eq!(config.section_timeout_for("JPM"), config.large_filer_timeout);
        assert_eq!(
            config.section_timeout_for("ACME"),
            config.standard_section_timeout
        );
    }
}
