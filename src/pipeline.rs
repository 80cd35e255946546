use chrono::NaiveDate;
use futures::future::{BoxFuture, FutureExt};
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::analysis::{self, KeywordContext, KeywordSet, RiskAnalysis, YearOverYearComparison};
use crate::core::ExtractorConfig;
use crate::edgar::fetch::{self, RawFiling};
use crate::edgar::locator::{FilingLocator, FilingReference};
use crate::edgar::rate_limiter::RateLimiter;
use crate::edgar::report::FilingType;
use crate::edgar::section::SectionRequest;
use crate::edgar::tickers::{CikResolver, Ticker};
use crate::error::{EdgarError, Result};
use crate::extract::{
    ChunkedOptions, ExtractedSection, ExtractionContext, ExtractionMethod, SectionExtractor,
};
use crate::llm::LlmClient;

/// One located-and-extracted section, ready for a downstream agent.
#[derive(Debug, Clone, Serialize)]
pub struct SectionResult {
    pub reference: FilingReference,
    pub section: ExtractedSection,
}

/// Per-section outcome for multi-section extraction. Errors are captured per
/// section so one failure never aborts its siblings.
#[derive(Debug, Clone, Serialize)]
pub struct SectionOutcome {
    pub request: SectionRequest,
    pub section: Option<ExtractedSection>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskYear {
    pub filing_date: NaiveDate,
    pub accession_number: String,
    pub method: ExtractionMethod,
    pub degraded_chunks: usize,
    pub analysis: RiskAnalysis,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskFactorHistory {
    pub ticker: String,
    pub years: Vec<RiskYear>,
    /// Diff of the two most recent years, when both extracted.
    pub comparison: Option<YearOverYearComparison>,
    /// True when the outer timeout forced a reduction from the requested
    /// year count to a single year.
    pub reduced_scope: bool,
}

/// Facade wiring locator → fetcher → tiered extraction → analyzers.
///
/// The LLM client is injected at construction; nothing in the pipeline
/// reaches for global state. On an outer timeout the pipeline retries with
/// reduced scope rather than failing outright; in-flight chunk calls are not
/// cancelled, only abandoned (they finish or hit their own timeouts).
pub struct ExtractionPipeline {
    client: Client,
    rate_limiter: Arc<RateLimiter>,
    locator: FilingLocator,
    extractor: SectionExtractor,
    config: ExtractorConfig,
}

impl ExtractionPipeline {
    pub fn new(config: ExtractorConfig, llm: Arc<dyn LlmClient>) -> Self {
        let client = Client::new();
        let resolver = Arc::new(CikResolver::new(client.clone(), config.user_agent.clone()));
        Self::with_resolver(config, llm, resolver)
    }

    /// Construction with an explicit resolver, the seam tests use to preload
    /// ticker fixtures.
    pub fn with_resolver(
        config: ExtractorConfig,
        llm: Arc<dyn LlmClient>,
        resolver: Arc<CikResolver>,
    ) -> Self {
        let client = Client::new();
        let rate_limiter = Arc::new(RateLimiter::new(config.edgar_request_delay));
        let locator = FilingLocator::new(
            client.clone(),
            rate_limiter.clone(),
            resolver,
            config.user_agent.clone(),
        );
        let extractor = SectionExtractor::standard(llm, ChunkedOptions::from_config(&config));
        ExtractionPipeline {
            client,
            rate_limiter,
            locator,
            extractor,
            config,
        }
    }

    pub async fn locate(
        &self,
        ticker: &str,
        filing_type: &FilingType,
        year: Option<i32>,
    ) -> Result<FilingReference> {
        let ticker = Ticker::new(ticker)?;
        self.locator.locate(&ticker, filing_type, year).await
    }

    pub async fn fetch(&self, reference: &FilingReference) -> Result<RawFiling> {
        fetch::fetch_filing(
            &self.client,
            &self.rate_limiter,
            &self.config.user_agent,
            reference,
        )
        .await
    }

    /// Runs the tier cascade over an already-fetched filing.
    pub async fn extract_from_filing(
        &self,
        raw: &RawFiling,
        request: &SectionRequest,
    ) -> Result<ExtractedSection> {
        let ctx = ExtractionContext {
            text: &raw.text,
            html: raw.html.as_deref(),
            request,
        };
        self.extractor.extract(&ctx).await
    }

    /// Locate → fetch → extract for one section.
    pub async fn extract_section(
        &self,
        ticker: &str,
        filing_type: &FilingType,
        request: &SectionRequest,
        year: Option<i32>,
    ) -> Result<SectionResult> {
        let reference = self.locate(ticker, filing_type, year).await?;
        let raw = self.fetch(&reference).await?;
        let section = self.extract_from_filing(&raw, request).await?;
        Ok(SectionResult { reference, section })
    }

    /// Extracts several sections from one filing. Sections are independent:
    /// a failure is recorded in its outcome and the rest proceed.
    pub async fn extract_many(
        &self,
        ticker: &str,
        filing_type: &FilingType,
        requests: &[SectionRequest],
        year: Option<i32>,
    ) -> Result<(FilingReference, Vec<SectionOutcome>)> {
        let reference = self.locate(ticker, filing_type, year).await?;
        let raw = self.fetch(&reference).await?;

        let mut outcomes = Vec::with_capacity(requests.len());
        for request in requests {
            match self.extract_from_filing(&raw, request).await {
                Ok(section) => outcomes.push(SectionOutcome {
                    request: request.clone(),
                    section: Some(section),
                    error: None,
                }),
                Err(e) => {
                    log::warn!(
                        "Section '{}' failed ({}); continuing with remaining sections",
                        request.section_name,
                        e
                    );
                    outcomes.push(SectionOutcome {
                        request: request.clone(),
                        section: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        Ok((reference, outcomes))
    }

    /// Multi-year Item 1A extraction with year-over-year comparison. The
    /// whole operation runs under a filer-tiered timeout; on expiry the scope
    /// drops to one year instead of failing outright.
    pub async fn risk_factor_history(&self, ticker: &str, years: usize) -> Result<RiskFactorHistory> {
        let parsed = Ticker::new(ticker)?;
        let budget = self.config.section_timeout_for(parsed.as_str());
        run_with_scope_reduction(budget, years, |years, reduced| {
            self.history_inner(&parsed, years, reduced).boxed()
        })
        .await
    }

    async fn history_inner(
        &self,
        ticker: &Ticker,
        years: usize,
        reduced_scope: bool,
    ) -> Result<RiskFactorHistory> {
        let references = self
            .locator
            .locate_recent(ticker, &FilingType::Form10K, None, years)
            .await?;
        let request = SectionRequest::risk_factors();

        let mut year_results = Vec::with_capacity(references.len());
        for reference in &references {
            let raw = match self.fetch(reference).await {
                Ok(raw) => raw,
                Err(e) => {
                    log::warn!(
                        "Skipping {} ({}): {}",
                        reference.accession_number,
                        reference.filing_date,
                        e
                    );
                    continue;
                }
            };
            match self.extract_from_filing(&raw, &request).await {
                Ok(section) => {
                    let rec = RiskYear {
                        filing_date: reference.filing_date,
                        accession_number: reference.accession_number.clone(),
                        method: section.method,
                        degraded_chunks: section.degraded_chunks,
                        analysis: analysis::risk::analyze(&section),
                    };
                    year_results.push(rec);
                }
                Err(e) => log::warn!(
                    "Risk factors missing from {}: {}",
                    reference.accession_number,
                    e
                ),
            }
        }

        // locate_recent returns newest first, so the analyses are already
        // ordered by filing year descending.
        let analyses: Vec<RiskAnalysis> =
            year_results.iter().map(|y| y.analysis.clone()).collect();
        let comparison = analysis::risk::compare_years(&analyses);

        Ok(RiskFactorHistory {
            ticker: ticker.to_string(),
            years: year_results,
            comparison,
            reduced_scope,
        })
    }

    /// Keyword-context mining over a fetched filing's full text.
    pub fn mine(&self, raw: &RawFiling, set: KeywordSet, window: usize) -> Vec<KeywordContext> {
        analysis::find_keyword_contexts(&raw.text, set.keywords(), window)
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }
}

/// Applies the filer-tiered budget to one history attempt. `attempt` is
/// called with the year count and a flag marking reduced scope; on the first
/// expiry the scope drops to a single year, and only a second expiry
/// surfaces as `Timeout`.
async fn run_with_scope_reduction<'a, F>(
    budget: Duration,
    years: usize,
    mut attempt: F,
) -> Result<RiskFactorHistory>
where
    F: FnMut(usize, bool) -> BoxFuture<'a, Result<RiskFactorHistory>>,
{
    match tokio::time::timeout(budget, attempt(years, false)).await {
        Ok(result) => result,
        Err(_) if years > 1 => {
            log::warn!(
                "Risk history exceeded {:?} for {} years; reducing scope to 1 year",
                budget,
                years
            );
            match tokio::time::timeout(budget, attempt(1, true)).await {
                Ok(result) => result,
                Err(_) => Err(EdgarError::Timeout(budget)),
            }
        }
        Err(_) => Err(EdgarError::Timeout(budget)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_history(ticker: &str, reduced_scope: bool) -> RiskFactorHistory {
        RiskFactorHistory {
            ticker: ticker.to_string(),
            years: Vec::new(),
            comparison: None,
            reduced_scope,
        }
    }

    #[tokio::test]
    async fn timeout_reduces_scope_to_one_year() {
        let mut attempts = Vec::new();
        let result = run_with_scope_reduction(Duration::from_millis(20), 3, |years, reduced| {
            attempts.push((years, reduced));
            if reduced {
                futures::future::ready(Ok(empty_history("ACME", reduced))).boxed()
            } else {
                // First attempt stalls past the budget.
                futures::future::pending().boxed()
            }
        })
        .await
        .unwrap();

        assert!(result.reduced_scope);
        assert_eq!(attempts, vec![(3, false), (1, true)]);
    }

    #[tokio::test]
    async fn single_year_request_times_out_without_retrying() {
        let mut attempts = 0;
        let budget = Duration::from_millis(20);
        let result = run_with_scope_reduction(budget, 1, |_, _| {
            attempts += 1;
            futures::future::pending().boxed()
        })
        .await;

        assert_eq!(attempts, 1);
        match result {
            Err(EdgarError::Timeout(d)) => assert_eq!(d, budget),
            other => panic!("expected Timeout, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn fast_attempt_keeps_full_scope() {
        let result = run_with_scope_reduction(Duration::from_secs(5), 3, |years, reduced| {
            assert_eq!(years, 3);
            assert!(!reduced);
            futures::future::ready(Ok(empty_history("ACME", reduced))).boxed()
        })
        .await
        .unwrap();
        assert!(!result.reduced_scope);
    }
}
