use async_trait::async_trait;
use std::sync::Arc;

use super::{ExtractedSection, ExtractionContext, ExtractionMethod, ExtractionTier};
use crate::edgar::section::{self, MIN_SECTION_LEN};
use crate::llm::{CompletionRequest, LlmClient};

/// Sentinel the model must return when it cannot locate the section.
/// Distinguishes "no section" from "empty section" and stops hallucinated
/// fallback content from passing validation.
pub const SECTION_NOT_FOUND: &str = "SECTION_NOT_FOUND";

/// Accept-with-warning floor used inside the chunked path.
pub const WARN_ACCEPT_LEN: usize = 300;

/// Single LLM call over a bounded window of the filing.
pub struct SingleShotExtractor {
    llm: Arc<dyn LlmClient>,
    /// Sections larger than this are left to the chunked tier.
    size_threshold: usize,
    window_limit: usize,
}

impl SingleShotExtractor {
    pub fn new(llm: Arc<dyn LlmClient>, size_threshold: usize, window_limit: usize) -> Self {
        SingleShotExtractor {
            llm,
            size_threshold,
            window_limit,
        }
    }

    /// Extraction over an explicit window; also used by the chunked tier for
    /// sections that turn out to fit one call.
    pub async fn extract_window(
        &self,
        window: &str,
        request: &crate::edgar::SectionRequest,
    ) -> Option<ExtractedSection> {
        let prompt = extraction_prompt(window, &request.start_marker, &request.end_marker);
        let completion = CompletionRequest::deterministic(prompt)
            .with_system("You extract verbatim sections from SEC filings. You never summarize, never paraphrase, and never invent text.");

        let response = match self.llm.complete(completion).await {
            Ok(text) => text,
            Err(e) => {
                log::warn!(
                    "Single-shot extraction call failed for '{}': {}",
                    request.section_name,
                    e
                );
                return None;
            }
        };

        let validated = validate_extraction(&response, MIN_SECTION_LEN)?;
        Some(ExtractedSection::new(
            &request.section_name,
            validated,
            ExtractionMethod::LlmSingle,
        ))
    }
}

#[async_trait]
impl ExtractionTier for SingleShotExtractor {
    async fn extract(&self, ctx: &ExtractionContext<'_>) -> Option<ExtractedSection> {
        // Pre-locate the section so the model sees a bounded window centered
        // on the boundary hit instead of the whole filing.
        let window = match section::find_boundaries(ctx.text, ctx.request) {
            Some(span) => {
                if span.len() > self.size_threshold {
                    log::debug!(
                        "Section '{}' is {} chars; leaving to the chunked tier",
                        ctx.request.section_name,
                        span.len()
                    );
                    return None;
                }
                section::context_window(ctx.text, span, self.window_limit)
            }
            None => {
                // No boundary hit: give the model the head of the document
                // and let the sentinel contract decide.
                let limit = section::floor_char_boundary(ctx.text, self.window_limit);
                &ctx.text[..limit]
            }
        };

        self.extract_window(window, ctx.request).await
    }

    fn name(&self) -> &'static str {
        "llm_single"
    }
}

/// Strict extraction instruction with the sentinel-on-failure contract.
pub fn extraction_prompt(window: &str, start_marker: &str, end_marker: &str) -> String {
    format!(
        "Find the section of this SEC filing that begins at the heading \"{start}\" \
         (accept formatting variants such as \"{start}.\", \"{start}:\", or all caps) \
         and return its complete text, verbatim, up to but not including \"{end}\", \
         the next major section heading, or the end of the provided text.\n\
         Do not summarize. Do not add commentary. \
         If you cannot locate the section, respond with exactly {sentinel} and nothing else.\n\n\
         FILING TEXT:\n{window}",
        start = start_marker,
        end = end_marker,
        sentinel = SECTION_NOT_FOUND,
        window = window,
    )
}

/// Validates a model response against the extraction contract: not the
/// sentinel, and long enough to be a real section.
pub fn validate_extraction(response: &str, min_len: usize) -> Option<String> {
    let trimmed = response.trim();
    if trimmed.is_empty() || trimmed.contains(SECTION_NOT_FOUND) {
        log::debug!("Extraction returned the not-found sentinel");
        return None;
    }
    if trimmed.len() < min_len {
        if trimmed.len() >= WARN_ACCEPT_LEN {
            log::warn!(
                "Extraction response is short ({} chars, floor {})",
                trimmed.len(),
                min_len
            );
        }
        return None;
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_responses_are_rejected() {
        assert!(validate_extraction(SECTION_NOT_FOUND, 500).is_none());
        assert!(validate_extraction("  SECTION_NOT_FOUND  ", 500).is_none());
    }

    #[test]
    fn short_responses_are_rejected() {
        assert!(validate_extraction("too short", 500).is_none());
    }

    #[test]
    fn long_responses_pass_trimmed() {
        let body = format!("  {}  ", "R".repeat(600));
        let validated = validate_extraction(&body, 500).unwrap();
        assert_eq!(validated, "R".repeat(600));
    }

    #[test]
    fn prompt_carries_markers_and_sentinel() {
        let prompt = extraction_prompt("some text", "Item 1A", "Item 1B");
        assert!(prompt.contains("Item 1A"));
        assert!(prompt.contains("Item 1B"));
        assert!(prompt.contains(SECTION_NOT_FOUND));
        assert!(prompt.ends_with("some text"));
    }
}
