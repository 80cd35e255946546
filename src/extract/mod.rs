//! Tiered section extraction.
//!
//! The fallback cascade (LLM single-shot → LLM chunked → DOM → regex) is an
//! ordered list of strategies, each returning `Option<ExtractedSection>` and
//! swallowing its own failures. Only exhaustion of every tier surfaces as
//! `SectionNotFound`.

pub mod chunked;
pub mod dom;
pub mod single_shot;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::EnumIter;

use crate::edgar::section::{self, SectionRequest, MIN_SECTION_LEN};
use crate::error::{EdgarError, Result};
use crate::llm::LlmClient;

pub use chunked::{ChunkedExtractor, ChunkedOptions};
pub use single_shot::SingleShotExtractor;

/// How a section's text was ultimately obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    LlmSingle,
    LlmChunked,
    Dom,
    Regex,
}

/// One extracted section plus provenance. Immutable once produced; the
/// analyzers read it and never write back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedSection {
    pub section_name: String,
    pub text: String,
    pub length: usize,
    pub method: ExtractionMethod,
    /// Number of chunks the section was split into (chunked method only).
    pub chunk_count: Option<usize>,
    /// Chunks that fell back to their raw text after an LLM failure. Nonzero
    /// means the result is complete but partially unpolished.
    pub degraded_chunks: usize,
}

impl ExtractedSection {
    pub fn new(section_name: impl Into<String>, text: String, method: ExtractionMethod) -> Self {
        ExtractedSection {
            section_name: section_name.into(),
            length: text.len(),
            text,
            method,
            chunk_count: None,
            degraded_chunks: 0,
        }
    }

    /// The 500-character contract: anything shorter is treated as a failed
    /// extraction and the caller moves to the next tier.
    pub fn meets_minimum_length(&self) -> bool {
        self.length >= MIN_SECTION_LEN
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded_chunks > 0
    }
}

/// Inputs a tier may draw on. Normalized text is always present; the
/// original markup only when the document was HTML.
pub struct ExtractionContext<'a> {
    pub text: &'a str,
    pub html: Option<&'a str>,
    pub request: &'a SectionRequest,
}

#[async_trait]
pub trait ExtractionTier: Send + Sync {
    /// Attempts extraction. `None` means "this tier cannot produce the
    /// section" — errors are logged inside the tier, never raised.
    async fn extract(&self, ctx: &ExtractionContext<'_>) -> Option<ExtractedSection>;

    fn name(&self) -> &'static str;
}

/// Last-resort tier: the boundary finder's raw span, unpolished.
pub struct RegexTier;

#[async_trait]
impl ExtractionTier for RegexTier {
    async fn extract(&self, ctx: &ExtractionContext<'_>) -> Option<ExtractedSection> {
        let span = section::find_boundaries(ctx.text, ctx.request)?;
        let text = ctx.text[span.start..span.end].trim().to_string();
        if text.len() < MIN_SECTION_LEN {
            return None;
        }
        Some(ExtractedSection::new(
            &ctx.request.section_name,
            text,
            ExtractionMethod::Regex,
        ))
    }

    fn name(&self) -> &'static str {
        "regex"
    }
}

/// Runs the ordered tier list. The order is data, not control flow, so tests
/// can assemble reduced or reordered cascades.
pub struct SectionExtractor {
    tiers: Vec<Box<dyn ExtractionTier>>,
}

impl SectionExtractor {
    /// The production cascade.
    pub fn standard(llm: Arc<dyn LlmClient>, options: ChunkedOptions) -> Self {
        SectionExtractor {
            tiers: vec![
                Box::new(SingleShotExtractor::new(
                    llm.clone(),
                    options.single_shot_threshold,
                    options.window_limit,
                )),
                Box::new(ChunkedExtractor::new(llm, options)),
                Box::new(dom::DomExtractor),
                Box::new(RegexTier),
            ],
        }
    }

    pub fn with_tiers(tiers: Vec<Box<dyn ExtractionTier>>) -> Self {
        SectionExtractor { tiers }
    }

    pub async fn extract(&self, ctx: &ExtractionContext<'_>) -> Result<ExtractedSection> {
        for tier in &self.tiers {
            log::debug!(
                "Trying extraction tier '{}' for section '{}'",
                tier.name(),
                ctx.request.section_name
            );
            if let Some(section) = tier.extract(ctx).await {
                log::info!(
                    "Section '{}' extracted via {} tier ({} chars{})",
                    section.section_name,
                    tier.name(),
                    section.length,
                    if section.is_degraded() {
                        ", degraded"
                    } else {
                        ""
                    }
                );
                return Ok(section);
            }
        }
        Err(EdgarError::SectionNotFound(
            ctx.request.section_name.clone(),
        ))
    }
}
