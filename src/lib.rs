//! SEC EDGAR filing section extraction.
//!
//! Given a ticker and a filing type, this crate resolves the filing's
//! primary document, normalizes it to text, and extracts named sections
//! ("Item 1A", "Item 7", …) through a tiered fallback cascade: single-shot
//! LLM extraction, chunked parallel LLM extraction, DOM parsing, and plain
//! regex bounding. Analyzers derive risk keyword densities, MD&A sentiment,
//! and year-over-year risk comparisons from the extracted sections.

pub mod analysis;
pub mod core;
pub mod edgar;
pub mod error;
pub mod extract;
pub mod llm;
pub mod pipeline;

// Re-exports
pub use self::core::ExtractorConfig;
pub use edgar::{FilingReference, FilingType, RawFiling, SectionRequest, Ticker};
pub use error::EdgarError;
pub use extract::{ExtractedSection, ExtractionMethod};
pub use llm::{CompletionRequest, LlmClient};
pub use pipeline::ExtractionPipeline;
