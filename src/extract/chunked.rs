use async_trait::async_trait;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use super::single_shot::{validate_extraction, SingleShotExtractor, WARN_ACCEPT_LEN};
use super::{ExtractedSection, ExtractionContext, ExtractionMethod, ExtractionTier};
use crate::edgar::section::{self, floor_char_boundary, SectionRequest, MIN_SECTION_LEN};
use crate::llm::{CompletionRequest, LlmClient};

/// Marker separating the instruction from the excerpt in the per-chunk
/// clean-and-reformat prompt. Public so test doubles can echo the excerpt.
pub const CHUNK_EXCERPT_MARKER: &str = "EXCERPT:\n";

/// Heading-like lines used for the preferred semantic split: short, starts
/// uppercase, no sentence-ending period. This is a tuned heuristic, not a
/// contract; override it via `ChunkedOptions::heading_pattern` when a filer's
/// heading style defeats it.
static DEFAULT_HEADING_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s{0,3}[A-Z][A-Za-z0-9 ,&/()'\-]{3,89}:?[ \t]*$").unwrap());

/// Minimum number of detected headings before the heading split is trusted
/// over plain paragraph accumulation.
const MIN_HEADINGS_FOR_SPLIT: usize = 3;

#[derive(Clone)]
pub struct ChunkedOptions {
    /// Sections at or below this size skip chunking entirely.
    pub single_shot_threshold: usize,
    pub window_limit: usize,
    /// Maximum simultaneous chunk LLM calls; chunks beyond this wait on the
    /// semaphore rather than being dispatched in fixed batches.
    pub max_concurrency: usize,
    pub chunk_timeout: Duration,
    pub heading_pattern: Regex,
}

impl Default for ChunkedOptions {
    fn default() -> Self {
        ChunkedOptions {
            single_shot_threshold: 15_000,
            window_limit: 150_000,
            max_concurrency: 5,
            chunk_timeout: Duration::from_secs(30),
            heading_pattern: DEFAULT_HEADING_PATTERN.clone(),
        }
    }
}

impl ChunkedOptions {
    pub fn from_config(config: &crate::core::ExtractorConfig) -> Self {
        ChunkedOptions {
            single_shot_threshold: config.single_shot_threshold,
            window_limit: config.window_limit,
            max_concurrency: config.max_concurrent_chunks,
            chunk_timeout: config.chunk_timeout,
            heading_pattern: DEFAULT_HEADING_PATTERN.clone(),
        }
    }

    pub fn with_heading_pattern(mut self, pattern: Regex) -> Self {
        self.heading_pattern = pattern;
        self
    }
}

/// Splits an oversized section into semantic chunks and cleans them with
/// bounded-concurrency LLM calls. A failed chunk keeps its original text, so
/// assembly never drops content — only leaves it unpolished.
pub struct ChunkedExtractor {
    llm: Arc<dyn LlmClient>,
    options: ChunkedOptions,
}

impl ChunkedExtractor {
    pub fn new(llm: Arc<dyn LlmClient>, options: ChunkedOptions) -> Self {
        ChunkedExtractor { llm, options }
    }

    /// Chunk split: heading-based when enough heading-like lines are found,
    /// otherwise paragraph accumulation up to the size threshold.
    pub fn split_chunks(&self, text: &str) -> Vec<String> {
        let heads: Vec<usize> = self
            .options
            .heading_pattern
            .find_iter(text)
            .map(|m| m.start())
            .collect();

        if heads.len() >= MIN_HEADINGS_FOR_SPLIT {
            log::debug!("Splitting on {} detected category headings", heads.len());
            let mut chunks = Vec::with_capacity(heads.len() + 1);
            if heads[0] > 0 {
                chunks.push(text[..heads[0]].to_string());
            }
            for pair in heads.windows(2) {
                chunks.push(text[pair[0]..pair[1]].to_string());
            }
            if let Some(&last) = heads.last() {
                chunks.push(text[last..].to_string());
            }
            // A single heading's body can still exceed one call's budget.
            return chunks
                .into_iter()
                .filter(|c| !c.trim().is_empty())
                .flat_map(|c| {
                    if c.len() > self.options.single_shot_threshold {
                        split_paragraph_chunks(&c, self.options.single_shot_threshold)
                    } else {
                        vec![c]
                    }
                })
                .collect();
        }

        split_paragraph_chunks(text, self.options.single_shot_threshold)
    }

    /// Cleans the already-bounded chunks concurrently and reassembles them in
    /// original order. Infallible once the section text is in hand.
    pub async fn extract_bounded(
        &self,
        bounded: &str,
        request: &SectionRequest,
    ) -> ExtractedSection {
        let chunks = self.split_chunks(bounded);
        let chunk_count = chunks.len();
        log::info!(
            "Chunked extraction of '{}': {} chars in {} chunks",
            request.section_name,
            bounded.len(),
            chunk_count
        );

        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrency));
        let mut handles = Vec::with_capacity(chunk_count);

        for (index, chunk) in chunks.iter().enumerate() {
            let llm = self.llm.clone();
            let semaphore = semaphore.clone();
            let chunk = chunk.clone();
            let timeout = self.options.chunk_timeout;

            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (index, chunk, true),
                };
                let completion = CompletionRequest::deterministic(clean_prompt(&chunk))
                    .with_system(
                        "You reformat excerpts of SEC filings. Preserve every piece of \
                         substantive content verbatim; only remove markup artifacts, page \
                         numbers, and repeated page headers.",
                    );
                match tokio::time::timeout(timeout, llm.complete(completion)).await {
                    Ok(Ok(cleaned)) => match validate_chunk(&cleaned, &chunk) {
                        Some(cleaned) => (index, cleaned, false),
                        None => (index, chunk, true),
                    },
                    Ok(Err(e)) => {
                        log::warn!("Chunk {} clean call failed: {}; keeping raw text", index, e);
                        (index, chunk, true)
                    }
                    Err(_) => {
                        log::warn!("Chunk {} timed out; keeping raw text", index);
                        (index, chunk, true)
                    }
                }
            }));
        }

        // Join by original index regardless of completion order.
        let mut assembled: Vec<Option<(String, bool)>> = (0..chunk_count).map(|_| None).collect();
        for (spawn_index, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok((index, text, degraded)) => assembled[index] = Some((text, degraded)),
                Err(e) => {
                    log::warn!("Chunk task {} panicked: {}; keeping raw text", spawn_index, e);
                    assembled[spawn_index] = Some((chunks[spawn_index].clone(), true));
                }
            }
        }

        let assembled: Vec<(String, bool)> = assembled.into_iter().flatten().collect();
        let degraded_chunks = assembled.iter().filter(|(_, degraded)| *degraded).count();
        let text = assembled.iter().map(|(text, _)| text.as_str()).join("\n\n");

        if degraded_chunks > 0 {
            log::warn!(
                "Section '{}': {}/{} chunks degraded to raw text",
                request.section_name,
                degraded_chunks,
                chunk_count
            );
        }

        let mut section = ExtractedSection::new(
            &request.section_name,
            text,
            ExtractionMethod::LlmChunked,
        );
        section.chunk_count = Some(chunk_count);
        section.degraded_chunks = degraded_chunks;
        section
    }
}

#[async_trait]
impl ExtractionTier for ChunkedExtractor {
    async fn extract(&self, ctx: &ExtractionContext<'_>) -> Option<ExtractedSection> {
        // Fast regex bounding box first; without it this tier has nothing to
        // chunk and the cascade moves on.
        let span = section::find_boundaries(ctx.text, ctx.request)?;
        let bounded = &ctx.text[span.start..span.end];

        // Small sections never take the chunked path.
        if bounded.len() <= self.options.single_shot_threshold {
            let single = SingleShotExtractor::new(
                self.llm.clone(),
                self.options.single_shot_threshold,
                self.options.window_limit,
            );
            return single.extract_window(bounded, ctx.request).await;
        }

        let section = self.extract_bounded(bounded, ctx.request).await;
        if section.length < MIN_SECTION_LEN {
            // Located text is never discarded entirely; fall back to the raw
            // bounded span under the regex method.
            return Some(ExtractedSection::new(
                &ctx.request.section_name,
                bounded.to_string(),
                ExtractionMethod::Regex,
            ));
        }
        Some(section)
    }

    fn name(&self) -> &'static str {
        "llm_chunked"
    }
}

/// Paragraph-accumulation split: blank-line boundaries, packed up to
/// `max_len` per chunk. A single paragraph larger than `max_len` is
/// hard-split at character boundaries.
fn split_paragraph_chunks(text: &str, max_len: usize) -> Vec<String> {
    static PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n").unwrap());

    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in PARAGRAPH_BREAK.split(text) {
        if paragraph.trim().is_empty() {
            continue;
        }
        if paragraph.len() > max_len {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let mut rest = paragraph;
            while rest.len() > max_len {
                let cut = floor_char_boundary(rest, max_len);
                chunks.push(rest[..cut].to_string());
                rest = &rest[cut..];
            }
            if !rest.trim().is_empty() {
                chunks.push(rest.to_string());
            }
            continue;
        }
        if !current.is_empty() && current.len() + paragraph.len() + 2 > max_len {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn clean_prompt(chunk: &str) -> String {
    format!(
        "Clean and reformat this excerpt from an SEC filing. Keep all substantive \
         content verbatim and in order; remove only markup artifacts, page numbers, \
         and repeated page headers. Return the cleaned text and nothing else.\n\n{}{}",
        CHUNK_EXCERPT_MARKER, chunk
    )
}

/// Chunk validation is looser than the section contract: chunks are already
/// bounded, so a short-but-nonempty cleanup of a short chunk is fine. A
/// response under the warn threshold for a substantial input means the model
/// dropped content, so the raw chunk is kept instead.
fn validate_chunk(response: &str, original: &str) -> Option<String> {
    let floor = if original.len() >= MIN_SECTION_LEN {
        WARN_ACCEPT_LEN
    } else {
        1
    };
    validate_extraction(response, floor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor_with(llm: Arc<dyn LlmClient>) -> ChunkedExtractor {
        ChunkedExtractor::new(llm, ChunkedOptions::default())
    }

    struct NoopLlm;

    #[async_trait]
    impl LlmClient for NoopLlm {
        async fn complete(&self, request: CompletionRequest) -> Result<String, crate::llm::LlmError> {
            // Echo the excerpt back unchanged.
            let excerpt = request
                .prompt
                .split(CHUNK_EXCERPT_MARKER)
                .nth(1)
                .unwrap_or_default();
            Ok(excerpt.to_string())
        }
    }

    fn headed_section(headings: usize, body_len: usize) -> String {
        (0..headings)
            .map(|i| {
                format!(
                    "Risk Category {} Heading\n{}\n",
                    ["One", "Two", "Three", "Four", "Five", "Six", "Seven", "Eight", "Nine", "Ten"]
                        [i % 10],
                    format!("This risk could materially affect our business. {}", "x".repeat(body_len))
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn heading_split_produces_a_chunk_per_heading() {
        let text = headed_section(10, 19_000);
        assert!(text.len() >= 190_000);
        let extractor = extractor_with(Arc::new(NoopLlm));
        let chunks = extractor.split_chunks(&text);
        assert!(chunks.len() >= 10, "got {} chunks", chunks.len());
        // Nothing lost in the split.
        let total: usize = chunks.iter().map(String::len).sum();
        assert!(total >= text.len() * 95 / 100);
    }

    #[test]
    fn paragraph_split_packs_up_to_the_threshold() {
        let text = (0..40)
            .map(|i| format!("paragraph {} {}", i, "y".repeat(900)))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = split_paragraph_chunks(&text, 5_000);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 5_000);
        }
        let total: usize = chunks.iter().map(String::len).sum();
        assert!(total >= text.len() * 95 / 100);
    }

    #[test]
    fn giant_paragraph_is_hard_split_without_panicking() {
        let text = "z".repeat(40_000);
        let chunks = split_paragraph_chunks(&text, 15_000);
        assert_eq!(chunks.iter().map(String::len).sum::<usize>(), 40_000);
        assert!(chunks.len() >= 3);
    }

    #[tokio::test]
    async fn passthrough_reassembly_preserves_length_and_order() {
        let text = headed_section(10, 19_000);
        let request = SectionRequest::risk_factors();
        let extractor = extractor_with(Arc::new(NoopLlm));
        let section = extractor.extract_bounded(&text, &request).await;

        assert_eq!(section.method, ExtractionMethod::LlmChunked);
        assert_eq!(section.degraded_chunks, 0);
        assert!(section.chunk_count.unwrap_or(0) >= 10);

        // Within 5% of the input length under a no-op clean pass.
        let lower = text.len() * 95 / 100;
        let upper = text.len() * 105 / 100;
        assert!(
            section.length >= lower && section.length <= upper,
            "length {} outside [{}, {}]",
            section.length,
            lower,
            upper
        );

        // Paragraph order preserved.
        let one = section.text.find("Risk Category One").unwrap();
        let five = section.text.find("Risk Category Five").unwrap();
        let ten = section.text.find("Risk Category Ten").unwrap();
        assert!(one < five && five < ten);
    }

    #[tokio::test]
    async fn deterministic_extraction_is_idempotent() {
        let text = headed_section(6, 18_000);
        let request = SectionRequest::risk_factors();
        let extractor = extractor_with(Arc::new(NoopLlm));
        let first = extractor.extract_bounded(&text, &request).await;
        let second = extractor.extract_bounded(&text, &request).await;
        assert_eq!(first.text, second.text);
    }
}
