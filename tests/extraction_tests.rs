use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use edgar_sections::analysis::KeywordSet;
use edgar_sections::core::ExtractorConfig;
use edgar_sections::edgar::fetch::RawFiling;
use edgar_sections::edgar::locator::FilingReference;
use edgar_sections::edgar::section::find_boundaries;
use edgar_sections::edgar::tickers::CikResolver;
use edgar_sections::edgar::RateLimiter;
use edgar_sections::extract::chunked::{ChunkedExtractor, ChunkedOptions, CHUNK_EXCERPT_MARKER};
use edgar_sections::extract::single_shot::SECTION_NOT_FOUND;
use edgar_sections::llm::{CompletionRequest, LlmClient, LlmError};
use edgar_sections::{
    EdgarError, ExtractionMethod, ExtractionPipeline, FilingType, SectionRequest, Ticker,
};

const SINGLE_SHOT_MARKER: &str = "FILING TEXT:\n";

/// Echoes chunk excerpts unchanged; answers single-shot extraction prompts
/// by running the same boundary search a deterministic model would.
struct HonestMock;

#[async_trait]
impl LlmClient for HonestMock {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        assert_eq!(request.temperature, 0.0);
        if let Some(excerpt) = request.prompt.split(CHUNK_EXCERPT_MARKER).nth(1) {
            return Ok(excerpt.to_string());
        }
        if let Some(window) = request.prompt.split(SINGLE_SHOT_MARKER).nth(1) {
            // Recover the requested markers from the instruction text, the
            // way a deterministic model would read them.
            let marker_re = regex::Regex::new(r#"(?s)heading "([^"]+)".*?including "([^"]+)""#).unwrap();
            let Some(caps) = marker_re.captures(&request.prompt) else {
                return Ok(SECTION_NOT_FOUND.to_string());
            };
            let req = SectionRequest::new(&caps[1], &caps[2], &caps[1]);
            return Ok(match find_boundaries(window, &req) {
                Some(span) => window[span.start..span.end].to_string(),
                None => SECTION_NOT_FOUND.to_string(),
            });
        }
        Ok(SECTION_NOT_FOUND.to_string())
    }
}

/// Always reports the sentinel, forcing the cascade past the LLM tiers.
struct SentinelMock;

#[async_trait]
impl LlmClient for SentinelMock {
    async fn complete(&self, _request: CompletionRequest) -> Result<String, LlmError> {
        Ok(SECTION_NOT_FOUND.to_string())
    }
}

/// Passthrough that raises for one specific chunk.
struct FailOneChunkMock {
    poison: String,
}

#[async_trait]
impl LlmClient for FailOneChunkMock {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let excerpt = request
            .prompt
            .split(CHUNK_EXCERPT_MARKER)
            .nth(1)
            .unwrap_or_default();
        if excerpt.contains(&self.poison) {
            return Err(LlmError::EmptyCompletion);
        }
        Ok(excerpt.to_string())
    }
}

/// Never completes within a short per-chunk timeout.
struct SlowMock;

#[async_trait]
impl LlmClient for SlowMock {
    async fn complete(&self, _request: CompletionRequest) -> Result<String, LlmError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(String::new())
    }
}

fn acme_pipeline(llm: Arc<dyn LlmClient>) -> ExtractionPipeline {
    let resolver = Arc::new(CikResolver::with_static(&[(
        "ACME",
        "123456",
        "Acme Corporation",
    )]));
    ExtractionPipeline::with_resolver(ExtractorConfig::offline(), llm, resolver)
}

fn acme_reference(cik: &str) -> FilingReference {
    FilingReference {
        ticker: "ACME".to_string(),
        cik: cik.to_string(),
        filing_type: FilingType::Form10K,
        accession_number: "0000123456-24-000001".to_string(),
        filing_date: chrono::NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
        primary_document_url:
            "https://www.sec.gov/Archives/edgar/data/123456/000012345624000001/acme.htm"
                .to_string(),
        is_index_fallback: false,
    }
}

fn risk_category_section(categories: usize, body_len: usize) -> String {
    (0..categories)
        .map(|i| {
            format!(
                "Risks Related To Segment {}\nA risk we monitor closely. {}\n",
                ["One", "Two", "Three", "Four", "Five", "Six", "Seven", "Eight", "Nine", "Ten"]
                    [i % 10],
                "x".repeat(body_len)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[tokio::test]
async fn end_to_end_acme_risk_factors() {
    let pipeline = acme_pipeline(Arc::new(HonestMock));

    // Mocked CIK resolution: ACME -> zero-padded 0000123456.
    let resolver = CikResolver::with_static(&[("ACME", "123456", "Acme Corporation")]);
    let limiter = RateLimiter::default();
    let ticker = Ticker::new("ACME").unwrap();
    let cik = resolver.resolve(&ticker, &limiter).await.unwrap();
    assert_eq!(cik, "0000123456");

    let content = format!(
        "Item 1A. Risk Factors\n{}\nItem 1B. Unresolved Staff Comments",
        "X".repeat(2000)
    );
    let raw = RawFiling::from_content(acme_reference(&cik), &content);

    let section = pipeline
        .extract_from_filing(&raw, &SectionRequest::risk_factors())
        .await
        .unwrap();

    assert_eq!(section.section_name, "Item 1A");
    assert!(section.length >= 2000, "length {}", section.length);
    assert!(section.text.contains(&"X".repeat(2000)));
}

#[tokio::test]
async fn small_section_is_never_chunked() {
    let pipeline = acme_pipeline(Arc::new(HonestMock));
    let content = format!(
        "Item 1A. Risk Factors\n{}\nItem 1B. Unresolved Staff Comments",
        "X".repeat(5_000)
    );
    let raw = RawFiling::from_content(acme_reference("0000123456"), &content);

    let section = pipeline
        .extract_from_filing(&raw, &SectionRequest::risk_factors())
        .await
        .unwrap();

    assert_ne!(section.method, ExtractionMethod::LlmChunked);
    assert_eq!(section.method, ExtractionMethod::LlmSingle);
}

#[tokio::test]
async fn sentinel_llm_falls_back_to_regex_tier() {
    let pipeline = acme_pipeline(Arc::new(SentinelMock));
    let content = format!(
        "Item 1A. Risk Factors\n{}\nItem 1B. Unresolved Staff Comments",
        "X".repeat(2_000)
    );
    let raw = RawFiling::from_content(acme_reference("0000123456"), &content);

    let section = pipeline
        .extract_from_filing(&raw, &SectionRequest::risk_factors())
        .await
        .unwrap();

    assert_eq!(section.method, ExtractionMethod::Regex);
    assert!(section.length >= 2_000);
}

#[tokio::test]
async fn failed_chunk_keeps_its_raw_text() {
    let poison = "Risks Related To Segment Three";
    let extractor = ChunkedExtractor::new(
        Arc::new(FailOneChunkMock {
            poison: poison.to_string(),
        }),
        ChunkedOptions::default(),
    );

    let text = risk_category_section(10, 19_000);
    let section = extractor
        .extract_bounded(&text, &SectionRequest::risk_factors())
        .await;

    // The failing chunk's original content is substituted, never dropped.
    assert!(section.text.contains(poison));
    assert!(section.degraded_chunks >= 1);
    assert_eq!(section.method, ExtractionMethod::LlmChunked);

    let lower = text.len() * 95 / 100;
    assert!(section.length >= lower, "content was dropped");
}

#[tokio::test]
async fn timed_out_chunks_degrade_without_failing_the_call() {
    let options = ChunkedOptions {
        chunk_timeout: Duration::from_millis(50),
        ..ChunkedOptions::default()
    };
    let extractor = ChunkedExtractor::new(Arc::new(SlowMock), options);

    let text = risk_category_section(4, 18_000);
    let section = extractor
        .extract_bounded(&text, &SectionRequest::risk_factors())
        .await;

    // Every chunk times out; the in-flight calls are abandoned rather than
    // cancelled, and the assembled output is the complete raw text.
    assert_eq!(section.degraded_chunks, section.chunk_count.unwrap());
    assert!(section.length >= text.len() * 95 / 100);
}

#[tokio::test]
async fn one_failed_section_does_not_abort_others() {
    let pipeline = acme_pipeline(Arc::new(HonestMock));
    let content = format!(
        "Item 1A. Risk Factors\n{}\nItem 1B. Unresolved Staff Comments\nNone.",
        "X".repeat(2_000)
    );
    let raw = RawFiling::from_content(acme_reference("0000123456"), &content);

    let ok = pipeline
        .extract_from_filing(&raw, &SectionRequest::risk_factors())
        .await;
    let missing = pipeline
        .extract_from_filing(&raw, &SectionRequest::mda())
        .await;

    assert!(ok.is_ok());
    match missing {
        Err(EdgarError::SectionNotFound(name)) => assert_eq!(name, "Item 7"),
        other => panic!("expected SectionNotFound, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn keyword_mining_over_a_filing() {
    let pipeline = acme_pipeline(Arc::new(HonestMock));
    let content = format!(
        "Item 8. Financial Statements\n{}\nThe credit agreement includes a leverage ratio \
         covenant measured quarterly.\n{}",
        "y".repeat(600),
        "z".repeat(600)
    );
    let raw = RawFiling::from_content(acme_reference("0000123456"), &content);

    let hits = pipeline.mine(&raw, KeywordSet::DebtCovenants, 80);
    assert!(hits.iter().any(|h| h.keyword == "covenant"));
    assert!(hits.iter().any(|h| h.keyword == "leverage ratio"));
    assert!(hits
        .iter()
        .all(|h| h.context.contains(&h.keyword.to_lowercase()) || !h.context.is_empty()));
}

#[tokio::test]
async fn unknown_ticker_surfaces_before_any_extraction() {
    let pipeline = acme_pipeline(Arc::new(HonestMock));
    let result = pipeline
        .locate("ZZZTOP", &FilingType::Form10K, None)
        .await;
    match result {
        Err(EdgarError::UnknownTicker(t)) => assert_eq!(t, "ZZZTOP"),
        other => panic!("expected UnknownTicker, got {:?}", other.map(|_| ())),
    }
}
