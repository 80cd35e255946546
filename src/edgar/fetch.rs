use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, StatusCode};
use scraper::{Html, Node};
use serde::Serialize;
use std::time::Duration;

use super::locator::FilingReference;
use super::rate_limiter::RateLimiter;
use crate::error::{EdgarError, Result};

/// 429 handling: the fixed inter-request delay covers the normal path, but
/// Too-Many-Requests gets an explicit exponential backoff instead of being
/// silently ignored.
const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// A filing document reduced to normalized text. Owned by the extraction
/// call that requested it; nothing here is cached or shared.
#[derive(Debug, Clone, Serialize)]
pub struct RawFiling {
    pub reference: FilingReference,
    pub text: String,
    pub text_length: usize,
    /// Original markup, kept for the DOM extraction tier.
    #[serde(skip)]
    pub html: Option<String>,
    pub retrieved_at: DateTime<Utc>,
}

impl RawFiling {
    /// Builds a filing from already-downloaded content. Used by tests and by
    /// callers that source documents outside the fetcher.
    pub fn from_content(reference: FilingReference, content: &str) -> Self {
        let looks_like_html = content.contains('<');
        let text = if looks_like_html {
            html_to_text(content)
        } else {
            content.to_string()
        };
        RawFiling {
            reference,
            text_length: text.len(),
            text,
            html: looks_like_html.then(|| content.to_string()),
            retrieved_at: Utc::now(),
        }
    }
}

/// Downloads the resolved document and strips it to normalized text.
pub async fn fetch_filing(
    client: &Client,
    rate_limiter: &RateLimiter,
    user_agent: &str,
    reference: &FilingReference,
) -> Result<RawFiling> {
    let body = get_text(client, rate_limiter, user_agent, &reference.primary_document_url).await?;
    log::info!(
        "Fetched {} ({} bytes) for {}",
        reference.primary_document_url,
        body.len(),
        reference.ticker
    );
    Ok(RawFiling::from_content(reference.clone(), &body))
}

/// Rate-limited GET returning the response body. Non-200 responses surface
/// as `FetchError`; only 429 is retried, with exponential backoff.
pub async fn get_text(
    client: &Client,
    rate_limiter: &RateLimiter,
    user_agent: &str,
    url: &str,
) -> Result<String> {
    let mut backoff = BACKOFF_BASE;
    for attempt in 1..=MAX_ATTEMPTS {
        rate_limiter.acquire().await;
        log::debug!("GET {} (attempt {})", url, attempt);

        let response = client
            .get(url)
            .header(reqwest::header::USER_AGENT, user_agent)
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xml,text/plain,*/*",
            )
            .header(reqwest::header::ACCEPT_ENCODING, "gzip, deflate")
            .send()
            .await
            .map_err(|e| EdgarError::fetch(url, e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            if attempt == MAX_ATTEMPTS {
                return Err(EdgarError::fetch(url, "HTTP 429 after retries"));
            }
            log::warn!("429 from {}, backing off {:?}", url, backoff);
            tokio::time::sleep(backoff).await;
            backoff *= 2;
            continue;
        }
        if !status.is_success() {
            return Err(EdgarError::fetch(url, format!("HTTP {}", status)));
        }

        return response.text().await.map_err(|e| EdgarError::fetch(url, e));
    }
    Err(EdgarError::fetch(url, "HTTP 429 after retries"))
}

/// Lightweight existence probe used by the locator's filename guessing.
/// HEAD-equivalent: no body is read.
pub async fn probe_exists(
    client: &Client,
    rate_limiter: &RateLimiter,
    user_agent: &str,
    url: &str,
) -> bool {
    rate_limiter.acquire().await;
    match client
        .head(url)
        .header(reqwest::header::USER_AGENT, user_agent)
        .send()
        .await
    {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            log::debug!("HEAD {} failed: {}", url, e);
            false
        }
    }
}

/// Elements whose boundaries separate paragraphs/headings in the normalized
/// text. Newlines here are what the section chunker later splits on.
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "br", "tr", "table", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6",
    "section", "article", "blockquote", "hr",
];

static MULTI_BLANK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n[\s]*\n+").unwrap());
static TRAILING_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+\n").unwrap());
static SPACE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\u{a0}]{2,}").unwrap());

/// Converts filing markup to text, preserving block-level boundaries as
/// newlines so heading/paragraph structure survives for boundary finding
/// and chunking.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::with_capacity(html.len() / 2);

    // Depth-first walk; the `leaving` flag closes a block element with a
    // newline after its children have been emitted.
    let mut stack = vec![(document.tree.root(), false)];
    while let Some((node, leaving)) = stack.pop() {
        if leaving {
            if !out.ends_with('\n') {
                out.push('\n');
            }
            continue;
        }
        match node.value() {
            Node::Text(text) => {
                // html5ever has already decoded entities in text nodes;
                // normalize non-breaking spaces so regexes see plain spaces.
                out.push_str(&text.replace('\u{a0}', " "));
            }
            Node::Element(element) => {
                let name = element.name();
                if name == "script" || name == "style" || name == "head" {
                    continue;
                }
                if BLOCK_ELEMENTS.contains(&name) {
                    if !out.ends_with('\n') {
                        out.push('\n');
                    }
                    stack.push((node, true));
                }
                let children: Vec<_> = node.children().collect();
                for child in children.into_iter().rev() {
                    stack.push((child, false));
                }
            }
            _ => {
                let children: Vec<_> = node.children().collect();
                for child in children.into_iter().rev() {
                    stack.push((child, false));
                }
            }
        }
    }

    let out = TRAILING_WS.replace_all(&out, "\n");
    let out = SPACE_RUNS.replace_all(&out, " ");
    let out = MULTI_BLANK.replace_all(&out, "\n\n");
    out.trim().to_string()
}
