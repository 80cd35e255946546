use async_trait::async_trait;
use scraper::{Html, Selector};

use super::{ExtractedSection, ExtractionContext, ExtractionMethod, ExtractionTier};
use crate::edgar::section::MIN_SECTION_LEN;

/// DOM-walking fallback: accumulates the text of block elements between the
/// start-marker heading and the end-marker heading in the original markup.
/// Useful when text normalization mangled the boundaries but the document
/// structure still carries them.
pub struct DomExtractor;

// Block-level elements only. Inline tags (`font`, `b`, `span`) must not be
// selected themselves or their text would be accumulated twice: once through
// the enclosing block and once on their own.
const BLOCK_SELECTOR: &str = "p, div, h1, h2, h3, h4, h5, h6, td, li";

fn matches_marker(text: &str, marker: &str) -> bool {
    let haystack = text.trim().to_lowercase();
    let needle = marker.to_lowercase();
    if !haystack.starts_with(&needle) {
        return false;
    }
    // "Item 1" must not match an "Item 1A" heading.
    match haystack.as_bytes().get(needle.len()) {
        None => true,
        Some(next) => !next.is_ascii_alphanumeric(),
    }
}

fn extract_between_headings(html: &str, start_marker: &str, end_marker: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(BLOCK_SELECTOR).ok()?;

    let mut collected = String::new();
    let mut in_section = false;

    for element in document.select(&selector) {
        let own_text: String = element
            .text()
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        // Only treat short blocks as heading candidates; a div wrapping the
        // whole document also "starts with" the marker.
        let heading_candidate = own_text.len() < 120;

        if in_section && heading_candidate && matches_marker(&own_text, end_marker) {
            break;
        }
        if !in_section {
            if heading_candidate && matches_marker(&own_text, start_marker) {
                in_section = true;
                collected.push_str(&own_text);
                collected.push('\n');
            }
            continue;
        }
        // Leaf-ish accumulation: skip containers whose children will be
        // visited separately, so text is not duplicated.
        let has_block_children = element
            .children()
            .filter_map(scraper::ElementRef::wrap)
            .any(|child| {
                matches!(
                    child.value().name(),
                    "p" | "div" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "li" | "td"
                )
            });
        if has_block_children || own_text.is_empty() {
            continue;
        }
        collected.push_str(&own_text);
        collected.push('\n');
    }

    if in_section && !collected.trim().is_empty() {
        Some(collected.trim().to_string())
    } else {
        None
    }
}

#[async_trait]
impl ExtractionTier for DomExtractor {
    async fn extract(&self, ctx: &ExtractionContext<'_>) -> Option<ExtractedSection> {
        let html = ctx.html?;
        let text = extract_between_headings(html, &ctx.request.start_marker, &ctx.request.end_marker)?;
        if text.len() < MIN_SECTION_LEN {
            log::debug!(
                "DOM tier found only {} chars for '{}'",
                text.len(),
                ctx.request.section_name
            );
            return None;
        }
        Some(ExtractedSection::new(
            &ctx.request.section_name,
            text,
            ExtractionMethod::Dom,
        ))
    }

    fn name(&self) -> &'static str {
        "dom"
    }
}
