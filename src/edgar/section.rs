use regex::Regex;
use serde::{Deserialize, Serialize};

/// A request to extract one named section bounded by two item markers.
/// Stateless value object; construct ad hoc or via the presets below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRequest {
    pub start_marker: String,
    pub end_marker: String,
    pub section_name: String,
}

impl SectionRequest {
    pub fn new(
        start_marker: impl Into<String>,
        end_marker: impl Into<String>,
        section_name: impl Into<String>,
    ) -> Self {
        SectionRequest {
            start_marker: start_marker.into(),
            end_marker: end_marker.into(),
            section_name: section_name.into(),
        }
    }

    /// Item 1A "Risk Factors", ending at Item 1B.
    pub fn risk_factors() -> Self {
        Self::new("Item 1A", "Item 1B", "Item 1A")
    }

    /// Item 7 "Management's Discussion and Analysis", ending at Item 7A.
    pub fn mda() -> Self {
        Self::new("Item 7", "Item 7A", "Item 7")
    }

    /// Item 7A "Quantitative and Qualitative Disclosures", ending at Item 8.
    pub fn market_risk() -> Self {
        Self::new("Item 7A", "Item 8", "Item 7A")
    }

    /// Item 1 "Business", ending at Item 1A.
    pub fn business() -> Self {
        Self::new("Item 1", "Item 1A", "Item 1")
    }
}

/// Byte span of a located section within normalized filing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionSpan {
    pub start: usize,
    pub end: usize,
}

impl SectionSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Minimum size for a span to count as a real section hit. Anything shorter
/// is a table-of-contents entry or a cross-reference, not the section body.
pub const MIN_SECTION_LEN: usize = 500;

/// A start-marker match this close to the end marker is a TOC line; keep
/// scanning past it.
const TOC_PROXIMITY: usize = 200;

/// One entry in the declarative marker-pattern table. `template` contains a
/// `{m}` placeholder that is substituted with the escaped marker text.
/// New filing-format variants are added here as data, not code.
struct SectionPattern {
    template: &'static str,
    priority: u8,
    description: &'static str,
}

/// Ordered by priority: line-anchored heading forms first, bare in-line
/// occurrence last. All are case-insensitive, so "ITEM 1A." and "Item 1A:"
/// both hit, and tolerate punctuation variants after the item number.
const SECTION_PATTERNS: &[SectionPattern] = &[
    SectionPattern {
        template: r"(?im)^[\s>*]*({m})\s*[.:\-–—]",
        priority: 1,
        description: "line-anchored heading with trailing punctuation",
    },
    SectionPattern {
        template: r"(?im)^[\s>*]*({m})\s+[A-Z]",
        priority: 2,
        description: "line-anchored heading followed by a title",
    },
    SectionPattern {
        template: r"(?i)({m})\s*[.:\-–—]",
        priority: 3,
        description: "in-line marker with punctuation",
    },
    SectionPattern {
        template: r"(?i)({m})\b",
        priority: 4,
        description: "bare marker",
    },
];

/// Turns "Item 1A" into a regex fragment tolerant of whitespace runs between
/// the word and the number.
fn marker_fragment(marker: &str) -> String {
    marker
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+")
}

/// Locates the start/end offsets of the section bounded by the request's
/// markers. Patterns are tried in priority order; the first match producing
/// a span of at least `MIN_SECTION_LEN` wins. Returns `None` when no pattern
/// qualifies, in which case the caller proceeds to DOM or LLM search.
pub fn find_boundaries(text: &str, request: &SectionRequest) -> Option<SectionSpan> {
    let start_fragment = marker_fragment(&request.start_marker);
    let end_fragment = marker_fragment(&request.end_marker);

    for pattern in SECTION_PATTERNS {
        let source = pattern.template.replace("{m}", &start_fragment);
        let Ok(start_re) = Regex::new(&source) else {
            log::warn!("Unbuildable section pattern: {}", source);
            continue;
        };
        // End marker matched leniently: any heading-ish occurrence ends the
        // section, whatever format the filer chose for it.
        let end_re = Regex::new(&format!(r"(?i){}\s*[.:\-–—\s]", end_fragment)).ok()?;

        for caps in start_re.captures_iter(text) {
            // The line-anchored templates can match leading whitespace before
            // the heading; the span must begin at the marker itself.
            let Some(marker) = caps.get(1) else { continue };
            let body_start = marker.start();
            let after_start = caps.get(0).map(|m| m.end()).unwrap_or(marker.end());

            let end_offset = end_re
                .find(&text[after_start..])
                .map(|m| after_start + m.start())
                .unwrap_or(text.len());

            // A start hit whose end marker sits within a couple hundred
            // characters is a table-of-contents row, not the section body.
            if end_offset.saturating_sub(body_start) < TOC_PROXIMITY {
                continue;
            }

            let span = SectionSpan {
                start: body_start,
                end: end_offset,
            };
            if span.len() >= MIN_SECTION_LEN {
                log::debug!(
                    "Boundary hit for '{}' via pattern {} ({}): {} chars",
                    request.start_marker,
                    pattern.priority,
                    pattern.description,
                    span.len()
                );
                return Some(span);
            }
        }
    }

    None
}

/// Bounded window around a detected section start, for handing to an LLM
/// extraction call instead of the whole filing. Includes a little context
/// before the boundary so the model sees the preceding heading structure.
pub fn context_window(text: &str, span: SectionSpan, max_len: usize) -> &str {
    const PRE_CONTEXT: usize = 2_000;
    let from = floor_char_boundary(text, span.start.saturating_sub(PRE_CONTEXT));
    let to = floor_char_boundary(text, (from + max_len).min(text.len()));
    &text[from..to]
}

/// Largest index `<= at` that falls on a char boundary. Filing text is mostly
/// ASCII but stray multibyte punctuation must not panic a slice.
pub fn floor_char_boundary(text: &str, at: usize) -> usize {
    if at >= text.len() {
        return text.len();
    }
    let mut idx = at;
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
