//! Derived, read-only aggregates over extracted sections. Nothing here
//! mutates an `ExtractedSection`.

pub mod footnotes;
pub mod mda;
pub mod risk;

pub use footnotes::{find_keyword_contexts, KeywordContext, KeywordSet};
pub use mda::{MdaAnalysis, SentimentLabel};
pub use risk::{RiskAnalysis, YearOverYearComparison};
