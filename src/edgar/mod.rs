pub mod fetch;
pub mod locator;
pub mod rate_limiter;
pub mod report;
pub mod section;
pub mod tickers;

pub use fetch::RawFiling;
pub use locator::{FilingLocator, FilingReference};
pub use rate_limiter::RateLimiter;
pub use report::FilingType;
pub use section::{SectionRequest, SectionSpan};
pub use tickers::{CikResolver, Ticker};
