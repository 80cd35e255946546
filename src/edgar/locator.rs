use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

use super::fetch::{get_text, probe_exists};
use super::rate_limiter::RateLimiter;
use super::report::FilingType;
use super::tickers::{CikResolver, Ticker};
use crate::error::{EdgarError, Result};

pub const EDGAR_DATA_URL: &str = "https://data.sec.gov";
pub const EDGAR_ARCHIVES_URL: &str = "https://www.sec.gov/Archives";
pub const EDGAR_BROWSE_URL: &str = "https://www.sec.gov/cgi-bin/browse-edgar";

/// A fully resolved filing: everything a fetcher needs to download the
/// primary document. Immutable once resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilingReference {
    pub ticker: String,
    /// 10-digit zero-padded CIK.
    pub cik: String,
    pub filing_type: FilingType,
    pub accession_number: String,
    pub filing_date: NaiveDate,
    pub primary_document_url: String,
    /// True when document resolution fell all the way back to the index
    /// page itself; callers may still attempt best-effort text extraction.
    pub is_index_fallback: bool,
}

impl FilingReference {
    #[doc(hidden)]
    pub fn for_tests(ticker: &str) -> Self {
        FilingReference {
            ticker: ticker.to_string(),
            cik: "0000123456".to_string(),
            filing_type: FilingType::Form10K,
            accession_number: "0000123456-24-000001".to_string(),
            filing_date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap_or_default(),
            primary_document_url: "https://www.sec.gov/Archives/test.htm".to_string(),
            is_index_fallback: false,
        }
    }
}

/// One row of a filings feed, before document resolution. The JSON dialect
/// carries a primary-document name; the Atom dialect only an index href.
#[derive(Debug, Clone)]
pub struct FilingSummary {
    pub accession_number: String,
    pub filing_date: NaiveDate,
    pub form: String,
    pub primary_document: Option<String>,
    pub index_url: String,
}

// Submissions feed, JSON dialect: column-parallel vectors keyed by row index.
#[derive(Debug, Deserialize)]
struct SubmissionsResponse {
    filings: SubmissionFilings,
}

#[derive(Debug, Deserialize)]
struct SubmissionFilings {
    recent: RecentFilings,
}

#[derive(Debug, Deserialize)]
struct RecentFilings {
    #[serde(rename = "accessionNumber")]
    accession_number: Vec<String>,
    #[serde(rename = "filingDate")]
    filing_date: Vec<NaiveDate>,
    form: Vec<String>,
    #[serde(rename = "primaryDocument", default)]
    primary_document: Vec<String>,
}

/// Resolves ticker + filing type to concrete filing documents.
pub struct FilingLocator {
    client: Client,
    rate_limiter: Arc<RateLimiter>,
    resolver: Arc<CikResolver>,
    user_agent: String,
}

impl FilingLocator {
    pub fn new(
        client: Client,
        rate_limiter: Arc<RateLimiter>,
        resolver: Arc<CikResolver>,
        user_agent: impl Into<String>,
    ) -> Self {
        FilingLocator {
            client,
            rate_limiter,
            resolver,
            user_agent: user_agent.into(),
        }
    }

    /// Locates the most recent filing of `filing_type` (optionally pinned to
    /// a calendar year) and resolves its primary document URL.
    pub async fn locate(
        &self,
        ticker: &Ticker,
        filing_type: &FilingType,
        year: Option<i32>,
    ) -> Result<FilingReference> {
        let mut refs = self.locate_recent(ticker, filing_type, year, 1).await?;
        refs.pop()
            .ok_or_else(|| filing_not_found(ticker, filing_type, year))
    }

    /// Up to `limit` matching filings, newest first, each resolved to a
    /// document URL. Used for multi-year comparisons.
    pub async fn locate_recent(
        &self,
        ticker: &Ticker,
        filing_type: &FilingType,
        year: Option<i32>,
        limit: usize,
    ) -> Result<Vec<FilingReference>> {
        let cik = self.resolver.resolve(ticker, &self.rate_limiter).await?;
        if let Ok(Some(name)) = self.resolver.company_name(ticker, &self.rate_limiter).await {
            log::info!("{} is {} (CIK {})", ticker, name, cik);
        }
        let summaries = self.list_filings(&cik, filing_type).await?;
        let matched = select_recent(&summaries, filing_type, year, limit);

        let mut references = Vec::with_capacity(matched.len());
        for summary in matched {
            references.push(
                self.resolve_document(ticker, &cik, filing_type, summary)
                    .await?,
            );
        }
        Ok(references)
    }

    /// Fetches the filings feed, preferring the JSON submissions dialect and
    /// falling back to the legacy Atom browse feed when that fails.
    async fn list_filings(&self, cik: &str, filing_type: &FilingType) -> Result<Vec<FilingSummary>> {
        let url = format!("{}/submissions/CIK{}.json", EDGAR_DATA_URL, cik);
        log::info!("Fetching filings feed from {}", url);

        match get_text(&self.client, &self.rate_limiter, &self.user_agent, &url).await {
            Ok(body) => match parse_submissions_json(&body, cik) {
                Ok(summaries) => return Ok(summaries),
                Err(e) => log::warn!("Submissions JSON dialect failed ({}), trying Atom feed", e),
            },
            Err(e) => log::warn!("Submissions feed fetch failed ({}), trying Atom feed", e),
        }

        let atom_url = format!(
            "{}?action=getcompany&CIK={}&type={}&dateb=&owner=include&count=40&output=atom",
            EDGAR_BROWSE_URL, cik, filing_type
        );
        log::info!("Fetching legacy Atom feed from {}", atom_url);
        let body = get_text(&self.client, &self.rate_limiter, &self.user_agent, &atom_url).await?;
        parse_atom_feed(&body)
    }

    /// Resolves one feed row to a direct document URL (never an index page,
    /// unless every fallback is exhausted and the degraded flag is set).
    async fn resolve_document(
        &self,
        ticker: &Ticker,
        cik: &str,
        filing_type: &FilingType,
        summary: &FilingSummary,
    ) -> Result<FilingReference> {
        let folder = accession_folder_url(cik, &summary.accession_number);

        let make_ref = |url: String, degraded: bool| FilingReference {
            ticker: ticker.to_string(),
            cik: cik.to_string(),
            filing_type: filing_type.clone(),
            accession_number: summary.accession_number.clone(),
            filing_date: summary.filing_date,
            primary_document_url: url,
            is_index_fallback: degraded,
        };

        // Feed-provided primary document (JSON dialect only).
        if let Some(doc) = summary
            .primary_document
            .as_deref()
            .filter(|d| !d.is_empty() && !d.ends_with("-index.htm"))
        {
            let url = normalize_document_href(doc, &folder);
            return Ok(make_ref(url, false));
        }

        // Index-page document table scan.
        match get_text(
            &self.client,
            &self.rate_limiter,
            &self.user_agent,
            &summary.index_url,
        )
        .await
        {
            Ok(index_html) => {
                if let Some(url) = select_document_from_index(&index_html, filing_type, &folder) {
                    return Ok(make_ref(url, false));
                }
            }
            Err(e) => log::warn!("Index page fetch failed for {}: {}", summary.index_url, e),
        }

        // Filename guessing against the accession folder.
        for guess in filename_guesses(ticker, filing_type) {
            let candidate = format!("{}{}", folder, guess);
            if probe_exists(&self.client, &self.rate_limiter, &self.user_agent, &candidate).await {
                log::info!("Filename guess hit: {}", candidate);
                return Ok(make_ref(candidate, false));
            }
        }

        // Degraded: hand back the index page itself, flagged.
        log::warn!(
            "Could not resolve a document for {}; returning index page",
            summary.accession_number
        );
        Ok(make_ref(summary.index_url.clone(), true))
    }
}

/// Feed rows matching the requested type (and year, when pinned), newest
/// first, capped at `limit`.
fn select_recent<'a>(
    summaries: &'a [FilingSummary],
    filing_type: &FilingType,
    year: Option<i32>,
    limit: usize,
) -> Vec<&'a FilingSummary> {
    let mut matched: Vec<&FilingSummary> = summaries
        .iter()
        .filter(|s| filing_type.matches(&s.form))
        .filter(|s| year.map_or(true, |y| s.filing_date.year() == y))
        .collect();
    matched.sort_by(|a, b| b.filing_date.cmp(&a.filing_date));
    matched.truncate(limit);
    matched
}

fn filing_not_found(ticker: &Ticker, filing_type: &FilingType, year: Option<i32>) -> EdgarError {
    EdgarError::FilingNotFound {
        ticker: ticker.to_string(),
        filing_type: filing_type.to_string(),
        year,
    }
}

/// `.../edgar/data/{cik-without-padding}/{accession-without-dashes}/`
pub fn accession_folder_url(cik: &str, accession_number: &str) -> String {
    format!(
        "{}/edgar/data/{}/{}/",
        EDGAR_ARCHIVES_URL,
        cik.trim_start_matches('0'),
        accession_number.replace('-', "")
    )
}

fn index_page_url(cik: &str, accession_number: &str) -> String {
    format!(
        "{}{}-index.htm",
        accession_folder_url(cik, accession_number),
        accession_number
    )
}

fn parse_submissions_json(body: &str, cik: &str) -> Result<Vec<FilingSummary>> {
    let response: SubmissionsResponse = serde_json::from_str(body)
        .map_err(|e| EdgarError::InvalidInput(format!("submissions JSON: {}", e)))?;
    let recent = response.filings.recent;

    let mut summaries = Vec::with_capacity(recent.accession_number.len());
    for (i, accession) in recent.accession_number.iter().enumerate() {
        let (Some(date), Some(form)) = (recent.filing_date.get(i), recent.form.get(i)) else {
            continue;
        };
        summaries.push(FilingSummary {
            accession_number: accession.clone(),
            filing_date: *date,
            form: form.clone(),
            primary_document: recent.primary_document.get(i).cloned(),
            index_url: index_page_url(cik, accession),
        });
    }
    Ok(summaries)
}

static ATOM_ENTRY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<entry>(.*?)</entry>").unwrap());
// The legacy feed spells it "accession-nunber"; accept the correct spelling
// too in case it is ever fixed.
static ATOM_ACCESSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<accession-nu[nm]ber>([^<]+)</accession-nu[nm]ber>").unwrap());
static ATOM_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<filing-date>([^<]+)</filing-date>").unwrap());
static ATOM_TYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<filing-type>([^<]+)</filing-type>").unwrap());
static ATOM_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<filing-href>([^<]+)</filing-href>").unwrap());

/// Legacy browse feed, Atom dialect. Scanned with regexes rather than a full
/// XML stack: the feed is flat and the fields of interest are single-line.
fn parse_atom_feed(body: &str) -> Result<Vec<FilingSummary>> {
    let mut summaries = Vec::new();
    for entry in ATOM_ENTRY.captures_iter(body) {
        let block = &entry[1];
        let (Some(accession), Some(date), Some(form), Some(href)) = (
            ATOM_ACCESSION.captures(block).map(|c| c[1].to_string()),
            ATOM_DATE
                .captures(block)
                .and_then(|c| NaiveDate::parse_from_str(&c[1], "%Y-%m-%d").ok()),
            ATOM_TYPE.captures(block).map(|c| c[1].to_string()),
            ATOM_HREF.captures(block).map(|c| {
                html_escape::decode_html_entities(&c[1]).to_string()
            }),
        ) else {
            log::debug!("Skipping malformed Atom entry");
            continue;
        };
        summaries.push(FilingSummary {
            accession_number: accession,
            filing_date: date,
            form,
            primary_document: None,
            index_url: href,
        });
    }
    if summaries.is_empty() {
        return Err(EdgarError::InvalidInput(
            "Atom feed contained no parseable entries".to_string(),
        ));
    }
    Ok(summaries)
}

/// Scans an accession index page's document table for a row whose type cell
/// matches the requested filing type and whose link is a real document, not
/// another index page. Inline-viewer (`/ix?doc=`) links are normalized to
/// the underlying document path.
pub fn select_document_from_index(
    html: &str,
    filing_type: &FilingType,
    base_folder: &str,
) -> Option<String> {
    let document = Html::parse_document(html);
    let row_selector = Selector::parse("table tr").ok()?;
    let cell_selector = Selector::parse("td").ok()?;
    let link_selector = Selector::parse("a[href]").ok()?;

    for row in document.select(&row_selector) {
        let type_matches = row.select(&cell_selector).any(|cell| {
            let text = cell.text().collect::<String>();
            filing_type.matches(text.trim())
        });
        if !type_matches {
            continue;
        }

        for link in row.select(&link_selector) {
            let href = link.value().attr("href").unwrap_or_default();
            if href.is_empty() || href.ends_with("-index.htm") || href.ends_with("-index.html") {
                continue;
            }
            return Some(normalize_document_href(href, base_folder));
        }
    }
    None
}

/// Absolute URL for a document href from an index table or feed, unwrapping
/// the inline-XBRL viewer prefix when present.
pub fn normalize_document_href(href: &str, base_folder: &str) -> String {
    let href = match href.find("/ix?doc=") {
        Some(pos) => &href[pos + "/ix?doc=".len()..],
        None => href,
    };
    // `join` handles all three shapes the index pages use: absolute URLs,
    // host-relative "/Archives/..." paths, and bare filenames.
    match Url::parse(base_folder).and_then(|base| base.join(href)) {
        Ok(url) => url.into(),
        Err(e) => {
            log::warn!("Unresolvable document href '{}': {}", href, e);
            href.to_string()
        }
    }
}

/// Filename patterns filers commonly use for the primary document, probed
/// against the accession folder when the index table yields nothing.
fn filename_guesses(ticker: &Ticker, filing_type: &FilingType) -> Vec<String> {
    let t = ticker.as_str().to_lowercase();
    let compact = filing_type
        .to_string()
        .to_lowercase()
        .replace(['-', ' ', '/'], "");
    vec![
        format!("{}.htm", t),
        format!("{}-{}.htm", t, compact),
        format!("{}{}.htm", t, compact),
        format!("form{}.htm", compact),
        format!("form{}.htm", filing_type.to_string().to_lowercase().replace(' ', "")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOLDER: &str = "https://www.sec.gov/Archives/edgar/data/123456/000012345624000001/";

    #[test]
    fn accession_folder_drops_padding_and_dashes() {
        assert_eq!(
            accession_folder_url("0000123456", "0000123456-24-000001"),
            FOLDER
        );
    }

    #[test]
    fn index_scan_prefers_the_non_index_link() {
        let html = r#"
            <html><body><table class="tableFile">
              <tr><th>Seq</th><th>Description</th><th>Document</th><th>Type</th></tr>
              <tr>
                <td>1</td><td>Complete submission</td>
                <td><a href="0000123456-24-000001-index.htm">0000123456-24-000001-index.htm</a></td>
                <td>10-K</td>
              </tr>
              <tr>
                <td>2</td><td>Annual report</td>
                <td><a href="acme-20231231.htm">acme-20231231.htm</a></td>
                <td>10-K</td>
              </tr>
            </table></body></html>"#;
        let url = select_document_from_index(html, &FilingType::Form10K, FOLDER).expect("url");
        assert_eq!(url, format!("{}acme-20231231.htm", FOLDER));
    }

    #[test]
    fn index_scan_ignores_rows_of_other_types() {
        let html = r#"
            <table><tr>
              <td>1</td><td><a href="ex-99.htm">ex-99.htm</a></td><td>EX-99.1</td>
            </tr></table>"#;
        assert!(select_document_from_index(html, &FilingType::Form10K, FOLDER).is_none());
    }

    #[test]
    fn inline_viewer_links_are_unwrapped() {
        let href = "/ix?doc=/Archives/edgar/data/123456/000012345624000001/acme-20231231.htm";
        assert_eq!(
            normalize_document_href(href, FOLDER),
            "https://www.sec.gov/Archives/edgar/data/123456/000012345624000001/acme-20231231.htm"
        );
    }

    #[test]
    fn absolute_hrefs_pass_through_untouched() {
        let href = "https://www.sec.gov/Archives/edgar/data/999/000099924000002/other.htm";
        assert_eq!(normalize_document_href(href, FOLDER), href);
    }

    #[test]
    fn atom_feed_parses_including_the_historic_misspelling() {
        let feed = r#"
        <feed xmlns="http://www.w3.org/2005/Atom">
          <entry>
            <content type="text/xml">
              <accession-nunber>0000123456-24-000001</accession-nunber>
              <filing-date>2024-02-01</filing-date>
              <filing-href>https://www.sec.gov/Archives/edgar/data/123456/000012345624000001/0000123456-24-000001-index.htm</filing-href>
              <filing-type>10-K</filing-type>
            </content>
          </entry>
        </feed>"#;
        let summaries = parse_atom_feed(feed).unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].accession_number, "0000123456-24-000001");
        assert_eq!(summaries[0].form, "10-K");
        assert!(summaries[0].primary_document.is_none());
    }

    #[test]
    fn submissions_json_parses_column_parallel_rows() {
        let body = r#"{
            "filings": { "recent": {
                "accessionNumber": ["0000123456-24-000001", "0000123456-23-000009"],
                "filingDate": ["2024-02-01", "2023-02-03"],
                "form": ["10-K", "10-K"],
                "primaryDocument": ["acme-20231231.htm", "acme-20221231.htm"]
            }}
        }"#;
        let summaries = parse_submissions_json(body, "0000123456").unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(
            summaries[0].primary_document.as_deref(),
            Some("acme-20231231.htm")
        );
        assert!(summaries[0].index_url.ends_with("-index.htm"));
    }

    fn summary(form: &str, date: &str) -> FilingSummary {
        FilingSummary {
            accession_number: "0000123456-24-000001".to_string(),
            filing_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            form: form.to_string(),
            primary_document: None,
            index_url: String::new(),
        }
    }

    #[test]
    fn selection_filters_by_type_and_year_newest_first() {
        let summaries = vec![
            summary("10-Q", "2024-05-01"),
            summary("10-K", "2023-02-03"),
            summary("10-K", "2024-02-01"),
        ];
        let matched = select_recent(&summaries, &FilingType::Form10K, None, 10);
        assert_eq!(matched.len(), 2);
        assert!(matched[0].filing_date > matched[1].filing_date);

        let pinned = select_recent(&summaries, &FilingType::Form10K, Some(2023), 10);
        assert_eq!(pinned.len(), 1);
        assert_eq!(pinned[0].filing_date.year(), 2023);
    }

    #[test]
    fn missing_filing_is_a_typed_error() {
        let summaries = vec![summary("10-Q", "2024-05-01")];
        assert!(select_recent(&summaries, &FilingType::Form10K, None, 1).is_empty());

        let ticker = Ticker::new("ACME").unwrap();
        let err = filing_not_found(&ticker, &FilingType::Form10K, Some(2024));
        match err {
            EdgarError::FilingNotFound {
                ticker,
                filing_type,
                year,
            } => {
                assert_eq!(ticker, "ACME");
                assert_eq!(filing_type, "10-K");
                assert_eq!(year, Some(2024));
            }
            other => panic!("expected FilingNotFound, got {:?}", other),
        }
    }

    #[test]
    fn filename_guesses_cover_the_common_patterns() {
        let ticker = Ticker::new("ACME").unwrap();
        let guesses = filename_guesses(&ticker, &FilingType::Form10K);
        assert!(guesses.contains(&"acme.htm".to_string()));
        assert!(guesses.contains(&"acme-10k.htm".to_string()));
        assert!(guesses.contains(&"form10k.htm".to_string()));
    }
}
