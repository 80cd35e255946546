use anyhow::Result;
use colored::*;
use edgar_sections::{
    analysis::KeywordSet,
    core::ExtractorConfig,
    llm::{OpenAiClient, OpenAiConfig},
    ExtractionPipeline, FilingType, SectionRequest,
};
use std::str::FromStr;
use std::sync::Arc;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "edgar-sections",
    about = "Extract and analyze sections of SEC filings"
)]
enum Command {
    /// Extract one section from the latest filing of the given type
    Extract {
        /// Ticker symbol, e.g. AAPL
        ticker: String,
        /// Filing type, e.g. 10-K, 10-Q, DEF 14A
        #[structopt(long, default_value = "10-K")]
        filing_type: String,
        /// Section start marker, e.g. "Item 1A"
        #[structopt(long, default_value = "Item 1A")]
        section: String,
        /// Section end marker; inferred for the common items (1, 1A, 7, 7A)
        #[structopt(long)]
        end: Option<String>,
        /// Restrict to filings with this filing year
        #[structopt(long)]
        year: Option<i32>,
    },
    /// Multi-year risk factor extraction with year-over-year comparison
    RiskHistory {
        ticker: String,
        /// Number of annual filings to cover
        #[structopt(long, default_value = "3")]
        years: usize,
    },
    /// Keyword-context mining over the latest filing's full text
    Mine {
        ticker: String,
        /// Keyword set: debt-covenants, related-party, off-balance-sheet
        #[structopt(long, default_value = "debt-covenants")]
        keyword_set: String,
        #[structopt(long, default_value = "10-K")]
        filing_type: String,
        /// Context window in characters on each side of a match
        #[structopt(long, default_value = "300")]
        window: usize,
    },
}

/// EDGAR accepts arbitrary form strings, so unrecognized types pass through
/// with a note listing the forms this tool knows well.
fn parse_filing_type(raw: &str) -> Result<FilingType> {
    let filing_type =
        FilingType::from_str(raw).map_err(|e| anyhow::anyhow!("bad filing type: {}", e))?;
    if let FilingType::Other(ref form) = filing_type {
        eprintln!(
            "{} unrecognized form '{}'; known types: {}",
            "Note:".yellow().bold(),
            form,
            FilingType::list_types()
        );
    }
    Ok(filing_type)
}

/// Builds the section request, inferring the end marker for the common
/// 10-K items when `--end` is omitted.
fn build_request(section: &str, end: Option<&str>) -> Result<SectionRequest> {
    if let Some(end) = end {
        return Ok(SectionRequest::new(section, end, section));
    }
    let preset = match section.trim().to_uppercase().as_str() {
        "ITEM 1" => SectionRequest::business(),
        "ITEM 1A" => SectionRequest::risk_factors(),
        "ITEM 7" => SectionRequest::mda(),
        "ITEM 7A" => SectionRequest::market_risk(),
        other => anyhow::bail!("--end is required for section '{}'", other),
    };
    Ok(preset)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let command = Command::from_args();
    let config = ExtractorConfig::from_env()?;

    let llm = Arc::new(OpenAiClient::new(
        OpenAiConfig::new(&config.openai_api_key, &config.openai_model)
            .with_api_base(&config.openai_api_base),
    )?);
    let pipeline = ExtractionPipeline::new(config, llm);

    match command {
        Command::Extract {
            ticker,
            filing_type,
            section,
            end,
            year,
        } => {
            let filing_type = parse_filing_type(&filing_type)?;
            let request = build_request(&section, end.as_deref())?;
            let result = pipeline
                .extract_section(&ticker, &filing_type, &request, year)
                .await?;
            eprintln!(
                "{} {} via {:?} ({} chars)",
                "Extracted".green().bold(),
                result.section.section_name,
                result.section.method,
                result.section.length
            );
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::RiskHistory { ticker, years } => {
            let history = pipeline.risk_factor_history(&ticker, years).await?;
            if history.reduced_scope {
                eprintln!(
                    "{}",
                    "Scope reduced to 1 year after timeout".yellow().bold()
                );
            }
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
        Command::Mine {
            ticker,
            keyword_set,
            filing_type,
            window,
        } => {
            let set = KeywordSet::from_str(&keyword_set)
                .map_err(|e| anyhow::anyhow!(e))?;
            let filing_type = parse_filing_type(&filing_type)?;
            let reference = pipeline.locate(&ticker, &filing_type, None).await?;
            let raw = pipeline.fetch(&reference).await?;
            let hits = pipeline.mine(&raw, set, window);
            eprintln!(
                "{} {} matches in {}",
                "Found".green().bold(),
                hits.len(),
                reference.primary_document_url
            );
            println!("{}", serde_json::to_string_pretty(&hits)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_markers_are_inferred_for_common_items() {
        assert_eq!(build_request("Item 1A", None).unwrap(), SectionRequest::risk_factors());
        assert_eq!(build_request("item 7", None).unwrap(), SectionRequest::mda());
        assert_eq!(build_request("Item 7A", None).unwrap(), SectionRequest::market_risk());
        assert_eq!(build_request("Item 1", None).unwrap(), SectionRequest::business());
    }

    #[test]
    fn explicit_end_marker_wins() {
        let request = build_request("Item 2", Some("Item 3")).unwrap();
        assert_eq!(request.start_marker, "Item 2");
        assert_eq!(request.end_marker, "Item 3");
    }

    #[test]
    fn uncommon_section_without_end_is_an_error() {
        assert!(build_request("Item 15", None).is_err());
    }
}
