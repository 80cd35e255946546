use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::rate_limiter::RateLimiter;
use crate::error::{EdgarError, Result};

const TICKER_URL: &str = "https://www.sec.gov/files/company_tickers.json";

/// Uppercase ASCII ticker symbol, validated at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ticker(String);

impl Ticker {
    pub fn new(ticker: impl Into<String>) -> Result<Self> {
        let uppercase = ticker.into().trim().to_uppercase();
        if uppercase.is_empty() {
            return Err(EdgarError::InvalidInput("ticker cannot be empty".into()));
        }
        if !uppercase
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        {
            return Err(EdgarError::InvalidInput(format!(
                "ticker must contain only alphanumeric characters, hyphens or dots: {}",
                uppercase
            )));
        }
        Ok(Ticker(uppercase))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Ticker {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
struct TickerMaps {
    ticker_to_cik: HashMap<String, (String, String)>, // Ticker -> (CIK, Name)
}

/// Resolves tickers to 10-digit zero-padded CIKs.
///
/// The company-ticker directory is fetched once and cached for the process
/// lifetime. The cache lives inside the resolver (not a module global) so
/// tests can construct a resolver preloaded with fixture data.
pub struct CikResolver {
    client: Client,
    user_agent: String,
    maps: RwLock<Option<Arc<TickerMaps>>>,
}

impl CikResolver {
    pub fn new(client: Client, user_agent: impl Into<String>) -> Self {
        CikResolver {
            client,
            user_agent: user_agent.into(),
            maps: RwLock::new(None),
        }
    }

    /// Resolver preloaded with `(ticker, cik, name)` entries; never touches
    /// the network.
    pub fn with_static(entries: &[(&str, &str, &str)]) -> Self {
        let mut ticker_to_cik = HashMap::new();
        for (ticker, cik, name) in entries {
            ticker_to_cik.insert(
                ticker.to_uppercase(),
                (format!("{:0>10}", cik), name.to_string()),
            );
        }
        CikResolver {
            client: Client::new(),
            user_agent: String::new(),
            maps: RwLock::new(Some(Arc::new(TickerMaps { ticker_to_cik }))),
        }
    }

    /// Ticker -> zero-padded CIK. `UnknownTicker` when the directory has no
    /// exact (case-insensitive) match.
    pub async fn resolve(&self, ticker: &Ticker, rate_limiter: &RateLimiter) -> Result<String> {
        let maps = self.ticker_maps(rate_limiter).await?;
        maps.ticker_to_cik
            .get(ticker.as_str())
            .map(|(cik, _)| cik.clone())
            .ok_or_else(|| EdgarError::UnknownTicker(ticker.to_string()))
    }

    pub async fn company_name(
        &self,
        ticker: &Ticker,
        rate_limiter: &RateLimiter,
    ) -> Result<Option<String>> {
        let maps = self.ticker_maps(rate_limiter).await?;
        Ok(maps
            .ticker_to_cik
            .get(ticker.as_str())
            .map(|(_, name)| name.clone()))
    }

    async fn ticker_maps(&self, rate_limiter: &RateLimiter) -> Result<Arc<TickerMaps>> {
        if let Some(cached) = self.maps.read().await.as_ref() {
            return Ok(cached.clone());
        }

        let mut write_guard = self.maps.write().await;
        // Another task may have filled the cache while we waited.
        if write_guard.is_none() {
            log::debug!("Fetching company ticker directory from {}", TICKER_URL);
            rate_limiter.acquire().await;

            let response = self
                .client
                .get(TICKER_URL)
                .header(reqwest::header::USER_AGENT, &self.user_agent)
                .send()
                .await
                .map_err(|e| EdgarError::fetch(TICKER_URL, e))?;

            if !response.status().is_success() {
                return Err(EdgarError::fetch(
                    TICKER_URL,
                    format!("HTTP {}", response.status()),
                ));
            }

            let json: HashMap<String, Value> = response
                .json()
                .await
                .map_err(|e| EdgarError::fetch(TICKER_URL, e))?;
            log::debug!("Loaded {} ticker entries", json.len());

            let mut ticker_to_cik = HashMap::new();
            for entry in json.values() {
                let (Some(ticker), Some(name), Some(cik)) = (
                    entry["ticker"].as_str(),
                    entry["title"].as_str(),
                    entry["cik_str"].as_u64(),
                ) else {
                    continue;
                };
                ticker_to_cik.insert(
                    ticker.trim().to_uppercase(),
                    (format!("{:010}", cik), name.to_string()),
                );
            }

            *write_guard = Some(Arc::new(TickerMaps { ticker_to_cik }));
        }

        Ok(write_guard.as_ref().cloned().unwrap_or_else(|| {
            // Unreachable: branch above always fills the cache.
            Arc::new(TickerMaps {
                ticker_to_cik: HashMap::new(),
            })
        }))
    }
}
