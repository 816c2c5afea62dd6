//! Reference membership lists for the candidate pool.

use std::time::Duration;

use async_trait::async_trait;
use capindex_market_data::Symbol;
use log::debug;
use scraper::{Html, Selector};

use crate::errors::{Error, Result};

const SP500_CONSTITUENTS_URL: &str = "https://en.wikipedia.org/wiki/List_of_S%26P_500_companies";
const USER_AGENT: &str = "capindex/0.4 (index data acquisition)";

/// Source of the candidate pool, in reference-list order.
#[async_trait]
pub trait ReferenceListSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_symbols(&self) -> Result<Vec<Symbol>>;
}

/// S&P 500 constituents scraped from the Wikipedia list page.
pub struct WikipediaSp500Source {
    client: reqwest::Client,
    url: String,
}

impl Default for WikipediaSp500Source {
    fn default() -> Self {
        Self::new()
    }
}

impl WikipediaSp500Source {
    pub fn new() -> Self {
        Self::with_url(SP500_CONSTITUENTS_URL)
    }

    pub fn with_url(url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl ReferenceListSource for WikipediaSp500Source {
    fn name(&self) -> &'static str {
        "wikipedia_sp500"
    }

    async fn fetch_symbols(&self) -> Result<Vec<Symbol>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::ReferenceList(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::ReferenceList(format!(
                "constituents page returned HTTP {}",
                response.status()
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| Error::ReferenceList(format!("failed to read body: {}", e)))?;

        let symbols = parse_constituents(&html)?;
        debug!("Reference list has {} symbols", symbols.len());
        Ok(symbols)
    }
}

/// First column of `table#constituents`, share classes dash-separated.
pub fn parse_constituents(html: &str) -> Result<Vec<Symbol>> {
    let document = Html::parse_document(html);
    let rows = Selector::parse("table#constituents tr")
        .map_err(|e| Error::ReferenceList(format!("bad selector: {}", e)))?;
    let first_cell = Selector::parse("td")
        .map_err(|e| Error::ReferenceList(format!("bad selector: {}", e)))?;

    let mut symbols: Vec<Symbol> = Vec::new();
    for row in document.select(&rows) {
        let Some(cell) = row.select(&first_cell).next() else {
            continue; // header row
        };
        let text: String = cell.text().collect();
        let symbol = Symbol::new(&text.trim().replace('.', "-"));
        if !symbol.is_empty() && !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }

    if symbols.is_empty() {
        return Err(Error::ReferenceList(
            "constituents table not found or empty".to_string(),
        ));
    }
    Ok(symbols)
}
