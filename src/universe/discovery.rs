//! Instrument discovery (cold path)
//!
//! One-shot REST queries for the active option list and the spot index
//! price. Called once at start-up, never on the hot path.

use std::time::Duration;

use serde::Deserialize;

use crate::universe::Instrument;

const DEFAULT_BASE_URL: &str = "https://www.deribit.com/api/v2";

/// Discovery client
pub struct InstrumentDiscovery {
    client: reqwest::Client,
    base_url: String,
}

impl InstrumentDiscovery {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Point at a different endpoint (tests, mirrors).
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .user_agent("boxarb/0.1")
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch all active options on the given currency.
    pub async fn fetch_instruments(
        &self,
        currency: &str,
    ) -> Result<Vec<Instrument>, DiscoveryError> {
        let url = format!(
            "{}/public/get_instruments?currency={currency}&kind=option",
            self.base_url
        );
        tracing::info!("fetching instruments from {url}");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DiscoveryError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(DiscoveryError::Http(response.status().as_u16()));
        }

        let body: InstrumentsResponse = response
            .json()
            .await
            .map_err(|e| DiscoveryError::Parse(e.to_string()))?;

        let instruments: Vec<Instrument> = body
            .result
            .into_iter()
            .map(|raw| Instrument {
                name: raw.instrument_name,
                is_active: raw.is_active,
                expiration_ms: raw.expiration_timestamp,
            })
            .collect();

        if instruments.is_empty() {
            return Err(DiscoveryError::NoInstruments);
        }
        tracing::info!("fetched {} instruments", instruments.len());

        Ok(instruments)
    }

    /// Fetch the current spot index price (e.g. `btc_usd`).
    pub async fn fetch_index_price(&self, index_name: &str) -> Result<f64, DiscoveryError> {
        let url = format!(
            "{}/public/get_index_price?index_name={index_name}",
            self.base_url
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DiscoveryError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(DiscoveryError::Http(response.status().as_u16()));
        }

        let body: IndexPriceResponse = response
            .json()
            .await
            .map_err(|e| DiscoveryError::Parse(e.to_string()))?;

        let price = body.result.index_price;
        if !price.is_finite() || price <= 0.0 {
            return Err(DiscoveryError::BadIndexPrice(price));
        }
        Ok(price)
    }
}

impl Default for InstrumentDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

// === API response types ===

#[derive(Debug, Deserialize)]
struct InstrumentsResponse {
    result: Vec<RawInstrument>,
}

#[derive(Debug, Deserialize)]
struct RawInstrument {
    instrument_name: String,
    is_active: bool,
    expiration_timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct IndexPriceResponse {
    result: IndexPriceResult,
}

#[derive(Debug, Deserialize)]
struct IndexPriceResult {
    index_price: f64,
}

/// Discovery errors
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Http(u16),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("No instruments returned")]
    NoInstruments,

    #[error("Bad index price: {0}")]
    BadIndexPrice(f64),
}
