//! DexScreener price oracle.
//!
//! Symbols are resolved through the pair search endpoint (`{symbol}/USDC`),
//! mint addresses through the token endpoint. Among the returned pairs the one
//! with the deepest USD liquidity wins.

use super::{looks_like_address, PriceOracle, PriceQuote};
use crate::analysis::types::OracleConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio_retry::{strategy::ExponentialBackoff, Retry};
use tracing::{debug, instrument};

#[derive(Debug, Clone, Deserialize)]
struct PairsResponse {
    #[serde(default)]
    pairs: Option<Vec<DexPair>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DexPair {
    chain_id: Option<String>,
    pair_address: Option<String>,
    base_token: PairToken,
    quote_token: PairToken,
    price_usd: Option<String>,
    price_change: Option<Window>,
    volume: Option<Window>,
    liquidity: Option<Liquidity>,
    market_cap: Option<f64>,
    fdv: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct PairToken {
    #[serde(default)]
    address: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    symbol: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Window {
    h24: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct Liquidity {
    usd: Option<f64>,
}

impl DexPair {
    fn liquidity_usd(&self) -> f64 {
        self.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0)
    }

    fn matches(&self, query: &str) -> bool {
        let token_matches = |t: &PairToken| {
            t.symbol.eq_ignore_ascii_case(query) || t.address == query
        };
        token_matches(&self.base_token) || token_matches(&self.quote_token)
    }

    /// Quote for the side of the pair that matched the query.
    fn into_quote(self, query: &str) -> Option<PriceQuote> {
        let price: f64 = self.price_usd.as_deref()?.parse().ok()?;
        let token = if self.base_token.symbol.eq_ignore_ascii_case(query)
            || self.base_token.address == query
        {
            &self.base_token
        } else {
            &self.quote_token
        };

        Some(PriceQuote {
            symbol: token.symbol.clone(),
            name: (!token.name.is_empty()).then(|| token.name.clone()),
            price,
            change_24h: self.price_change.as_ref().and_then(|w| w.h24),
            volume_24h: self.volume.as_ref().and_then(|w| w.h24),
            market_cap: self.market_cap.or(self.fdv),
            liquidity: self.liquidity.as_ref().and_then(|l| l.usd),
            chain_id: self.chain_id.clone(),
            pair_address: self.pair_address.clone(),
            fetched_at: Utc::now(),
        })
    }
}

/// Pick the matching pair with the highest USD liquidity.
fn select_best_pair(pairs: Vec<DexPair>, query: &str) -> Option<PriceQuote> {
    let mut matching: Vec<DexPair> = pairs.into_iter().filter(|p| p.matches(query)).collect();
    matching.sort_by(|a, b| b.liquidity_usd().total_cmp(&a.liquidity_usd()));
    matching
        .into_iter()
        .find_map(|pair| pair.into_quote(query))
}

pub struct DexScreenerOracle {
    http_client: Client,
    config: OracleConfig,
}

impl DexScreenerOracle {
    pub fn new(config: OracleConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            config,
        })
    }

    fn url_for(&self, query: &str) -> String {
        let base = self.config.dexscreener_base.trim_end_matches('/');
        if looks_like_address(query) {
            format!("{}/latest/dex/tokens/{}", base, query)
        } else {
            format!("{}/latest/dex/search?q={}/USDC", base, query)
        }
    }

    #[instrument(skip(self))]
    async fn fetch_pairs(&self, url: &str) -> Result<Vec<DexPair>> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .context("Failed to reach DexScreener")?;

        if !response.status().is_success() {
            return Err(anyhow!("DexScreener API error: {}", response.status()));
        }

        let body: PairsResponse = response
            .json()
            .await
            .context("Failed to parse DexScreener response")?;

        Ok(body.pairs.unwrap_or_default())
    }
}

#[async_trait]
impl PriceOracle for DexScreenerOracle {
    #[instrument(skip(self))]
    async fn get_price(&self, symbol_or_address: &str) -> Result<Option<PriceQuote>> {
        let query = symbol_or_address.trim();
        if query.is_empty() {
            return Ok(None);
        }

        let url = self.url_for(query);
        let retry_strategy = ExponentialBackoff::from_millis(200)
            .max_delay(Duration::from_secs(2))
            .take(2);

        let pairs = Retry::spawn(retry_strategy, || self.fetch_pairs(&url)).await?;
        let quote = select_best_pair(pairs, query);

        debug!(
            "DexScreener quote for {}: {:?}",
            query,
            quote.as_ref().map(|q| q.price)
        );
        Ok(quote)
    }
}
