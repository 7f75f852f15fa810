//! Price oracle boundary.
//!
//! Two seams live here: the async [`PriceOracle`] used for spot-price
//! questions, and the synchronous [`ReferencePrices`] table the classifier
//! falls back on when a trade carries no native leg to price it with.

pub mod cache;
pub mod dexscreener;
pub mod reference;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub use cache::CachedPriceOracle;
pub use dexscreener::DexScreenerOracle;
pub use reference::StaticReferencePrices;

/// Spot price plus whatever market metadata the source reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub symbol: String,
    pub name: Option<String>,
    /// USD price
    pub price: f64,
    pub change_24h: Option<f64>,
    pub volume_24h: Option<f64>,
    pub market_cap: Option<f64>,
    pub liquidity: Option<f64>,
    pub chain_id: Option<String>,
    pub pair_address: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl PriceQuote {
    pub fn new(symbol: impl Into<String>, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            name: None,
            price,
            change_24h: None,
            volume_24h: None,
            market_cap: None,
            liquidity: None,
            chain_id: None,
            pair_address: None,
            fetched_at: Utc::now(),
        }
    }
}

/// Maps an asset symbol or mint address to a current price.
///
/// `Ok(None)` is a miss. `Err` is a transport or decode failure; callers
/// treat both as "no price".
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn get_price(&self, symbol_or_address: &str) -> anyhow::Result<Option<PriceQuote>>;

    /// Look up several assets, skipping the ones that fail.
    async fn get_prices(&self, symbols: &[String]) -> Vec<PriceQuote> {
        let mut quotes = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            match self.get_price(symbol).await {
                Ok(Some(quote)) => quotes.push(quote),
                Ok(None) => {}
                Err(e) => warn!("Price lookup for {} failed: {:#}", symbol, e),
            }
        }
        quotes
    }
}

/// Rough per-symbol reference prices, consulted synchronously by the classifier.
pub trait ReferencePrices: Send + Sync {
    fn reference_price(&self, symbol: &str) -> Option<f64>;

    /// Symbol for a well-known mint, if any.
    fn symbol_for_mint(&self, _mint: &str) -> Option<String> {
        None
    }
}

/// Render an optional price, "N/A" on a miss.
/// Base58 mint addresses are 32 to 44 characters with no separators.
pub(crate) fn looks_like_address(query: &str) -> bool {
    (32..=44).contains(&query.len()) && query.chars().all(|c| c.is_ascii_alphanumeric())
}

pub fn format_price(price: Option<f64>) -> String {
    match price {
        Some(p) if p.is_finite() && p > 0.0 && p < 0.01 => format!("${:.8}", p),
        Some(p) if p.is_finite() => format!("${:.2}", p),
        _ => crate::analysis::types::NOT_AVAILABLE.to_string(),
    }
}
