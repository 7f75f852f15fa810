//! Static reference-price table.
//!
//! These figures are placeholders for valuing trades that carry no native leg.
//! They are not market data.

use super::{PriceOracle, PriceQuote, ReferencePrices};
use async_trait::async_trait;
use std::collections::HashMap;

const DEFAULT_PRICES: &[(&str, f64)] = &[
    ("SOL", 20.0),
    ("BONK", 0.000003),
    ("JUP", 0.65),
    ("PYTH", 0.45),
    ("RAY", 1.85),
    ("ORCA", 0.75),
    ("USDC", 1.0),
    ("USDT", 1.0),
];

const KNOWN_MINTS: &[(&str, &str)] = &[
    ("So11111111111111111111111111111111111111112", "SOL"),
    ("DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263", "BONK"),
    ("JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN", "JUP"),
    ("HZ1JovNiVvGrGNiiYvEozEVgZ58xaU3RKwX8eACQBCt3", "PYTH"),
    ("4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R", "RAY"),
    ("orcaEKTdK7LKz57vaAYr9QeNsVEPfiu6QeMU1kektZE", "ORCA"),
    ("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", "USDC"),
    ("Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB", "USDT"),
];

/// Wrapped native mint; token legs in this mint count as native.
pub const WRAPPED_NATIVE_MINT: &str = "So11111111111111111111111111111111111111112";

#[derive(Debug, Clone)]
pub struct StaticReferencePrices {
    prices: HashMap<String, f64>,
    mints: HashMap<String, String>,
}

impl StaticReferencePrices {
    pub fn new() -> Self {
        Self {
            prices: DEFAULT_PRICES
                .iter()
                .map(|(symbol, price)| (symbol.to_string(), *price))
                .collect(),
            mints: KNOWN_MINTS
                .iter()
                .map(|(mint, symbol)| (mint.to_string(), symbol.to_string()))
                .collect(),
        }
    }

    /// An empty table; every lookup misses.
    pub fn empty() -> Self {
        Self {
            prices: HashMap::new(),
            mints: HashMap::new(),
        }
    }

    pub fn with_price(mut self, symbol: impl Into<String>, price: f64) -> Self {
        self.prices.insert(symbol.into().to_ascii_uppercase(), price);
        self
    }
}

impl Default for StaticReferencePrices {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferencePrices for StaticReferencePrices {
    fn reference_price(&self, symbol: &str) -> Option<f64> {
        self.prices.get(&symbol.to_ascii_uppercase()).copied()
    }

    fn symbol_for_mint(&self, mint: &str) -> Option<String> {
        self.mints.get(mint).cloned()
    }
}

#[async_trait]
impl PriceOracle for StaticReferencePrices {
    async fn get_price(&self, symbol_or_address: &str) -> anyhow::Result<Option<PriceQuote>> {
        let symbol = self
            .symbol_for_mint(symbol_or_address)
            .unwrap_or_else(|| symbol_or_address.to_ascii_uppercase());

        Ok(self
            .reference_price(&symbol)
            .map(|price| PriceQuote::new(symbol, price)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_lookup_is_case_insensitive() {
        let table = StaticReferencePrices::new();

        assert_eq!(table.reference_price("jup"), Some(0.65));
        assert_eq!(table.reference_price("BONK"), Some(0.000003));
        assert_eq!(table.reference_price("UNKNOWN"), None);
    }

    #[test]
    fn test_known_mints() {
        let table = StaticReferencePrices::new();

        assert_eq!(table.symbol_for_mint(WRAPPED_NATIVE_MINT).as_deref(), Some("SOL"));
        assert_eq!(table.symbol_for_mint("nope"), None);
        assert_eq!(StaticReferencePrices::empty().reference_price("SOL"), None);
    }

    #[tokio::test]
    async fn test_oracle_by_mint() {
        let table = StaticReferencePrices::new().with_price("wif", 2.5);

        let quote = table
            .get_price("JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(quote.symbol, "JUP");
        assert_eq!(table.get_price("WIF").await.unwrap().unwrap().price, 2.5);
        assert!(table.get_price("NOPE").await.unwrap().is_none());
    }
}
