//! TTL cache in front of any [`PriceOracle`].

use super::{looks_like_address, PriceOracle, PriceQuote};
use crate::analysis::types::OracleConfig;
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Caches hits and misses alike; errors are never cached.
pub struct CachedPriceOracle {
    inner: Arc<dyn PriceOracle>,
    cache: Cache<String, Option<PriceQuote>>,
}

impl CachedPriceOracle {
    pub fn new(inner: Arc<dyn PriceOracle>, config: &OracleConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_cache_entries)
            .time_to_live(Duration::from_secs(config.cache_ttl_seconds))
            .build();

        Self { inner, cache }
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl PriceOracle for CachedPriceOracle {
    #[instrument(skip(self))]
    async fn get_price(&self, symbol_or_address: &str) -> anyhow::Result<Option<PriceQuote>> {
        // Mint addresses are case-sensitive, symbols are not
        let query = symbol_or_address.trim();
        let key = if looks_like_address(query) {
            query.to_string()
        } else {
            query.to_ascii_uppercase()
        };

        if let Some(cached) = self.cache.get(&key).await {
            debug!("Price cache hit for {}", key);
            return Ok(cached);
        }

        let quote = self.inner.get_price(symbol_or_address).await?;
        self.cache.insert(key, quote.clone()).await;
        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingOracle {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PriceOracle for CountingOracle {
        async fn get_price(&self, symbol: &str) -> anyhow::Result<Option<PriceQuote>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if symbol.eq_ignore_ascii_case("fail") {
                return Err(anyhow::anyhow!("boom"));
            }
            Ok((symbol.eq_ignore_ascii_case("jup")).then(|| PriceQuote::new("JUP", 0.65)))
        }
    }

    #[tokio::test]
    async fn test_hits_and_misses_are_cached() {
        let inner = Arc::new(CountingOracle {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedPriceOracle::new(inner.clone(), &OracleConfig::default());

        assert!(cached.get_price("JUP").await.unwrap().is_some());
        assert!(cached.get_price("jup").await.unwrap().is_some());
        assert!(cached.get_price("NOPE").await.unwrap().is_none());
        assert!(cached.get_price("NOPE").await.unwrap().is_none());

        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_addresses_keep_their_case() {
        let inner = Arc::new(CountingOracle {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedPriceOracle::new(inner.clone(), &OracleConfig::default());

        let mint = "JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN";
        cached.get_price(mint).await.unwrap();
        cached.get_price(&mint.to_ascii_lowercase()).await.unwrap();
        cached.get_price(mint).await.unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        cached.cache.run_pending_tasks().await;
        assert_eq!(cached.entry_count(), 2);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let inner = Arc::new(CountingOracle {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedPriceOracle::new(inner.clone(), &OracleConfig::default());

        assert!(cached.get_price("FAIL").await.is_err());
        assert!(cached.get_price("FAIL").await.is_err());

        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
