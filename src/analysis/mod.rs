//! Analysis core - classification, aggregation and pattern detection.
//!
//! Everything in this module is synchronous and operates on in-memory
//! slices. Network access lives in `feed` and `oracle`.

pub mod aggregator;
pub mod classifier;
pub mod jitter;
pub mod patterns;
pub mod synthesizer;
pub mod types;
pub mod venue;

pub use aggregator::{format_hold_time, TradeAggregator};
pub use classifier::{ClassifyError, TradeClassifier};
pub use jitter::Jitter;
pub use patterns::PatternDetector;
pub use synthesizer::FallbackSynthesizer;
pub use types::{
    AggregatorConfig, AnalyzerConfig, ClassifierConfig, FeedConfig, FrequencyClass, OracleConfig,
    Pattern, PatternConfig, PatternKind, TokenAnalysis, TradeExtreme, TradeFrequency,
    WalletAnalysis,
};
pub use venue::{detect_venue, UNKNOWN_VENUE};

use crate::feed::TransactionFeed;
use crate::oracle::PriceOracle;
use crate::pipeline::WalletAnalyzer;
use std::sync::Arc;

/// Analyzer builder for convenient construction with sensible defaults.
pub struct AnalyzerBuilder {
    config: AnalyzerConfig,
    oracle: Option<Arc<dyn PriceOracle>>,
}

impl AnalyzerBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: AnalyzerConfig::default(),
            oracle: None,
        }
    }

    /// Start from an existing configuration.
    pub fn from_config(config: AnalyzerConfig) -> Self {
        Self {
            config,
            oracle: None,
        }
    }

    pub fn with_rpc_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.feed.rpc_endpoint = endpoint.into();
        self
    }

    pub fn with_helius_api_key(mut self, key: Option<String>) -> Self {
        self.config.feed.helius_api_key = key;
        self
    }

    /// Set how many transactions to request per wallet.
    pub fn with_fetch_limit(mut self, limit: usize) -> Self {
        self.config.feed.fetch_limit = limit;
        self
    }

    pub fn with_dust_threshold(mut self, threshold: f64) -> Self {
        self.config.classifier.dust_threshold = threshold;
        self
    }

    /// Seed for confidence jitter and demo data.
    pub fn with_jitter_seed(mut self, seed: u64) -> Self {
        self.config.patterns.jitter_seed = seed;
        self
    }

    pub fn with_synthetic_trade_count(mut self, count: usize) -> Self {
        self.config.synthetic_trade_count = count;
        self
    }

    /// Set rate limiting for the feed.
    pub fn with_rate_limit(mut self, requests_per_second: u32) -> Self {
        self.config.feed.rate_limit_requests_per_second = requests_per_second;
        self
    }

    pub fn with_retry_attempts(mut self, attempts: usize) -> Self {
        self.config.feed.retry_attempts = attempts;
        self
    }

    /// Set batch size and delays for the RPC feed.
    pub fn with_batching(
        mut self,
        batch_size: usize,
        request_delay_ms: u64,
        inter_batch_delay_ms: u64,
    ) -> Self {
        self.config.feed.batch_size = batch_size;
        self.config.feed.request_delay_ms = request_delay_ms;
        self.config.feed.inter_batch_delay_ms = inter_batch_delay_ms;
        self
    }

    /// Set the TTL of cached wallet reports.
    pub fn with_analysis_cache_ttl(mut self, ttl_seconds: u64) -> Self {
        self.config.analysis_cache_ttl_seconds = ttl_seconds;
        self
    }

    pub fn with_price_oracle(mut self, oracle: Arc<dyn PriceOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Build the configuration only.
    pub fn build_config(self) -> AnalyzerConfig {
        self.config
    }

    /// Build an analyzer over the given feed.
    pub fn build(self, feed: Arc<dyn TransactionFeed>) -> WalletAnalyzer {
        let analyzer = WalletAnalyzer::new(feed, self.config);
        match self.oracle {
            Some(oracle) => analyzer.with_oracle(oracle),
            None => analyzer,
        }
    }
}

impl Default for AnalyzerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
