//! Analysis output types and the analyzer configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder rendered wherever a figure cannot be computed.
pub const NOT_AVAILABLE: &str = "N/A";

/// Per-asset rollup, recomputed on every aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAnalysis {
    pub symbol: String,
    pub name: String,
    pub total_trades: usize,
    /// Dispositions whose proceeds beat their FIFO cost basis
    pub profitable_trades: usize,
    /// Percent, one decimal
    pub success_rate: f64,
    /// Signed cash-flow total, two decimals
    pub total_profit_loss: f64,
    pub average_hold_time: String,
    pub best_trade: TradeExtreme,
    pub worst_trade: TradeExtreme,
}

/// Value and date of a best/worst trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeExtreme {
    pub trade_id: String,
    pub value: f64,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrequencyClass {
    Low,
    Medium,
    High,
}

impl FrequencyClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrequencyClass::Low => "Low",
            FrequencyClass::Medium => "Medium",
            FrequencyClass::High => "High",
        }
    }
}

/// Trading frequency bucket together with the literal rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeFrequency {
    pub class: FrequencyClass,
    /// Trades per week, one decimal
    pub trades_per_week: f64,
}

impl TradeFrequency {
    pub fn from_rate(trades_per_week: f64) -> Self {
        let class = if trades_per_week < 1.0 {
            FrequencyClass::Low
        } else if trades_per_week < 10.0 {
            FrequencyClass::Medium
        } else {
            FrequencyClass::High
        };

        Self {
            class,
            trades_per_week: round_to(trades_per_week, 1),
        }
    }
}

impl std::fmt::Display for TradeFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:.1} trades/week)", self.class.as_str(), self.trades_per_week)
    }
}

/// Wallet-level analytics. A fresh value on every aggregation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletAnalysis {
    /// Percent of trades whose transaction succeeded
    pub overall_success_rate: f64,
    /// Naive cash-flow total (a lower bound, no lot matching)
    pub total_profit_loss: f64,
    pub most_profitable_asset: String,
    /// Equals `most_profitable_asset` when only one asset was traded
    pub least_profitable_asset: String,
    pub average_hold_time: String,
    /// Same figure in seconds, `None` when no acquisition/disposition pair closed
    pub average_hold_seconds: Option<i64>,
    pub trade_frequency: TradeFrequency,
    pub recommendations: Vec<String>,
    pub token_analyses: Vec<TokenAnalysis>,
}

impl WalletAnalysis {
    /// Canonical zero-value analysis for a wallet with no trades.
    pub fn empty() -> Self {
        Self {
            overall_success_rate: 0.0,
            total_profit_loss: 0.0,
            most_profitable_asset: NOT_AVAILABLE.to_string(),
            least_profitable_asset: NOT_AVAILABLE.to_string(),
            average_hold_time: NOT_AVAILABLE.to_string(),
            average_hold_seconds: None,
            trade_frequency: TradeFrequency::from_rate(0.0),
            recommendations: vec![
                "No transaction history found. Try adding some funds to your wallet or making some transactions.".to_string(),
                "Consider buying SOL to start your trading journey.".to_string(),
                "Explore Solana DeFi platforms like Jupiter, Raydium, or Orca.".to_string(),
            ],
            token_analyses: Vec::new(),
        }
    }

    /// Clearly-labeled analysis for callers that could not reach the aggregator.
    pub fn unavailable() -> Self {
        Self {
            recommendations: vec![
                "Unable to fully analyze your wallet due to an error.".to_string(),
                "Try again in a few moments.".to_string(),
                "Make sure your wallet has transaction history.".to_string(),
            ],
            ..Self::empty()
        }
    }

    /// The least profitable asset, or `None` when it is the same as the most profitable one.
    pub fn distinct_least_profitable(&self) -> Option<&str> {
        if self.token_analyses.len() > 1 && self.least_profitable_asset != self.most_profitable_asset {
            Some(self.least_profitable_asset.as_str())
        } else {
            None
        }
    }
}

/// Fixed set of behavioral patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternKind {
    BuyLowSellHigh,
    AveragingDown,
    MomentumClustering,
    ConcentrationRisk,
    RapidSuccession,
    ReactiveSelling,
    Accumulation,
    Distribution,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::BuyLowSellHigh => "buy-low-sell-high",
            PatternKind::AveragingDown => "averaging-down",
            PatternKind::MomentumClustering => "momentum-clustering",
            PatternKind::ConcentrationRisk => "concentration-risk",
            PatternKind::RapidSuccession => "rapid-succession",
            PatternKind::ReactiveSelling => "reactive-selling",
            PatternKind::Accumulation => "accumulation",
            PatternKind::Distribution => "distribution",
        }
    }

    pub fn all() -> Vec<PatternKind> {
        vec![
            PatternKind::BuyLowSellHigh,
            PatternKind::AveragingDown,
            PatternKind::MomentumClustering,
            PatternKind::ConcentrationRisk,
            PatternKind::RapidSuccession,
            PatternKind::ReactiveSelling,
            PatternKind::Accumulation,
            PatternKind::Distribution,
        ]
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected behavioral pattern with the trades that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    pub id: String,
    pub kind: PatternKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    /// Heuristic 0-100, jittered within a fixed range per kind
    pub confidence: u8,
    pub description: String,
    pub suggested_action: String,
    pub trade_ids: Vec<String>,
}

// --- Configuration ---

/// Top-level configuration for the analyzer and its collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub classifier: ClassifierConfig,
    pub aggregator: AggregatorConfig,
    pub patterns: PatternConfig,
    pub feed: FeedConfig,
    pub oracle: OracleConfig,
    /// Trades produced by the synthesizer when the feed yields nothing usable
    pub synthetic_trade_count: usize,
    /// TTL of cached wallet reports
    pub analysis_cache_ttl_seconds: u64,
    pub max_cached_wallets: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Symbol used for native-asset trades
    pub native_symbol: String,
    pub lamports_per_native: f64,
    /// Minimum amount (native units) for a trade to be kept
    pub dust_threshold: f64,
    /// Unit price used when neither the native leg nor the reference table has one
    pub default_unit_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Average holds shorter than this trigger the "hold longer" recommendation
    pub short_hold_days: i64,
    /// Trades below this amount count as small for the consolidation rule
    pub small_trade_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Seed for confidence jitter; same seed and input give the same output
    pub jitter_seed: u64,
    pub min_trades_per_asset: usize,
    pub min_gain_percent: f64,
    pub strong_gain_percent: f64,
    pub min_drop_percent: f64,
    pub strong_drop_percent: f64,
    pub momentum_min_trades: usize,
    pub momentum_window_days: i64,
    pub concentration_share: f64,
    pub concentration_min_trades: usize,
    pub rapid_gap_hours: i64,
    pub rapid_recent_trades: usize,
    pub reactive_gap_hours: i64,
    pub min_short_gaps: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub rpc_endpoint: String,
    pub helius_api_key: Option<String>,
    pub helius_api_base: String,
    pub fetch_limit: usize,
    /// Signatures fetched per batch on the RPC path
    pub batch_size: usize,
    pub request_delay_ms: u64,
    pub inter_batch_delay_ms: u64,
    pub max_parallel_requests: usize,
    pub rate_limit_requests_per_second: u32,
    pub retry_attempts: usize,
    pub retry_base_delay_ms: u64,
    pub request_timeout_seconds: u64,
    /// Error ratio above which the rate limiter backs off
    pub rate_limit_error_threshold: f64,
    pub rate_limit_window: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub dexscreener_base: String,
    pub request_timeout_seconds: u64,
    pub cache_ttl_seconds: u64,
    pub max_cache_entries: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            native_symbol: "SOL".to_string(),
            lamports_per_native: 1_000_000_000.0,
            dust_threshold: 0.001,
            default_unit_price: 0.1,
        }
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            short_hold_days: 7,
            small_trade_amount: 0.01,
        }
    }
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            jitter_seed: 42,
            min_trades_per_asset: 2,
            min_gain_percent: 5.0,
            strong_gain_percent: 20.0,
            min_drop_percent: 10.0,
            strong_drop_percent: 25.0,
            momentum_min_trades: 3,
            momentum_window_days: 30,
            concentration_share: 0.7,
            concentration_min_trades: 5,
            rapid_gap_hours: 24,
            rapid_recent_trades: 10,
            reactive_gap_hours: 12,
            min_short_gaps: 2,
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            rpc_endpoint: "https://api.mainnet-beta.solana.com".to_string(),
            helius_api_key: None,
            helius_api_base: "https://api.helius.xyz".to_string(),
            fetch_limit: 50,
            batch_size: 3,
            request_delay_ms: 300,
            inter_batch_delay_ms: 1000,
            max_parallel_requests: 3,
            rate_limit_requests_per_second: 10,
            retry_attempts: 4,
            retry_base_delay_ms: 250,
            request_timeout_seconds: 30,
            rate_limit_error_threshold: 0.2,
            rate_limit_window: 50,
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            dexscreener_base: "https://api.dexscreener.com".to_string(),
            request_timeout_seconds: 10,
            cache_ttl_seconds: 60,
            max_cache_entries: 1000,
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            aggregator: AggregatorConfig::default(),
            patterns: PatternConfig::default(),
            feed: FeedConfig::default(),
            oracle: OracleConfig::default(),
            synthetic_trade_count: 4,
            analysis_cache_ttl_seconds: 300,
            max_cached_wallets: 256,
        }
    }
}

impl AnalyzerConfig {
    /// Defaults overlaid with environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(key) = std::env::var("HELIUS_API_KEY") {
            if !key.trim().is_empty() {
                config.feed.helius_api_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var("SOLANA_RPC_URL") {
            if !url.trim().is_empty() {
                config.feed.rpc_endpoint = url;
            }
        }
        if let Some(limit) = env_parse::<usize>("TRADE_LENS_FETCH_LIMIT") {
            config.feed.fetch_limit = limit;
        }
        if let Some(seed) = env_parse::<u64>("TRADE_LENS_JITTER_SEED") {
            config.patterns.jitter_seed = seed;
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_buckets() {
        assert_eq!(TradeFrequency::from_rate(0.5).class, FrequencyClass::Low);
        assert_eq!(TradeFrequency::from_rate(1.0).class, FrequencyClass::Medium);
        assert_eq!(TradeFrequency::from_rate(9.99).class, FrequencyClass::Medium);
        assert_eq!(TradeFrequency::from_rate(10.0).class, FrequencyClass::High);
        assert_eq!(TradeFrequency::from_rate(2.04).to_string(), "Medium (2.0 trades/week)");
    }

    #[test]
    fn test_empty_analysis() {
        let empty = WalletAnalysis::empty();

        assert_eq!(empty.overall_success_rate, 0.0);
        assert_eq!(empty.average_hold_time, NOT_AVAILABLE);
        assert!(empty.token_analyses.is_empty());
        assert_eq!(empty.recommendations.len(), 3);
        assert_eq!(empty.distinct_least_profitable(), None);
    }

    #[test]
    fn test_pattern_kind_serialization() {
        let json = serde_json::to_string(&PatternKind::BuyLowSellHigh).unwrap();
        assert_eq!(json, "\"buy-low-sell-high\"");
        for kind in PatternKind::all() {
            let encoded = serde_json::to_string(&kind).unwrap();
            assert_eq!(encoded, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = AnalyzerConfig::default();

        assert_eq!(config.classifier.dust_threshold, 0.001);
        assert_eq!(config.classifier.default_unit_price, 0.1);
        assert_eq!(config.synthetic_trade_count, 4);
        assert_eq!(config.patterns.concentration_min_trades, 5);
        assert_eq!(config.feed.batch_size, 3);
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let config: AnalyzerConfig =
            serde_json::from_str(r#"{"classifier": {"native_symbol": "ETH"}}"#).unwrap();

        assert_eq!(config.classifier.native_symbol, "ETH");
        assert_eq!(config.classifier.dust_threshold, 0.001);
        assert_eq!(config.feed.fetch_limit, 50);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.25, 1), 1.3);
        assert_eq!(round_to(-2.345, 2), -2.35);
    }
}
