//! Orchestration: feed → classifier → aggregator / pattern detector.
//!
//! This is the only place that decides between a live report and a demo one.
//! Feed failures, empty feeds and feeds with nothing tradeable all end in a
//! synthetic report whose source says why.

use crate::analysis::types::{AnalyzerConfig, Pattern, WalletAnalysis};
use crate::analysis::{FallbackSynthesizer, PatternDetector, TradeAggregator, TradeClassifier};
use crate::feed::TransactionFeed;
use crate::oracle::{PriceOracle, PriceQuote, ReferencePrices, StaticReferencePrices};
use crate::types::Trade;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Where the trades in a report came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ReportSource {
    Live,
    Synthetic { reason: String },
}

/// Everything a rendering surface needs for one wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub address: String,
    pub source: ReportSource,
    /// Oldest first
    pub trades: Vec<Trade>,
    pub analysis: WalletAnalysis,
    pub patterns: Vec<Pattern>,
    pub generated_at: DateTime<Utc>,
}

impl AnalysisReport {
    /// True when the trades are demo data and must be labelled as such.
    pub fn is_synthetic(&self) -> bool {
        matches!(self.source, ReportSource::Synthetic { .. })
    }
}

pub struct WalletAnalyzer {
    feed: Arc<dyn TransactionFeed>,
    oracle: Option<Arc<dyn PriceOracle>>,
    classifier: TradeClassifier,
    aggregator: TradeAggregator,
    detector: PatternDetector,
    synthesizer: FallbackSynthesizer,
    config: AnalyzerConfig,
}

impl WalletAnalyzer {
    pub fn new(feed: Arc<dyn TransactionFeed>, config: AnalyzerConfig) -> Self {
        Self {
            feed,
            oracle: None,
            classifier: TradeClassifier::new(
                config.classifier.clone(),
                Arc::new(StaticReferencePrices::new()),
            ),
            aggregator: TradeAggregator::new(config.aggregator.clone()),
            detector: PatternDetector::new(config.patterns.clone()),
            synthesizer: FallbackSynthesizer::new(Some(config.patterns.jitter_seed)),
            config,
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn PriceOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Swap the table the classifier prices unpaired token legs with.
    pub fn with_reference_prices(mut self, prices: Arc<dyn ReferencePrices>) -> Self {
        self.classifier = TradeClassifier::new(self.config.classifier.clone(), prices);
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Fetch, classify and analyze one wallet. Never fails.
    #[instrument(skip(self))]
    pub async fn analyze(&self, address: &str) -> AnalysisReport {
        let limit = self.config.feed.fetch_limit;

        let transactions = match self.feed.fetch_transactions(address, limit).await {
            Ok(txs) => txs,
            Err(e) => {
                warn!("Feed failed for {}, falling back to demo data: {}", address, e);
                return self.synthetic_report(address, format!("transaction feed unavailable: {}", e));
            }
        };

        if transactions.is_empty() {
            warn!("No transactions for {}, falling back to demo data", address);
            return self.synthetic_report(address, "no transactions returned".to_string());
        }

        let trades = self.classifier.classify_all(&transactions, address);
        if trades.is_empty() {
            warn!(
                "None of {} transactions for {} classified as trades, falling back to demo data",
                transactions.len(),
                address
            );
            return self.synthetic_report(
                address,
                format!("no trades recognized among {} transactions", transactions.len()),
            );
        }

        info!(
            "Classified {} trades from {} transactions for {}",
            trades.len(),
            transactions.len(),
            address
        );
        self.report(address, ReportSource::Live, trades)
    }

    /// Demo report without touching the feed.
    pub fn demo(&self, address: &str) -> AnalysisReport {
        self.synthetic_report(address, "demo mode requested".to_string())
    }

    /// Aggregate and detect patterns over an existing trade set.
    pub fn analyze_trades(&self, trades: &[Trade]) -> (WalletAnalysis, Vec<Pattern>) {
        (
            self.aggregator.aggregate(trades),
            self.detector.detect_patterns(trades),
        )
    }

    /// Current price for an asset. Oracle errors and misses both yield `None`.
    #[instrument(skip(self))]
    pub async fn spot_price(&self, asset: &str) -> Option<PriceQuote> {
        let oracle = self.oracle.as_ref()?;
        match oracle.get_price(asset).await {
            Ok(quote) => quote,
            Err(e) => {
                warn!("Price lookup for {} failed: {:#}", asset, e);
                None
            }
        }
    }

    fn synthetic_report(&self, address: &str, reason: String) -> AnalysisReport {
        if self.config.synthetic_trade_count == 0 {
            info!("Demo data disabled, returning an unavailable analysis for {}", address);
            return AnalysisReport {
                address: address.to_string(),
                source: ReportSource::Synthetic { reason },
                trades: Vec::new(),
                analysis: WalletAnalysis::unavailable(),
                patterns: Vec::new(),
                generated_at: Utc::now(),
            };
        }

        let mut trades = self.synthesizer.synthesize(self.config.synthetic_trade_count);
        trades.sort_by_key(|t| t.timestamp);
        self.report(address, ReportSource::Synthetic { reason }, trades)
    }

    fn report(&self, address: &str, source: ReportSource, trades: Vec<Trade>) -> AnalysisReport {
        let (analysis, patterns) = self.analyze_trades(&trades);
        debug!("Report for {} carries {} patterns", address, patterns.len());

        AnalysisReport {
            address: address.to_string(),
            source,
            trades,
            analysis,
            patterns,
            generated_at: Utc::now(),
        }
    }
}

/// TTL cache in front of [`WalletAnalyzer::analyze`]. Only live reports are kept.
pub struct CachedWalletAnalyzer {
    inner: Arc<WalletAnalyzer>,
    cache: Cache<String, Arc<AnalysisReport>>,
}

impl CachedWalletAnalyzer {
    pub fn new(inner: Arc<WalletAnalyzer>) -> Self {
        let cache = Cache::builder()
            .max_capacity(inner.config().max_cached_wallets)
            .time_to_live(Duration::from_secs(inner.config().analysis_cache_ttl_seconds))
            .build();

        Self { inner, cache }
    }

    #[instrument(skip(self))]
    pub async fn analyze(&self, address: &str) -> Arc<AnalysisReport> {
        if let Some(report) = self.cache.get(address).await {
            debug!("Analysis cache hit for {}", address);
            return report;
        }

        let report = Arc::new(self.inner.analyze(address).await);
        if !report.is_synthetic() {
            self.cache.insert(address.to_string(), report.clone()).await;
        }
        report
    }

    pub async fn invalidate(&self, address: &str) {
        self.cache.invalidate(address).await;
    }
}
