//! trade-lens - trade reconstruction and behavioral analytics for Solana wallets
//!
//! Raw transactions from a feed are classified into trades, aggregated into
//! wallet analytics and scanned for behavioral patterns. Wallets the feed
//! cannot describe get a clearly labelled demo report instead.

pub mod analysis;
pub mod feed;
pub mod oracle;
pub mod pipeline;
pub mod types;

// Re-export main types for convenience
pub use analysis::{AnalyzerBuilder, AnalyzerConfig, Pattern, PatternKind, WalletAnalysis};
pub use pipeline::{AnalysisReport, CachedWalletAnalyzer, ReportSource, WalletAnalyzer};
pub use types::{RawTransaction, Trade, TradeType};
