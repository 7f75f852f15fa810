//! CLI entry point: analyze one wallet and print the report as JSON.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use trade_lens::feed::{HeliusFeed, RpcFeed, TransactionFeed};
use trade_lens::oracle::{CachedPriceOracle, DexScreenerOracle};
use trade_lens::{AnalyzerBuilder, AnalyzerConfig};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Source {
    Helius,
    Rpc,
}

#[derive(Debug, Parser)]
#[command(name = "trade-lens", about = "Reconstruct and analyze the trade history of a Solana wallet")]
struct Args {
    /// Wallet address to analyze
    address: String,

    /// Skip the feed and print a demo report
    #[arg(long)]
    demo: bool,

    /// Number of recent transactions to fetch
    #[arg(long)]
    limit: Option<usize>,

    /// Seed for confidence jitter and demo data
    #[arg(long)]
    seed: Option<u64>,

    /// Transaction source; defaults to Helius when HELIUS_API_KEY is set
    #[arg(long, value_enum)]
    source: Option<Source>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = AnalyzerConfig::from_env();

    let mut builder = AnalyzerBuilder::from_config(config.clone());
    if let Some(limit) = args.limit {
        builder = builder.with_fetch_limit(limit);
    }
    if let Some(seed) = args.seed {
        builder = builder.with_jitter_seed(seed);
    }
    match DexScreenerOracle::new(config.oracle.clone()) {
        Ok(oracle) => {
            builder = builder.with_price_oracle(Arc::new(CachedPriceOracle::new(
                Arc::new(oracle),
                &config.oracle,
            )));
        }
        Err(e) => warn!("Price oracle disabled: {:#}", e),
    }

    let feed = build_feed(&config, args.source)?;
    let analyzer = builder.build(feed);

    info!("Analyzing wallet {}", args.address);
    let report = if args.demo {
        analyzer.demo(&args.address)
    } else {
        analyzer.analyze(&args.address).await
    };

    if report.is_synthetic() {
        warn!("Report for {} contains demo data, not real activity", args.address);
    }

    let output = if args.pretty {
        serde_json::to_string_pretty(&report)
    } else {
        serde_json::to_string(&report)
    }
    .context("Failed to serialize report")?;
    println!("{}", output);

    Ok(())
}

fn build_feed(config: &AnalyzerConfig, source: Option<Source>) -> Result<Arc<dyn TransactionFeed>> {
    let source = source.unwrap_or(if config.feed.helius_api_key.is_some() {
        Source::Helius
    } else {
        Source::Rpc
    });

    match source {
        Source::Helius => {
            let key = config
                .feed
                .helius_api_key
                .clone()
                .context("HELIUS_API_KEY is required for --source helius")?;
            Ok(Arc::new(HeliusFeed::new(key, config.feed.clone())?))
        }
        Source::Rpc => Ok(Arc::new(RpcFeed::new(config.feed.clone())?)),
    }
}
