//! Transaction source feeds.
//!
//! A feed yields raw parsed transactions for an address in no guaranteed
//! order. Rate-limit signals are retried with backoff inside the feed; once
//! the attempt ceiling is hit the fetch fails with [`FeedError::RateLimited`]
//! and the caller decides what to show instead.

pub mod helius;
pub mod rate_limit;
pub mod rpc;

use crate::types::RawTransaction;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};

pub use helius::HeliusFeed;
pub use rate_limit::AdaptiveRateLimiter;
pub use rpc::RpcFeed;

#[derive(Debug, Error)]
pub enum FeedError {
    /// Upstream kept signalling rate limits until the retry ceiling
    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: usize },
    /// A single rate-limit signal; retried, never returned from a fetch
    #[error("rate limited by upstream")]
    Throttled,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("feed unavailable: {0}")]
    Unavailable(String),
}

impl FeedError {
    pub fn is_retryable(&self) -> bool {
        match self {
            FeedError::Throttled | FeedError::Unavailable(_) => true,
            FeedError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, FeedError::Throttled | FeedError::RateLimited { .. })
    }
}

#[async_trait]
pub trait TransactionFeed: Send + Sync {
    /// Fetch up to `limit` recent transactions for `address`.
    async fn fetch_transactions(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<RawTransaction>, FeedError>;
}

/// Doubling backoff starting at `base_ms`, capped at ten seconds, with jitter.
pub(crate) fn backoff(base_ms: u64, attempts: usize) -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(2)
        .factor((base_ms / 2).max(1))
        .max_delay(Duration::from_secs(10))
        .map(jitter)
        .take(attempts)
}

/// Turn an exhausted throttle into the caller-facing error.
pub(crate) fn exhausted(err: FeedError, attempts: usize) -> FeedError {
    match err {
        FeedError::Throttled => FeedError::RateLimited {
            attempts: attempts + 1,
        },
        other => other,
    }
}
