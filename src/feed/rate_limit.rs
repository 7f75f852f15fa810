//! Adaptive request throttling for feeds, backed by governor.
//!
//! The quota shrinks while upstream keeps answering with rate-limit or server
//! errors and creeps back toward the configured base once it recovers.

use crate::analysis::types::FeedConfig;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

pub struct AdaptiveRateLimiter {
    limiter: Arc<DefaultDirectRateLimiter>,
    base_quota: u32,
    current_quota: u32,
    /// Recent outcomes, `true` for success
    outcomes: VecDeque<bool>,
    window_size: usize,
    error_threshold: f64,
    min_quota: u32,
    last_adjustment: Instant,
    adjustment_interval: Duration,
}

/// Snapshot for logging.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitStats {
    pub base_quota: u32,
    pub current_quota: u32,
    pub error_rate: f64,
    pub samples: usize,
}

fn limiter_for(per_second: u32) -> Arc<DefaultDirectRateLimiter> {
    let quota = Quota::per_second(NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

impl AdaptiveRateLimiter {
    pub fn new(base_requests_per_second: u32, window_size: usize, error_threshold: f64) -> Self {
        let base = base_requests_per_second.max(1);
        Self {
            limiter: limiter_for(base),
            base_quota: base,
            current_quota: base,
            outcomes: VecDeque::with_capacity(window_size),
            window_size: window_size.max(1),
            error_threshold: error_threshold.clamp(0.0, 1.0),
            min_quota: (base / 4).max(1),
            last_adjustment: Instant::now(),
            adjustment_interval: Duration::from_secs(30),
        }
    }

    pub fn from_config(config: &FeedConfig) -> Self {
        Self::new(
            config.rate_limit_requests_per_second,
            config.rate_limit_window,
            config.rate_limit_error_threshold,
        )
    }

    /// Shared handle to the current limiter. Callers await `until_ready()` on
    /// it without holding any lock on this struct.
    pub fn handle(&self) -> Arc<DefaultDirectRateLimiter> {
        self.limiter.clone()
    }

    pub fn record_success(&mut self) {
        self.record(true);
    }

    pub fn record_failure(&mut self) {
        self.record(false);
    }

    fn record(&mut self, success: bool) {
        self.outcomes.push_back(success);
        while self.outcomes.len() > self.window_size {
            self.outcomes.pop_front();
        }

        if self.should_adjust() {
            self.adjust_quota();
        }
    }

    fn should_adjust(&self) -> bool {
        self.outcomes.len() >= self.window_size / 2
            && self.last_adjustment.elapsed() >= self.adjustment_interval
    }

    #[instrument(skip(self))]
    fn adjust_quota(&mut self) {
        let error_rate = self.error_rate();
        let old_quota = self.current_quota;

        if error_rate > self.error_threshold {
            let reduction = 1.0 - (error_rate - self.error_threshold) * 0.5;
            let reduced = ((self.current_quota as f64) * reduction) as u32;
            self.current_quota = reduced.max(self.min_quota);
            warn!(
                "Feed error rate {:.0}%, reducing quota from {} to {} req/s",
                error_rate * 100.0,
                old_quota,
                self.current_quota
            );
        } else if error_rate < self.error_threshold * 0.5 && self.current_quota < self.base_quota {
            let raised = ((self.current_quota as f64) * 1.25).ceil() as u32;
            self.current_quota = raised.min(self.base_quota);
            debug!(
                "Feed error rate {:.0}%, raising quota from {} to {} req/s",
                error_rate * 100.0,
                old_quota,
                self.current_quota
            );
        }

        if self.current_quota != old_quota {
            self.limiter = limiter_for(self.current_quota);
            self.last_adjustment = Instant::now();
        }
    }

    fn error_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let failures = self.outcomes.iter().filter(|ok| !**ok).count();
        failures as f64 / self.outcomes.len() as f64
    }

    pub fn current_quota(&self) -> u32 {
        self.current_quota
    }

    pub fn stats(&self) -> RateLimitStats {
        RateLimitStats {
            base_quota: self.base_quota,
            current_quota: self.current_quota,
            error_rate: self.error_rate(),
            samples: self.outcomes.len(),
        }
    }
}
