//! Demo trade synthesis for wallets the feed could not describe.
//!
//! Every trade produced here carries [`DEMO_MARKER`] in its notes.

use super::jitter::Jitter;
use crate::types::{Trade, TradeType, DEMO_MARKER};
use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// (symbol, base price, spread)
const TOKEN_POOL: &[(&str, f64, f64)] = &[
    ("BONK", 0.000003, 0.000001),
    ("JUP", 0.65, 0.1),
    ("PYTH", 0.45, 0.05),
    ("RAY", 1.85, 0.2),
    ("ORCA", 0.75, 0.1),
];

const VENUES: &[&str] = &["Jupiter", "Raydium", "Orca"];

/// Number of leading trades placed within the last two days.
const RECENT_TRADES: usize = 2;

pub struct FallbackSynthesizer {
    jitter: Mutex<Jitter>,
}

impl FallbackSynthesizer {
    pub fn new(seed: Option<u64>) -> Self {
        let jitter = match seed {
            Some(seed) => Jitter::seeded(seed),
            None => Jitter::from_entropy(),
        };
        Self {
            jitter: Mutex::new(jitter),
        }
    }

    pub fn synthesize(&self, count: usize) -> Vec<Trade> {
        self.synthesize_at(count, Utc::now())
    }

    /// Produce `count` demo trades relative to `now`, newest first.
    pub fn synthesize_at(&self, count: usize, now: DateTime<Utc>) -> Vec<Trade> {
        let mut jitter = match self.jitter.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut trades: Vec<Trade> = (0..count)
            .map(|i| synthetic_trade(&mut jitter, i, now))
            .collect();
        trades.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        trades
    }
}

fn synthetic_trade(jitter: &mut Jitter, index: usize, now: DateTime<Utc>) -> Trade {
    let age = if index < RECENT_TRADES {
        Duration::seconds(jitter.range_i64(0, 2 * 86_400))
    } else {
        Duration::seconds(jitter.range_i64(3 * 86_400, 33 * 86_400))
    };
    let timestamp = now - age;

    let (symbol, base, spread) = TOKEN_POOL[jitter.index(TOKEN_POOL.len())];
    let unit_price = base + jitter.range_f64(0.0, spread);
    let amount = plausible_amount(jitter, unit_price);
    let trade_type = if jitter.coin() {
        TradeType::Acquisition
    } else {
        TradeType::Disposition
    };
    let venue = VENUES[jitter.index(VENUES.len())];

    Trade::new(
        format!("demo-{}-{}", index + 1, timestamp.timestamp()),
        timestamp,
        trade_type,
        symbol,
        amount,
        unit_price,
        venue,
        true,
    )
    .with_notes(format!(
        "{} Test {} {} on {}",
        DEMO_MARKER, trade_type, symbol, venue
    ))
}

/// Cheaper assets trade in larger sizes.
fn plausible_amount(jitter: &mut Jitter, unit_price: f64) -> f64 {
    let (low, high) = if unit_price < 0.0001 {
        (1_000_000.0, 10_000_000.0)
    } else if unit_price < 0.01 {
        (1_000.0, 10_000.0)
    } else if unit_price < 0.1 {
        (100.0, 1_000.0)
    } else if unit_price < 1.0 {
        (20.0, 100.0)
    } else {
        (1.0, 11.0)
    };
    jitter.range_f64(low, high).floor().max(low)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_every_trade_is_marked() {
        let trades = FallbackSynthesizer::new(Some(1)).synthesize_at(4, now());

        assert_eq!(trades.len(), 4);
        for trade in &trades {
            assert!(trade.is_synthetic());
            assert!(trade.notes.as_deref().unwrap().contains("Test"));
            assert!(trade.amount > 0.0);
            assert_eq!(trade.total_value, trade.amount * trade.unit_price);
        }
    }

    #[test]
    fn test_newest_first_and_recent_skew() {
        let trades = FallbackSynthesizer::new(Some(5)).synthesize_at(6, now());

        for pair in trades.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
        let recent = trades
            .iter()
            .filter(|t| now() - t.timestamp < Duration::days(2))
            .count();
        assert!(recent >= 2);
        assert!(trades.iter().all(|t| now() - t.timestamp < Duration::days(33)));
    }

    #[test]
    fn test_prices_follow_pool() {
        let trades = FallbackSynthesizer::new(Some(11)).synthesize_at(20, now());

        for trade in &trades {
            let (_, base, spread) = TOKEN_POOL
                .iter()
                .find(|(symbol, _, _)| *symbol == trade.asset)
                .copied()
                .unwrap();
            assert!(trade.unit_price >= base && trade.unit_price <= base + spread);
            assert!(VENUES.contains(&trade.venue.as_str()));
        }
    }

    #[test]
    fn test_seeded_output_is_repeatable() {
        let a = FallbackSynthesizer::new(Some(3)).synthesize_at(4, now());
        let b = FallbackSynthesizer::new(Some(3)).synthesize_at(4, now());
        assert_eq!(a, b);
        assert!(FallbackSynthesizer::new(None).synthesize(0).is_empty());
    }
}
