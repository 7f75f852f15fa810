//! Trade aggregation into wallet-level analytics.
//!
//! Profit/loss here is a naive cash-flow figure: acquisitions subtract their
//! value, dispositions add theirs, with no lot matching. It is a lower bound
//! for a wallet that still holds what it bought. Only the per-asset
//! "profitable trades" count uses FIFO lots.

use super::types::{
    round_to, AggregatorConfig, FrequencyClass, TokenAnalysis, TradeExtreme, TradeFrequency,
    WalletAnalysis, NOT_AVAILABLE,
};
use crate::types::{Trade, TradeType};
use chrono::{DateTime, Utc};
use nonempty::NonEmpty;
use std::collections::VecDeque;
use tracing::debug;

const SECONDS_PER_DAY: i64 = 86_400;
const SECONDS_PER_WEEK: f64 = 7.0 * 86_400.0;
const LOT_EPSILON: f64 = 1e-12;

const RECOMMEND_HOLD_LONGER: &str = "Consider holding assets longer for better potential returns.";
const RECOMMEND_DIVERSIFY: &str =
    "Your portfolio could benefit from diversification across more assets.";
const RECOMMEND_SLOW_DOWN: &str =
    "Your trading frequency is high. Consider a more strategic approach to reduce fees.";
const RECOMMEND_CONSOLIDATE: &str = "Many of your transactions are very small. Consider consolidating into larger trades to minimize fees.";
const RECOMMEND_CONTINUE: &str = "Continue your current strategy as it appears to be working well.";

/// Pure aggregation over an immutable trade slice.
#[derive(Debug, Clone, Default)]
pub struct TradeAggregator {
    config: AggregatorConfig,
}

/// Running hold-time total for one asset.
#[derive(Debug, Clone, Copy, Default)]
struct HoldStats {
    total_seconds: i64,
    pairs: i64,
}

impl HoldStats {
    fn merge(&mut self, other: HoldStats) {
        self.total_seconds += other.total_seconds;
        self.pairs += other.pairs;
    }

    fn average_seconds(&self) -> Option<i64> {
        (self.pairs > 0).then(|| self.total_seconds / self.pairs)
    }
}

/// FIFO outcome for one asset.
#[derive(Debug, Clone, Copy, Default)]
struct LotOutcome {
    matched: usize,
    profitable: usize,
}

impl TradeAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    /// Compute a fresh [`WalletAnalysis`]. Never fails; an empty slice yields
    /// [`WalletAnalysis::empty`].
    pub fn aggregate(&self, trades: &[Trade]) -> WalletAnalysis {
        if trades.is_empty() {
            return WalletAnalysis::empty();
        }

        let successful = trades.iter().filter(|t| t.successful).count();
        let overall_success_rate = round_to(successful as f64 / trades.len() as f64 * 100.0, 1);
        let total_profit_loss = round_to(trades.iter().map(Trade::cash_flow).sum(), 2);

        let mut overall_hold = HoldStats::default();
        let mut token_analyses = Vec::new();
        for (asset, group) in group_by_asset(trades) {
            let ordered = chronological(&group);
            let hold = hold_stats(&ordered);
            overall_hold.merge(hold);
            token_analyses.push(token_analysis(asset, &ordered, hold));
        }

        // Stable, so ties keep first-appearance order
        token_analyses.sort_by(|a, b| b.total_profit_loss.total_cmp(&a.total_profit_loss));

        let most_profitable_asset = token_analyses
            .first()
            .map(|t| t.symbol.clone())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());
        let least_profitable_asset = token_analyses
            .last()
            .map(|t| t.symbol.clone())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());

        let average_hold_seconds = overall_hold.average_seconds();
        let trade_frequency = frequency(trades);
        let recommendations =
            self.recommendations(trades, &token_analyses, average_hold_seconds, trade_frequency);

        debug!(
            "Aggregated {} trades across {} assets, P/L {:.2}",
            trades.len(),
            token_analyses.len(),
            total_profit_loss
        );

        WalletAnalysis {
            overall_success_rate,
            total_profit_loss,
            most_profitable_asset,
            least_profitable_asset,
            average_hold_time: format_hold_time(average_hold_seconds),
            average_hold_seconds,
            trade_frequency,
            recommendations,
            token_analyses,
        }
    }

    fn recommendations(
        &self,
        trades: &[Trade],
        token_analyses: &[TokenAnalysis],
        average_hold_seconds: Option<i64>,
        frequency: TradeFrequency,
    ) -> Vec<String> {
        let mut out = Vec::new();

        if let Some(seconds) = average_hold_seconds {
            if seconds < self.config.short_hold_days * SECONDS_PER_DAY {
                out.push(RECOMMEND_HOLD_LONGER.to_string());
            }
        }

        if token_analyses.len() == 1 {
            out.push(RECOMMEND_DIVERSIFY.to_string());
        }

        if frequency.class == FrequencyClass::High {
            out.push(RECOMMEND_SLOW_DOWN.to_string());
        }

        let small = trades
            .iter()
            .filter(|t| t.effective_amount() < self.config.small_trade_amount)
            .count();
        if small * 3 > trades.len() {
            out.push(RECOMMEND_CONSOLIDATE.to_string());
        }

        if out.is_empty() {
            out.push(RECOMMEND_CONTINUE.to_string());
        }
        out
    }
}

/// Partition by asset, keeping first-appearance order of assets and input
/// order within each group.
fn group_by_asset(trades: &[Trade]) -> Vec<(String, NonEmpty<&Trade>)> {
    let mut groups: Vec<(String, NonEmpty<&Trade>)> = Vec::new();

    for trade in trades {
        match groups.iter_mut().find(|(asset, _)| *asset == trade.asset) {
            Some((_, group)) => group.push(trade),
            None => groups.push((trade.asset.clone(), NonEmpty::new(trade))),
        }
    }

    groups
}

fn chronological<'a>(group: &NonEmpty<&'a Trade>) -> Vec<&'a Trade> {
    let mut ordered: Vec<&Trade> = group.iter().copied().collect();
    ordered.sort_by_key(|t| t.timestamp);
    ordered
}

/// Each disposition closes the most recent open acquisition.
fn hold_stats(ordered: &[&Trade]) -> HoldStats {
    let mut stats = HoldStats::default();
    let mut open: Option<DateTime<Utc>> = None;

    for trade in ordered {
        match trade.trade_type {
            TradeType::Acquisition => open = Some(trade.timestamp),
            TradeType::Disposition => {
                if let Some(opened) = open.take() {
                    stats.total_seconds += (trade.timestamp - opened).num_seconds();
                    stats.pairs += 1;
                }
            }
        }
    }

    stats
}

/// Match dispositions against acquisition lots oldest-first.
fn fifo_outcome(ordered: &[&Trade]) -> LotOutcome {
    let mut lots: VecDeque<(f64, f64)> = VecDeque::new();
    let mut outcome = LotOutcome::default();

    for trade in ordered {
        let amount = trade.effective_amount();
        if amount <= 0.0 {
            continue;
        }
        let unit_price = trade.effective_value() / amount;

        match trade.trade_type {
            TradeType::Acquisition => lots.push_back((amount, unit_price)),
            TradeType::Disposition => {
                let mut remaining = amount;
                let mut matched_qty = 0.0;
                let mut cost = 0.0;

                while remaining > LOT_EPSILON {
                    let Some(front) = lots.front_mut() else {
                        break;
                    };
                    let take = remaining.min(front.0);
                    matched_qty += take;
                    cost += take * front.1;
                    remaining -= take;
                    front.0 -= take;
                    if front.0 <= LOT_EPSILON {
                        lots.pop_front();
                    }
                }

                if matched_qty > 0.0 {
                    outcome.matched += 1;
                    if matched_qty * unit_price > cost {
                        outcome.profitable += 1;
                    }
                }
            }
        }
    }

    outcome
}

fn token_analysis(symbol: String, ordered: &[&Trade], hold: HoldStats) -> TokenAnalysis {
    let lots = fifo_outcome(ordered);
    let success_rate = if lots.matched > 0 {
        round_to(lots.profitable as f64 / lots.matched as f64 * 100.0, 1)
    } else {
        0.0
    };
    let total_profit_loss = round_to(ordered.iter().map(|t| t.cash_flow()).sum(), 2);

    // `ordered` comes from a NonEmpty group
    let mut best = ordered[0];
    let mut worst = ordered[0];
    for trade in ordered.iter().skip(1) {
        if trade.effective_value() > best.effective_value() {
            best = trade;
        }
        if trade.effective_value() < worst.effective_value() {
            worst = trade;
        }
    }

    TokenAnalysis {
        name: symbol.clone(),
        symbol,
        total_trades: ordered.len(),
        profitable_trades: lots.profitable,
        success_rate,
        total_profit_loss,
        average_hold_time: format_hold_time(hold.average_seconds()),
        best_trade: extreme(best),
        worst_trade: extreme(worst),
    }
}

fn extreme(trade: &Trade) -> TradeExtreme {
    TradeExtreme {
        trade_id: trade.id.clone(),
        value: round_to(trade.effective_value(), 2),
        date: trade.timestamp,
    }
}

/// Trades per week over the span between the first and last trade, with a
/// one-week floor on the span.
fn frequency(trades: &[Trade]) -> TradeFrequency {
    let first = trades.iter().map(|t| t.timestamp).min();
    let last = trades.iter().map(|t| t.timestamp).max();

    let weeks = match (first, last) {
        (Some(first), Some(last)) => (last - first).num_seconds() as f64 / SECONDS_PER_WEEK,
        _ => 0.0,
    };

    TradeFrequency::from_rate(trades.len() as f64 / weeks.max(1.0))
}

/// "N day(s), M hour(s)", "N hour(s), M minute(s)" or "N minute(s)".
pub fn format_hold_time(seconds: Option<i64>) -> String {
    let Some(seconds) = seconds else {
        return NOT_AVAILABLE.to_string();
    };
    let seconds = seconds.max(0);

    let days = seconds / SECONDS_PER_DAY;
    let hours = (seconds % SECONDS_PER_DAY) / 3600;
    let minutes = (seconds % 3600) / 60;

    if days > 0 {
        if hours > 0 {
            format!("{} day(s), {} hour(s)", days, hours)
        } else {
            format!("{} day(s)", days)
        }
    } else if hours > 0 {
        if minutes > 0 {
            format!("{} hour(s), {} minute(s)", hours, minutes)
        } else {
            format!("{} hour(s)", hours)
        }
    } else {
        format!("{} minute(s)", minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(days: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(days)
    }

    fn trade(id: &str, day: i64, kind: TradeType, asset: &str, amount: f64, price: f64) -> Trade {
        Trade::new(id, at(day), kind, asset, amount, price, "Jupiter", true)
    }

    #[test]
    fn test_empty_input() {
        let analysis = TradeAggregator::default().aggregate(&[]);
        assert_eq!(analysis, WalletAnalysis::empty());
    }

    #[test]
    fn test_round_trip_profit_and_hold() {
        let trades = vec![
            trade("a", 0, TradeType::Acquisition, "X", 10.0, 1.0),
            trade("b", 1, TradeType::Disposition, "X", 10.0, 1.5),
        ];
        let analysis = TradeAggregator::default().aggregate(&trades);

        assert_eq!(analysis.total_profit_loss, 5.0);
        assert_eq!(analysis.average_hold_time, "1 day(s)");
        assert_eq!(analysis.average_hold_seconds, Some(86_400));
        assert_eq!(analysis.overall_success_rate, 100.0);

        let x = &analysis.token_analyses[0];
        assert_eq!(x.profitable_trades, 1);
        assert_eq!(x.success_rate, 100.0);
        assert_eq!(x.best_trade.trade_id, "b");
        assert_eq!(x.worst_trade.trade_id, "a");
        assert_eq!(analysis.distinct_least_profitable(), None);
        assert_eq!(analysis.least_profitable_asset, "X");
    }

    #[test]
    fn test_success_rate_uses_flag() {
        let mut failed = trade("b", 1, TradeType::Acquisition, "X", 1.0, 1.0);
        failed.successful = false;
        let trades = vec![trade("a", 0, TradeType::Acquisition, "X", 1.0, 1.0), failed];

        let analysis = TradeAggregator::default().aggregate(&trades);
        assert_eq!(analysis.overall_success_rate, 50.0);
    }

    #[test]
    fn test_ranking_and_grouping_order() {
        let trades = vec![
            trade("1", 0, TradeType::Acquisition, "LOSS", 10.0, 1.0),
            trade("2", 0, TradeType::Disposition, "GAIN", 10.0, 2.0),
            trade("3", 1, TradeType::Disposition, "FLAT", 1.0, 0.0),
        ];
        let analysis = TradeAggregator::default().aggregate(&trades);

        let order: Vec<_> = analysis.token_analyses.iter().map(|t| t.symbol.as_str()).collect();
        assert_eq!(order, vec!["GAIN", "FLAT", "LOSS"]);
        assert_eq!(analysis.most_profitable_asset, "GAIN");
        assert_eq!(analysis.distinct_least_profitable(), Some("LOSS"));
        assert_eq!(analysis.average_hold_time, NOT_AVAILABLE);
    }

    #[test]
    fn test_hold_time_uses_most_recent_open_acquisition() {
        let trades = vec![
            trade("a", 0, TradeType::Acquisition, "X", 1.0, 1.0),
            trade("b", 4, TradeType::Acquisition, "X", 1.0, 1.0),
            trade("c", 6, TradeType::Disposition, "X", 1.0, 1.0),
            trade("d", 7, TradeType::Disposition, "X", 1.0, 1.0),
        ];
        let analysis = TradeAggregator::default().aggregate(&trades);

        assert_eq!(analysis.average_hold_time, "2 day(s)");
    }

    #[test]
    fn test_fifo_profitability() {
        let trades = vec![
            trade("a", 0, TradeType::Acquisition, "X", 5.0, 1.0),
            trade("b", 1, TradeType::Acquisition, "X", 5.0, 3.0),
            trade("c", 2, TradeType::Disposition, "X", 5.0, 2.0),
            trade("d", 3, TradeType::Disposition, "X", 5.0, 2.0),
            trade("e", 4, TradeType::Disposition, "X", 5.0, 2.0),
        ];
        let analysis = TradeAggregator::default().aggregate(&trades);
        let x = &analysis.token_analyses[0];

        // c beats the 1.0 lot, d loses to the 3.0 lot, e has nothing to match
        assert_eq!(x.profitable_trades, 1);
        assert_eq!(x.success_rate, 50.0);
    }

    #[test]
    fn test_frequency_floor_of_one_week() {
        let trades: Vec<Trade> = (0..12)
            .map(|i| trade(&i.to_string(), 0, TradeType::Acquisition, "X", 1.0, 1.0))
            .collect();
        let analysis = TradeAggregator::default().aggregate(&trades);

        assert_eq!(analysis.trade_frequency.class, FrequencyClass::High);
        assert_eq!(analysis.trade_frequency.trades_per_week, 12.0);
        assert!(analysis.recommendations.contains(&RECOMMEND_SLOW_DOWN.to_string()));
    }

    #[test]
    fn test_recommendation_order() {
        let trades = vec![
            trade("a", 0, TradeType::Acquisition, "X", 0.001, 1.0),
            trade("b", 1, TradeType::Disposition, "X", 0.001, 1.0),
        ];
        let analysis = TradeAggregator::default().aggregate(&trades);

        assert_eq!(
            analysis.recommendations,
            vec![
                RECOMMEND_HOLD_LONGER.to_string(),
                RECOMMEND_DIVERSIFY.to_string(),
                RECOMMEND_CONSOLIDATE.to_string(),
            ]
        );
    }

    #[test]
    fn test_default_recommendation() {
        let trades = vec![
            trade("a", 0, TradeType::Acquisition, "X", 1.0, 1.0),
            trade("b", 30, TradeType::Disposition, "X", 1.0, 1.0),
            trade("c", 31, TradeType::Acquisition, "Y", 1.0, 1.0),
        ];
        let analysis = TradeAggregator::default().aggregate(&trades);

        assert_eq!(analysis.recommendations, vec![RECOMMEND_CONTINUE.to_string()]);
    }

    #[test]
    fn test_malformed_trade_is_zero_contribution() {
        let trades = vec![
            trade("a", 0, TradeType::Disposition, "X", 10.0, 1.0),
            trade("b", 1, TradeType::Acquisition, "X", -5.0, 1.0),
        ];
        let analysis = TradeAggregator::default().aggregate(&trades);

        assert_eq!(analysis.total_profit_loss, 10.0);
    }

    #[test]
    fn test_input_not_mutated() {
        let trades = vec![
            trade("late", 5, TradeType::Disposition, "X", 1.0, 1.0),
            trade("early", 0, TradeType::Acquisition, "X", 1.0, 1.0),
        ];
        let before = trades.clone();
        let analysis = TradeAggregator::default().aggregate(&trades);

        assert_eq!(trades, before);
        assert_eq!(analysis.average_hold_time, "5 day(s)");
    }

    #[test]
    fn test_format_hold_time() {
        assert_eq!(format_hold_time(None), NOT_AVAILABLE);
        assert_eq!(format_hold_time(Some(90_000)), "1 day(s), 1 hour(s)");
        assert_eq!(format_hold_time(Some(5_400)), "1 hour(s), 30 minute(s)");
        assert_eq!(format_hold_time(Some(7_200)), "2 hour(s)");
        assert_eq!(format_hold_time(Some(59)), "0 minute(s)");
    }
}
