//! Behavioral pattern detection.
//!
//! Each kind is evaluated independently over a timestamp-sorted view of the
//! trades. Only assets with at least `min_trades_per_asset` trades take part.
//! Confidence scores are heuristic: a fixed base per kind plus seeded jitter,
//! so the same trades and seed always give the same output.

use super::jitter::Jitter;
use super::types::{Pattern, PatternConfig, PatternKind};
use crate::types::{Trade, TradeType};
use chrono::Duration;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct PatternDetector {
    config: PatternConfig,
}

/// Accumulates patterns with sequential ids.
struct PatternSink<'a> {
    patterns: Vec<Pattern>,
    jitter: &'a mut Jitter,
}

impl PatternSink<'_> {
    #[allow(clippy::too_many_arguments)]
    fn push(
        &mut self,
        kind: PatternKind,
        asset: Option<&str>,
        base: u8,
        spread: u8,
        description: String,
        suggested_action: &str,
        trades: &[&Trade],
    ) {
        let id = format!(
            "{}-{}-{}",
            kind.as_str(),
            asset.unwrap_or("portfolio"),
            self.patterns.len() + 1
        );
        self.patterns.push(Pattern {
            id,
            kind,
            asset: asset.map(str::to_string),
            confidence: self.jitter.confidence(base, spread),
            description,
            suggested_action: suggested_action.to_string(),
            trade_ids: trades.iter().map(|t| t.id.clone()).collect(),
        });
    }
}

impl PatternDetector {
    pub fn new(config: PatternConfig) -> Self {
        Self { config }
    }

    pub fn detect_patterns(&self, trades: &[Trade]) -> Vec<Pattern> {
        let mut sorted: Vec<&Trade> = trades.iter().collect();
        sorted.sort_by_key(|t| t.timestamp);

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for trade in &sorted {
            *counts.entry(trade.asset.as_str()).or_default() += 1;
        }

        let eligible: Vec<&Trade> = sorted
            .iter()
            .copied()
            .filter(|t| counts[t.asset.as_str()] >= self.config.min_trades_per_asset)
            .collect();
        if eligible.is_empty() {
            return Vec::new();
        }

        let mut jitter = Jitter::seeded(self.config.jitter_seed);
        let mut sink = PatternSink {
            patterns: Vec::new(),
            jitter: &mut jitter,
        };

        for (asset, group) in by_asset(&eligible) {
            self.buy_low_sell_high(&mut sink, asset, &group);
            self.averaging_down(&mut sink, asset, &group);
            self.momentum(&mut sink, asset, &group, TradeType::Acquisition);
            self.momentum(&mut sink, asset, &group, TradeType::Disposition);
        }

        self.concentration(&mut sink, &sorted, &eligible);
        let recent: Vec<&Trade> = sorted[sorted.len().saturating_sub(self.config.rapid_recent_trades)..]
            .iter()
            .copied()
            .filter(|t| counts[t.asset.as_str()] >= self.config.min_trades_per_asset)
            .collect();
        self.rapid_succession(&mut sink, &recent);
        self.reactive_selling(&mut sink, &eligible);
        self.accumulation_distribution(&mut sink, &eligible);

        debug!("Detected {} patterns over {} trades", sink.patterns.len(), trades.len());
        sink.patterns
    }

    /// Best acquisition/later-disposition pair by unit-price gain.
    fn buy_low_sell_high(&self, sink: &mut PatternSink<'_>, asset: &str, group: &[&Trade]) {
        let mut best: Option<(f64, &Trade, &Trade)> = None;

        for (i, buy) in group.iter().enumerate() {
            if !buy.is_acquisition() || buy.unit_price <= 0.0 {
                continue;
            }
            for sell in group.iter().skip(i + 1) {
                if !sell.is_disposition() || sell.timestamp <= buy.timestamp {
                    continue;
                }
                let gain = (sell.unit_price - buy.unit_price) / buy.unit_price * 100.0;
                if gain >= self.config.min_gain_percent
                    && best.map(|(g, _, _)| gain > g).unwrap_or(true)
                {
                    best = Some((gain, *buy, *sell));
                }
            }
        }

        let Some((gain, buy, sell)) = best else {
            return;
        };
        let days = (sell.timestamp - buy.timestamp).num_days();
        let base = if gain > self.config.strong_gain_percent { 80 } else { 60 };

        sink.push(
            PatternKind::BuyLowSellHigh,
            Some(asset),
            base,
            15,
            format!(
                "Bought {} and sold {} day(s) later for a {:.0}% gain",
                asset, days, gain
            ),
            "Document what drove this entry and exit so the setup can be repeated.",
            &[buy, sell],
        );
    }

    /// Largest drop between two consecutive acquisitions.
    fn averaging_down(&self, sink: &mut PatternSink<'_>, asset: &str, group: &[&Trade]) {
        let buys: Vec<&Trade> = group.iter().copied().filter(|t| t.is_acquisition()).collect();
        let mut best: Option<(f64, &Trade, &Trade)> = None;

        for pair in buys.windows(2) {
            let (first, second) = (pair[0], pair[1]);
            if first.unit_price <= 0.0 {
                continue;
            }
            let drop = (first.unit_price - second.unit_price) / first.unit_price * 100.0;
            if drop >= self.config.min_drop_percent
                && best.map(|(d, _, _)| drop > d).unwrap_or(true)
            {
                best = Some((drop, first, second));
            }
        }

        let Some((drop, first, second)) = best else {
            return;
        };
        let base = if drop > self.config.strong_drop_percent { 75 } else { 60 };

        sink.push(
            PatternKind::AveragingDown,
            Some(asset),
            base,
            15,
            format!(
                "Bought more {} after price dropped {:.0}%, lowering average cost basis",
                asset, drop
            ),
            "Set a limit on how much you add to a falling position.",
            &[first, second],
        );
    }

    /// Largest cluster of same-typed trades inside the momentum window.
    fn momentum(
        &self,
        sink: &mut PatternSink<'_>,
        asset: &str,
        group: &[&Trade],
        trade_type: TradeType,
    ) {
        let same: Vec<&Trade> = group
            .iter()
            .copied()
            .filter(|t| t.trade_type == trade_type)
            .collect();
        let window = Duration::days(self.config.momentum_window_days);

        let mut best: &[&Trade] = &[];
        for start in 0..same.len() {
            let end = same[start..]
                .iter()
                .take_while(|t| t.timestamp - same[start].timestamp <= window)
                .count();
            if end > best.len() {
                best = &same[start..start + end];
            }
        }

        if best.len() < self.config.momentum_min_trades {
            return;
        }

        let (Some(first), Some(last)) = (best.first(), best.last()) else {
            return;
        };
        let span_days = (last.timestamp - first.timestamp).num_days().max(1);
        let verb = match trade_type {
            TradeType::Acquisition => "Accumulated",
            TradeType::Disposition => "Distributed",
        };
        let base = if best.len() >= 5 { 75 } else { 60 };

        sink.push(
            PatternKind::MomentumClustering,
            Some(asset),
            base,
            15,
            format!("{} {} with {} txns in {} day(s)", verb, asset, best.len(), span_days),
            "Check whether these trades followed a plan or chased a price move.",
            best,
        );
    }

    /// One asset holding more than the configured share of a large enough trade set.
    fn concentration(&self, sink: &mut PatternSink<'_>, sorted: &[&Trade], eligible: &[&Trade]) {
        let total = sorted.len();
        if total <= self.config.concentration_min_trades {
            return;
        }

        let mut top: Option<(&str, Vec<&Trade>)> = None;
        for (asset, group) in by_asset(eligible) {
            if top.as_ref().map(|(_, best)| group.len() > best.len()).unwrap_or(true) {
                top = Some((asset, group));
            }
        }
        let Some((asset, group)) = top else {
            return;
        };

        let share = group.len() as f64 / total as f64;
        if share <= self.config.concentration_share {
            return;
        }

        sink.push(
            PatternKind::ConcentrationRisk,
            Some(asset),
            80,
            15,
            format!(
                "Over {:.0}% of your recent activity involves {} ({} of {} trades)",
                self.config.concentration_share * 100.0,
                asset,
                group.len(),
                total
            ),
            "Consider diversifying across more assets to reduce single-asset risk.",
            &group,
        );
    }

    /// Short gaps between consecutive acquisitions. `recent` is the eligible
    /// part of the most recent trades overall.
    fn rapid_succession(&self, sink: &mut PatternSink<'_>, recent: &[&Trade]) {
        let buys: Vec<&Trade> = recent.iter().copied().filter(|t| t.is_acquisition()).collect();
        let involved = short_gap_trades(&buys, Duration::hours(self.config.rapid_gap_hours));

        let Some((gaps, involved)) = involved else {
            return;
        };
        if gaps < self.config.min_short_gaps {
            return;
        }

        sink.push(
            PatternKind::RapidSuccession,
            None,
            60,
            25,
            format!(
                "{} acquisitions came within {} hours of the previous one",
                gaps, self.config.rapid_gap_hours
            ),
            "Consider planning entries in advance and spreading buys over time.",
            &involved,
        );
    }

    /// Short gaps between consecutive dispositions.
    fn reactive_selling(&self, sink: &mut PatternSink<'_>, eligible: &[&Trade]) {
        let sells: Vec<&Trade> = eligible.iter().copied().filter(|t| t.is_disposition()).collect();
        let involved = short_gap_trades(&sells, Duration::hours(self.config.reactive_gap_hours));

        let Some((gaps, involved)) = involved else {
            return;
        };
        if gaps < self.config.min_short_gaps {
            return;
        }

        sink.push(
            PatternKind::ReactiveSelling,
            None,
            65,
            20,
            format!(
                "{} dispositions followed the previous one within {} hours",
                gaps, self.config.reactive_gap_hours
            ),
            "Consider setting exit rules ahead of time instead of selling into short-term moves.",
            &involved,
        );
    }

    fn accumulation_distribution(&self, sink: &mut PatternSink<'_>, eligible: &[&Trade]) {
        let buys: Vec<&Trade> = eligible.iter().copied().filter(|t| t.is_acquisition()).collect();
        let sells: Vec<&Trade> = eligible.iter().copied().filter(|t| t.is_disposition()).collect();
        let ratio = buys.len() as f64 / eligible.len() as f64;

        if eligible.len() >= 5 && ratio > 0.8 {
            sink.push(
                PatternKind::Accumulation,
                None,
                70,
                20,
                format!(
                    "{:.0}% of your recent trades are acquisitions ({} of {})",
                    ratio * 100.0,
                    buys.len(),
                    eligible.len()
                ),
                "Decide on exit targets for the positions you are building.",
                &buys,
            );
        }

        if ratio < 0.2 && sells.len() > 3 {
            sink.push(
                PatternKind::Distribution,
                None,
                65,
                20,
                format!(
                    "{:.0}% of your recent trades are dispositions ({} of {})",
                    (1.0 - ratio) * 100.0,
                    sells.len(),
                    eligible.len()
                ),
                "Review whether you are exiting on plan or reducing exposure under pressure.",
                &sells,
            );
        }
    }
}

/// Group a sorted slice by asset in first-appearance order.
fn by_asset<'a>(trades: &[&'a Trade]) -> Vec<(&'a str, Vec<&'a Trade>)> {
    let mut groups: Vec<(&'a str, Vec<&'a Trade>)> = Vec::new();
    for trade in trades {
        match groups.iter_mut().find(|(asset, _)| *asset == trade.asset) {
            Some((_, group)) => group.push(*trade),
            None => groups.push((trade.asset.as_str(), vec![*trade])),
        }
    }
    groups
}

/// Count consecutive gaps shorter than `max_gap` and collect the trades on
/// either side of them. `None` when there are fewer than two trades.
fn short_gap_trades<'a>(trades: &[&'a Trade], max_gap: Duration) -> Option<(usize, Vec<&'a Trade>)> {
    if trades.len() < 2 {
        return None;
    }

    let mut gaps = 0;
    let mut involved: Vec<&Trade> = Vec::new();
    for pair in trades.windows(2) {
        if pair[1].timestamp - pair[0].timestamp < max_gap {
            gaps += 1;
            for trade in pair {
                if !involved.iter().any(|t| t.id == trade.id) {
                    involved.push(*trade);
                }
            }
        }
    }

    Some((gaps, involved))
}
