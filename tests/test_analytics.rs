//! Aggregation and pattern-detection properties over hand-built trade sets.

use chrono::{DateTime, Duration, TimeZone, Utc};
use trade_lens::analysis::{FallbackSynthesizer, PatternDetector, TradeAggregator};
use trade_lens::{PatternKind, Trade, TradeType};

fn at(hours: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::hours(hours)
}

fn trade(id: &str, hours: i64, kind: TradeType, asset: &str, amount: f64, price: f64) -> Trade {
    Trade::new(id, at(hours), kind, asset, amount, price, "Raydium", true)
}

#[test]
fn test_profit_loss_is_cash_flow_sum() {
    let trades = vec![
        trade("1", 0, TradeType::Acquisition, "BONK", 1000.0, 0.25),
        trade("2", 5, TradeType::Disposition, "BONK", 400.0, 0.5),
        trade("3", 9, TradeType::Acquisition, "JUP", 20.0, 0.75),
        trade("4", 30, TradeType::Disposition, "JUP", 20.0, 1.0),
    ];

    let analysis = TradeAggregator::default().aggregate(&trades);

    // -250 + 200 - 15 + 20
    assert_eq!(analysis.total_profit_loss, -45.0);
    let per_asset: f64 = analysis.token_analyses.iter().map(|t| t.total_profit_loss).sum();
    assert_eq!(per_asset, analysis.total_profit_loss);
    assert_eq!(analysis.most_profitable_asset, "JUP");
    assert_eq!(analysis.least_profitable_asset, "BONK");
}

#[test]
fn test_empty_history_aggregates_to_defaults() {
    let analysis = TradeAggregator::default().aggregate(&[]);

    assert_eq!(analysis.total_profit_loss, 0.0);
    assert_eq!(analysis.average_hold_time, "N/A");
    assert!(analysis.token_analyses.is_empty());
}

#[test]
fn test_concentration_threshold_boundaries() {
    let detector = PatternDetector::default();

    // 5 of 6 trades on one asset
    let mut trades: Vec<Trade> = (0..5)
        .map(|i| trade(&format!("a{}", i), i * 100, TradeType::Acquisition, "A", 10.0, 1.0))
        .collect();
    trades.push(trade("b0", 600, TradeType::Acquisition, "B", 10.0, 1.0));
    let fired = detector
        .detect_patterns(&trades)
        .into_iter()
        .find(|p| p.kind == PatternKind::ConcentrationRisk)
        .unwrap();
    assert_eq!(fired.asset.as_deref(), Some("A"));
    assert_eq!(fired.trade_ids.len(), 5);

    // 4 of 5: the trade count never exceeds the minimum
    let trades: Vec<Trade> = trades.into_iter().skip(1).collect();
    assert_eq!(trades.len(), 5);
    assert!(detector
        .detect_patterns(&trades)
        .iter()
        .all(|p| p.kind != PatternKind::ConcentrationRisk));
}

#[test]
fn test_singleton_assets_produce_no_patterns() {
    let trades = vec![
        trade("1", 0, TradeType::Acquisition, "A", 10.0, 1.0),
        trade("2", 1, TradeType::Disposition, "B", 10.0, 5.0),
        trade("3", 2, TradeType::Acquisition, "C", 10.0, 1.0),
        trade("4", 3, TradeType::Acquisition, "D", 10.0, 1.0),
    ];

    assert!(PatternDetector::default().detect_patterns(&trades).is_empty());
}

#[test]
fn test_pattern_invariants() {
    let trades = vec![
        trade("1", 0, TradeType::Acquisition, "A", 10.0, 2.0),
        trade("2", 10, TradeType::Acquisition, "A", 10.0, 1.0),
        trade("3", 20, TradeType::Acquisition, "A", 10.0, 0.8),
        trade("4", 30, TradeType::Disposition, "A", 30.0, 3.0),
        trade("5", 40, TradeType::Disposition, "B", 5.0, 1.0),
        trade("6", 41, TradeType::Disposition, "B", 5.0, 1.0),
    ];

    let patterns = PatternDetector::default().detect_patterns(&trades);
    assert!(!patterns.is_empty());

    for pattern in &patterns {
        assert!(pattern.confidence <= 100);
        assert!(!pattern.trade_ids.is_empty());
        assert!(pattern
            .trade_ids
            .iter()
            .all(|id| trades.iter().any(|t| &t.id == id)));
    }

    let kinds: Vec<_> = patterns.iter().map(|p| p.kind).collect();
    assert!(kinds.contains(&PatternKind::BuyLowSellHigh));
    assert!(kinds.contains(&PatternKind::AveragingDown));
}

#[test]
fn test_detection_is_deterministic() {
    let trades: Vec<Trade> = (0..8)
        .map(|i| {
            let kind = if i % 3 == 0 { TradeType::Disposition } else { TradeType::Acquisition };
            trade(&format!("t{}", i), i * 6, kind, "X", 5.0, 1.0 + i as f64 * 0.1)
        })
        .collect();

    let detector = PatternDetector::default();
    assert_eq!(detector.detect_patterns(&trades), detector.detect_patterns(&trades));
}

#[test]
fn test_seeded_synthesizer_feeds_the_analytics() {
    let now = at(24 * 60);
    let first = FallbackSynthesizer::new(Some(9)).synthesize_at(5, now);
    let second = FallbackSynthesizer::new(Some(9)).synthesize_at(5, now);
    assert_eq!(first, second);

    assert!(first.iter().all(Trade::is_synthetic));
    assert!(first.iter().all(|t| t.timestamp <= now));

    let analysis = TradeAggregator::default().aggregate(&first);
    assert!(!analysis.recommendations.is_empty());
    assert!(analysis.token_analyses.len() <= 5);
}
