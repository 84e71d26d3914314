//! Pure entry-strategy classification and trigger detection. No I/O, no
//! persistence -- `trades::mod` fetches candles and calls these.

use crate::types::{Candle, EntryStrategy, TradeAction};
use regex::Regex;
use std::sync::OnceLock;

fn breakout_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)breakout|break above|break below|breaks? through").unwrap())
}

/// Classifies an entry condition's text as breakout or pullback/traditional.
pub fn classify_entry_strategy(entry_condition: &str) -> EntryStrategy {
    if breakout_re().is_match(entry_condition) {
        EntryStrategy::Breakout
    } else {
        EntryStrategy::Pullback
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TriggerHit {
    pub timestamp_index: usize,
    pub price: f64,
}

/// Trigger-hit classification law: traditional BUY fires on `low <= entry`,
/// breakout BUY fires on `high >= entry`; SELL is the mirror image. Returns
/// the first candle (in iteration order) that satisfies the rule.
pub fn check_trigger(
    candles: &[Candle],
    entry_price: f64,
    action: TradeAction,
    strategy: EntryStrategy,
) -> Option<TriggerHit> {
    for (i, candle) in candles.iter().enumerate() {
        let hit = match (action, strategy) {
            (TradeAction::Buy, EntryStrategy::Pullback) => candle.low <= entry_price,
            (TradeAction::Buy, EntryStrategy::Breakout) => candle.high >= entry_price,
            (TradeAction::Sell, EntryStrategy::Pullback) => candle.high >= entry_price,
            (TradeAction::Sell, EntryStrategy::Breakout) => candle.low <= entry_price,
        };
        if hit {
            let price = match (action, strategy) {
                (TradeAction::Buy, EntryStrategy::Pullback) => candle.low,
                (TradeAction::Buy, EntryStrategy::Breakout) => candle.high,
                (TradeAction::Sell, EntryStrategy::Pullback) => candle.high,
                (TradeAction::Sell, EntryStrategy::Breakout) => candle.low,
            };
            return Some(TriggerHit { timestamp_index: i, price });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(h: f64, l: f64) -> Candle {
        Candle { timestamp: "t".into(), open: (h + l) / 2.0, high: h, low: l, close: (h + l) / 2.0, volume: 0.0 }
    }

    #[test]
    fn classify_detects_breakout_phrases_case_insensitively() {
        assert_eq!(classify_entry_strategy("Break above resistance at 100"), EntryStrategy::Breakout);
        assert_eq!(classify_entry_strategy("BREAKOUT confirmed"), EntryStrategy::Breakout);
        assert_eq!(classify_entry_strategy("price breaks through support"), EntryStrategy::Breakout);
        assert_eq!(classify_entry_strategy("pullback to support zone"), EntryStrategy::Pullback);
        assert_eq!(classify_entry_strategy("wait for dip"), EntryStrategy::Pullback);
    }

    #[test]
    fn traditional_buy_triggers_on_low_touching_entry() {
        let candles = vec![candle(105.0, 101.0), candle(104.0, 99.0)];
        let hit = check_trigger(&candles, 100.0, TradeAction::Buy, EntryStrategy::Pullback).unwrap();
        assert_eq!(hit.timestamp_index, 1);
        assert_eq!(hit.price, 99.0);
    }

    #[test]
    fn breakout_buy_triggers_on_high_touching_entry() {
        // S2: BTCUSD/1h breakout BUY, entry 100.0
        let candles = vec![candle(100.5, 99.0), candle(99.5, 98.0)];
        let hit = check_trigger(&candles, 100.0, TradeAction::Buy, EntryStrategy::Breakout).unwrap();
        assert_eq!(hit.timestamp_index, 0);
        assert_eq!(hit.price, 100.5);
    }

    #[test]
    fn breakout_sell_triggers_on_low_touching_entry() {
        let candles = vec![candle(101.0, 100.0)];
        let hit = check_trigger(&candles, 100.0, TradeAction::Sell, EntryStrategy::Breakout).unwrap();
        assert_eq!(hit.price, 100.0);
    }

    #[test]
    fn no_trigger_returns_none() {
        let candles = vec![candle(105.0, 102.0)];
        assert!(check_trigger(&candles, 100.0, TradeAction::Buy, EntryStrategy::Pullback).is_none());
    }
}
