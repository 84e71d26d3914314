//! Pure exit detection: profit/stop rules plus the tie-break-favors-stop
//! rule when both would fire on the same candle.

use crate::types::{Candle, TradeAction, TradeStatus};

#[derive(Debug, Clone, Copy)]
pub struct ExitHit {
    pub status: TradeStatus,
    pub close_price: f64,
}

/// Evaluates one candle against a BUY/SELL position's target and stop. If
/// both would fire, the boundary closer to the candle's open wins; an exact
/// tie favors the stop (conservative).
pub fn check_exit(candle: &Candle, action: TradeAction, target_price: f64, stop_loss: f64) -> Option<ExitHit> {
    let (profit_hit, stop_hit) = match action {
        TradeAction::Buy => (candle.high >= target_price, candle.low <= stop_loss),
        TradeAction::Sell => (candle.low <= target_price, candle.high >= stop_loss),
    };

    match (profit_hit, stop_hit) {
        (true, false) => Some(ExitHit { status: TradeStatus::ProfitHit, close_price: target_price }),
        (false, true) => Some(ExitHit { status: TradeStatus::StopHit, close_price: stop_loss }),
        (true, true) => {
            let target_dist = (target_price - candle.open).abs();
            let stop_dist = (stop_loss - candle.open).abs();
            if stop_dist <= target_dist {
                Some(ExitHit { status: TradeStatus::StopHit, close_price: stop_loss })
            } else {
                Some(ExitHit { status: TradeStatus::ProfitHit, close_price: target_price })
            }
        }
        (false, false) => None,
    }
}

/// Signed PnL: positive for BUY on a rise, positive for SELL on a drop.
pub fn realized_pnl(action: TradeAction, entry_price: f64, close_price: f64) -> f64 {
    match action {
        TradeAction::Buy => close_price - entry_price,
        TradeAction::Sell => entry_price - close_price,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(o: f64, h: f64, l: f64) -> Candle {
        Candle { timestamp: "t".into(), open: o, high: h, low: l, close: o, volume: 0.0 }
    }

    #[test]
    fn buy_profit_only() {
        let hit = check_exit(&candle(145.0, 153.0, 144.0), TradeAction::Buy, 152.0, 140.0).unwrap();
        assert_eq!(hit.status, TradeStatus::ProfitHit);
        assert_eq!(hit.close_price, 152.0);
    }

    #[test]
    fn buy_stop_only() {
        let hit = check_exit(&candle(120.0, 121.0, 116.0), TradeAction::Buy, 130.0, 118.0).unwrap();
        assert_eq!(hit.status, TradeStatus::StopHit);
        assert_eq!(hit.close_price, 118.0);
    }

    #[test]
    fn s3_tie_break_favors_stop() {
        // S3: Active BUY SOLUSD/1h, entry 144.5, target 152.0, stop 140.0,
        // candle {o:145, h:152.5, l:139.5}.
        let hit = check_exit(&candle(145.0, 152.5, 139.5), TradeAction::Buy, 152.0, 140.0).unwrap();
        assert_eq!(hit.status, TradeStatus::StopHit);
        assert_eq!(hit.close_price, 140.0);
    }

    #[test]
    fn s4_realized_pnl_for_stop_hit_buy() {
        // S4: BUY closed as stop_hit, entry 118500, stop 116000.
        assert_eq!(realized_pnl(TradeAction::Buy, 118_500.0, 116_000.0), -2500.0);
    }

    #[test]
    fn sell_profit_and_stop_are_mirrored() {
        let hit = check_exit(&candle(100.0, 101.0, 94.0), TradeAction::Sell, 95.0, 105.0).unwrap();
        assert_eq!(hit.status, TradeStatus::ProfitHit);
        assert_eq!(hit.close_price, 95.0);
    }

    #[test]
    fn no_exit_when_neither_boundary_touched() {
        assert!(check_exit(&candle(100.0, 101.0, 99.0), TradeAction::Buy, 110.0, 90.0).is_none());
    }
}
