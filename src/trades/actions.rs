//! AI-driven actions on an existing trade: MAINTAIN / MODIFY / CLOSE /
//! REPLACE. Callers (`trades::TradeEngine`) hold the per-`(ticker,
//! timeframe)` lock for the duration of these calls.

use crate::db::trades::TradeFieldPatch;
use crate::db::Store;
use crate::errors::{AppError, AppResult};
use crate::types::{Trade, TradeStatus, TradeUpdate, UpdateType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiAction {
    Maintain,
    Modify,
    Close,
    Replace,
}

impl AiAction {
    /// Parses a (case-insensitive, trimmed) `previous_position_status`.
    /// `NEW` has no meaning on an *existing* trade and is not an AiAction --
    /// it only applies to the MAINTAIN-gate on trade creation.
    pub fn parse(status: &str) -> Option<Self> {
        match status.trim().to_ascii_uppercase().as_str() {
            "MAINTAIN" => Some(AiAction::Maintain),
            "MODIFY" => Some(AiAction::Modify),
            "CLOSE" => Some(AiAction::Close),
            "REPLACE" => Some(AiAction::Replace),
            _ => None,
        }
    }
}

/// `MAINTAIN`: no trade mutation beyond an audit row.
pub fn maintain(store: &Store, trade: &Trade, notes: Option<String>) -> AppResult<()> {
    store.insert_trade_update(&TradeUpdate {
        id: 0,
        trade_id: trade.id,
        timestamp: chrono::Utc::now().to_rfc3339(),
        price: trade.current_price,
        update_type: UpdateType::Maintain,
        payload: serde_json::json!({}),
        notes,
    })?;
    Ok(())
}

/// `MODIFY`: updates target/stop only; entry and status are preserved.
pub fn modify(
    store: &Store,
    trade: &Trade,
    new_target: f64,
    new_stop: f64,
    notes: Option<String>,
) -> AppResult<()> {
    store.update_trade_fields(
        trade.id,
        &trade.updated_at,
        TradeFieldPatch { target_price: Some(new_target), stop_loss: Some(new_stop), ..Default::default() },
    )?;
    store.insert_trade_update(&TradeUpdate {
        id: 0,
        trade_id: trade.id,
        timestamp: chrono::Utc::now().to_rfc3339(),
        price: trade.current_price,
        update_type: UpdateType::Modify,
        payload: serde_json::json!({ "new_target": new_target, "new_stop": new_stop }),
        notes,
    })?;
    Ok(())
}

/// `CLOSE`: closes at `close_price` (current price, or an AI-supplied
/// price) with reason `ai_closed`.
pub fn close(store: &Store, trade: &Trade, close_price: f64, notes: Option<String>) -> AppResult<()> {
    store.close_trade(trade.id, close_price, TradeStatus::AiClosed, serde_json::json!({ "notes": notes }))
}

/// `REPLACE`: close as `ai_closed`. The caller (which owns the lock and the
/// fresh analysis data) is responsible for then calling
/// `TradeEngine::create_trade_from_analysis` for the replacement -- that
/// call is itself subject to the MAINTAIN gate on the *new* trade's own
/// context assessment, so it cannot be folded into this function without
/// re-entering the creation path from inside it.
pub fn replace_close_leg(store: &Store, trade: &Trade, close_price: f64) -> AppResult<()> {
    store.close_trade(trade.id, close_price, TradeStatus::AiClosed, serde_json::json!({ "reason": "replace" }))
}

pub fn terminal_reason_requires_price(reason: &str) -> AppResult<()> {
    if reason.trim().is_empty() {
        return Err(AppError::Validation("close reason must not be empty".into()));
    }
    Ok(())
}
