//! Per-`(ticker, timeframe)` trade state machine. Every mutation acquires
//! a keyed lock for the duration of the change; different keys proceed in
//! parallel, sharded with `dashmap` rather than one global mutex.

pub mod actions;
pub mod exits;
pub mod triggers;

use crate::context::is_maintain;
use crate::db::trades::TradeFieldPatch;
use crate::db::Store;
use crate::errors::{AppError, AppResult};
use crate::types::{Analysis, Candle, Timeframe, Trade, TradeStatus, TradeUpdate, UpdateType};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

/// How long after creation a trade is exempt from exit evaluation, to avoid
/// an immediate false closure on a stale candle fetched before the market
/// has moved past the entry.
pub const GRACE_PERIOD_MINUTES: i64 = 5;

type TradeKey = (String, Timeframe);

pub struct TradeEngine {
    store: Store,
    locks: DashMap<TradeKey, Arc<AsyncMutex<()>>>,
}

impl TradeEngine {
    pub fn new(store: Store) -> Self {
        Self { store, locks: DashMap::new() }
    }

    fn lock_for(&self, ticker: &str, timeframe: Timeframe) -> Arc<AsyncMutex<()>> {
        self.locks
            .entry((ticker.to_string(), timeframe))
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Steps 1-5 of trade creation from an analysis. Returns `Conflict` if
    /// blocked by MAINTAIN, an unsupported action, or an existing open
    /// trade; the caller treats any `Err` as "refused, no trade created."
    pub async fn create_trade_from_analysis(
        &self,
        ticker: &str,
        timeframe: Timeframe,
        analysis: &Analysis,
        context: &serde_json::Value,
    ) -> AppResult<Trade> {
        let key_lock = self.lock_for(ticker, timeframe);
        let _guard = key_lock.lock().await;

        let previous_status = analysis
            .context_assessment
            .get("previous_position_status")
            .and_then(|v| v.as_str());
        if is_maintain(previous_status) {
            return Err(AppError::Conflict("MAINTAIN verdict blocks new trade creation".into()));
        }

        let action = analysis
            .recommendation
            .action
            .as_trade_action()
            .ok_or_else(|| AppError::Conflict("recommendation action is not buy/sell".into()))?;

        if self.store.get_active_trade(ticker, timeframe)?.is_some() {
            return Err(AppError::Conflict(format!(
                "an open trade already exists for {ticker}/{timeframe}"
            )));
        }

        let entry_condition = analysis
            .detailed_analysis
            .get("trading_analysis")
            .and_then(|t| t.get("entry_strategies"))
            .and_then(|s| s.as_array())
            .and_then(|arr| arr.first())
            .and_then(|e| e.get("entry_condition"))
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let strategy = triggers::classify_entry_strategy(entry_condition);

        let entry_price = analysis.recommendation.entry_price.ok_or_else(|| {
            AppError::Validation("recommendation missing entry_price".into())
        })?;
        let target_price = analysis.recommendation.target_price.ok_or_else(|| {
            AppError::Validation("recommendation missing target_price".into())
        })?;
        let stop_loss = analysis.recommendation.stop_loss.ok_or_else(|| {
            AppError::Validation("recommendation missing stop_loss".into())
        })?;

        let now = chrono::Utc::now().to_rfc3339();
        let trade = Trade {
            id: 0,
            analysis_id: analysis.id,
            ticker: ticker.to_string(),
            timeframe,
            action,
            entry_price,
            target_price,
            stop_loss,
            entry_condition: entry_condition.to_string(),
            entry_strategy: strategy,
            created_at: now.clone(),
            updated_at: now,
            status: TradeStatus::Waiting,
            trigger_hit_time: None,
            trigger_hit_price: None,
            current_price: None,
            unrealized_pnl: None,
            realized_pnl: None,
            close_time: None,
            close_price: None,
            close_reason: None,
            close_details: None,
            original_analysis_snapshot: serde_json::to_value(analysis).unwrap_or_default(),
            original_context_snapshot: context.clone(),
        };

        let id = self.store.insert_trade(&trade)?;
        self.store.get_trade(id)
    }

    /// Fetches candles since `trade.created_at` and transitions `waiting` ->
    /// `active` on the first one that satisfies the trigger rule.
    pub async fn check_trigger(&self, trade_id: i64, candles: &[Candle]) -> AppResult<Option<Trade>> {
        let trade = self.store.get_trade(trade_id)?;
        if trade.status != TradeStatus::Waiting {
            return Ok(None);
        }

        let key_lock = self.lock_for(&trade.ticker, trade.timeframe);
        let _guard = key_lock.lock().await;
        let trade = self.store.get_trade(trade_id)?;
        if trade.status != TradeStatus::Waiting {
            return Ok(None);
        }

        let hit = triggers::check_trigger(candles, trade.entry_price, trade.action, trade.entry_strategy);
        let Some(hit) = hit else { return Ok(None) };

        let candle = &candles[hit.timestamp_index];
        self.store.update_trade_fields(
            trade.id,
            &trade.updated_at,
            TradeFieldPatch {
                status: Some(TradeStatus::Active),
                trigger_hit_time: Some(candle.timestamp.clone()),
                trigger_hit_price: Some(hit.price),
                ..Default::default()
            },
        )?;

        Ok(Some(self.store.get_trade(trade_id)?))
    }

    /// Evaluates exit rules for an active trade, honoring the grace period
    /// unless `bypass_grace_period` (set for active-trade context checks,
    /// which are always eligible regardless of analysis age).
    pub async fn check_exit(
        &self,
        trade_id: i64,
        candles: &[Candle],
        bypass_grace_period: bool,
    ) -> AppResult<Option<Trade>> {
        let trade = self.store.get_trade(trade_id)?;
        if trade.status != TradeStatus::Active {
            return Ok(None);
        }

        if !bypass_grace_period {
            let created = chrono::DateTime::parse_from_rfc3339(&trade.created_at)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .unwrap_or_else(|_| chrono::Utc::now());
            if chrono::Utc::now() - created < chrono::Duration::minutes(GRACE_PERIOD_MINUTES) {
                return Ok(None);
            }
        }

        let key_lock = self.lock_for(&trade.ticker, trade.timeframe);
        let _guard = key_lock.lock().await;
        let trade = self.store.get_trade(trade_id)?;
        if trade.status != TradeStatus::Active {
            return Ok(None);
        }

        for candle in candles {
            if let Some(hit) = exits::check_exit(candle, trade.action, trade.target_price, trade.stop_loss) {
                self.store.close_trade(trade.id, hit.close_price, hit.status, serde_json::json!({}))?;
                return Ok(Some(self.store.get_trade(trade_id)?));
            }
        }
        Ok(None)
    }

    /// MAINTAIN / MODIFY / CLOSE -- REPLACE's second leg (creating the
    /// successor trade) is the caller's responsibility, see
    /// `actions::replace_close_leg`.
    pub async fn apply_ai_action(
        &self,
        trade_id: i64,
        action: actions::AiAction,
        modify_target: Option<f64>,
        modify_stop: Option<f64>,
        close_price: Option<f64>,
        notes: Option<String>,
    ) -> AppResult<()> {
        let trade = self.store.get_trade(trade_id)?;
        let key_lock = self.lock_for(&trade.ticker, trade.timeframe);
        let _guard = key_lock.lock().await;
        let trade = self.store.get_trade(trade_id)?;

        match action {
            actions::AiAction::Maintain => actions::maintain(&self.store, &trade, notes),
            actions::AiAction::Modify => {
                let target = modify_target.unwrap_or(trade.target_price);
                let stop = modify_stop.unwrap_or(trade.stop_loss);
                actions::modify(&self.store, &trade, target, stop, notes)
            }
            actions::AiAction::Close => {
                let price = close_price.or(trade.current_price).unwrap_or(trade.entry_price);
                actions::close(&self.store, &trade, price, notes)
            }
            actions::AiAction::Replace => {
                let price = close_price.or(trade.current_price).unwrap_or(trade.entry_price);
                actions::replace_close_leg(&self.store, &trade, price)
            }
        }
    }

    /// Always succeeds if a non-closed trade exists for `(ticker,
    /// timeframe)`.
    pub async fn close_trade_by_user(
        &self,
        ticker: &str,
        timeframe: Timeframe,
        price: f64,
        note: Option<String>,
    ) -> AppResult<Trade> {
        let key_lock = self.lock_for(ticker, timeframe);
        let _guard = key_lock.lock().await;
        let trade = self
            .store
            .get_active_trade(ticker, timeframe)?
            .ok_or_else(|| AppError::NotFound(format!("no open trade for {ticker}/{timeframe}")))?;

        self.store.close_trade(
            trade.id,
            price,
            TradeStatus::UserClosed,
            serde_json::json!({ "note": note }),
        )?;
        self.store.get_trade(trade.id)
    }

    /// Orphan policy default: `close`. Marks every open trade whose
    /// analysis no longer exists as `ai_closed` with `orphan_cleanup`
    /// details.
    pub async fn reconcile_orphans_close(&self) -> AppResult<usize> {
        let mut closed = 0;
        for trade in self.store.list_trades(true)? {
            if self.store.get_analysis(trade.analysis_id).is_err() {
                let key_lock = self.lock_for(&trade.ticker, trade.timeframe);
                let _guard = key_lock.lock().await;
                let current = self.store.get_trade(trade.id)?;
                if current.status.is_closed() {
                    continue;
                }
                let price = current.current_price.unwrap_or(current.entry_price);
                self.store.close_trade(
                    trade.id,
                    price,
                    TradeStatus::AiClosed,
                    serde_json::json!({ "reason": "orphan_cleanup" }),
                )?;
                self.store.insert_trade_update(&TradeUpdate {
                    id: 0,
                    trade_id: trade.id,
                    timestamp: chrono::Utc::now().to_rfc3339(),
                    price: Some(price),
                    update_type: UpdateType::OrphanCleanup,
                    payload: serde_json::json!({ "missing_analysis_id": trade.analysis_id }),
                    notes: Some("parent analysis no longer exists".into()),
                })?;
                closed += 1;
            }
        }
        Ok(closed)
    }

    /// Orphan policy `recreate`: materializes a replacement Analysis row
    /// from `Trade.original_analysis_snapshot` and relinks the trade to it,
    /// instead of closing it. Maintenance-only -- only the `maintain`
    /// binary calls this, never the background engines.
    pub async fn reconcile_orphans_recreate(&self) -> AppResult<usize> {
        let mut recreated = 0;
        for trade in self.store.list_trades(true)? {
            if self.store.get_analysis(trade.analysis_id).is_err() {
                let key_lock = self.lock_for(&trade.ticker, trade.timeframe);
                let _guard = key_lock.lock().await;
                let current = self.store.get_trade(trade.id)?;
                if self.store.get_analysis(current.analysis_id).is_ok() {
                    continue;
                }

                let snapshot: Analysis = serde_json::from_value(current.original_analysis_snapshot.clone())
                    .map_err(|e| {
                        AppError::Validation(format!("trade {}: unreadable analysis snapshot: {e}", trade.id))
                    })?;
                let new_id = self.store.insert_analysis(&snapshot)?;
                self.store.relink_trade_analysis(trade.id, new_id)?;
                self.store.insert_trade_update(&TradeUpdate {
                    id: 0,
                    trade_id: trade.id,
                    timestamp: chrono::Utc::now().to_rfc3339(),
                    price: current.current_price,
                    update_type: UpdateType::OrphanCleanup,
                    payload: serde_json::json!({ "recreated_analysis_id": new_id }),
                    notes: Some("parent analysis recreated from snapshot".into()),
                })?;
                recreated += 1;
            }
        }
        Ok(recreated)
    }
}
