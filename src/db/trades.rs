use super::Store;
use crate::errors::{AppError, AppResult};
use crate::types::{EntryStrategy, Timeframe, Trade, TradeAction, TradeStatus, TradeUpdate, UpdateType};
use rusqlite::{params, OptionalExtension, Row};

fn row_to_trade(row: &Row) -> rusqlite::Result<Trade> {
    let timeframe: String = row.get("timeframe")?;
    let action: String = row.get("action")?;
    let status: String = row.get("status")?;
    let strategy: String = row.get("entry_strategy")?;
    let close_details: Option<String> = row.get("close_details")?;
    let original_analysis: String = row.get("original_analysis_snapshot")?;
    let original_context: String = row.get("original_context_snapshot")?;

    Ok(Trade {
        id: row.get("id")?,
        analysis_id: row.get("analysis_id")?,
        ticker: row.get("ticker")?,
        timeframe: Timeframe::parse(&timeframe).unwrap_or(Timeframe::H1),
        action: TradeAction::parse(&action).unwrap_or(TradeAction::Buy),
        entry_price: row.get("entry_price")?,
        target_price: row.get("target_price")?,
        stop_loss: row.get("stop_loss")?,
        entry_condition: row.get("entry_condition")?,
        entry_strategy: EntryStrategy::parse(&strategy).unwrap_or(EntryStrategy::Pullback),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        status: TradeStatus::parse(&status).unwrap_or(TradeStatus::Waiting),
        trigger_hit_time: row.get("trigger_hit_time")?,
        trigger_hit_price: row.get("trigger_hit_price")?,
        current_price: row.get("current_price")?,
        unrealized_pnl: row.get("unrealized_pnl")?,
        realized_pnl: row.get("realized_pnl")?,
        close_time: row.get("close_time")?,
        close_price: row.get("close_price")?,
        close_reason: row.get("close_reason")?,
        close_details: close_details.and_then(|s| serde_json::from_str(&s).ok()),
        original_analysis_snapshot: serde_json::from_str(&original_analysis)
            .unwrap_or(serde_json::json!({})),
        original_context_snapshot: serde_json::from_str(&original_context)
            .unwrap_or(serde_json::json!({})),
    })
}

/// Partial patch for `update_trade_fields`. `None` leaves the column untouched.
#[derive(Debug, Default)]
pub struct TradeFieldPatch {
    pub target_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub current_price: Option<f64>,
    pub unrealized_pnl: Option<f64>,
    pub status: Option<TradeStatus>,
    pub trigger_hit_time: Option<String>,
    pub trigger_hit_price: Option<f64>,
}

impl Store {
    pub fn insert_trade(&self, t: &Trade) -> AppResult<i64> {
        let conn = self.lock()?;
        let result = conn.execute(
            "INSERT INTO trades (analysis_id, ticker, timeframe, action, entry_price, target_price,
                stop_loss, entry_condition, entry_strategy, created_at, updated_at, status,
                original_analysis_snapshot, original_context_snapshot)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                t.analysis_id,
                t.ticker,
                t.timeframe.as_str(),
                t.action.as_str(),
                t.entry_price,
                t.target_price,
                t.stop_loss,
                t.entry_condition,
                t.entry_strategy.as_str(),
                t.created_at,
                t.updated_at,
                t.status.as_str(),
                t.original_analysis_snapshot.to_string(),
                t.original_context_snapshot.to_string(),
            ],
        );

        match result {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(AppError::Conflict(format!(
                    "a non-closed trade already exists for {}/{}",
                    t.ticker, t.timeframe
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_trade(&self, id: i64) -> AppResult<Trade> {
        let conn = self.lock()?;
        conn.query_row("SELECT * FROM trades WHERE id = ?1", params![id], row_to_trade)
            .optional()?
            .ok_or_else(|| AppError::NotFound(format!("trade {id}")))
    }

    pub fn get_active_trade(&self, ticker: &str, timeframe: Timeframe) -> AppResult<Option<Trade>> {
        let conn = self.lock()?;
        let trade = conn
            .query_row(
                "SELECT * FROM trades WHERE ticker = ?1 AND timeframe = ?2
                 AND status IN ('waiting', 'active')",
                params![ticker, timeframe.as_str()],
                row_to_trade,
            )
            .optional()?;
        Ok(trade)
    }

    pub fn list_trades(&self, only_open: bool) -> AppResult<Vec<Trade>> {
        let conn = self.lock()?;
        let sql = if only_open {
            "SELECT * FROM trades WHERE status IN ('waiting','active') ORDER BY created_at DESC"
        } else {
            "SELECT * FROM trades ORDER BY created_at DESC"
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], row_to_trade)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Partial update with CAS on `updated_at`: the caller must supply the
    /// `updated_at` it last observed; a concurrent writer that already moved
    /// it forward causes this call to report a conflict instead of clobbering.
    pub fn update_trade_fields(
        &self,
        id: i64,
        expected_updated_at: &str,
        patch: TradeFieldPatch,
    ) -> AppResult<()> {
        let conn = self.lock()?;
        let now = chrono::Utc::now().to_rfc3339();

        let n = conn.execute(
            "UPDATE trades SET
                target_price = COALESCE(?3, target_price),
                stop_loss = COALESCE(?4, stop_loss),
                current_price = COALESCE(?5, current_price),
                unrealized_pnl = COALESCE(?6, unrealized_pnl),
                status = COALESCE(?7, status),
                trigger_hit_time = COALESCE(?8, trigger_hit_time),
                trigger_hit_price = COALESCE(?9, trigger_hit_price),
                updated_at = ?10
             WHERE id = ?1 AND updated_at = ?2",
            params![
                id,
                expected_updated_at,
                patch.target_price,
                patch.stop_loss,
                patch.current_price,
                patch.unrealized_pnl,
                patch.status.map(|s| s.as_str()),
                patch.trigger_hit_time,
                patch.trigger_hit_price,
                now,
            ],
        )?;

        if n == 0 {
            return Err(AppError::Conflict(format!(
                "trade {id} was modified concurrently (CAS on updated_at failed)"
            )));
        }
        Ok(())
    }

    /// Atomic transition into a terminal state: sets current_price =
    /// close_price, stamps close_time, and appends the audit TradeUpdate
    /// inside the same transaction.
    pub fn close_trade(
        &self,
        id: i64,
        close_price: f64,
        reason: TradeStatus,
        details: serde_json::Value,
    ) -> AppResult<()> {
        if reason.is_open() {
            return Err(AppError::Validation(format!(
                "{reason} is not a terminal trade status"
            )));
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let trade = tx
            .query_row("SELECT * FROM trades WHERE id = ?1", params![id], row_to_trade)
            .optional()?
            .ok_or_else(|| AppError::NotFound(format!("trade {id}")))?;

        if trade.status.is_closed() {
            return Err(AppError::Conflict(format!("trade {id} is already closed")));
        }

        let realized_pnl = match trade.action {
            TradeAction::Buy => close_price - trade.entry_price,
            TradeAction::Sell => trade.entry_price - close_price,
        };

        let now = chrono::Utc::now().to_rfc3339();

        tx.execute(
            "UPDATE trades SET status = ?2, current_price = ?3, close_price = ?3,
                close_time = ?4, close_reason = ?5, close_details = ?6,
                realized_pnl = ?7, updated_at = ?4
             WHERE id = ?1",
            params![
                id,
                reason.as_str(),
                close_price,
                now,
                reason.as_str(),
                details.to_string(),
                realized_pnl,
            ],
        )?;

        tx.execute(
            "INSERT INTO trade_updates (trade_id, timestamp, price, update_type, payload, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                now,
                close_price,
                UpdateType::StatusCorrection.as_str(),
                details.to_string(),
                format!("closed as {reason}"),
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Maintenance-only: repoints a trade at a freshly recreated analysis
    /// row. Used by the `recreate` orphan-reconciliation policy, never by
    /// the background engines.
    pub fn relink_trade_analysis(&self, trade_id: i64, new_analysis_id: i64) -> AppResult<()> {
        let conn = self.lock()?;
        let now = chrono::Utc::now().to_rfc3339();
        let n = conn.execute(
            "UPDATE trades SET analysis_id = ?2, updated_at = ?3 WHERE id = ?1",
            params![trade_id, new_analysis_id, now],
        )?;
        if n == 0 {
            return Err(AppError::NotFound(format!("trade {trade_id}")));
        }
        Ok(())
    }

    pub fn insert_trade_update(&self, u: &TradeUpdate) -> AppResult<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO trade_updates (trade_id, timestamp, price, update_type, payload, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                u.trade_id,
                u.timestamp,
                u.price,
                u.update_type.as_str(),
                u.payload.to_string(),
                u.notes,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::db::init_test_db;

    pub fn sample_trade(analysis_id: i64, ticker: &str, timeframe: Timeframe) -> Trade {
        Trade {
            id: 0,
            analysis_id,
            ticker: ticker.into(),
            timeframe,
            action: TradeAction::Buy,
            entry_price: 100.0,
            target_price: 110.0,
            stop_loss: 95.0,
            entry_condition: "pullback to support".into(),
            entry_strategy: EntryStrategy::Pullback,
            created_at: "2026-01-01T00:00:00Z".into(),
            updated_at: "2026-01-01T00:00:00Z".into(),
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
            original_analysis_snapshot: serde_json::json!({}),
            original_context_snapshot: serde_json::json!({}),
        }
    }

    fn insert_analysis(store: &Store, ticker: &str) -> i64 {
        store
            .insert_analysis(&crate::types::Analysis {
                id: 0,
                ticker: ticker.into(),
                timeframe: Timeframe::H1,
                analysis_timestamp: "2026-01-01T00:00:00Z".into(),
                confidence: 0.7,
                recommendation: crate::types::Recommendation {
                    action: crate::types::RecommendationAction::Buy,
                    entry_price: Some(100.0),
                    target_price: Some(110.0),
                    stop_loss: Some(95.0),
                    reasoning: "test".into(),
                },
                detailed_analysis: serde_json::json!({}),
                context_assessment: serde_json::json!({}),
                image_hash: None,
                model_used: None,
            })
            .unwrap()
    }

    #[test]
    fn at_most_one_open_trade_per_ticker_timeframe() {
        let store = Store::new(init_test_db());
        let analysis_id = insert_analysis(&store, "BTCUSD");

        store
            .insert_trade(&sample_trade(analysis_id, "BTCUSD", Timeframe::H1))
            .unwrap();

        let err = store
            .insert_trade(&sample_trade(analysis_id, "BTCUSD", Timeframe::H1))
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn close_trade_sets_matching_current_and_close_price() {
        let store = Store::new(init_test_db());
        let analysis_id = insert_analysis(&store, "SOLUSD");
        let id = store
            .insert_trade(&sample_trade(analysis_id, "SOLUSD", Timeframe::H1))
            .unwrap();

        store
            .close_trade(id, 95.0, TradeStatus::StopHit, serde_json::json!({}))
            .unwrap();

        let trade = store.get_trade(id).unwrap();
        assert_eq!(trade.close_price, Some(95.0));
        assert_eq!(trade.current_price, Some(95.0));
        assert_eq!(trade.realized_pnl, Some(-5.0));
        assert_eq!(trade.status, TradeStatus::StopHit);
        assert!(trade.close_time.is_some());
    }

    #[test]
    fn closed_trade_cannot_be_closed_again() {
        let store = Store::new(init_test_db());
        let analysis_id = insert_analysis(&store, "AAVEUSD");
        let id = store
            .insert_trade(&sample_trade(analysis_id, "AAVEUSD", Timeframe::H1))
            .unwrap();
        store
            .close_trade(id, 95.0, TradeStatus::StopHit, serde_json::json!({}))
            .unwrap();

        let err = store
            .close_trade(id, 90.0, TradeStatus::UserClosed, serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
