use super::Store;
use crate::errors::{AppError, AppResult};
use crate::types::{Analysis, Recommendation, Timeframe};
use rusqlite::{params, OptionalExtension, Row};

fn row_to_analysis(row: &Row) -> rusqlite::Result<Analysis> {
    let timeframe_str: String = row.get("timeframe")?;
    let action_str: String = row.get("action")?;
    let detailed: String = row.get("detailed_analysis")?;
    let context: String = row.get("context_assessment")?;

    Ok(Analysis {
        id: row.get("id")?,
        ticker: row.get("ticker")?,
        timeframe: Timeframe::parse(&timeframe_str).unwrap_or(Timeframe::H1),
        analysis_timestamp: row.get("analysis_timestamp")?,
        confidence: row.get("confidence")?,
        recommendation: Recommendation {
            action: crate::types::RecommendationAction::parse(&action_str)
                .unwrap_or(crate::types::RecommendationAction::Hold),
            entry_price: row.get("entry_price")?,
            target_price: row.get("target_price")?,
            stop_loss: row.get("stop_loss")?,
            reasoning: row.get("reasoning")?,
        },
        detailed_analysis: serde_json::from_str(&detailed).unwrap_or(serde_json::json!({})),
        context_assessment: serde_json::from_str(&context).unwrap_or(serde_json::json!({})),
        image_hash: row.get("image_hash")?,
        model_used: row.get("model_used")?,
    })
}

impl Store {
    pub fn insert_analysis(&self, a: &Analysis) -> AppResult<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO analyses (ticker, timeframe, analysis_timestamp, confidence, action,
                entry_price, target_price, stop_loss, reasoning, detailed_analysis,
                context_assessment, image_hash, model_used)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                a.ticker,
                a.timeframe.as_str(),
                a.analysis_timestamp,
                a.confidence,
                a.recommendation.action.as_str(),
                a.recommendation.entry_price,
                a.recommendation.target_price,
                a.recommendation.stop_loss,
                a.recommendation.reasoning,
                a.detailed_analysis.to_string(),
                a.context_assessment.to_string(),
                a.image_hash,
                a.model_used,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_analysis(&self, id: i64) -> AppResult<Analysis> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT * FROM analyses WHERE id = ?1 AND deleted_at IS NULL",
            params![id],
            row_to_analysis,
        )
        .optional()?
        .ok_or_else(|| AppError::NotFound(format!("analysis {id}")))
    }

    pub fn list_analyses(
        &self,
        ticker: &str,
        since: Option<&str>,
        limit: usize,
    ) -> AppResult<Vec<Analysis>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM analyses
             WHERE ticker = ?1 AND deleted_at IS NULL AND (?2 IS NULL OR analysis_timestamp >= ?2)
             ORDER BY analysis_timestamp DESC LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![ticker, since, limit as i64], row_to_analysis)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Refuses deletion if any Trade references this analysis, regardless of
    /// the trade's status -- `force` only widens the error message, it never
    /// relaxes the guard.
    pub fn delete_analysis(&self, id: i64, force: bool) -> AppResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let exists: Option<i64> = tx
            .query_row(
                "SELECT id FROM analyses WHERE id = ?1 AND deleted_at IS NULL",
                params![id],
                |r| r.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(AppError::NotFound(format!("analysis {id}")));
        }

        let referencing: i64 = tx.query_row(
            "SELECT COUNT(*) FROM trades WHERE analysis_id = ?1",
            params![id],
            |r| r.get(0),
        )?;
        if referencing > 0 {
            let hint = if force { " (force does not override this)" } else { "" };
            return Err(AppError::Conflict(format!(
                "analysis {id} is referenced by {referencing} trade(s){hint}"
            )));
        }

        tx.execute(
            "UPDATE analyses SET deleted_at = ?2 WHERE id = ?1",
            params![id, chrono::Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Partial success permitted: each id is evaluated independently.
    pub fn delete_analyses_bulk(&self, ids: &[i64]) -> AppResult<(usize, usize)> {
        let mut deleted = 0;
        let mut refused = 0;
        for id in ids {
            match self.delete_analysis(*id, false) {
                Ok(()) => deleted += 1,
                Err(_) => refused += 1,
            }
        }
        Ok((deleted, refused))
    }

    /// Never deletes an analysis referenced by any trade, of any status.
    pub fn cleanup_old_analyses(&self, older_than: &str) -> AppResult<usize> {
        let conn = self.lock()?;
        let n = conn.execute(
            "UPDATE analyses SET deleted_at = ?2
             WHERE deleted_at IS NULL
               AND analysis_timestamp < ?1
               AND id NOT IN (SELECT DISTINCT analysis_id FROM trades)",
            params![older_than, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test_db;
    use crate::types::{RecommendationAction, TradeAction, TradeStatus};

    fn sample_analysis(ticker: &str) -> Analysis {
        Analysis {
            id: 0,
            ticker: ticker.into(),
            timeframe: Timeframe::H1,
            analysis_timestamp: "2026-01-01T00:00:00Z".into(),
            confidence: 0.8,
            recommendation: Recommendation {
                action: RecommendationAction::Buy,
                entry_price: Some(100.0),
                target_price: Some(110.0),
                stop_loss: Some(95.0),
                reasoning: "test".into(),
            },
            detailed_analysis: serde_json::json!({}),
            context_assessment: serde_json::json!({}),
            image_hash: None,
            model_used: Some("test-model".into()),
        }
    }

    #[test]
    fn delete_unreferenced_analysis_succeeds() {
        let store = Store::new(init_test_db());
        let id = store.insert_analysis(&sample_analysis("BTCUSD")).unwrap();
        store.delete_analysis(id, false).unwrap();
        assert!(matches!(store.get_analysis(id), Err(AppError::NotFound(_))));
    }

    #[test]
    fn delete_referenced_analysis_refused() {
        let store = Store::new(init_test_db());
        let id = store.insert_analysis(&sample_analysis("ETHUSD")).unwrap();

        let mut trade = crate::db::trades::tests::sample_trade(id, "ETHUSD", Timeframe::H1);
        trade.action = TradeAction::Buy;
        trade.status = TradeStatus::Active;
        store.insert_trade(&trade).unwrap();

        let err = store.delete_analysis(id, true).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn cleanup_never_deletes_referenced_analysis() {
        let store = Store::new(init_test_db());
        let id = store.insert_analysis(&sample_analysis("AAVEUSD")).unwrap();
        let trade = crate::db::trades::tests::sample_trade(id, "AAVEUSD", Timeframe::H1);
        store.insert_trade(&trade).unwrap();

        let n = store.cleanup_old_analyses("2999-01-01T00:00:00Z").unwrap();
        assert_eq!(n, 0);
        assert!(store.get_analysis(id).is_ok());
    }
}
