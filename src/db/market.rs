use super::Store;
use crate::errors::{AppError, AppResult};
use crate::types::MarketSnapshot;
use rusqlite::{params, Row};

/// Validates the §3 invariants. Called both by the repository insert path
/// and by the scanner before it even attempts a write, so a bad fetch never
/// reaches the database.
pub fn validate_snapshot(s: &MarketSnapshot) -> AppResult<()> {
    if !(s.btc_price > 0.0 && s.eth_price > 0.0) {
        return Err(AppError::Validation("btc_price and eth_price must be > 0".into()));
    }
    if !(s.btc_market_cap > 0.0 && s.eth_market_cap > 0.0) {
        return Err(AppError::Validation(
            "btc_market_cap and eth_market_cap must be > 0".into(),
        ));
    }
    if !(s.btc_dominance > 0.0 && s.btc_dominance < 100.0) {
        return Err(AppError::Validation("btc_dominance must be in (0, 100)".into()));
    }
    if s.total_market_cap < s.btc_market_cap + s.eth_market_cap {
        return Err(AppError::Validation(
            "total_market_cap must be >= btc_market_cap + eth_market_cap".into(),
        ));
    }
    Ok(())
}

fn row_to_snapshot(row: &Row) -> rusqlite::Result<MarketSnapshot> {
    Ok(MarketSnapshot {
        timestamp: row.get("timestamp")?,
        btc_price: row.get("btc_price")?,
        eth_price: row.get("eth_price")?,
        btc_market_cap: row.get("btc_market_cap")?,
        eth_market_cap: row.get("eth_market_cap")?,
        total_market_cap: row.get("total_market_cap")?,
        btc_dominance: row.get("btc_dominance")?,
        alt_strength_ratio: row.get("alt_strength_ratio")?,
        data_quality_score: row.get("data_quality_score")?,
    })
}

impl Store {
    /// Rejects rows that fail §3 invariants; no partial/NULL rows are ever
    /// written.
    pub fn insert_snapshot(&self, s: &MarketSnapshot, data_source: &str) -> AppResult<i64> {
        validate_snapshot(s)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO market_snapshots (timestamp, btc_price, eth_price, btc_market_cap,
                eth_market_cap, total_market_cap, btc_dominance, alt_strength_ratio,
                data_source, data_quality_score)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                s.timestamp,
                s.btc_price,
                s.eth_price,
                s.btc_market_cap,
                s.eth_market_cap,
                s.total_market_cap,
                s.btc_dominance,
                s.alt_strength_ratio,
                data_source,
                s.data_quality_score,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn range_snapshots(&self, from: &str, to: &str) -> AppResult<Vec<MarketSnapshot>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM market_snapshots WHERE timestamp >= ?1 AND timestamp <= ?2
             ORDER BY timestamp ASC",
        )?;
        let rows = stmt.query_map(params![from, to], row_to_snapshot)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn latest_snapshot(&self) -> AppResult<Option<MarketSnapshot>> {
        let conn = self.lock()?;
        use rusqlite::OptionalExtension;
        let row = conn
            .query_row(
                "SELECT * FROM market_snapshots ORDER BY timestamp DESC LIMIT 1",
                [],
                row_to_snapshot,
            )
            .optional()?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_snapshot() -> MarketSnapshot {
        MarketSnapshot {
            timestamp: "2026-01-01T00:00:00Z".into(),
            btc_price: 60000.0,
            eth_price: 3000.0,
            btc_market_cap: 1.2e12,
            eth_market_cap: 3.6e11,
            total_market_cap: 2.5e12,
            btc_dominance: 48.0,
            alt_strength_ratio: (2.5e12 - 1.2e12) / 60000.0,
            data_quality_score: 1.0,
        }
    }

    #[test]
    fn valid_snapshot_passes() {
        assert!(validate_snapshot(&valid_snapshot()).is_ok());
    }

    #[test]
    fn negative_price_rejected() {
        let mut s = valid_snapshot();
        s.btc_price = -1.0;
        assert!(validate_snapshot(&s).is_err());
    }

    #[test]
    fn dominance_out_of_range_rejected() {
        let mut s = valid_snapshot();
        s.btc_dominance = 0.0;
        assert!(validate_snapshot(&s).is_err());
        s.btc_dominance = 100.0;
        assert!(validate_snapshot(&s).is_err());
    }

    #[test]
    fn total_cap_below_parts_rejected() {
        let mut s = valid_snapshot();
        s.total_market_cap = s.btc_market_cap;
        assert!(validate_snapshot(&s).is_err());
    }

    #[test]
    fn insert_rejects_invalid_snapshot() {
        let store = Store::new(crate::db::init_test_db());
        let mut s = valid_snapshot();
        s.eth_price = 0.0;
        assert!(store.insert_snapshot(&s, "test").is_err());
    }
}
