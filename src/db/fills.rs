use super::Store;
use crate::errors::AppResult;
use crate::types::Fill;
use rusqlite::params;

impl Store {
    /// Idempotent on `hash`: re-syncing an already-seen fill is a no-op, not
    /// an error, since the sync loop re-fetches an overlap margin on every
    /// pass by design.
    pub fn insert_fill(&self, f: &Fill) -> AppResult<bool> {
        let conn = self.lock()?;
        let n = conn.execute(
            "INSERT OR IGNORE INTO fills (hash, tid, time_ms, coin, side, size, price, account_type, wallet_address)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                f.hash,
                f.tid,
                f.time_ms,
                f.coin,
                f.side,
                f.size,
                f.price,
                f.account_type,
                f.wallet_address,
            ],
        )?;
        Ok(n > 0)
    }

    pub fn count_fills(&self, account_type: &str, wallet: &str) -> AppResult<i64> {
        let conn = self.lock()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM fills WHERE account_type = ?1 AND wallet_address = ?2",
            params![account_type, wallet],
            |r| r.get(0),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test_db;

    fn sample_fill(hash: &str, time_ms: i64) -> Fill {
        Fill {
            hash: hash.into(),
            tid: 1,
            time_ms,
            coin: "BTC".into(),
            side: "B".into(),
            size: 0.01,
            price: 60000.0,
            account_type: "personal_wallet".into(),
            wallet_address: "0xabc".into(),
        }
    }

    #[test]
    fn insert_fill_is_idempotent_on_hash() {
        let store = Store::new(init_test_db());
        let f = sample_fill("0xhash1", 1000);
        assert!(store.insert_fill(&f).unwrap());
        assert!(!store.insert_fill(&f).unwrap());
        assert_eq!(store.count_fills("personal_wallet", "0xabc").unwrap(), 1);
    }

    #[test]
    fn distinct_hashes_both_persist() {
        let store = Store::new(init_test_db());
        store.insert_fill(&sample_fill("0xhash1", 1000)).unwrap();
        store.insert_fill(&sample_fill("0xhash2", 1001)).unwrap();
        assert_eq!(store.count_fills("personal_wallet", "0xabc").unwrap(), 2);
    }
}
