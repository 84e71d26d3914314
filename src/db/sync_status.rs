use super::Store;
use crate::errors::AppResult;
use crate::types::SyncState;
use rusqlite::{params, OptionalExtension, Row};

fn row_to_sync_status(row: &Row) -> rusqlite::Result<crate::types::SyncStatus> {
    let state: String = row.get("state")?;
    Ok(crate::types::SyncStatus {
        account_type: row.get("account_type")?,
        wallet: row.get("wallet")?,
        last_synced_fill_time: row.get("last_synced_fill_time")?,
        state: SyncState::parse(&state).unwrap_or(SyncState::Idle),
        last_error: row.get("last_error")?,
        fills_synced_total: row.get("fills_synced_total")?,
    })
}

/// Partial patch applied after each sync pass for one `(account_type, wallet)` key.
#[derive(Debug, Default)]
pub struct SyncStatusPatch {
    pub last_synced_fill_time: Option<i64>,
    pub state: Option<SyncState>,
    pub last_error: Option<Option<String>>,
    pub fills_synced_delta: i64,
}

impl Store {
    pub fn get_sync_status(
        &self,
        account_type: &str,
        wallet: &str,
    ) -> AppResult<Option<crate::types::SyncStatus>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT * FROM sync_status WHERE account_type = ?1 AND wallet = ?2",
                params![account_type, wallet],
                row_to_sync_status,
            )
            .optional()?;
        Ok(row)
    }

    /// Upserts the row for `(account_type, wallet)`, creating it with
    /// `state = idle` and a zero high-water mark on first sight.
    pub fn set_sync_status(
        &self,
        account_type: &str,
        wallet: &str,
        patch: SyncStatusPatch,
    ) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sync_status (account_type, wallet, last_synced_fill_time, state, last_error, fills_synced_total)
             VALUES (?1, ?2, COALESCE(?3, 0), COALESCE(?4, 'IDLE'), ?5, ?6)
             ON CONFLICT(account_type, wallet) DO UPDATE SET
                last_synced_fill_time = COALESCE(?3, last_synced_fill_time),
                state = COALESCE(?4, state),
                last_error = CASE WHEN ?7 THEN ?5 ELSE last_error END,
                fills_synced_total = fills_synced_total + ?6",
            params![
                account_type,
                wallet,
                patch.last_synced_fill_time,
                patch.state.map(|s| s.as_str().to_string()),
                patch.last_error.clone().flatten(),
                patch.fills_synced_delta,
                patch.last_error.is_some(),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test_db;

    #[test]
    fn first_sight_creates_idle_row_with_zero_watermark() {
        let store = Store::new(init_test_db());
        store
            .set_sync_status("personal_wallet", "0xabc", SyncStatusPatch::default())
            .unwrap();
        let row = store.get_sync_status("personal_wallet", "0xabc").unwrap().unwrap();
        assert_eq!(row.last_synced_fill_time, 0);
        assert_eq!(row.state, SyncState::Idle);
    }

    #[test]
    fn fills_synced_total_accumulates_across_updates() {
        let store = Store::new(init_test_db());
        store
            .set_sync_status(
                "vault",
                "0xdef",
                SyncStatusPatch { fills_synced_delta: 3, ..Default::default() },
            )
            .unwrap();
        store
            .set_sync_status(
                "vault",
                "0xdef",
                SyncStatusPatch { fills_synced_delta: 2, ..Default::default() },
            )
            .unwrap();
        let row = store.get_sync_status("vault", "0xdef").unwrap().unwrap();
        assert_eq!(row.fills_synced_total, 5);
    }
}
