//! Fill-sync engine: one task, ticking on `SYNC_INTERVAL_MINUTES`, syncing
//! every configured account sequentially within a tick -- mirroring the
//! original scheduler's `sync_all_accounts` loop rather than fanning each
//! account out to its own task, so two accounts never race the same
//! exchange rate limit.

use crate::config::SyncAccount;
use crate::db::sync_status::SyncStatusPatch;
use crate::db::Store;
use crate::exchange::ExchangeClient;
use crate::types::SyncState;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// First sync for an account with no prior watermark reaches back this far.
const INITIAL_LOOKBACK_DAYS: i64 = 365;

pub async fn run_fill_sync(
    store: Store,
    exchange: ExchangeClient,
    accounts: Vec<SyncAccount>,
    interval: Duration,
    overlap_margin_ms: i64,
    cancel: CancellationToken,
) {
    if accounts.is_empty() {
        tracing::warn!("fill sync has no configured accounts, task exiting");
        return;
    }

    tracing::info!(accounts = accounts.len(), "fill sync starting, running initial pass");
    sync_all_accounts(&store, &exchange, &accounts, overlap_margin_ms).await;

    let mut ticker = crate::clock::every(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("fill sync shutting down");
                return;
            }
            _ = ticker.tick() => {
                sync_all_accounts(&store, &exchange, &accounts, overlap_margin_ms).await;
            }
        }
    }
}

async fn sync_all_accounts(store: &Store, exchange: &ExchangeClient, accounts: &[SyncAccount], overlap_margin_ms: i64) {
    for account in accounts {
        match sync_one_account(store, exchange, account, overlap_margin_ms).await {
            Ok(synced) => {
                tracing::info!(account_type = %account.account_type, wallet = %account.wallet, synced, "account sync completed");
            }
            Err(e) => {
                tracing::warn!(account_type = %account.account_type, wallet = %account.wallet, error = %e, "account sync failed");
                let _ = store.set_sync_status(
                    &account.account_type,
                    &account.wallet,
                    SyncStatusPatch {
                        state: Some(SyncState::Failed),
                        last_error: Some(Some(e.to_string())),
                        ..Default::default()
                    },
                );
            }
        }
    }
}

async fn sync_one_account(
    store: &Store,
    exchange: &ExchangeClient,
    account: &SyncAccount,
    overlap_margin_ms: i64,
) -> crate::errors::AppResult<usize> {
    let existing = store.get_sync_status(&account.account_type, &account.wallet)?;

    let start_time_ms = match &existing {
        Some(status) => (status.last_synced_fill_time - overlap_margin_ms).max(0),
        None => chrono::Utc::now().timestamp_millis() - INITIAL_LOOKBACK_DAYS * 24 * 3600 * 1000,
    };

    store.set_sync_status(
        &account.account_type,
        &account.wallet,
        SyncStatusPatch { state: Some(SyncState::Running), ..Default::default() },
    )?;

    let fills = exchange.user_fills(&account.account_type, &account.wallet, start_time_ms).await?;

    let mut inserted = 0usize;
    let mut max_time = existing.as_ref().map(|s| s.last_synced_fill_time).unwrap_or(0);
    for fill in &fills {
        if store.insert_fill(fill)? {
            inserted += 1;
        }
        max_time = max_time.max(fill.time_ms);
    }

    store.set_sync_status(
        &account.account_type,
        &account.wallet,
        SyncStatusPatch {
            last_synced_fill_time: Some(max_time),
            state: Some(SyncState::Completed),
            last_error: Some(None),
            fills_synced_delta: inserted as i64,
        },
    )?;

    Ok(inserted)
}
