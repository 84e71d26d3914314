//! Cross-module trade-creation scenarios that exercise `TradeEngine`
//! together with `Store`, rather than either in isolation.

use macro_trader::db::Store;
use macro_trader::trades::TradeEngine;
use macro_trader::types::{
    Analysis, EntryStrategy, Recommendation, RecommendationAction, Timeframe, Trade, TradeAction,
    TradeStatus,
};

fn sample_analysis(ticker: &str, previous_position_status: Option<&str>) -> Analysis {
    Analysis {
        id: 0,
        ticker: ticker.into(),
        timeframe: Timeframe::H1,
        analysis_timestamp: "2026-01-01T01:00:00Z".into(),
        confidence: 0.8,
        recommendation: Recommendation {
            action: RecommendationAction::Buy,
            entry_price: Some(2755.0),
            target_price: Some(2820.0),
            stop_loss: Some(2620.0),
            reasoning: "momentum continuation".into(),
        },
        detailed_analysis: serde_json::json!({}),
        context_assessment: serde_json::json!({ "previous_position_status": previous_position_status }),
        image_hash: None,
        model_used: Some("test-model".into()),
    }
}

/// Soft-deletes an analysis row directly against the pool, bypassing
/// `Store::delete_analysis`'s referencing-trade guard. Used to construct an
/// orphaned-trade scenario the public API refuses to create on its own.
fn soft_delete_analysis(store: &Store, analysis_id: i64) {
    store
        .pool
        .lock()
        .unwrap()
        .execute(
            "UPDATE analyses SET deleted_at = ?2 WHERE id = ?1",
            rusqlite::params![analysis_id, chrono::Utc::now().to_rfc3339()],
        )
        .unwrap();
}

fn sample_trade(analysis_id: i64) -> Trade {
    Trade {
        id: 0,
        analysis_id,
        ticker: "ETHUSD".into(),
        timeframe: Timeframe::H1,
        action: TradeAction::Buy,
        entry_price: 2750.0,
        target_price: 2820.0,
        stop_loss: 2620.0,
        entry_condition: "pullback to 2750 support".into(),
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

/// S1: an existing waiting trade plus a MAINTAIN verdict refuses creation
/// of a second trade and leaves the original untouched.
#[tokio::test]
async fn maintain_verdict_blocks_duplicate_trade_creation() {
    let store = Store::new(macro_trader::db::init_test_db());
    let seed_analysis_id = store.insert_analysis(&sample_analysis("ETHUSD", None)).unwrap();
    let existing_trade_id = store.insert_trade(&sample_trade(seed_analysis_id)).unwrap();

    let engine = TradeEngine::new(store.clone());
    let maintain_analysis = sample_analysis("ETHUSD", Some("MAINTAIN"));

    let err = engine
        .create_trade_from_analysis("ETHUSD", Timeframe::H1, &maintain_analysis, &serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, macro_trader::errors::AppError::Conflict(_)));

    let existing = store.get_trade(existing_trade_id).unwrap();
    assert_eq!(existing.status, TradeStatus::Waiting);
    assert_eq!(existing.entry_price, 2750.0);
    assert!(store.list_trades(true).unwrap().len() == 1);
}

/// A non-MAINTAIN recommendation is also refused while an open trade
/// already exists for the same (ticker, timeframe) -- creation is
/// exclusive, not just MAINTAIN-gated.
#[tokio::test]
async fn open_trade_blocks_second_creation_even_without_maintain() {
    let store = Store::new(macro_trader::db::init_test_db());
    let seed_analysis_id = store.insert_analysis(&sample_analysis("ETHUSD", None)).unwrap();
    store.insert_trade(&sample_trade(seed_analysis_id)).unwrap();

    let engine = TradeEngine::new(store.clone());
    let fresh_analysis = sample_analysis("ETHUSD", None);

    let err = engine
        .create_trade_from_analysis("ETHUSD", Timeframe::H1, &fresh_analysis, &serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, macro_trader::errors::AppError::Conflict(_)));
}

/// Orphan reconciliation (`close` policy) never touches a trade whose
/// analysis still exists, only ones whose parent row is gone.
#[tokio::test]
async fn orphan_close_only_affects_trades_with_missing_analysis() {
    let store = Store::new(macro_trader::db::init_test_db());

    let live_analysis_id = store.insert_analysis(&sample_analysis("BTCUSD", None)).unwrap();
    let mut live_trade = sample_trade(live_analysis_id);
    live_trade.ticker = "BTCUSD".into();
    let live_trade_id = store.insert_trade(&live_trade).unwrap();

    let orphan_analysis_id = store.insert_analysis(&sample_analysis("SOLUSD", None)).unwrap();
    let mut orphan_trade = sample_trade(orphan_analysis_id);
    orphan_trade.ticker = "SOLUSD".into();
    let orphan_trade_id = store.insert_trade(&orphan_trade).unwrap();
    // `Store::delete_analysis` refuses while any trade references the row,
    // regardless of status, so the orphan here is manufactured with a raw
    // soft-delete against the test's own connection instead.
    soft_delete_analysis(&store, orphan_analysis_id);

    let engine = TradeEngine::new(store.clone());
    let closed = engine.reconcile_orphans_close().await.unwrap();
    assert_eq!(closed, 1);

    assert_eq!(store.get_trade(live_trade_id).unwrap().status, TradeStatus::Waiting);
    let orphan_after = store.get_trade(orphan_trade_id).unwrap();
    assert_eq!(orphan_after.status, TradeStatus::AiClosed);
    assert!(orphan_after.close_time.is_some());
}

#[tokio::test]
async fn reconcile_orphans_recreate_relinks_to_a_new_analysis_row() {
    let store = Store::new(macro_trader::db::init_test_db());

    let analysis = sample_analysis("SOLUSD", None);
    let analysis_id = store.insert_analysis(&analysis).unwrap();
    let mut trade = sample_trade(analysis_id);
    trade.ticker = "SOLUSD".into();
    trade.original_analysis_snapshot = serde_json::to_value(&analysis).unwrap();
    let trade_id = store.insert_trade(&trade).unwrap();
    soft_delete_analysis(&store, analysis_id);

    let engine = TradeEngine::new(store.clone());
    let recreated = engine.reconcile_orphans_recreate().await.unwrap();
    assert_eq!(recreated, 1);

    let after = store.get_trade(trade_id).unwrap();
    assert_ne!(after.analysis_id, analysis_id);
    assert!(store.get_analysis(after.analysis_id).is_ok());
    assert_eq!(after.status, TradeStatus::Waiting);
}
