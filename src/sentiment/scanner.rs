//! Scanner loop: ingests a snapshot on every tick, but gates analysis
//! (chart render + AI call) behind the debouncer so it fires at most once
//! per `scan_interval_hours` regardless of tick cadence.

use super::{transition, SentimentEngine};
use crate::charts;
use crate::context;
use crate::db::sentiment::SystemStatePatch;
use crate::types::{AssetTrend, MarketSnapshot, SentimentVerdict, SystemStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Ingestion runs far more often than analysis; the debouncer (sized to
/// `scan_interval_hours`) decides when an ingested snapshot also triggers
/// an AI analysis pass.
const INGEST_TICK: Duration = Duration::from_secs(15 * 60);

pub async fn run_scanner_loop(engine: Arc<SentimentEngine>, scan_interval: Duration, cancel: CancellationToken) {
    tracing::info!("sentiment scanner loop started");
    let mut interval = crate::clock::every(INGEST_TICK);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("sentiment scanner shutting down");
                return;
            }
            _ = interval.tick() => {
                run_one_tick(&engine, scan_interval).await;
            }
        }
    }
}

async fn run_one_tick(engine: &Arc<SentimentEngine>, scan_interval: Duration) {
    let ingest_result = ingest_snapshot(engine).await;

    match &ingest_result {
        Ok(_) => record_outcome(engine, true, None),
        Err(e) => {
            tracing::warn!(error = %e, "snapshot ingest failed");
            record_outcome(engine, false, Some(e.to_string()));
        }
    }

    if ingest_result.is_err() {
        return;
    }

    if !engine.debouncer.try_fire() {
        return;
    }
    let _ = scan_interval;

    match run_analysis(engine).await {
        Ok(_) => {
            tracing::info!("analysis pass completed");
        }
        Err(e) => {
            tracing::warn!(error = %e, "analysis pass failed");
            let state = engine.store.get_system_state().ok();
            let failures = state.map(|s| s.consecutive_analysis_failures + 1).unwrap_or(1);
            let _ = engine.store.update_system_state(SystemStatePatch {
                consecutive_analysis_failures: Some(failures),
                ..Default::default()
            });
        }
    }
}

/// Forces one ingest+analysis pass on demand, bypassing the debouncer --
/// an explicit operator request rather than a background tick.
pub async fn run_forced_analysis(engine: &Arc<SentimentEngine>) -> crate::errors::AppResult<()> {
    ingest_snapshot(engine).await?;
    run_analysis(engine).await
}

/// Forces one ingest-only pass, skipping the AI call entirely.
pub async fn run_forced_ingest(engine: &Arc<SentimentEngine>) -> crate::errors::AppResult<MarketSnapshot> {
    ingest_snapshot(engine).await
}

/// Collects BTC/ETH from `latest_quotes` and dominance from
/// `global_metrics` -- never `historical_quotes` -- so a snapshot never
/// mixes sources (the "wonky last point" bug).
async fn ingest_snapshot(engine: &Arc<SentimentEngine>) -> crate::errors::AppResult<MarketSnapshot> {
    const MAX_ATTEMPTS: u32 = 3;
    let mut last_err = None;

    for _ in 0..MAX_ATTEMPTS {
        if !engine.rate_limiter.acquire(Duration::from_secs(5)).await {
            last_err = Some(crate::errors::AppError::Transient("rate limiter timeout".into()));
            continue;
        }

        let quotes = engine.quotes.latest_quotes(&["BTC", "ETH"]).await;
        let metrics = engine.quotes.global_metrics().await;

        match (quotes, metrics) {
            (Ok(q), Ok(m)) => {
                let btc = q.get("BTC");
                let eth = q.get("ETH");
                if let (Some(btc), Some(eth)) = (btc, eth) {
                    let alt_strength_ratio = if btc.price > 0.0 {
                        (m.total_market_cap - btc.market_cap) / btc.price
                    } else {
                        0.0
                    };
                    let snapshot = MarketSnapshot {
                        timestamp: chrono::Utc::now().to_rfc3339(),
                        btc_price: btc.price,
                        eth_price: eth.price,
                        btc_market_cap: btc.market_cap,
                        eth_market_cap: eth.market_cap,
                        total_market_cap: m.total_market_cap,
                        btc_dominance: m.btc_dominance,
                        alt_strength_ratio,
                        data_quality_score: 1.0,
                    };
                    match engine.store.insert_snapshot(&snapshot, "latest+global") {
                        Ok(_) => return Ok(snapshot),
                        Err(e) => last_err = Some(e),
                    }
                } else {
                    last_err = Some(crate::errors::AppError::Validation("missing BTC or ETH quote".into()));
                }
            }
            (Err(e), _) | (_, Err(e)) => last_err = Some(e),
        }
    }

    Err(last_err.unwrap_or_else(|| crate::errors::AppError::Transient("snapshot ingest exhausted retries".into())))
}

async fn run_analysis(engine: &Arc<SentimentEngine>) -> crate::errors::AppResult<()> {
    let recent = engine.store.range_snapshots(
        &(chrono::Utc::now() - chrono::Duration::days(30)).to_rfc3339(),
        &chrono::Utc::now().to_rfc3339(),
    )?;
    let chart_set = charts::render_all(&recent);

    let latest = recent.last().cloned().ok_or_else(|| {
        crate::errors::AppError::Validation("no snapshots available for analysis".into())
    })?;

    let prompt = context::render_macro_prompt(&latest);

    let images: Vec<Vec<u8>> = [
        &chart_set.btc_price,
        &chart_set.eth_price,
        &chart_set.btc_dominance,
        &chart_set.alt_strength,
        &chart_set.combined,
    ]
    .into_iter()
    .filter_map(|opt| opt.clone())
    .collect();

    let raw = engine.ai.analyze(&prompt, &images, &engine.ai_model).await?;
    let parsed = context::parse_verdict(&raw);

    if parsed.analysis_type == "unstructured" && parsed.previous_position_status.is_none() {
        return Err(crate::errors::AppError::ParseError(
            "AI response could not be parsed into any recommendation".into(),
        ));
    }

    let flat_trend = AssetTrend { trend_direction: crate::types::TrendDirection::Sideways, trend_strength: 0.0 };
    let verdict = SentimentVerdict {
        id: 0,
        analysis_timestamp: chrono::Utc::now().to_rfc3339(),
        overall_confidence: parsed.confidence,
        market_regime: parsed.market_regime.unwrap_or_else(|| infer_regime(&latest)),
        trade_permission: parsed.trade_permission.unwrap_or_else(|| infer_permission(parsed.confidence)),
        btc_trend: parsed.btc_trend.unwrap_or_else(|| flat_trend.clone()),
        eth_trend: parsed.eth_trend.unwrap_or_else(|| flat_trend.clone()),
        alt_trend: parsed.alt_trend.unwrap_or(flat_trend),
        model_used: engine.ai_model.clone(),
        processing_time_ms: 0,
    };

    engine.store.insert_verdict(&verdict, &chart_set)?;

    let state = engine.store.get_system_state()?;
    let new_status = transition(state.system_status, 0, true);
    engine.store.update_system_state(SystemStatePatch {
        system_status: Some(new_status),
        consecutive_failures: Some(0),
        consecutive_analysis_failures: Some(0),
        last_successful_scan: Some(chrono::Utc::now().to_rfc3339()),
        total_scans_completed: Some(state.total_scans_completed + 1),
        total_analyses_completed: Some(state.total_analyses_completed + 1),
        ..Default::default()
    })?;

    Ok(())
}

/// Dominance-only fallback for when the AI response omits `market_regime`
/// (e.g. the unstructured fallback path never carries it).
fn infer_regime(s: &MarketSnapshot) -> crate::types::MarketRegime {
    if s.btc_dominance > 55.0 {
        crate::types::MarketRegime::BtcSeason
    } else if s.btc_dominance < 40.0 {
        crate::types::MarketRegime::AltSeason
    } else {
        crate::types::MarketRegime::Transition
    }
}

/// Confidence-only fallback for when the AI response omits
/// `trade_permission`.
fn infer_permission(confidence: f64) -> crate::types::TradePermission {
    if confidence < 0.3 {
        crate::types::TradePermission::NoTrade
    } else if confidence > 0.7 {
        crate::types::TradePermission::Aggressive
    } else {
        crate::types::TradePermission::Selective
    }
}

fn record_outcome(engine: &Arc<SentimentEngine>, success: bool, error: Option<String>) {
    let state = match engine.store.get_system_state() {
        Ok(s) => s,
        Err(_) => return,
    };

    let failures = if success { 0 } else { state.consecutive_failures + 1 };
    let new_status = transition(state.system_status, failures as u32, success);

    let _ = engine.store.update_system_state(SystemStatePatch {
        system_status: Some(new_status),
        consecutive_failures: Some(failures),
        last_failed_scan: if success { None } else { error },
        last_successful_scan: if success { Some(chrono::Utc::now().to_rfc3339()) } else { None },
        ..Default::default()
    });
}
