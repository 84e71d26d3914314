//! Thin HTTP handlers over `db::Store` / `trades::TradeEngine` /
//! `sentiment::SentimentEngine`. Each handler validates just enough to
//! route the request and converts its `AppResult` into a response; the
//! domain logic lives in the engines, not here.

use crate::context;
use crate::db::sentiment::SystemStatePatch;
use crate::errors::AppError;
use crate::server::dto::ApiError;
use crate::state::AppState;
use crate::types::{Analysis, Recommendation, RecommendationAction, Timeframe};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use sha2::{Digest, Sha256};
use std::sync::Arc;

pub async fn healthz(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let db_ok = state.store.latest_snapshot().is_ok();
    let status = state
        .store
        .get_system_state()
        .map(|s| s.system_status.to_string())
        .unwrap_or_else(|_| "UNKNOWN".into());
    Json(serde_json::json!({ "db_ok": db_ok, "system_status": status }))
}

#[derive(Debug, Default)]
struct MultipartAnalyzeRequest {
    image: Option<Vec<u8>>,
    ticker: Option<String>,
    context: Option<serde_json::Value>,
}

/// `POST /api/chart-analysis/analyze` -- multipart fields `image`,
/// `ticker`, `context`. Runs the AI once and persists the resulting
/// Analysis. If the recommendation is actionable, also attempts trade
/// creation; a refusal there (MAINTAIN, existing open trade, ...) is logged
/// rather than surfaced as a request failure -- the caller asked for an
/// analysis, and got one, whether or not a trade followed from it.
pub async fn analyze_chart(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Analysis>, ApiError> {
    let mut req = MultipartAnalyzeRequest::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| AppError::Validation(e.to_string()))? {
        match field.name().unwrap_or_default() {
            "image" => {
                req.image = Some(field.bytes().await.map_err(|e| AppError::Validation(e.to_string()))?.to_vec());
            }
            "ticker" => {
                req.ticker = Some(field.text().await.map_err(|e| AppError::Validation(e.to_string()))?);
            }
            "context" => {
                let text = field.text().await.map_err(|e| AppError::Validation(e.to_string()))?;
                req.context = serde_json::from_str(&text).ok();
            }
            _ => {}
        }
    }

    let image = req.image.ok_or_else(|| AppError::Validation("missing image field".into()))?;
    let ticker = req.ticker.ok_or_else(|| AppError::Validation("missing ticker field".into()))?.to_uppercase();
    let ctx_value = req.context.unwrap_or_else(|| serde_json::json!({}));

    let timeframe = ctx_value
        .get("timeframe")
        .and_then(|v| v.as_str())
        .and_then(Timeframe::parse)
        .unwrap_or(Timeframe::H1);
    let current_price = ctx_value.get("current_price").and_then(|v| v.as_f64()).unwrap_or(0.0);

    let active_trade = state.store.get_active_trade(&ticker, timeframe)?;
    let prompt_ctx = context::assemble(&ticker, timeframe, current_price, active_trade, None);
    let prompt = context::render_prompt(&prompt_ctx);

    let raw = state.sentiment.ai.analyze(&prompt, &[image.clone()], &state.config.ai_model).await?;
    let parsed = context::parse_verdict(&raw);

    let image_hash = hex::encode(Sha256::digest(&image));
    let recommendation = recommendation_from_parsed(&parsed);

    let analysis = Analysis {
        id: 0,
        ticker: ticker.clone(),
        timeframe,
        analysis_timestamp: chrono::Utc::now().to_rfc3339(),
        confidence: parsed.confidence,
        recommendation,
        detailed_analysis: parsed.raw.get("detailed_analysis").cloned().unwrap_or_else(|| serde_json::json!({})),
        context_assessment: parsed.raw.get("context_assessment").cloned().unwrap_or_else(|| {
            serde_json::json!({ "previous_position_status": parsed.previous_position_status })
        }),
        image_hash: Some(image_hash),
        model_used: Some(state.config.ai_model.clone()),
    };

    let id = state.store.insert_analysis(&analysis)?;
    let stored = state.store.get_analysis(id)?;

    if stored.recommendation.action != RecommendationAction::Hold {
        match state.trades.create_trade_from_analysis(&ticker, timeframe, &stored, &ctx_value).await {
            Ok(trade) => tracing::info!(trade_id = trade.id, "trade created from on-demand analysis"),
            Err(e) => tracing::info!(error = %e, "on-demand analysis did not produce a trade"),
        }
    }

    Ok(Json(stored))
}

fn recommendation_from_parsed(parsed: &context::ParsedVerdict) -> Recommendation {
    let rec = parsed.raw.get("recommendation").cloned().unwrap_or_else(|| serde_json::json!({}));
    let action = rec
        .get("action")
        .and_then(|v| v.as_str())
        .and_then(RecommendationAction::parse)
        .unwrap_or(RecommendationAction::Hold);

    Recommendation {
        action,
        entry_price: rec.get("entry_price").and_then(|v| v.as_f64()),
        target_price: rec.get("target_price").and_then(|v| v.as_f64()),
        stop_loss: rec.get("stop_loss").and_then(|v| v.as_f64()),
        reasoning: rec.get("reasoning").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
    }
}

#[derive(serde::Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// `GET /api/chart-analysis/history/{ticker}?limit=N`.
pub async fn analysis_history(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<Analysis>>, ApiError> {
    let limit = q.limit.unwrap_or(50).min(500);
    let rows = state.store.list_analyses(&ticker.to_uppercase(), None, limit)?;
    Ok(Json(rows))
}

#[derive(serde::Deserialize)]
pub struct DeleteQuery {
    pub force: Option<bool>,
}

/// `DELETE /api/chart-analysis/delete/{id}?force=bool`. 200 on delete, 404
/// if absent, 409 if referenced -- exactly where `AppError::status_code`
/// maps `NotFound`/`Conflict`.
pub async fn delete_analysis(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(q): Query<DeleteQuery>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_analysis(id, q.force.unwrap_or(false))?;
    Ok(StatusCode::OK)
}

/// `GET /api/active-trades/all` -- non-closed trades only.
pub async fn active_trades(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiError> {
    let trades = state.store.list_trades(true)?;
    Ok(Json(serde_json::json!({ "trades": trades })))
}

/// `GET /api/active-trades/all-history` -- every status.
pub async fn trade_history(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiError> {
    let trades = state.store.list_trades(false)?;
    Ok(Json(serde_json::json!({ "trades": trades })))
}

#[derive(serde::Deserialize)]
pub struct CloseTradeRequest {
    pub ticker: String,
    pub timeframe: Option<Timeframe>,
    pub price: f64,
    pub note: Option<String>,
}

/// `POST /api/active-trades/close` -- closes as `user_closed`.
pub async fn close_trade(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CloseTradeRequest>,
) -> Result<Json<crate::types::Trade>, ApiError> {
    let timeframe = body.timeframe.unwrap_or(Timeframe::H1);
    let trade = state
        .trades
        .close_trade_by_user(&body.ticker.to_uppercase(), timeframe, body.price, body.note)
        .await?;
    Ok(Json(trade))
}

/// `GET /api/macro-sentiment/status` -- current verdict + SystemState.
pub async fn sentiment_status(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiError> {
    let verdict = state.store.latest_verdict()?;
    let system_state = state.store.get_system_state()?;
    Ok(Json(serde_json::json!({ "verdict": verdict, "system_state": system_state })))
}

#[derive(serde::Deserialize, Default)]
pub struct AnalyzeRequest {
    pub model: Option<String>,
    pub days: Option<i64>,
}

/// `POST /api/macro-sentiment/analyze` -- forces one scan+analyze cycle,
/// bypassing the scanner's debounce. The debounce exists to stop background
/// bursts, not to block a deliberate on-demand request.
pub async fn force_analyze(
    State(state): State<Arc<AppState>>,
    Json(_body): Json<AnalyzeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    crate::sentiment::scanner::run_forced_analysis(&state.sentiment).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// `POST /api/macro-sentiment/scan` -- ingest-only, no AI call.
pub async fn force_scan(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiError> {
    let snapshot = crate::sentiment::scanner::run_forced_ingest(&state.sentiment).await?;
    Ok(Json(serde_json::json!({ "snapshot": snapshot })))
}

#[derive(serde::Deserialize)]
pub struct SentimentHistoryQuery {
    pub since: Option<String>,
}

/// `GET /api/macro-sentiment/history`.
pub async fn sentiment_history(
    State(state): State<Arc<AppState>>,
    Query(q): Query<SentimentHistoryQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let since = q.since.unwrap_or_else(|| (chrono::Utc::now() - chrono::Duration::days(30)).to_rfc3339());
    let history = state.store.confidence_history(&since)?;
    Ok(Json(serde_json::json!({ "history": history })))
}

/// `POST /api/macro-sentiment/bootstrap` -- re-runs the one-shot backfill on
/// demand. Clears `bootstrap_completed` first so `run_bootstrap`'s own guard
/// doesn't immediately no-op it.
pub async fn force_bootstrap(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiError> {
    state.store.update_system_state(SystemStatePatch { bootstrap_completed: Some(false), ..Default::default() })?;
    crate::sentiment::bootstrap::run_bootstrap(&state.sentiment).await;
    let system_state = state.store.get_system_state()?;
    Ok(Json(serde_json::json!({ "system_state": system_state })))
}
