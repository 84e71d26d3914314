use macro_trader::state::AppState;
use macro_trader::{ai, config, db, exchange, quotes, sentiment, server, sync, trades};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    eprintln!("[macro-trader] binary started, setting up logging...");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("macro-trader starting");

    let cfg = match config::AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("config error: {e}");
            std::process::exit(1);
        }
    };

    let db_pool = match db::init_db(std::path::Path::new("data")) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!("database init error: {e}");
            std::process::exit(1);
        }
    };
    let store = db::Store::new(db_pool);

    let quotes = quotes::QuotesClient::new(&cfg.quotes_base_url, &cfg.quotes_api_key);
    let exchange = exchange::ExchangeClient::new(&cfg.exchange_base_url, &cfg.exchange_api_key, &cfg.exchange_api_secret);
    let ai = ai::AiClient::new(&cfg.ai_base_url, &cfg.ai_api_key);
    let trades = trades::TradeEngine::new(store.clone());

    let scan_interval = Duration::from_secs(cfg.scan_interval_hours * 3600);
    let sync_interval = Duration::from_secs(cfg.sync_interval_minutes * 60);

    let sentiment = Arc::new(sentiment::SentimentEngine::new(
        store.clone(),
        quotes.clone(),
        ai,
        cfg.ai_model.clone(),
        scan_interval,
    ));

    let app_state = Arc::new(AppState {
        config: cfg.clone(),
        store: store.clone(),
        quotes: quotes.clone(),
        exchange: exchange.clone(),
        trades,
        sentiment: sentiment.clone(),
    });

    let cancel = CancellationToken::new();

    // 1. Macro sentiment engine: bootstrap + periodic scanner.
    let sentiment_task = sentiment.clone();
    let sentiment_cancel = cancel.clone();
    let sentiment_handle = tokio::spawn(async move {
        sentiment::run(sentiment_task, scan_interval, sentiment_cancel).await;
    });

    // 2. Exchange fill-sync engine.
    let sync_store = store.clone();
    let sync_exchange = exchange.clone();
    let sync_accounts = cfg.accounts.clone();
    let sync_overlap_margin_ms = cfg.sync_overlap_margin_ms;
    let sync_cancel = cancel.clone();
    let sync_handle = tokio::spawn(async move {
        sync::run_fill_sync(sync_store, sync_exchange, sync_accounts, sync_interval, sync_overlap_margin_ms, sync_cancel).await;
    });

    // 3. Axum HTTP server.
    let port = cfg.server_port;
    let server_state = app_state.clone();
    let app = axum::Router::new()
        .route("/healthz", axum::routing::get(server::routes::healthz))
        .route("/api/chart-analysis/analyze", axum::routing::post(server::routes::analyze_chart))
        .route("/api/chart-analysis/history/{ticker}", axum::routing::get(server::routes::analysis_history))
        .route("/api/chart-analysis/delete/{id}", axum::routing::delete(server::routes::delete_analysis))
        .route("/api/active-trades/all", axum::routing::get(server::routes::active_trades))
        .route("/api/active-trades/all-history", axum::routing::get(server::routes::trade_history))
        .route("/api/active-trades/close", axum::routing::post(server::routes::close_trade))
        .route("/api/macro-sentiment/status", axum::routing::get(server::routes::sentiment_status))
        .route("/api/macro-sentiment/analyze", axum::routing::post(server::routes::force_analyze))
        .route("/api/macro-sentiment/scan", axum::routing::post(server::routes::force_scan))
        .route("/api/macro-sentiment/history", axum::routing::get(server::routes::sentiment_history))
        .route("/api/macro-sentiment/bootstrap", axum::routing::post(server::routes::force_bootstrap))
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .with_state(server_state);

    let addr = format!("0.0.0.0:{port}");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("bind error: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!("server listening on {addr}");

    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
    });

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, cancelling background tasks");
    cancel.cancel();

    let joined = tokio::time::timeout(
        SHUTDOWN_GRACE,
        async { tokio::join!(sentiment_handle, sync_handle, server_handle) },
    )
    .await;

    if joined.is_err() {
        tracing::warn!("shutdown grace period elapsed, abandoning stragglers");
    }
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
