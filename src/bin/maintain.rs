//! One-shot maintenance CLI, run out-of-band from the long-lived engines.
//! Exit codes: 0 success, 1 generic failure, 2 validation/refusal.
//!
//! Usage:
//!   maintain cleanup-analyses --older-than <rfc3339>
//!   maintain reconcile-orphans --policy close|recreate

use macro_trader::db;
use macro_trader::trades::TradeEngine;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let code = run(&args).await;
    std::process::exit(code);
}

async fn run(args: &[String]) -> i32 {
    let Some(command) = args.first() else {
        eprintln!("usage: maintain <cleanup-analyses|reconcile-orphans> [options]");
        return 2;
    };

    let db_pool = match db::init_db(std::path::Path::new("data")) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!("database init error: {e}");
            return 1;
        }
    };
    let store = db::Store::new(db_pool);

    match command.as_str() {
        "cleanup-analyses" => {
            let Some(older_than) = flag_value(args, "--older-than") else {
                eprintln!("missing --older-than <rfc3339 timestamp>");
                return 2;
            };
            match store.cleanup_old_analyses(&older_than) {
                Ok(n) => {
                    tracing::info!(deleted = n, "cleanup-analyses completed");
                    0
                }
                Err(e) => {
                    tracing::error!(error = %e, "cleanup-analyses failed");
                    1
                }
            }
        }
        "reconcile-orphans" => {
            let policy = flag_value(args, "--policy").unwrap_or_else(|| "close".to_string());
            let trades = TradeEngine::new(store);
            let result = match policy.as_str() {
                "close" => trades.reconcile_orphans_close().await,
                "recreate" => trades.reconcile_orphans_recreate().await,
                other => {
                    eprintln!("unknown --policy {other}, expected close|recreate");
                    return 2;
                }
            };
            match result {
                Ok(n) => {
                    tracing::info!(affected = n, policy, "reconcile-orphans completed");
                    0
                }
                Err(e) => {
                    tracing::error!(error = %e, "reconcile-orphans failed");
                    1
                }
            }
        }
        other => {
            eprintln!("unknown command {other}");
            2
        }
    }
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag).and_then(|i| args.get(i + 1)).cloned()
}
