//! Macro sentiment engine: bootstrap + periodic scanner driving
//! `SystemState.system_status`, the single-writer singleton consulted by
//! the trade lifecycle engine for trade-permission gating.

pub mod bootstrap;
pub mod scanner;

use crate::ai::AiClient;
use crate::clock::Debouncer;
use crate::db::Store;
use crate::quotes::{QuotesClient, RateLimiter};
use crate::types::SystemStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct SentimentEngine {
    pub store: Store,
    pub quotes: QuotesClient,
    pub ai: AiClient,
    pub rate_limiter: Arc<RateLimiter>,
    pub debouncer: Debouncer,
    pub ai_model: String,
}

impl SentimentEngine {
    pub fn new(store: Store, quotes: QuotesClient, ai: AiClient, ai_model: String, analysis_interval: Duration) -> Self {
        Self {
            store,
            quotes,
            ai,
            rate_limiter: Arc::new(RateLimiter::new(5.0, Duration::from_secs(1), 10.0)),
            debouncer: Debouncer::new(analysis_interval),
            ai_model,
        }
    }
}

/// Pure state-machine transition for `SystemState.system_status`, applying
/// the table from §4.7: three consecutive failures degrade; any success
/// recovers; halt is operator-driven and not reachable from this function.
pub fn transition(current: SystemStatus, consecutive_failures: u32, just_succeeded: bool) -> SystemStatus {
    if current == SystemStatus::Halted {
        return SystemStatus::Halted;
    }
    if just_succeeded {
        return SystemStatus::Active;
    }
    if consecutive_failures >= 3 {
        return SystemStatus::Degraded;
    }
    current
}

/// Drives bootstrap then the scanner loop. Spawned exactly once from
/// `main.rs`; never starts itself as a side effect of construction.
pub async fn run(engine: Arc<SentimentEngine>, scan_interval: Duration, cancel: CancellationToken) {
    tracing::info!("sentiment engine starting");

    let state = match engine.store.get_system_state() {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to read system state, aborting sentiment engine");
            return;
        }
    };

    if !state.bootstrap_completed {
        bootstrap::run_bootstrap(&engine).await;
    }

    scanner::run_scanner_loop(engine, scan_interval, cancel).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_consecutive_failures_degrade_from_active() {
        assert_eq!(transition(SystemStatus::Active, 3, false), SystemStatus::Degraded);
        assert_eq!(transition(SystemStatus::Active, 2, false), SystemStatus::Active);
    }

    #[test]
    fn success_recovers_from_degraded() {
        assert_eq!(transition(SystemStatus::Degraded, 0, true), SystemStatus::Active);
    }

    #[test]
    fn halted_is_sticky() {
        assert_eq!(transition(SystemStatus::Halted, 0, true), SystemStatus::Halted);
    }
}
