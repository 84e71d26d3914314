//! Composition-root shared state, handed to every Axum handler via
//! `State<Arc<AppState>>`. Holds one instance of every client/engine built
//! in `main.rs`; nothing here is constructed lazily.

use crate::config::AppConfig;
use crate::db::Store;
use crate::exchange::ExchangeClient;
use crate::quotes::QuotesClient;
use crate::sentiment::SentimentEngine;
use crate::trades::TradeEngine;
use std::sync::Arc;

pub struct AppState {
    pub config: AppConfig,
    pub store: Store,
    pub quotes: QuotesClient,
    pub exchange: ExchangeClient,
    pub trades: TradeEngine,
    pub sentiment: Arc<SentimentEngine>,
}
