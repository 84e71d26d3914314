use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub quotes_api_key: String,
    pub quotes_base_url: String,
    pub exchange_api_key: String,
    pub exchange_api_secret: String,
    pub exchange_base_url: String,
    pub ai_api_key: String,
    pub ai_base_url: String,
    pub ai_model: String,
    pub scan_interval_hours: u64,
    pub sync_interval_minutes: u64,
    pub sync_overlap_margin_ms: i64,
    pub server_port: u16,
    pub accounts: Vec<SyncAccount>,
}

#[derive(Debug, Clone)]
pub struct SyncAccount {
    pub account_type: String,
    pub wallet: String,
}

impl AppConfig {
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();

        let scan_interval_hours = env_var_or("SCAN_INTERVAL_HOURS", "4")
            .parse::<u64>()
            .map_err(|e| AppError::Config(format!("SCAN_INTERVAL_HOURS: {e}")))?;

        let sync_interval_minutes = env_var_or("SYNC_INTERVAL_MINUTES", "5")
            .parse::<u64>()
            .map_err(|e| AppError::Config(format!("SYNC_INTERVAL_MINUTES: {e}")))?;

        let sync_overlap_margin_ms = env_var_or("SYNC_OVERLAP_MARGIN_MS", "30000")
            .parse::<i64>()
            .map_err(|e| AppError::Config(format!("SYNC_OVERLAP_MARGIN_MS: {e}")))?;

        let server_port = env_var_or("SERVER_PORT", "8080")
            .parse::<u16>()
            .map_err(|e| AppError::Config(format!("SERVER_PORT: {e}")))?;

        Ok(Self {
            quotes_api_key: env_var("QUOTES_API_KEY")?,
            quotes_base_url: env_var_or("QUOTES_BASE_URL", "https://api.freecryptoapi.com/v1"),
            exchange_api_key: env_var("EXCHANGE_API_KEY")?,
            exchange_api_secret: env_var("EXCHANGE_API_SECRET")?,
            exchange_base_url: env_var_or("EXCHANGE_BASE_URL", "https://api.hyperliquid.xyz"),
            ai_api_key: env_var("AI_API_KEY")?,
            ai_base_url: env_var_or("AI_BASE_URL", "https://api.anthropic.com/v1"),
            ai_model: env_var_or("AI_MODEL", "claude-sonnet-4-5"),
            scan_interval_hours,
            sync_interval_minutes,
            sync_overlap_margin_ms,
            server_port,
            accounts: configured_accounts(),
        })
    }
}

/// Mirrors the original scheduler's env-driven account list: a primary
/// wallet plus an optional secondary wallet, each synced independently.
fn configured_accounts() -> Vec<SyncAccount> {
    let mut accounts = Vec::new();
    if let Ok(wallet) = std::env::var("WALLET_ADDRESS") {
        accounts.push(SyncAccount {
            account_type: "personal_wallet".into(),
            wallet,
        });
    }
    if let Ok(wallet) = std::env::var("VAULT_WALLET_ADDRESS") {
        accounts.push(SyncAccount {
            account_type: "vault".into(),
            wallet,
        });
    }
    accounts
}

fn env_var(key: &str) -> AppResult<String> {
    std::env::var(key).map_err(|_| AppError::Config(format!("missing env var: {key}")))
}

fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
