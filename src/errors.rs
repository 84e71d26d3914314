use axum::http::StatusCode;

/// Error taxonomy by effect on the caller, not by origin (see design notes
/// on error propagation). HTTP handlers map each variant to a status code
/// via `status_code`; callers inside the engines match on variant to decide
/// whether to retry, count a failure, or halt.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Caller input or externally-fetched data violates a data-model invariant.
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Referential-integrity or uniqueness refusal.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Network / 5xx / rate-limited, already exhausted its retry budget.
    #[error("transient: {0}")]
    Transient(String),

    #[error("parse error: {0}")]
    ParseError(String),

    /// Programmer error, schema mismatch, corrupt state. The worker that
    /// raises this is expected to exit and be restarted by the scheduler.
    #[error("fatal: {0}")]
    Fatal(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("auth error: {0}")]
    Auth(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ParseError(_) => StatusCode::BAD_GATEWAY,
            AppError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Network(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ChannelClosed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Transient(_) => "TRANSIENT",
            AppError::ParseError(_) => "PARSE_ERROR",
            AppError::Fatal(_) => "FATAL",
            AppError::Network(_) => "NETWORK",
            AppError::Database(_) => "DATABASE",
            AppError::Auth(_) => "AUTH",
            AppError::Config(_) => "CONFIG",
            AppError::ChannelClosed(_) => "CHANNEL_CLOSED",
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::ParseError(e.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Network(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
