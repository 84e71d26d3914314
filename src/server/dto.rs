//! HTTP-boundary error shape. Every inbound handler returns `{error, code,
//! detail?}` on failure and never an `error` field on success (§7).

use crate::errors::AppError;
use axum::response::{IntoResponse, Response};
use axum::Json;

pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(e: AppError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        let body = Json(serde_json::json!({
            "error": self.0.to_string(),
            "code": self.0.code(),
        }));
        (status, body).into_response()
    }
}
