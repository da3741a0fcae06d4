use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use shared::errors::EngineError;

/// HTTP-facing wrapper around the shared error taxonomy.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let category = self.0.category();
        let status = StatusCode::from_u16(category.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        match category.log_level() {
            "error" => tracing::error!(error = %self.0, "request failed"),
            "warn" => tracing::warn!(error = %self.0, "request rejected"),
            "debug" => tracing::debug!(error = %self.0, "request deferred"),
            _ => tracing::info!(error = %self.0, "request not applicable"),
        }

        let body = Json(json!({
            "error": self.0.to_string(),
            "category": category,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
