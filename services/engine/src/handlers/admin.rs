//! Operator endpoints
//!
//! Force-crash is the kill switch for an in-flight round. The engine
//! still reveals the real secret afterwards, so even a forced round
//! stays auditable.

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::errors::Result;
use crate::state::AppState;

pub async fn force_crash(State(state): State<AppState>) -> Result<(StatusCode, Json<Value>)> {
    tracing::warn!("Operator force-crash requested");
    state.engine.force_crash().await?;

    // The engine task applies the crash on its next loop turn.
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))))
}
