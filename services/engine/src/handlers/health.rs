use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::errors::Result;
use crate::state::AppState;

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "engine",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Health including a storage round-trip.
pub async fn detailed_health(State(state): State<AppState>) -> Result<Json<Value>> {
    let current = state.rounds.current().await?;

    Ok(Json(json!({
        "status": "healthy",
        "service": "engine",
        "version": env!("CARGO_PKG_VERSION"),
        "storage": "ok",
        "current_round": current.map(|r| r.round_id.to_string()),
    })))
}
