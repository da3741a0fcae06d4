//! Endpoints for the trusted purchase service
//!
//! Ticket minting happens after payment clears in the purchase flow; the
//! engine records the entitlement and nothing else. These routes sit
//! behind the internal network boundary, not the public gateway.

use axum::{extract::State, Json};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use shared::errors::EngineError;
use uuid::Uuid;

use crate::domain::Ticket;
use crate::errors::{ApiError, Result};
use crate::state::AppState;

const DEFAULT_TICKET_TTL_MS: i64 = 24 * 60 * 60 * 1_000;

#[derive(Debug, Deserialize)]
pub struct MintTicketRequest {
    pub wallet: String,
    pub face_value: u64,
    pub funding_token: String,
    pub funding_amount: u64,
    pub ttl_ms: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MintTicketResponse {
    pub ticket: Ticket,
}

pub async fn mint_ticket(
    State(state): State<AppState>,
    Json(req): Json<MintTicketRequest>,
) -> Result<Json<MintTicketResponse>> {
    let span = tracing::info_span!(
        "mint_ticket",
        wallet = %req.wallet,
        face_value = req.face_value,
    );
    let _enter = span.enter();

    if req.face_value == 0 {
        return Err(ApiError(EngineError::validation(
            "face_value must be positive",
        )));
    }
    let ttl_ms = req.ttl_ms.unwrap_or(DEFAULT_TICKET_TTL_MS);
    if ttl_ms <= 0 {
        return Err(ApiError(EngineError::validation("ttl_ms must be positive")));
    }

    let now = Utc::now();
    let ticket = Ticket {
        ticket_id: Uuid::new_v4(),
        wallet: req.wallet,
        face_value: req.face_value,
        funding_token: req.funding_token,
        funding_amount: req.funding_amount,
        expires_at: now + Duration::milliseconds(ttl_ms),
        used: false,
        consumed_by_round: None,
        created_at: now,
    };
    state.tickets.insert(&ticket).await?;

    tracing::info!(ticket_id = %ticket.ticket_id, "Ticket minted");
    metrics::counter!("tickets_minted_total").increment(1);

    Ok(Json(MintTicketResponse { ticket }))
}

#[derive(Debug, Deserialize)]
pub struct ListTicketsQuery {
    pub wallet: String,
}

pub async fn list_available_tickets(
    State(state): State<AppState>,
    axum::extract::Query(query): axum::extract::Query<ListTicketsQuery>,
) -> Result<Json<Vec<Ticket>>> {
    let tickets = state.tickets.find_available_by_wallet(&query.wallet).await?;
    Ok(Json(tickets))
}
