use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use shared::errors::EngineError;
use shared::types::Multiplier;
use uuid::Uuid;

use crate::domain::Bet;
use crate::errors::{ApiError, Result};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PlaceBetRequest {
    // TODO: derive wallet from session auth once the gateway lands
    pub wallet: String,
    pub ticket_id: Uuid,
    /// Optional auto cash-out target in hundredths (200 = 2.00x)
    pub auto_cashout_at: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct PlaceBetResponse {
    pub bet: Bet,
}

pub async fn place_bet(
    State(state): State<AppState>,
    Json(req): Json<PlaceBetRequest>,
) -> Result<Json<PlaceBetResponse>> {
    let span = tracing::info_span!(
        "place_bet",
        wallet = %req.wallet,
        ticket_id = %req.ticket_id,
    );
    let _enter = span.enter();

    let auto_cashout_at = req.auto_cashout_at.map(Multiplier::from_hundredths);
    let bet = state
        .ledger
        .place_bet(&req.wallet, req.ticket_id, auto_cashout_at)
        .await?;

    Ok(Json(PlaceBetResponse { bet }))
}

#[derive(Debug, Deserialize)]
pub struct CashOutRequest {
    pub wallet: String,
}

pub async fn cash_out(
    State(state): State<AppState>,
    Path(bet_id): Path<Uuid>,
    Json(req): Json<CashOutRequest>,
) -> Result<Json<Bet>> {
    let span = tracing::info_span!("cash_out", %bet_id, wallet = %req.wallet);
    let _enter = span.enter();

    let bet = state.ledger.cash_out(&req.wallet, bet_id).await?;
    Ok(Json(bet))
}

pub async fn get_bet(
    State(state): State<AppState>,
    Path(bet_id): Path<Uuid>,
) -> Result<Json<Bet>> {
    let bet = state
        .ledger
        .bet(bet_id)
        .await?
        .ok_or_else(|| ApiError(EngineError::bet_not_found(bet_id)))?;
    Ok(Json(bet))
}

#[derive(Debug, Deserialize)]
pub struct ListBetsQuery {
    pub wallet: String,
    pub limit: Option<i64>,
}

pub async fn list_wallet_bets(
    State(state): State<AppState>,
    Query(query): Query<ListBetsQuery>,
) -> Result<Json<Vec<Bet>>> {
    let limit = query.limit.unwrap_or(20).min(100);
    let bets = state.ledger.bets_for_wallet(&query.wallet, limit).await?;
    tracing::debug!(wallet = %query.wallet, bet_count = bets.len(), "Retrieved wallet bets");
    Ok(Json(bets))
}
