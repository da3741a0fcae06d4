use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::claims::ClaimOutcome;
use crate::domain::ClaimAuthorization;
use crate::errors::Result;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RequestClaimRequest {
    pub wallet: String,
    pub bet_id: Uuid,
    /// Amount the client expects to claim, for tolerance checking
    pub amount: u64,
    /// Client-chosen nonce; burned for this bet once an authorization
    /// is issued with it
    pub nonce: u64,
}

#[derive(Debug, Serialize)]
pub struct RequestClaimResponse {
    pub authorization: ClaimAuthorization,
}

pub async fn request_claim(
    State(state): State<AppState>,
    Json(req): Json<RequestClaimRequest>,
) -> Result<Json<RequestClaimResponse>> {
    let span = tracing::info_span!(
        "request_claim",
        bet_id = %req.bet_id,
        wallet = %req.wallet,
        amount = req.amount,
    );
    let _enter = span.enter();

    let authorization = state
        .signer
        .request_claim(&req.wallet, req.bet_id, req.amount, req.nonce)
        .await?;

    Ok(Json(RequestClaimResponse { authorization }))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmClaimRequest {
    pub wallet: String,
    pub tx_hash: String,
    pub nonce: u64,
    pub amount: u64,
}

pub async fn confirm_claim(
    State(state): State<AppState>,
    Path(bet_id): Path<Uuid>,
    Json(req): Json<ConfirmClaimRequest>,
) -> Result<Response> {
    let span = tracing::info_span!(
        "confirm_claim",
        %bet_id,
        wallet = %req.wallet,
        tx_hash = %req.tx_hash,
    );
    let _enter = span.enter();

    let outcome = state
        .confirmer
        .confirm_claim(&req.wallet, bet_id, &req.tx_hash, req.nonce, req.amount)
        .await?;

    let response = match outcome {
        ClaimOutcome::Confirmed(bet) => {
            (StatusCode::OK, Json(json!({ "status": "confirmed", "bet": bet })))
                .into_response()
        }
        // Not final yet; the client polls this endpoint again.
        ClaimOutcome::Pending => (
            StatusCode::ACCEPTED,
            Json(json!({ "status": "pending" })),
        )
            .into_response(),
        ClaimOutcome::Failed { reason, unlocked } => (
            StatusCode::OK,
            Json(json!({
                "status": "failed",
                "reason": reason,
                "unlocked": unlocked,
            })),
        )
            .into_response(),
    };

    Ok(response)
}
