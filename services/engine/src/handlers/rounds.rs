use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::errors::EngineError;
use shared::fairness::{multiplier_at, verify_round};
use shared::types::Multiplier;
use solana_sdk::hash::Hash;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::{Round, RoundPhase};
use crate::errors::{ApiError, Result};
use crate::state::AppState;

/// Public projection of the current round.
///
/// The crash point and secret stay hidden until the round has crashed;
/// leaking either early would let players cash out with perfect timing.
#[derive(Debug, Serialize)]
pub struct RoundView {
    pub round_id: Option<Uuid>,
    pub round_number: Option<u64>,
    pub phase: RoundPhase,
    pub commitment: Option<String>,
    /// Live multiplier while flying, final multiplier after the crash
    pub multiplier: Option<Multiplier>,
    pub secret: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub total_wagered: u64,
    pub total_paid: u64,
    pub forced: bool,
}

impl RoundView {
    fn idle() -> Self {
        Self {
            round_id: None,
            round_number: None,
            phase: RoundPhase::Idle,
            commitment: None,
            multiplier: None,
            secret: None,
            started_at: None,
            total_wagered: 0,
            total_paid: 0,
            forced: false,
        }
    }

    fn project(round: Round, growth_rate_per_ms: f64) -> Self {
        let crashed = matches!(round.phase, RoundPhase::Crashed | RoundPhase::Payout);
        let multiplier = if crashed {
            round.ended_multiplier
        } else if round.phase == RoundPhase::Flying {
            round.flight_started_at.map(|start| {
                let elapsed_ms = (Utc::now() - start).num_milliseconds().max(0) as u64;
                multiplier_at(elapsed_ms, growth_rate_per_ms)
            })
        } else {
            None
        };

        Self {
            round_id: Some(round.round_id),
            round_number: Some(round.round_number),
            phase: round.phase,
            commitment: Some(round.commitment),
            multiplier,
            secret: if crashed { round.secret } else { None },
            started_at: Some(round.started_at),
            total_wagered: round.total_wagered,
            total_paid: round.total_paid,
            forced: crashed && round.forced,
        }
    }
}

pub async fn get_current_round(State(state): State<AppState>) -> Result<Json<RoundView>> {
    let view = match state.rounds.current().await? {
        Some(round) => RoundView::project(round, state.config.game.growth_rate_per_ms),
        None => RoundView::idle(),
    };
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub commitment: String,
    pub secret: String,
    pub round_number: u64,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
    pub crash_multiplier: Option<Multiplier>,
}

/// Third-party audit endpoint: recompute the crash point from a revealed
/// secret and check it against the published commitment.
pub async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>> {
    let commitment = Hash::from_str(&req.commitment)
        .map_err(|_| ApiError(EngineError::validation("commitment is not a valid base58 hash")))?;
    let secret = Hash::from_str(&req.secret)
        .map_err(|_| ApiError(EngineError::validation("secret is not a valid base58 hash")))?;

    let recomputed = verify_round(&commitment, &secret, req.round_number, &state.fairness);
    Ok(Json(VerifyResponse {
        valid: recomputed.is_some(),
        crash_multiplier: recomputed,
    }))
}
