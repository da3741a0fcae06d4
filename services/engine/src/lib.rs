pub mod chain;
pub mod claims;
pub mod config;
pub mod domain;
pub mod errors;
pub mod handlers;
pub mod ledger;
pub mod repository;
pub mod retry;
pub mod round;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use state::AppState;

/// Build the engine's HTTP API. Shared between the binary and the
/// integration tests.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health::health_check))
        .route("/health/detailed", get(handlers::health::detailed_health))
        // Round read model and fairness audit
        .route("/api/round", get(handlers::rounds::get_current_round))
        .route("/api/verify", post(handlers::rounds::verify))
        // Bets
        .route(
            "/api/bets",
            post(handlers::bets::place_bet).get(handlers::bets::list_wallet_bets),
        )
        .route("/api/bets/:bet_id", get(handlers::bets::get_bet))
        .route("/api/bets/:bet_id/cashout", post(handlers::bets::cash_out))
        // Claims
        .route("/api/claims", post(handlers::claims::request_claim))
        .route(
            "/api/claims/:bet_id/confirm",
            post(handlers::claims::confirm_claim),
        )
        // Internal purchase-service endpoints
        .route(
            "/api/external/tickets",
            post(handlers::external::mint_ticket)
                .get(handlers::external::list_available_tickets),
        )
        // Operator endpoints
        .route("/api/admin/force-crash", post(handlers::admin::force_crash))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
