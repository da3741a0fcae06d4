//! HTTP surface tests against the router with in-memory storage.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use engine::chain::StubChainReader;
use engine::claims::{ClaimConfirmer, ClaimSigner};
use engine::config::{ChainConfig, ClaimConfig, Config, FairnessSettings, GameConfig, RedisConfig};
use engine::ledger::Ledger;
use engine::repository::MemoryRepository;
use engine::round::RoundEngine;
use engine::state::AppState;
use serde_json::{json, Value};
use shared::fairness::SeedPair;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower::ServiceExt;
use uuid::Uuid;

fn test_config() -> Config {
    Config {
        api_port: 0,
        metrics_port: 0,
        redis: RedisConfig {
            url: "redis://localhost:6379".to_string(),
        },
        game: GameConfig {
            betting_window_ms: 100,
            countdown_ms: 10,
            payout_pause_ms: 10,
            flight_tick_ms: 5,
            growth_rate_per_ms: shared::DEFAULT_GROWTH_RATE_PER_MS,
        },
        fairness: FairnessSettings {
            house_edge_bps: shared::DEFAULT_HOUSE_EDGE_BPS,
            instant_crash_one_in: shared::DEFAULT_INSTANT_CRASH_ONE_IN,
            max_multiplier_hundredths: shared::DEFAULT_MAX_MULTIPLIER_HUNDREDTHS,
        },
        claims: ClaimConfig {
            keypair_path: "/dev/null".to_string(),
            chain_id: 1,
            contract_address: "11111111111111111111111111111111".to_string(),
            amount_tolerance: 1,
            max_claiming_age_ms: shared::DEFAULT_MAX_CLAIMING_AGE_MS,
            sweep_interval_ms: shared::DEFAULT_SWEEP_INTERVAL_MS,
        },
        chain: ChainConfig {
            receipt_api_url: "http://localhost:9999".to_string(),
            api_key: String::new(),
        },
    }
}

/// Router over in-memory storage; the round engine task is not running,
/// so the round read model stays idle.
fn app() -> Router {
    let config = test_config();
    let repo = Arc::new(MemoryRepository::new());
    let (events, _) = broadcast::channel(64);
    let fairness = config.fairness.to_fairness_config();

    let ledger = Arc::new(Ledger::new(
        repo.clone(),
        repo.clone(),
        repo.clone(),
        events.clone(),
        config.game.growth_rate_per_ms,
    ));
    let (_engine, handle) = RoundEngine::new(
        repo.clone(),
        ledger.clone(),
        config.game.clone(),
        fairness,
    );

    let contract = Pubkey::from_str(&config.claims.contract_address).unwrap();
    let signer = Arc::new(ClaimSigner::new(
        repo.clone(),
        repo.clone(),
        repo.clone(),
        Arc::new(Keypair::new()),
        config.claims.chain_id,
        contract,
        config.claims.amount_tolerance,
        events.clone(),
    ));
    let confirmer = Arc::new(ClaimConfirmer::new(
        repo.clone(),
        repo.clone(),
        Arc::new(StubChainReader::new()),
        config.claims.contract_address.clone(),
        events,
    ));

    let state = AppState {
        config: Arc::new(config),
        rounds: repo.clone(),
        tickets: repo,
        ledger,
        signer,
        confirmer,
        engine: handle,
        fairness,
    };
    engine::router(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "engine");
}

#[tokio::test]
async fn test_round_read_model_is_idle_without_a_round() {
    let app = app();
    let response = app
        .oneshot(Request::get("/api/round").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["phase"], "idle");
    assert!(body["secret"].is_null());
    assert!(body["multiplier"].is_null());
}

#[tokio::test]
async fn test_mint_and_list_tickets() {
    let app = app();
    let wallet = Pubkey::new_unique().to_string();

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/external/tickets",
            json!({
                "wallet": wallet,
                "face_value": 100,
                "funding_token": "SOL",
                "funding_amount": 100,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["ticket"]["face_value"], 100);
    assert_eq!(body["ticket"]["used"], false);

    let response = app
        .oneshot(
            Request::get(format!("/api/external/tickets?wallet={}", wallet))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let tickets = body_json(response).await;
    assert_eq!(tickets.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_zero_value_ticket_is_rejected() {
    let app = app();
    let response = app
        .oneshot(post_json(
            "/api/external/tickets",
            json!({
                "wallet": "w",
                "face_value": 0,
                "funding_token": "SOL",
                "funding_amount": 0,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["category"], "VALIDATION");
}

#[tokio::test]
async fn test_place_bet_without_open_round_conflicts() {
    let app = app();
    let response = app
        .oneshot(post_json(
            "/api/bets",
            json!({
                "wallet": "w",
                "ticket_id": Uuid::new_v4(),
            }),
        ))
        .await
        .unwrap();
    // No round engine running, so there is no current round at all.
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_bet_is_404() {
    let app = app();
    let response = app
        .oneshot(
            Request::get(format!("/api/bets/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["category"], "NOT_FOUND");
}

#[tokio::test]
async fn test_verify_endpoint_accepts_and_rejects() {
    let app = app();
    let pair = SeedPair::random();

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/verify",
            json!({
                "commitment": pair.commitment.to_string(),
                "secret": pair.secret.to_string(),
                "round_number": 3,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["valid"], true);
    assert!(body["crash_multiplier"].as_u64().unwrap() >= 100);

    // A secret that does not hash to the commitment fails the audit.
    let other = SeedPair::random();
    let response = app
        .oneshot(post_json(
            "/api/verify",
            json!({
                "commitment": pair.commitment.to_string(),
                "secret": other.secret.to_string(),
                "round_number": 3,
            }),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["valid"], false);
    assert!(body["crash_multiplier"].is_null());
}
