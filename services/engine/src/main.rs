use axum::{routing::get, Router};
use engine::chain::HttpChainReader;
use engine::claims::{ClaimConfirmer, ClaimSigner, RecoverySweep};
use engine::config::Config;
use engine::ledger::Ledger;
use engine::repository::RedisRepository;
use engine::round::RoundEngine;
use engine::state::AppState;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::read_keypair_file;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Structured logging, JSON in production (configurable via env)
    let use_json = std::env::var("LOG_FORMAT")
        .unwrap_or_else(|_| "text".to_string())
        .eq_ignore_ascii_case("json");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "engine=info,tower_http=info".into());

    if use_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        service = "engine",
        version = env!("CARGO_PKG_VERSION"),
        log_format = if use_json { "json" } else { "text" },
        "Starting crash game engine"
    );

    let config = Config::load()?;
    tracing::info!("Configuration loaded");

    let redis_client = redis::Client::open(config.redis.url.clone())?;
    let redis_conn = redis_client.get_connection_manager().await?;
    tracing::info!("Redis connected");

    let repo = Arc::new(RedisRepository::new(redis_conn));

    let keypair = read_keypair_file(&config.claims.keypair_path)
        .map_err(|e| anyhow::anyhow!("failed to read claim keypair: {}", e))?;
    let keypair = Arc::new(keypair);
    let contract_address = Pubkey::from_str(&config.claims.contract_address)
        .map_err(|e| anyhow::anyhow!("invalid CLAIM_CONTRACT_ADDRESS: {}", e))?;

    let api_key = if config.chain.api_key.is_empty() {
        None
    } else {
        Some(config.chain.api_key.clone())
    };
    let chain = Arc::new(HttpChainReader::new(
        config.chain.receipt_api_url.clone(),
        api_key,
    )?);

    let (ledger_events, _) = broadcast::channel(256);
    let fairness = config.fairness.to_fairness_config();

    let ledger = Arc::new(Ledger::new(
        repo.clone(),
        repo.clone(),
        repo.clone(),
        ledger_events.clone(),
        config.game.growth_rate_per_ms,
    ));

    let (round_engine, engine_handle) = RoundEngine::new(
        repo.clone(),
        ledger.clone(),
        config.game.clone(),
        fairness,
    );
    tokio::spawn(round_engine.run());
    tracing::info!("Round engine started");

    let signer = Arc::new(ClaimSigner::new(
        repo.clone(),
        repo.clone(),
        repo.clone(),
        keypair,
        config.claims.chain_id,
        contract_address,
        config.claims.amount_tolerance,
        ledger_events.clone(),
    ));
    tracing::info!(signer = %signer.signer_pubkey(), "Claim signer ready");

    let confirmer = Arc::new(ClaimConfirmer::new(
        repo.clone(),
        repo.clone(),
        chain,
        config.claims.contract_address.clone(),
        ledger_events.clone(),
    ));

    let sweep = RecoverySweep::new(
        repo.clone(),
        repo.clone(),
        ledger_events,
        chrono::Duration::milliseconds(config.claims.max_claiming_age_ms),
        Duration::from_millis(config.claims.sweep_interval_ms),
    );
    tokio::spawn(sweep.run());
    tracing::info!("Recovery sweep started");

    let state = AppState {
        config: Arc::new(config.clone()),
        rounds: repo.clone(),
        tickets: repo,
        ledger,
        signer,
        confirmer,
        engine: engine_handle,
        fairness,
    };
    // One recorder feeds both the scrape port and the API /metrics route.
    let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;
    let api_recorder = recorder.clone();
    let app = engine::router(state)
        .route("/metrics", get(move || async move { api_recorder.render() }));

    let metrics_handle = tokio::spawn(start_metrics_server(config.metrics_port, recorder));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    tracing::info!("Engine API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    metrics_handle.await??;

    Ok(())
}

async fn start_metrics_server(
    port: u16,
    recorder: metrics_exporter_prometheus::PrometheusHandle,
) -> anyhow::Result<()> {
    let app = Router::new().route("/metrics", get(move || async move { recorder.render() }));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Metrics server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
