use serde::Deserialize;
use shared::constants::*;
use shared::fairness::FairnessConfig;
use shared::types::Multiplier;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api_port: u16,
    pub metrics_port: u16,
    pub redis: RedisConfig,
    pub game: GameConfig,
    pub fairness: FairnessSettings,
    pub claims: ClaimConfig,
    pub chain: ChainConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameConfig {
    pub betting_window_ms: u64,
    pub countdown_ms: u64,
    pub payout_pause_ms: u64,
    pub flight_tick_ms: u64,
    pub growth_rate_per_ms: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FairnessSettings {
    pub house_edge_bps: u16,
    pub instant_crash_one_in: u64,
    pub max_multiplier_hundredths: u64,
}

impl FairnessSettings {
    pub fn to_fairness_config(&self) -> FairnessConfig {
        FairnessConfig {
            house_edge_bps: self.house_edge_bps,
            instant_crash_one_in: self.instant_crash_one_in,
            max_multiplier: Multiplier::from_hundredths(self.max_multiplier_hundredths),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClaimConfig {
    pub keypair_path: String,
    pub chain_id: u64,
    pub contract_address: String,
    pub amount_tolerance: u64,
    pub max_claiming_age_ms: i64,
    pub sweep_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub receipt_api_url: String,
    pub api_key: String,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            api_port: env::var("ENGINE_API_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()?,
            metrics_port: env::var("ENGINE_METRICS_PORT")
                .unwrap_or_else(|_| "9090".to_string())
                .parse()?,
            redis: RedisConfig {
                url: env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            },
            game: GameConfig {
                betting_window_ms: env::var("GAME_BETTING_WINDOW_MS")
                    .unwrap_or_else(|_| DEFAULT_BETTING_WINDOW_MS.to_string())
                    .parse()?,
                countdown_ms: env::var("GAME_COUNTDOWN_MS")
                    .unwrap_or_else(|_| DEFAULT_COUNTDOWN_MS.to_string())
                    .parse()?,
                payout_pause_ms: env::var("GAME_PAYOUT_PAUSE_MS")
                    .unwrap_or_else(|_| DEFAULT_PAYOUT_PAUSE_MS.to_string())
                    .parse()?,
                flight_tick_ms: env::var("GAME_FLIGHT_TICK_MS")
                    .unwrap_or_else(|_| DEFAULT_FLIGHT_TICK_MS.to_string())
                    .parse()?,
                growth_rate_per_ms: env::var("GAME_GROWTH_RATE_PER_MS")
                    .unwrap_or_else(|_| DEFAULT_GROWTH_RATE_PER_MS.to_string())
                    .parse()?,
            },
            fairness: FairnessSettings {
                house_edge_bps: env::var("FAIRNESS_HOUSE_EDGE_BPS")
                    .unwrap_or_else(|_| DEFAULT_HOUSE_EDGE_BPS.to_string())
                    .parse()?,
                instant_crash_one_in: env::var("FAIRNESS_INSTANT_CRASH_ONE_IN")
                    .unwrap_or_else(|_| DEFAULT_INSTANT_CRASH_ONE_IN.to_string())
                    .parse()?,
                max_multiplier_hundredths: env::var("FAIRNESS_MAX_MULTIPLIER_HUNDREDTHS")
                    .unwrap_or_else(|_| DEFAULT_MAX_MULTIPLIER_HUNDREDTHS.to_string())
                    .parse()?,
            },
            claims: ClaimConfig {
                keypair_path: env::var("CLAIM_KEYPAIR")
                    .map_err(|_| anyhow::anyhow!("CLAIM_KEYPAIR must be set"))?,
                chain_id: env::var("CLAIM_CHAIN_ID")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()?,
                contract_address: env::var("CLAIM_CONTRACT_ADDRESS")
                    .map_err(|_| anyhow::anyhow!("CLAIM_CONTRACT_ADDRESS must be set"))?,
                amount_tolerance: env::var("CLAIM_AMOUNT_TOLERANCE")
                    .unwrap_or_else(|_| DEFAULT_CLAIM_AMOUNT_TOLERANCE.to_string())
                    .parse()?,
                max_claiming_age_ms: env::var("CLAIM_MAX_CLAIMING_AGE_MS")
                    .unwrap_or_else(|_| DEFAULT_MAX_CLAIMING_AGE_MS.to_string())
                    .parse()?,
                sweep_interval_ms: env::var("CLAIM_SWEEP_INTERVAL_MS")
                    .unwrap_or_else(|_| DEFAULT_SWEEP_INTERVAL_MS.to_string())
                    .parse()?,
            },
            chain: ChainConfig {
                receipt_api_url: env::var("CHAIN_RECEIPT_API_URL")
                    .map_err(|_| anyhow::anyhow!("CHAIN_RECEIPT_API_URL must be set"))?,
                api_key: env::var("CHAIN_API_KEY").unwrap_or_default(),
            },
        })
    }
}
