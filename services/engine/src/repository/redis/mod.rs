//! Redis-backed repository implementation
//!
//! Rounds, tickets, and bets live in Redis hashes with sorted-set indexes
//! for wallet lookups and the claiming-lock sweep. The conditional writes
//! (`transition`, `consume`) run as Lua scripts so racing callers resolve
//! server-side.

mod keys;
mod lua_scripts;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use shared::errors::{EngineError, Result};
use shared::types::Multiplier;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::{Bet, BetPatch, BetStatus, ClaimAuthorization, Round, RoundPhase, Ticket};

use super::{AuthorizationRepository, BetRepository, RoundRepository, TicketRepository};
pub use keys::*;
pub use lua_scripts::*;

pub struct RedisRepository {
    redis: ConnectionManager,
}

impl RedisRepository {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

fn upstream(e: redis::RedisError) -> EngineError {
    EngineError::upstream(e)
}

fn parse_ms(map: &HashMap<String, String>, field: &str) -> Option<DateTime<Utc>> {
    map.get(field)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

fn opt_ms(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.timestamp_millis().to_string())
        .unwrap_or_default()
}

fn required_ms(
    map: &HashMap<String, String>,
    field: &str,
    key: &str,
) -> Result<DateTime<Utc>> {
    parse_ms(map, field)
        .ok_or_else(|| EngineError::fatal(format!("invalid {} for {}", field, key)))
}

fn parse_u64(map: &HashMap<String, String>, field: &str) -> u64 {
    map.get(field)
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0)
}

fn round_to_fields(round: &Round) -> Vec<(&'static str, String)> {
    vec![
        ("round_id", round.round_id.to_string()),
        ("round_number", round.round_number.to_string()),
        ("commitment", round.commitment.clone()),
        ("secret", round.secret.clone().unwrap_or_default()),
        (
            "crash_multiplier",
            round.crash_multiplier.as_hundredths().to_string(),
        ),
        (
            "ended_multiplier",
            round
                .ended_multiplier
                .map(|m| m.as_hundredths().to_string())
                .unwrap_or_default(),
        ),
        ("phase", round.phase.as_str().to_string()),
        ("started_at_ms", round.started_at.timestamp_millis().to_string()),
        ("flight_started_at_ms", opt_ms(round.flight_started_at)),
        ("ended_at_ms", opt_ms(round.ended_at)),
        ("total_wagered", round.total_wagered.to_string()),
        ("total_paid", round.total_paid.to_string()),
        ("forced", round.forced.to_string()),
    ]
}

fn round_from_map(key: &str, map: HashMap<String, String>) -> Result<Round> {
    let round_id = map
        .get("round_id")
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| EngineError::fatal(format!("invalid round_id for {}", key)))?;
    let phase_str = map.get("phase").map(|s| s.as_str()).unwrap_or_default();
    let phase = RoundPhase::parse(phase_str)
        .ok_or_else(|| EngineError::fatal(format!("invalid phase '{}' for {}", phase_str, key)))?;

    Ok(Round {
        round_id,
        round_number: parse_u64(&map, "round_number"),
        commitment: map.get("commitment").cloned().unwrap_or_default(),
        secret: map.get("secret").cloned().filter(|v| !v.is_empty()),
        crash_multiplier: Multiplier::from_hundredths(parse_u64(&map, "crash_multiplier")),
        ended_multiplier: map
            .get("ended_multiplier")
            .filter(|v| !v.is_empty())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Multiplier::from_hundredths),
        phase,
        started_at: required_ms(&map, "started_at_ms", key)?,
        flight_started_at: parse_ms(&map, "flight_started_at_ms"),
        ended_at: parse_ms(&map, "ended_at_ms"),
        total_wagered: parse_u64(&map, "total_wagered"),
        total_paid: parse_u64(&map, "total_paid"),
        forced: map
            .get("forced")
            .map(|v| v == "true")
            .unwrap_or(false),
    })
}

fn ticket_to_fields(ticket: &Ticket) -> Vec<(&'static str, String)> {
    vec![
        ("ticket_id", ticket.ticket_id.to_string()),
        ("wallet", ticket.wallet.clone()),
        ("face_value", ticket.face_value.to_string()),
        ("funding_token", ticket.funding_token.clone()),
        ("funding_amount", ticket.funding_amount.to_string()),
        (
            "expires_at_ms",
            ticket.expires_at.timestamp_millis().to_string(),
        ),
        ("used", ticket.used.to_string()),
        (
            "consumed_by_round",
            ticket
                .consumed_by_round
                .map(|id| id.to_string())
                .unwrap_or_default(),
        ),
        (
            "created_at_ms",
            ticket.created_at.timestamp_millis().to_string(),
        ),
    ]
}

fn ticket_from_map(key: &str, map: HashMap<String, String>) -> Result<Ticket> {
    let ticket_id = map
        .get("ticket_id")
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| EngineError::fatal(format!("invalid ticket_id for {}", key)))?;

    Ok(Ticket {
        ticket_id,
        wallet: map.get("wallet").cloned().unwrap_or_default(),
        face_value: parse_u64(&map, "face_value"),
        funding_token: map.get("funding_token").cloned().unwrap_or_default(),
        funding_amount: parse_u64(&map, "funding_amount"),
        expires_at: required_ms(&map, "expires_at_ms", key)?,
        used: map.get("used").map(|v| v == "true").unwrap_or(false),
        consumed_by_round: map
            .get("consumed_by_round")
            .filter(|v| !v.is_empty())
            .and_then(|v| Uuid::parse_str(v).ok()),
        created_at: required_ms(&map, "created_at_ms", key)?,
    })
}

fn bet_to_fields(bet: &Bet) -> Vec<(&'static str, String)> {
    vec![
        ("bet_id", bet.bet_id.to_string()),
        ("round_id", bet.round_id.to_string()),
        ("ticket_id", bet.ticket_id.to_string()),
        ("wallet", bet.wallet.clone()),
        ("stake", bet.stake.to_string()),
        (
            "auto_cashout_at",
            bet.auto_cashout_at
                .map(|m| m.as_hundredths().to_string())
                .unwrap_or_default(),
        ),
        (
            "cashed_out_at",
            bet.cashed_out_at
                .map(|m| m.as_hundredths().to_string())
                .unwrap_or_default(),
        ),
        ("winnings", bet.winnings.to_string()),
        ("status", bet.status.as_str().to_string()),
        ("created_at_ms", bet.created_at.timestamp_millis().to_string()),
        ("claiming_since_ms", opt_ms(bet.claiming_since)),
        ("claim_tx", bet.claim_tx.clone().unwrap_or_default()),
        ("settled_at_ms", opt_ms(bet.settled_at)),
    ]
}

fn bet_from_map(key: &str, map: HashMap<String, String>) -> Result<Bet> {
    let bet_id = map
        .get("bet_id")
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| EngineError::fatal(format!("invalid bet_id for {}", key)))?;
    let round_id = map
        .get("round_id")
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| EngineError::fatal(format!("invalid round_id for {}", key)))?;
    let ticket_id = map
        .get("ticket_id")
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| EngineError::fatal(format!("invalid ticket_id for {}", key)))?;
    let status_str = map.get("status").map(|s| s.as_str()).unwrap_or_default();
    let status = BetStatus::parse(status_str).ok_or_else(|| {
        EngineError::fatal(format!("invalid status '{}' for {}", status_str, key))
    })?;

    let parse_multiplier = |field: &str| {
        map.get(field)
            .filter(|v| !v.is_empty())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Multiplier::from_hundredths)
    };

    Ok(Bet {
        bet_id,
        round_id,
        ticket_id,
        wallet: map.get("wallet").cloned().unwrap_or_default(),
        stake: parse_u64(&map, "stake"),
        auto_cashout_at: parse_multiplier("auto_cashout_at"),
        cashed_out_at: parse_multiplier("cashed_out_at"),
        winnings: parse_u64(&map, "winnings"),
        status,
        created_at: required_ms(&map, "created_at_ms", key)?,
        claiming_since: parse_ms(&map, "claiming_since_ms"),
        claim_tx: map.get("claim_tx").cloned().filter(|v| !v.is_empty()),
        settled_at: parse_ms(&map, "settled_at_ms"),
    })
}

/// Serialize a [`BetPatch`] to Lua field/value argument pairs.
fn patch_to_args(patch: &BetPatch) -> Vec<(String, String)> {
    let mut args = Vec::new();
    if let Some(m) = patch.cashed_out_at {
        args.push(("cashed_out_at".into(), m.as_hundredths().to_string()));
    }
    if let Some(w) = patch.winnings {
        args.push(("winnings".into(), w.to_string()));
    }
    if let Some(t) = patch.claiming_since {
        args.push(("claiming_since_ms".into(), t.timestamp_millis().to_string()));
    }
    if let Some(tx) = &patch.claim_tx {
        args.push(("claim_tx".into(), tx.clone()));
    }
    if let Some(t) = patch.settled_at {
        args.push(("settled_at_ms".into(), t.timestamp_millis().to_string()));
    }
    if patch.clear_claiming {
        args.push(("claiming_since_ms".into(), String::new()));
    }
    args
}

async fn load_bet(redis: &mut ConnectionManager, bet_id: Uuid) -> Result<Option<Bet>> {
    let key = bet_key(bet_id);
    let map: HashMap<String, String> = redis.hgetall(&key).await.map_err(upstream)?;
    if map.is_empty() {
        return Ok(None);
    }
    bet_from_map(&key, map).map(Some)
}

#[async_trait]
impl RoundRepository for RedisRepository {
    async fn insert(&self, round: &Round) -> Result<()> {
        let mut conn = self.redis.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.hset_multiple(round_key(round.round_id), &round_to_fields(round))
            .ignore();
        pipe.set(current_round_key(), round.round_id.to_string())
            .ignore();
        let _: () = pipe.query_async(&mut conn).await.map_err(upstream)?;
        Ok(())
    }

    async fn update(&self, round: &Round) -> Result<()> {
        let mut conn = self.redis.clone();
        let _: () = conn
            .hset_multiple(round_key(round.round_id), &round_to_fields(round))
            .await
            .map_err(upstream)?;
        Ok(())
    }

    async fn current(&self) -> Result<Option<Round>> {
        let mut conn = self.redis.clone();
        let current: Option<String> = conn.get(current_round_key()).await.map_err(upstream)?;
        let Some(id_str) = current else {
            return Ok(None);
        };
        let Ok(round_id) = Uuid::parse_str(&id_str) else {
            return Ok(None);
        };
        RoundRepository::find_by_id(self, round_id).await
    }

    async fn find_by_id(&self, round_id: Uuid) -> Result<Option<Round>> {
        let mut conn = self.redis.clone();
        let key = round_key(round_id);
        let map: HashMap<String, String> = conn.hgetall(&key).await.map_err(upstream)?;
        if map.is_empty() {
            return Ok(None);
        }
        round_from_map(&key, map).map(Some)
    }

    async fn next_round_number(&self) -> Result<u64> {
        let mut conn = self.redis.clone();
        let number: u64 = conn.incr(round_counter_key(), 1).await.map_err(upstream)?;
        Ok(number)
    }
}

#[async_trait]
impl TicketRepository for RedisRepository {
    async fn insert(&self, ticket: &Ticket) -> Result<()> {
        let mut conn = self.redis.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.hset_multiple(ticket_key(ticket.ticket_id), &ticket_to_fields(ticket))
            .ignore();
        pipe.zadd(
            wallet_tickets_key(&ticket.wallet),
            ticket.ticket_id.to_string(),
            ticket.created_at.timestamp_millis(),
        )
        .ignore();
        let _: () = pipe.query_async(&mut conn).await.map_err(upstream)?;
        Ok(())
    }

    async fn find_by_id(&self, ticket_id: Uuid) -> Result<Option<Ticket>> {
        let mut conn = self.redis.clone();
        let key = ticket_key(ticket_id);
        let map: HashMap<String, String> = conn.hgetall(&key).await.map_err(upstream)?;
        if map.is_empty() {
            return Ok(None);
        }
        ticket_from_map(&key, map).map(Some)
    }

    async fn consume(&self, ticket_id: Uuid, round_id: Uuid) -> Result<bool> {
        let mut conn = self.redis.clone();
        let script = Script::new(CONSUME_TICKET_SCRIPT);
        let consumed: i32 = script
            .key(ticket_key(ticket_id))
            .arg(round_id.to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(upstream)?;
        Ok(consumed == 1)
    }

    async fn release(&self, ticket_id: Uuid, round_id: Uuid) -> Result<bool> {
        let mut conn = self.redis.clone();
        let script = Script::new(RELEASE_TICKET_SCRIPT);
        let released: i32 = script
            .key(ticket_key(ticket_id))
            .arg(round_id.to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(upstream)?;
        Ok(released == 1)
    }

    async fn find_available_by_wallet(&self, wallet: &str) -> Result<Vec<Ticket>> {
        let mut conn = self.redis.clone();
        let ids: Vec<String> = conn
            .zrevrange(wallet_tickets_key(wallet), 0, -1)
            .await
            .map_err(upstream)?;

        let now = Utc::now();
        let mut tickets = Vec::new();
        for id_str in ids {
            if let Ok(id) = Uuid::parse_str(&id_str) {
                if let Some(ticket) = TicketRepository::find_by_id(self, id).await? {
                    if !ticket.used && ticket.expires_at > now {
                        tickets.push(ticket);
                    }
                }
            }
        }
        Ok(tickets)
    }
}

#[async_trait]
impl BetRepository for RedisRepository {
    async fn insert(&self, bet: &Bet) -> Result<()> {
        let mut conn = self.redis.clone();
        let now_ms = bet.created_at.timestamp_millis();
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.hset_multiple(bet_key(bet.bet_id), &bet_to_fields(bet))
            .ignore();
        pipe.zadd(wallet_bets_key(&bet.wallet), bet.bet_id.to_string(), now_ms)
            .ignore();
        pipe.zadd(round_bets_key(bet.round_id), bet.bet_id.to_string(), now_ms)
            .ignore();
        let _: () = pipe.query_async(&mut conn).await.map_err(upstream)?;
        Ok(())
    }

    async fn find_by_id(&self, bet_id: Uuid) -> Result<Option<Bet>> {
        let mut conn = self.redis.clone();
        load_bet(&mut conn, bet_id).await
    }

    async fn find_by_round(&self, round_id: Uuid) -> Result<Vec<Bet>> {
        let mut conn = self.redis.clone();
        let ids: Vec<String> = conn
            .zrange(round_bets_key(round_id), 0, -1)
            .await
            .map_err(upstream)?;

        let mut bets = Vec::new();
        for id_str in ids {
            if let Ok(id) = Uuid::parse_str(&id_str) {
                if let Some(bet) = load_bet(&mut conn, id).await? {
                    bets.push(bet);
                }
            }
        }
        Ok(bets)
    }

    async fn find_by_wallet(&self, wallet: &str, limit: i64) -> Result<Vec<Bet>> {
        let mut conn = self.redis.clone();
        let end = (limit - 1).max(-1) as isize;
        let ids: Vec<String> = conn
            .zrevrange(wallet_bets_key(wallet), 0, end)
            .await
            .map_err(upstream)?;

        let mut bets = Vec::new();
        for id_str in ids {
            if let Ok(id) = Uuid::parse_str(&id_str) {
                if let Some(bet) = load_bet(&mut conn, id).await? {
                    bets.push(bet);
                }
            }
        }
        Ok(bets)
    }

    async fn transition(
        &self,
        bet_id: Uuid,
        from: BetStatus,
        to: BetStatus,
        patch: BetPatch,
    ) -> Result<bool> {
        let mut conn = self.redis.clone();
        let claiming_score = patch
            .claiming_since
            .map(|t| t.timestamp_millis())
            .unwrap_or_else(|| Utc::now().timestamp_millis());

        let script = Script::new(TRANSITION_SCRIPT);
        let mut invocation = script.prepare_invoke();
        invocation
            .key(bet_key(bet_id))
            .key(claiming_index_key())
            .arg(bet_id.to_string())
            .arg(from.as_str())
            .arg(to.as_str())
            .arg(claiming_score.to_string());
        for (field, value) in patch_to_args(&patch) {
            invocation.arg(field).arg(value);
        }

        let updated: i32 = invocation.invoke_async(&mut conn).await.map_err(upstream)?;
        Ok(updated == 1)
    }

    async fn find_claiming_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Bet>> {
        let mut conn = self.redis.clone();
        let cutoff_ms = cutoff.timestamp_millis();
        let ids: Vec<String> = conn
            .zrangebyscore(claiming_index_key(), "-inf", cutoff_ms)
            .await
            .map_err(upstream)?;

        let mut bets = Vec::new();
        for id_str in ids {
            if let Ok(id) = Uuid::parse_str(&id_str) {
                if let Some(bet) = load_bet(&mut conn, id).await? {
                    // The index is advisory; re-check against the hash.
                    if bet.status == BetStatus::Claiming {
                        bets.push(bet);
                    }
                }
            }
        }
        Ok(bets)
    }
}

#[async_trait]
impl AuthorizationRepository for RedisRepository {
    async fn insert(&self, auth: &ClaimAuthorization) -> Result<()> {
        let mut conn = self.redis.clone();
        let json = serde_json::to_string(auth)
            .map_err(|e| EngineError::fatal(format!("authorization serialization: {}", e)))?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.set(claim_auth_key(auth.bet_id), json).ignore();
        pipe.sadd(claim_nonces_key(auth.bet_id), auth.nonce).ignore();
        let _: () = pipe.query_async(&mut conn).await.map_err(upstream)?;
        Ok(())
    }

    async fn find_active_by_bet(&self, bet_id: Uuid) -> Result<Option<ClaimAuthorization>> {
        let mut conn = self.redis.clone();
        let json: Option<String> = conn.get(claim_auth_key(bet_id)).await.map_err(upstream)?;
        match json {
            None => Ok(None),
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| EngineError::fatal(format!("authorization deserialization: {}", e))),
        }
    }

    async fn void_active_for_bet(&self, bet_id: Uuid) -> Result<()> {
        let mut conn = self.redis.clone();
        // Nonces stay in the burned set; only the active record goes away.
        let _: () = conn.del(claim_auth_key(bet_id)).await.map_err(upstream)?;
        Ok(())
    }

    async fn nonce_used(&self, bet_id: Uuid, nonce: u64) -> Result<bool> {
        let mut conn = self.redis.clone();
        let used: bool = conn
            .sismember(claim_nonces_key(bet_id), nonce)
            .await
            .map_err(upstream)?;
        Ok(used)
    }
}
