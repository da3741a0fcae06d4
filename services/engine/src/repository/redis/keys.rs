//! Redis key generation functions
//!
//! Centralizes all Redis key patterns used for round, ticket, bet, and
//! claim-authorization storage and indexing.

use uuid::Uuid;

const ROUND_KEY_PREFIX: &str = "round:";
const CURRENT_ROUND_KEY: &str = "rounds:current";
const ROUND_COUNTER_KEY: &str = "rounds:counter";

const TICKET_KEY_PREFIX: &str = "ticket:";
const WALLET_TICKETS_PREFIX: &str = "tickets:wallet:";

const BET_KEY_PREFIX: &str = "bet:";
const WALLET_BETS_PREFIX: &str = "bets:wallet:";
const ROUND_BETS_PREFIX: &str = "bets:round:";

/// Sorted set of bet ids holding the claiming lock, scored by lock time
const CLAIMING_INDEX: &str = "bets:claiming";

const CLAIM_AUTH_PREFIX: &str = "claim:active:";
const CLAIM_NONCES_PREFIX: &str = "claim:nonces:";

pub fn round_key(round_id: Uuid) -> String {
    format!("{}{}", ROUND_KEY_PREFIX, round_id)
}

pub fn current_round_key() -> &'static str {
    CURRENT_ROUND_KEY
}

pub fn round_counter_key() -> &'static str {
    ROUND_COUNTER_KEY
}

pub fn ticket_key(ticket_id: Uuid) -> String {
    format!("{}{}", TICKET_KEY_PREFIX, ticket_id)
}

pub fn wallet_tickets_key(wallet: &str) -> String {
    format!("{}{}", WALLET_TICKETS_PREFIX, wallet)
}

pub fn bet_key(bet_id: Uuid) -> String {
    format!("{}{}", BET_KEY_PREFIX, bet_id)
}

pub fn wallet_bets_key(wallet: &str) -> String {
    format!("{}{}", WALLET_BETS_PREFIX, wallet)
}

pub fn round_bets_key(round_id: Uuid) -> String {
    format!("{}{}", ROUND_BETS_PREFIX, round_id)
}

pub fn claiming_index_key() -> &'static str {
    CLAIMING_INDEX
}

pub fn claim_auth_key(bet_id: Uuid) -> String {
    format!("{}{}", CLAIM_AUTH_PREFIX, bet_id)
}

pub fn claim_nonces_key(bet_id: Uuid) -> String {
    format!("{}{}", CLAIM_NONCES_PREFIX, bet_id)
}
