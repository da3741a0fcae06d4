//! Persistence traits for rounds, tickets, bets, and claim authorizations
//!
//! The only concurrency primitive is the conditional status transition:
//! `BetRepository::transition` and `TicketRepository::consume` succeed for
//! exactly one caller when racing, which is what makes claim issuance and
//! ticket consumption exactly-once.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::errors::Result;
use uuid::Uuid;

use crate::domain::{Bet, BetPatch, BetStatus, ClaimAuthorization, Round, Ticket};

pub use memory::MemoryRepository;
pub use self::redis::RedisRepository;

#[async_trait]
pub trait RoundRepository: Send + Sync {
    async fn insert(&self, round: &Round) -> Result<()>;
    async fn update(&self, round: &Round) -> Result<()>;
    /// The most recently opened round, if any
    async fn current(&self) -> Result<Option<Round>>;
    async fn find_by_id(&self, round_id: Uuid) -> Result<Option<Round>>;
    /// Allocate the next monotonic round number
    async fn next_round_number(&self) -> Result<u64>;
}

#[async_trait]
pub trait TicketRepository: Send + Sync {
    async fn insert(&self, ticket: &Ticket) -> Result<()>;
    async fn find_by_id(&self, ticket_id: Uuid) -> Result<Option<Ticket>>;
    /// Conditionally mark the ticket used; returns false if it was
    /// already consumed
    async fn consume(&self, ticket_id: Uuid, round_id: Uuid) -> Result<bool>;
    /// Undo a consumption made for `round_id`; returns false when the
    /// ticket is not held by that round
    async fn release(&self, ticket_id: Uuid, round_id: Uuid) -> Result<bool>;
    async fn find_available_by_wallet(&self, wallet: &str) -> Result<Vec<Ticket>>;
}

#[async_trait]
pub trait BetRepository: Send + Sync {
    async fn insert(&self, bet: &Bet) -> Result<()>;
    async fn find_by_id(&self, bet_id: Uuid) -> Result<Option<Bet>>;
    async fn find_by_round(&self, round_id: Uuid) -> Result<Vec<Bet>>;
    async fn find_by_wallet(&self, wallet: &str, limit: i64) -> Result<Vec<Bet>>;
    /// Conditional status transition: applies `patch` and moves the bet
    /// from `from` to `to` only if the stored status still equals `from`.
    /// Returns false when another writer won the race.
    async fn transition(
        &self,
        bet_id: Uuid,
        from: BetStatus,
        to: BetStatus,
        patch: BetPatch,
    ) -> Result<bool>;
    /// Bets stuck in `claiming` since before the cutoff (recovery sweep)
    async fn find_claiming_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Bet>>;
}

#[async_trait]
pub trait AuthorizationRepository: Send + Sync {
    async fn insert(&self, auth: &ClaimAuthorization) -> Result<()>;
    /// The outstanding (non-voided) authorization for a bet, if any
    async fn find_active_by_bet(&self, bet_id: Uuid) -> Result<Option<ClaimAuthorization>>;
    /// Void the outstanding authorization; its nonce stays burned
    async fn void_active_for_bet(&self, bet_id: Uuid) -> Result<()>;
    /// Whether this nonce was ever issued for this bet (voided or not)
    async fn nonce_used(&self, bet_id: Uuid, nonce: u64) -> Result<bool>;
}
