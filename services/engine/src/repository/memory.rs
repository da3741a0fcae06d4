//! In-memory repository backing tests and local development
//!
//! A mutex-guarded store implementing every repository trait. Conditional
//! transitions hold the lock across read-compare-write, giving the same
//! exactly-once semantics as the Redis Lua scripts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::errors::Result;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::domain::{Bet, BetPatch, BetStatus, ClaimAuthorization, Round, Ticket};

use super::{AuthorizationRepository, BetRepository, RoundRepository, TicketRepository};

#[derive(Default)]
struct Inner {
    rounds: HashMap<Uuid, Round>,
    current_round: Option<Uuid>,
    round_counter: u64,
    tickets: HashMap<Uuid, Ticket>,
    bets: HashMap<Uuid, Bet>,
    authorizations: HashMap<Uuid, Vec<ClaimAuthorization>>,
}

#[derive(Default)]
pub struct MemoryRepository {
    inner: Mutex<Inner>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn apply_patch(bet: &mut Bet, to: BetStatus, patch: BetPatch) {
    bet.status = to;
    if let Some(m) = patch.cashed_out_at {
        bet.cashed_out_at = Some(m);
    }
    if let Some(w) = patch.winnings {
        bet.winnings = w;
    }
    if let Some(t) = patch.claiming_since {
        bet.claiming_since = Some(t);
    }
    if let Some(tx) = patch.claim_tx {
        bet.claim_tx = Some(tx);
    }
    if let Some(t) = patch.settled_at {
        bet.settled_at = Some(t);
    }
    if patch.clear_claiming {
        bet.claiming_since = None;
    }
}

#[async_trait]
impl RoundRepository for MemoryRepository {
    async fn insert(&self, round: &Round) -> Result<()> {
        let mut inner = self.inner.lock().expect("memory repo poisoned");
        inner.rounds.insert(round.round_id, round.clone());
        inner.current_round = Some(round.round_id);
        Ok(())
    }

    async fn update(&self, round: &Round) -> Result<()> {
        let mut inner = self.inner.lock().expect("memory repo poisoned");
        inner.rounds.insert(round.round_id, round.clone());
        Ok(())
    }

    async fn current(&self) -> Result<Option<Round>> {
        let inner = self.inner.lock().expect("memory repo poisoned");
        Ok(inner
            .current_round
            .and_then(|id| inner.rounds.get(&id).cloned()))
    }

    async fn find_by_id(&self, round_id: Uuid) -> Result<Option<Round>> {
        let inner = self.inner.lock().expect("memory repo poisoned");
        Ok(inner.rounds.get(&round_id).cloned())
    }

    async fn next_round_number(&self) -> Result<u64> {
        let mut inner = self.inner.lock().expect("memory repo poisoned");
        inner.round_counter += 1;
        Ok(inner.round_counter)
    }
}

#[async_trait]
impl TicketRepository for MemoryRepository {
    async fn insert(&self, ticket: &Ticket) -> Result<()> {
        let mut inner = self.inner.lock().expect("memory repo poisoned");
        inner.tickets.insert(ticket.ticket_id, ticket.clone());
        Ok(())
    }

    async fn find_by_id(&self, ticket_id: Uuid) -> Result<Option<Ticket>> {
        let inner = self.inner.lock().expect("memory repo poisoned");
        Ok(inner.tickets.get(&ticket_id).cloned())
    }

    async fn consume(&self, ticket_id: Uuid, round_id: Uuid) -> Result<bool> {
        let mut inner = self.inner.lock().expect("memory repo poisoned");
        match inner.tickets.get_mut(&ticket_id) {
            Some(ticket) if !ticket.used => {
                ticket.used = true;
                ticket.consumed_by_round = Some(round_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, ticket_id: Uuid, round_id: Uuid) -> Result<bool> {
        let mut inner = self.inner.lock().expect("memory repo poisoned");
        match inner.tickets.get_mut(&ticket_id) {
            Some(ticket) if ticket.used && ticket.consumed_by_round == Some(round_id) => {
                ticket.used = false;
                ticket.consumed_by_round = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_available_by_wallet(&self, wallet: &str) -> Result<Vec<Ticket>> {
        let inner = self.inner.lock().expect("memory repo poisoned");
        let now = Utc::now();
        Ok(inner
            .tickets
            .values()
            .filter(|t| t.wallet == wallet && !t.used && t.expires_at > now)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BetRepository for MemoryRepository {
    async fn insert(&self, bet: &Bet) -> Result<()> {
        let mut inner = self.inner.lock().expect("memory repo poisoned");
        inner.bets.insert(bet.bet_id, bet.clone());
        Ok(())
    }

    async fn find_by_id(&self, bet_id: Uuid) -> Result<Option<Bet>> {
        let inner = self.inner.lock().expect("memory repo poisoned");
        Ok(inner.bets.get(&bet_id).cloned())
    }

    async fn find_by_round(&self, round_id: Uuid) -> Result<Vec<Bet>> {
        let inner = self.inner.lock().expect("memory repo poisoned");
        Ok(inner
            .bets
            .values()
            .filter(|b| b.round_id == round_id)
            .cloned()
            .collect())
    }

    async fn find_by_wallet(&self, wallet: &str, limit: i64) -> Result<Vec<Bet>> {
        let inner = self.inner.lock().expect("memory repo poisoned");
        let mut bets: Vec<Bet> = inner
            .bets
            .values()
            .filter(|b| b.wallet == wallet)
            .cloned()
            .collect();
        bets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        bets.truncate(limit.max(0) as usize);
        Ok(bets)
    }

    async fn transition(
        &self,
        bet_id: Uuid,
        from: BetStatus,
        to: BetStatus,
        patch: BetPatch,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().expect("memory repo poisoned");
        match inner.bets.get_mut(&bet_id) {
            Some(bet) if bet.status == from => {
                apply_patch(bet, to, patch);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_claiming_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Bet>> {
        let inner = self.inner.lock().expect("memory repo poisoned");
        Ok(inner
            .bets
            .values()
            .filter(|b| {
                b.status == BetStatus::Claiming
                    && b.claiming_since.map(|t| t < cutoff).unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AuthorizationRepository for MemoryRepository {
    async fn insert(&self, auth: &ClaimAuthorization) -> Result<()> {
        let mut inner = self.inner.lock().expect("memory repo poisoned");
        inner
            .authorizations
            .entry(auth.bet_id)
            .or_default()
            .push(auth.clone());
        Ok(())
    }

    async fn find_active_by_bet(&self, bet_id: Uuid) -> Result<Option<ClaimAuthorization>> {
        let inner = self.inner.lock().expect("memory repo poisoned");
        Ok(inner
            .authorizations
            .get(&bet_id)
            .and_then(|auths| auths.iter().rev().find(|a| !a.voided).cloned()))
    }

    async fn void_active_for_bet(&self, bet_id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().expect("memory repo poisoned");
        if let Some(auths) = inner.authorizations.get_mut(&bet_id) {
            for auth in auths.iter_mut() {
                auth.voided = true;
            }
        }
        Ok(())
    }

    async fn nonce_used(&self, bet_id: Uuid, nonce: u64) -> Result<bool> {
        let inner = self.inner.lock().expect("memory repo poisoned");
        Ok(inner
            .authorizations
            .get(&bet_id)
            .map(|auths| auths.iter().any(|a| a.nonce == nonce))
            .unwrap_or(false))
    }
}
