//! Recovery for interrupted claim flows
//!
//! Two halves share one policy. The pure [`recovery_action`] function is
//! the client-side decision table for a persisted claim outbox record
//! after a crash or page reload. [`RecoverySweep`] is the server-side
//! backstop that unlocks bets abandoned in `claiming` so the winnings are
//! not stranded.

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use shared::errors::Result;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use uuid::Uuid;

use crate::chain::TxReceipt;
use crate::domain::{BetPatch, BetStatus, LedgerEvent};
use crate::repository::{AuthorizationRepository, BetRepository};

/// What a client persists before submitting a claim transaction. Enough
/// to re-request an authorization or reconcile a landed one after a
/// crash or page reload.
#[derive(Debug, Clone)]
pub struct ClaimOutboxRecord {
    pub bet_id: Uuid,
    pub wallet: String,
    pub nonce: u64,
    pub amount: u64,
    /// Set once the transaction was broadcast
    pub tx_hash: Option<String>,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct RecoveryPolicy {
    /// Records younger than this are left alone; the transaction may
    /// still land on its own.
    pub min_claim_age: Duration,
    /// Bets locked in `claiming` longer than this are force-unlocked by
    /// the server sweep.
    pub max_claiming_age: Duration,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            min_claim_age: Duration::milliseconds(shared::DEFAULT_MIN_CLAIM_AGE_MS),
            max_claiming_age: Duration::milliseconds(shared::DEFAULT_MAX_CLAIMING_AGE_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Too early to tell; check again later.
    LeaveAlone,
    /// The claim demonstrably did not land; release the lock and request
    /// a fresh authorization.
    Unlock,
    /// The transaction succeeded; report it so the bet settles.
    Reconcile { tx_hash: String },
}

/// Decide what to do with an interrupted claim. Pure so both the client
/// runtime and tests exercise the same table.
pub fn recovery_action(
    record: &ClaimOutboxRecord,
    now: DateTime<Utc>,
    receipt: Option<&TxReceipt>,
    policy: &RecoveryPolicy,
) -> RecoveryAction {
    if now - record.issued_at < policy.min_claim_age {
        return RecoveryAction::LeaveAlone;
    }

    match (&record.tx_hash, receipt) {
        (Some(tx_hash), Some(receipt)) if receipt.succeeded => RecoveryAction::Reconcile {
            tx_hash: tx_hash.clone(),
        },
        // Broadcast but not yet visible: the indexer may be lagging, so
        // only the age gate above separates "wait" from "give up".
        (Some(_), None) => {
            if now - record.issued_at >= policy.max_claiming_age {
                RecoveryAction::Unlock
            } else {
                RecoveryAction::LeaveAlone
            }
        }
        // Failed on-chain, or never broadcast at all.
        _ => RecoveryAction::Unlock,
    }
}

/// Server-side sweep that unlocks bets stuck in `claiming`.
pub struct RecoverySweep {
    bets: Arc<dyn BetRepository>,
    authorizations: Arc<dyn AuthorizationRepository>,
    events: broadcast::Sender<LedgerEvent>,
    max_claiming_age: Duration,
    interval: std::time::Duration,
}

impl RecoverySweep {
    pub fn new(
        bets: Arc<dyn BetRepository>,
        authorizations: Arc<dyn AuthorizationRepository>,
        events: broadcast::Sender<LedgerEvent>,
        max_claiming_age: Duration,
        interval: std::time::Duration,
    ) -> Self {
        Self {
            bets,
            authorizations,
            events,
            max_claiming_age,
            interval,
        }
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.sweep_once().await {
                Ok(0) => {}
                Ok(unlocked) => info!(unlocked, "Recovery sweep released stuck claims"),
                Err(e) => error!(error = %e, "Recovery sweep failed"),
            }
        }
    }

    /// Unlock every bet that has held the claiming lock past the policy
    /// age. The conditional transition makes this safe against a
    /// confirmation landing mid-sweep.
    pub async fn sweep_once(&self) -> Result<usize> {
        let cutoff = Utc::now() - self.max_claiming_age;
        let mut unlocked = 0;

        for bet in self.bets.find_claiming_older_than(cutoff).await? {
            let patch = BetPatch {
                clear_claiming: true,
                ..Default::default()
            };
            if self
                .bets
                .transition(bet.bet_id, BetStatus::Claiming, BetStatus::Won, patch)
                .await?
            {
                self.authorizations.void_active_for_bet(bet.bet_id).await?;
                unlocked += 1;
                counter!("claims_unlocked_total").increment(1);
                info!(bet_id = %bet.bet_id, "Stuck claim unlocked");
                let _ = self
                    .events
                    .send(LedgerEvent::ClaimUnlocked { bet_id: bet.bet_id });
            }
        }

        Ok(unlocked)
    }
}
