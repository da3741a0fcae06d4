//! Claim confirmation against on-chain receipts
//!
//! The winner submits the signed authorization to the claim contract and
//! then reports the transaction hash back. Confirmation only trusts what
//! the chain indexer says: the receipt must come from the claim contract
//! and carry an event matching the issued authorization exactly.

use chrono::Utc;
use metrics::counter;
use shared::errors::{EngineError, Result};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::chain::{ChainReader, TxReceipt};
use crate::domain::{Bet, BetPatch, BetStatus, ClaimAuthorization, LedgerEvent};
use crate::repository::{AuthorizationRepository, BetRepository};

#[derive(Debug)]
pub enum ClaimOutcome {
    /// The claim landed on-chain; the bet is settled.
    Confirmed(Bet),
    /// The transaction is not yet observable; poll again.
    Pending,
    /// The transaction is final but does not settle this claim.
    Failed { reason: String, unlocked: bool },
}

pub struct ClaimConfirmer {
    bets: Arc<dyn BetRepository>,
    authorizations: Arc<dyn AuthorizationRepository>,
    chain: Arc<dyn ChainReader>,
    contract_address: String,
    events: broadcast::Sender<LedgerEvent>,
}

impl ClaimConfirmer {
    pub fn new(
        bets: Arc<dyn BetRepository>,
        authorizations: Arc<dyn AuthorizationRepository>,
        chain: Arc<dyn ChainReader>,
        contract_address: String,
        events: broadcast::Sender<LedgerEvent>,
    ) -> Self {
        Self {
            bets,
            authorizations,
            chain,
            contract_address,
            events,
        }
    }

    /// Check a reported claim transaction and settle or unlock the bet.
    ///
    /// Safe to call repeatedly with the same hash; an already-claimed bet
    /// confirms idempotently.
    pub async fn confirm_claim(
        &self,
        wallet: &str,
        bet_id: Uuid,
        tx_hash: &str,
        nonce: u64,
        amount: u64,
    ) -> Result<ClaimOutcome> {
        let bet = self
            .bets
            .find_by_id(bet_id)
            .await?
            .ok_or_else(|| EngineError::bet_not_found(bet_id))?;

        if bet.wallet != wallet {
            return Err(EngineError::wallet_mismatch(wallet));
        }
        match bet.status {
            BetStatus::Claimed => return Ok(ClaimOutcome::Confirmed(bet)),
            BetStatus::Claiming => {}
            _ => return Err(EngineError::not_claimable(bet_id)),
        }

        let auth = self
            .authorizations
            .find_active_by_bet(bet_id)
            .await?
            .ok_or_else(|| {
                EngineError::Conflict(format!("no active claim authorization for bet {}", bet_id))
            })?;

        // The caller must be confirming the authorization that is actually
        // outstanding, not a voided one it still holds.
        if auth.nonce != nonce || auth.amount != amount {
            return Err(EngineError::validation(
                "claim details do not match the outstanding authorization",
            ));
        }

        let Some(receipt) = self.chain.get_transaction_receipt(tx_hash).await? else {
            return Ok(ClaimOutcome::Pending);
        };

        if !receipt.succeeded {
            // Final and failed: release the lock so the winner can request
            // a fresh authorization. The old nonce stays burned.
            self.unlock(bet_id).await?;
            counter!("claims_failed_total").increment(1);
            warn!(bet_id = %bet_id, tx_hash, "Claim transaction failed, lock released");
            return Ok(ClaimOutcome::Failed {
                reason: "claim transaction failed on-chain".to_string(),
                unlocked: true,
            });
        }

        if receipt.to != self.contract_address {
            // A successful unrelated transaction proves nothing about this
            // claim; keep the lock, the sweep handles true abandonment.
            warn!(bet_id = %bet_id, tx_hash, to = %receipt.to, "Receipt is not from the claim contract");
            return Ok(ClaimOutcome::Failed {
                reason: "transaction did not invoke the claim contract".to_string(),
                unlocked: false,
            });
        }

        if !receipt_matches(&receipt, &auth) {
            warn!(bet_id = %bet_id, tx_hash, "No claim event matching the authorization");
            return Ok(ClaimOutcome::Failed {
                reason: "no claim event matching the authorization".to_string(),
                unlocked: false,
            });
        }

        let patch = BetPatch {
            claim_tx: Some(tx_hash.to_string()),
            settled_at: Some(Utc::now()),
            clear_claiming: true,
            ..Default::default()
        };
        if !self
            .bets
            .transition(bet_id, BetStatus::Claiming, BetStatus::Claimed, patch)
            .await?
        {
            // A concurrent confirmation landed first.
            let settled = self
                .bets
                .find_by_id(bet_id)
                .await?
                .ok_or_else(|| EngineError::bet_not_found(bet_id))?;
            if settled.status == BetStatus::Claimed {
                return Ok(ClaimOutcome::Confirmed(settled));
            }
            return Err(EngineError::not_claimable(bet_id));
        }

        counter!("claims_settled_total").increment(1);
        info!(bet_id = %bet_id, tx_hash, amount = auth.amount, "Claim settled");
        let _ = self.events.send(LedgerEvent::ClaimSettled {
            bet_id,
            tx_hash: tx_hash.to_string(),
        });

        self.bets
            .find_by_id(bet_id)
            .await?
            .map(ClaimOutcome::Confirmed)
            .ok_or_else(|| EngineError::bet_not_found(bet_id))
    }

    async fn unlock(&self, bet_id: Uuid) -> Result<()> {
        let patch = BetPatch {
            clear_claiming: true,
            ..Default::default()
        };
        if self
            .bets
            .transition(bet_id, BetStatus::Claiming, BetStatus::Won, patch)
            .await?
        {
            self.authorizations.void_active_for_bet(bet_id).await?;
            let _ = self.events.send(LedgerEvent::ClaimUnlocked { bet_id });
        }
        Ok(())
    }
}

/// The receipt settles the authorization only on an exact event match.
fn receipt_matches(receipt: &TxReceipt, auth: &ClaimAuthorization) -> bool {
    receipt.logs.iter().any(|log| {
        log.bet_id == auth.bet_id
            && log.claimant == auth.wallet
            && log.amount == auth.amount
            && log.round_commitment == auth.round_commitment
            && log.nonce == auth.nonce
    })
}
