//! Claim authorization signing
//!
//! A claim request moves the bet `won` -> `claiming` and issues exactly
//! one ed25519 authorization over a domain-tagged message. The contract
//! verifies the same byte layout on-chain, so [`claim_message`] is the
//! wire format.

use chrono::Utc;
use metrics::counter;
use shared::errors::{EngineError, Result};
use shared::CLAIM_MESSAGE_DOMAIN_TAG;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

use crate::domain::{BetPatch, BetStatus, ClaimAuthorization, LedgerEvent};
use crate::repository::{AuthorizationRepository, BetRepository, RoundRepository};

/// The exact byte sequence the engine signs and the claim contract
/// re-derives: tag, claimant, amount, commitment, nonce, chain id,
/// contract address.
pub fn claim_message(
    wallet: &Pubkey,
    amount: u64,
    round_commitment: &Hash,
    nonce: u64,
    chain_id: u64,
    contract_address: &Pubkey,
) -> Vec<u8> {
    let mut message = Vec::with_capacity(CLAIM_MESSAGE_DOMAIN_TAG.len() + 32 + 8 + 32 + 8 + 8 + 32);
    message.extend_from_slice(CLAIM_MESSAGE_DOMAIN_TAG);
    message.extend_from_slice(&wallet.to_bytes());
    message.extend_from_slice(&amount.to_le_bytes());
    message.extend_from_slice(round_commitment.as_ref());
    message.extend_from_slice(&nonce.to_le_bytes());
    message.extend_from_slice(&chain_id.to_le_bytes());
    message.extend_from_slice(&contract_address.to_bytes());
    message
}

/// Verify an authorization signature against the signer's public key.
pub fn verify_claim_signature(signer: &Pubkey, message: &[u8], signature: &Signature) -> bool {
    signature.verify(signer.as_ref(), message)
}

pub struct ClaimSigner {
    bets: Arc<dyn BetRepository>,
    rounds: Arc<dyn RoundRepository>,
    authorizations: Arc<dyn AuthorizationRepository>,
    keypair: Arc<Keypair>,
    chain_id: u64,
    contract_address: Pubkey,
    amount_tolerance: u64,
    events: broadcast::Sender<LedgerEvent>,
}

impl ClaimSigner {
    pub fn new(
        bets: Arc<dyn BetRepository>,
        rounds: Arc<dyn RoundRepository>,
        authorizations: Arc<dyn AuthorizationRepository>,
        keypair: Arc<Keypair>,
        chain_id: u64,
        contract_address: Pubkey,
        amount_tolerance: u64,
        events: broadcast::Sender<LedgerEvent>,
    ) -> Self {
        Self {
            bets,
            rounds,
            authorizations,
            keypair,
            chain_id,
            contract_address,
            amount_tolerance,
            events,
        }
    }

    pub fn signer_pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Issue a signed claim authorization for a won bet.
    ///
    /// The nonce is client-chosen; any nonce ever issued for the bet is
    /// burned, so a replay after an unlock always fails here. The `won`
    /// -> `claiming` transition is the serialization point: concurrent
    /// requests for the same bet all reach it, one wins, the rest get
    /// `Conflict`.
    pub async fn request_claim(
        &self,
        wallet: &str,
        bet_id: Uuid,
        amount: u64,
        nonce: u64,
    ) -> Result<ClaimAuthorization> {
        let bet = self
            .bets
            .find_by_id(bet_id)
            .await?
            .ok_or_else(|| EngineError::bet_not_found(bet_id))?;

        if bet.wallet != wallet {
            return Err(EngineError::wallet_mismatch(wallet));
        }
        match bet.status {
            BetStatus::Won => {}
            BetStatus::Claimed => return Err(EngineError::already_claimed(bet_id)),
            BetStatus::Claiming => return Err(EngineError::claim_in_progress(bet_id)),
            BetStatus::Active | BetStatus::Lost => {
                return Err(EngineError::not_claimable(bet_id))
            }
        }

        // Clients compute winnings independently; tolerate rounding drift
        // of at most the configured amount, nothing more.
        if amount.abs_diff(bet.winnings) > self.amount_tolerance {
            return Err(EngineError::amount_mismatch(amount, bet.winnings));
        }

        let round = self
            .rounds
            .find_by_id(bet.round_id)
            .await?
            .ok_or_else(|| EngineError::fatal(format!("round missing for bet {}", bet_id)))?;
        let commitment = Hash::from_str(&round.commitment)
            .map_err(|_| EngineError::fatal(format!("bad stored commitment for bet {}", bet_id)))?;
        let claimant = Pubkey::from_str(wallet)
            .map_err(|_| EngineError::validation("wallet is not a valid public key"))?;

        if self.authorizations.nonce_used(bet_id, nonce).await? {
            return Err(EngineError::Conflict(format!(
                "nonce {} already used for bet {}",
                nonce, bet_id
            )));
        }

        let patch = BetPatch {
            claiming_since: Some(Utc::now()),
            ..Default::default()
        };
        if !self
            .bets
            .transition(bet_id, BetStatus::Won, BetStatus::Claiming, patch)
            .await?
        {
            return Err(EngineError::claim_in_progress(bet_id));
        }

        let message = claim_message(
            &claimant,
            bet.winnings,
            &commitment,
            nonce,
            self.chain_id,
            &self.contract_address,
        );
        let signature = self.keypair.sign_message(&message);

        let auth = ClaimAuthorization {
            bet_id,
            wallet: wallet.to_string(),
            amount: bet.winnings,
            round_commitment: round.commitment.clone(),
            nonce,
            chain_id: self.chain_id,
            contract_address: self.contract_address.to_string(),
            signature: signature.to_string(),
            issued_at: Utc::now(),
            voided: false,
        };
        self.authorizations.insert(&auth).await?;

        counter!("claims_issued_total").increment(1);
        info!(bet_id = %bet_id, nonce, amount = bet.winnings, "Claim authorization issued");
        let _ = self.events.send(LedgerEvent::ClaimLocked { bet_id, nonce });

        Ok(auth)
    }
}
