//! End-to-end claim flow over the in-memory repository and stub chain.

use chrono::{Duration, Utc};
use engine::chain::{ClaimEventLog, StubChainReader, TxReceipt};
use engine::claims::{claim_message, verify_claim_signature, ClaimConfirmer, ClaimOutcome,
    ClaimSigner, RecoverySweep};
use engine::domain::{Bet, BetStatus, ClaimAuthorization, Round, Ticket};
use engine::repository::{
    AuthorizationRepository, BetRepository, MemoryRepository, RoundRepository, TicketRepository,
};
use shared::errors::EngineError;
use shared::fairness::SeedPair;
use shared::types::Multiplier;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

const CONTRACT: &str = "11111111111111111111111111111111";

struct Harness {
    repo: Arc<MemoryRepository>,
    signer: ClaimSigner,
    confirmer: ClaimConfirmer,
    chain: Arc<StubChainReader>,
    keypair: Arc<Keypair>,
}

fn harness() -> Harness {
    let repo = Arc::new(MemoryRepository::new());
    let chain = Arc::new(StubChainReader::new());
    let keypair = Arc::new(Keypair::new());
    let (events, _) = broadcast::channel(64);
    let contract = Pubkey::from_str(CONTRACT).unwrap();

    let signer = ClaimSigner::new(
        repo.clone(),
        repo.clone(),
        repo.clone(),
        keypair.clone(),
        1,
        contract,
        1,
        events.clone(),
    );
    let confirmer = ClaimConfirmer::new(
        repo.clone(),
        repo.clone(),
        chain.clone(),
        CONTRACT.to_string(),
        events,
    );

    Harness {
        repo,
        signer,
        confirmer,
        chain,
        keypair,
    }
}

/// Insert a settled round and a won bet for a fresh wallet.
async fn won_bet(repo: &MemoryRepository, winnings: u64) -> (String, Bet, Round) {
    let wallet = Pubkey::new_unique().to_string();
    let pair = SeedPair::random();
    let mut round = Round::open(1, pair.commitment.to_string(), Multiplier::from_hundredths(345));
    round.secret = Some(pair.secret.to_string());
    RoundRepository::insert(repo, &round).await.unwrap();

    let ticket = Ticket {
        ticket_id: Uuid::new_v4(),
        wallet: wallet.clone(),
        face_value: winnings / 2,
        funding_token: "SOL".to_string(),
        funding_amount: winnings / 2,
        expires_at: Utc::now() + Duration::hours(1),
        used: true,
        consumed_by_round: Some(round.round_id),
        created_at: Utc::now(),
    };
    TicketRepository::insert(repo, &ticket).await.unwrap();

    let mut bet = Bet::place(round.round_id, &ticket, None);
    bet.status = BetStatus::Won;
    bet.cashed_out_at = Some(Multiplier::from_hundredths(200));
    bet.winnings = winnings;
    BetRepository::insert(repo, &bet).await.unwrap();

    (wallet, bet, round)
}

fn matching_receipt(auth: &ClaimAuthorization) -> TxReceipt {
    TxReceipt {
        succeeded: true,
        to: CONTRACT.to_string(),
        logs: vec![ClaimEventLog {
            bet_id: auth.bet_id,
            claimant: auth.wallet.clone(),
            amount: auth.amount,
            round_commitment: auth.round_commitment.clone(),
            nonce: auth.nonce,
        }],
    }
}

#[tokio::test]
async fn test_concurrent_claim_requests_yield_one_signature() {
    let h = harness();
    let (wallet, bet, _) = won_bet(&h.repo, 2_000).await;

    let (a, b) = tokio::join!(
        h.signer.request_claim(&wallet, bet.bet_id, 2_000, 11),
        h.signer.request_claim(&wallet, bet.bet_id, 2_000, 22),
    );

    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1);
    let loser = if a.is_ok() { b } else { a };
    assert!(loser.unwrap_err().is_conflict());

    let stored = BetRepository::find_by_id(h.repo.as_ref(), bet.bet_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, BetStatus::Claiming);
    assert!(stored.claiming_since.is_some());
}

#[tokio::test]
async fn test_authorization_signature_verifies() {
    let h = harness();
    let (wallet, bet, round) = won_bet(&h.repo, 2_000).await;

    let auth = h.signer.request_claim(&wallet, bet.bet_id, 2_000, 7).await.unwrap();
    assert_eq!(auth.amount, 2_000);
    assert_eq!(auth.nonce, 7);
    assert_eq!(auth.round_commitment, round.commitment);

    let message = claim_message(
        &Pubkey::from_str(&auth.wallet).unwrap(),
        auth.amount,
        &Hash::from_str(&auth.round_commitment).unwrap(),
        auth.nonce,
        auth.chain_id,
        &Pubkey::from_str(&auth.contract_address).unwrap(),
    );
    let signature = Signature::from_str(&auth.signature).unwrap();
    assert!(verify_claim_signature(
        &h.keypair.pubkey(),
        &message,
        &signature
    ));
}

#[tokio::test]
async fn test_amount_tolerance() {
    let h = harness();

    // Off by one unit is within the configured tolerance.
    let (wallet, bet, _) = won_bet(&h.repo, 2_000).await;
    let auth = h.signer.request_claim(&wallet, bet.bet_id, 2_001, 1).await.unwrap();
    // The authorization always carries the server-side amount.
    assert_eq!(auth.amount, 2_000);

    // Off by fifty is a hard mismatch.
    let (wallet, bet, _) = won_bet(&h.repo, 2_000).await;
    let err = h
        .signer
        .request_claim(&wallet, bet.bet_id, 2_050, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn test_claim_rejections() {
    let h = harness();
    let (wallet, bet, _) = won_bet(&h.repo, 2_000).await;

    // Wrong wallet.
    let other = Pubkey::new_unique().to_string();
    let err = h.signer.request_claim(&other, bet.bet_id, 2_000, 1).await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    // Unknown bet.
    let err = h
        .signer
        .request_claim(&wallet, Uuid::new_v4(), 2_000, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));

    // Second request while claiming, even with a fresh nonce.
    h.signer.request_claim(&wallet, bet.bet_id, 2_000, 1).await.unwrap();
    let err = h.signer.request_claim(&wallet, bet.bet_id, 2_000, 2).await.unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_confirm_pending_then_confirmed() {
    let h = harness();
    let (wallet, bet, _) = won_bet(&h.repo, 2_000).await;
    let auth = h.signer.request_claim(&wallet, bet.bet_id, 2_000, 7).await.unwrap();

    // Indexer has not seen the transaction yet.
    let outcome = h
        .confirmer
        .confirm_claim(&wallet, bet.bet_id, "tx1", auth.nonce, auth.amount)
        .await
        .unwrap();
    assert!(matches!(outcome, ClaimOutcome::Pending));

    h.chain.insert_receipt("tx1", matching_receipt(&auth));
    let outcome = h
        .confirmer
        .confirm_claim(&wallet, bet.bet_id, "tx1", auth.nonce, auth.amount)
        .await
        .unwrap();
    let ClaimOutcome::Confirmed(settled) = outcome else {
        panic!("expected confirmation");
    };
    assert_eq!(settled.status, BetStatus::Claimed);
    assert_eq!(settled.claim_tx.as_deref(), Some("tx1"));
    assert!(settled.settled_at.is_some());

    // Re-confirming an already settled bet is idempotent.
    let outcome = h
        .confirmer
        .confirm_claim(&wallet, bet.bet_id, "tx1", auth.nonce, auth.amount)
        .await
        .unwrap();
    assert!(matches!(outcome, ClaimOutcome::Confirmed(_)));
}

#[tokio::test]
async fn test_confirm_rejects_stale_authorization_details() {
    let h = harness();
    let (wallet, bet, _) = won_bet(&h.repo, 2_000).await;
    let auth = h.signer.request_claim(&wallet, bet.bet_id, 2_000, 7).await.unwrap();

    let err = h
        .confirmer
        .confirm_claim(&wallet, bet.bet_id, "tx1", auth.nonce + 1, auth.amount)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn test_failed_transaction_unlocks_and_burns_nonce() {
    let h = harness();
    let (wallet, bet, _) = won_bet(&h.repo, 2_000).await;
    let first = h.signer.request_claim(&wallet, bet.bet_id, 2_000, 7).await.unwrap();

    h.chain.insert_receipt(
        "tx-failed",
        TxReceipt {
            succeeded: false,
            to: CONTRACT.to_string(),
            logs: vec![],
        },
    );
    let outcome = h
        .confirmer
        .confirm_claim(&wallet, bet.bet_id, "tx-failed", first.nonce, first.amount)
        .await
        .unwrap();
    let ClaimOutcome::Failed { unlocked, .. } = outcome else {
        panic!("expected failure");
    };
    assert!(unlocked);

    let stored = BetRepository::find_by_id(h.repo.as_ref(), bet.bet_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, BetStatus::Won);
    assert!(stored.claiming_since.is_none());
    assert!(
        AuthorizationRepository::find_active_by_bet(h.repo.as_ref(), bet.bet_id)
            .await
            .unwrap()
            .is_none()
    );

    // The voided nonce stays burned; a fresh one is accepted.
    let err = h
        .signer
        .request_claim(&wallet, bet.bet_id, 2_000, first.nonce)
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    let second = h.signer.request_claim(&wallet, bet.bet_id, 2_000, 8).await.unwrap();
    assert_ne!(second.nonce, first.nonce);
    assert!(
        AuthorizationRepository::nonce_used(h.repo.as_ref(), bet.bet_id, first.nonce)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_wrong_contract_keeps_the_lock() {
    let h = harness();
    let (wallet, bet, _) = won_bet(&h.repo, 2_000).await;
    let auth = h.signer.request_claim(&wallet, bet.bet_id, 2_000, 7).await.unwrap();

    h.chain.insert_receipt(
        "tx-other",
        TxReceipt {
            succeeded: true,
            to: "SomeOtherProgram11111111111111111111111111".to_string(),
            logs: vec![],
        },
    );
    let outcome = h
        .confirmer
        .confirm_claim(&wallet, bet.bet_id, "tx-other", auth.nonce, auth.amount)
        .await
        .unwrap();
    let ClaimOutcome::Failed { unlocked, .. } = outcome else {
        panic!("expected failure");
    };
    assert!(!unlocked);

    let stored = BetRepository::find_by_id(h.repo.as_ref(), bet.bet_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, BetStatus::Claiming);
}

#[tokio::test]
async fn test_recovery_sweep_unlocks_stuck_claims() {
    let h = harness();
    let (wallet, bet, _) = won_bet(&h.repo, 2_000).await;
    let auth = h.signer.request_claim(&wallet, bet.bet_id, 2_000, 7).await.unwrap();

    // Backdate the lock past the sweep cutoff.
    let stuck_patch = engine::domain::BetPatch {
        claiming_since: Some(Utc::now() - Duration::minutes(10)),
        ..Default::default()
    };
    assert!(BetRepository::transition(
        h.repo.as_ref(),
        bet.bet_id,
        BetStatus::Claiming,
        BetStatus::Claiming,
        stuck_patch,
    )
    .await
    .unwrap());

    let (events, _) = broadcast::channel(16);
    let sweep = RecoverySweep::new(
        h.repo.clone(),
        h.repo.clone(),
        events,
        Duration::minutes(5),
        std::time::Duration::from_secs(60),
    );
    assert_eq!(sweep.sweep_once().await.unwrap(), 1);

    let stored = BetRepository::find_by_id(h.repo.as_ref(), bet.bet_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, BetStatus::Won);
    assert!(stored.claiming_since.is_none());
    assert!(
        AuthorizationRepository::find_active_by_bet(h.repo.as_ref(), bet.bet_id)
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        AuthorizationRepository::nonce_used(h.repo.as_ref(), bet.bet_id, auth.nonce)
            .await
            .unwrap()
    );

    // Nothing left to unlock on the next pass.
    assert_eq!(sweep.sweep_once().await.unwrap(), 0);
}
