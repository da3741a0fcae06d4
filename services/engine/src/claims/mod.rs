//! Claim issuance, confirmation, and recovery
//!
//! Winnings leave the engine as signed claim authorizations that the
//! winner submits on-chain. The claiming lock (`won` -> `claiming`) is
//! the only gate: whoever wins that conditional transition gets the one
//! signature for the bet.

pub mod confirmer;
pub mod recovery;
pub mod signer;

pub use confirmer::{ClaimConfirmer, ClaimOutcome};
pub use recovery::{
    recovery_action, ClaimOutboxRecord, RecoveryAction, RecoveryPolicy, RecoverySweep,
};
pub use signer::{claim_message, verify_claim_signature, ClaimSigner};
