/// Provably-fair commitment scheme and crash-point derivation
///
/// Before betting opens the engine generates a 32-byte secret and publishes
/// `commitment = sha256(secret)`. The crash multiplier is derived
/// deterministically from the secret and the round number, so after the
/// secret is revealed any third party can re-run [`verify_round`] and audit
/// the round without trusting the server.
use rand::RngCore;
use solana_sdk::hash::{hash, Hash};

use crate::constants::{
    DEFAULT_HOUSE_EDGE_BPS, DEFAULT_INSTANT_CRASH_ONE_IN, DEFAULT_MAX_MULTIPLIER_HUNDREDTHS,
};
use crate::types::Multiplier;

/// Tunable parameters of the crash-point distribution.
///
/// Deliberately configuration, not constants: operators tune edge and
/// instant-crash odds per deployment.
#[derive(Debug, Clone, Copy)]
pub struct FairnessConfig {
    /// House edge in basis points (100 = 1%)
    pub house_edge_bps: u16,
    /// One round in N crashes instantly at 1.00x; 0 disables instant crashes
    pub instant_crash_one_in: u64,
    /// Hard cap on the crash multiplier regardless of formula output
    pub max_multiplier: Multiplier,
}

impl Default for FairnessConfig {
    fn default() -> Self {
        Self {
            house_edge_bps: DEFAULT_HOUSE_EDGE_BPS,
            instant_crash_one_in: DEFAULT_INSTANT_CRASH_ONE_IN,
            max_multiplier: Multiplier::from_hundredths(DEFAULT_MAX_MULTIPLIER_HUNDREDTHS),
        }
    }
}

/// A round's secret and its public commitment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedPair {
    pub secret: Hash,
    pub commitment: Hash,
}

impl SeedPair {
    /// Generate a fresh secret/commitment pair from the given RNG.
    pub fn generate<R: RngCore>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self::from_secret(Hash::new_from_array(bytes))
    }

    /// Generate from the OS RNG.
    pub fn random() -> Self {
        Self::generate(&mut rand::rngs::OsRng)
    }

    pub fn from_secret(secret: Hash) -> Self {
        Self {
            secret,
            commitment: commitment_of(&secret),
        }
    }
}

/// The one-way commitment: sha256 of the secret bytes.
pub fn commitment_of(secret: &Hash) -> Hash {
    hash(secret.as_ref())
}

/// Deterministically derive the crash multiplier from a secret and the
/// round number.
///
/// The round number is mixed into the digest so a secret can never be
/// precomputed and reused across rounds. The uniform 64-bit draw is mapped
/// through a fixed-point inverse-CDF in basis points, floored at 1.00x and
/// capped at the configured maximum.
pub fn crash_point(secret: &Hash, round_number: u64, config: &FairnessConfig) -> Multiplier {
    let mut data = Vec::with_capacity(40);
    data.extend_from_slice(secret.as_ref());
    data.extend_from_slice(&round_number.to_le_bytes());
    let digest = hash(&data).to_bytes();

    let draw = u64::from_le_bytes(digest[0..8].try_into().expect("8-byte slice"));
    let instant_draw = u64::from_le_bytes(digest[8..16].try_into().expect("8-byte slice"));

    if config.instant_crash_one_in > 0 && instant_draw % config.instant_crash_one_in == 0 {
        return Multiplier::ONE;
    }

    // Map the draw to 0..=9999 bps, then invert: crash = (1 - edge) / (1 - p).
    let normalized_bps = (draw as u128) * 9_999 / (u64::MAX as u128);
    let denominator = 10_000u128 - normalized_bps; // 1..=10000
    let edge_factor = 10_000u128 - config.house_edge_bps as u128;
    let hundredths = (edge_factor * 100 / denominator) as u64;

    Multiplier::from_hundredths(
        hundredths.clamp(100, config.max_multiplier.as_hundredths()),
    )
}

/// Third-party audit of a revealed round.
///
/// Returns the independently recomputed crash multiplier when the revealed
/// secret matches the published commitment, `None` otherwise.
pub fn verify_round(
    commitment: &Hash,
    revealed_secret: &Hash,
    round_number: u64,
    config: &FairnessConfig,
) -> Option<Multiplier> {
    if commitment_of(revealed_secret) != *commitment {
        return None;
    }
    Some(crash_point(revealed_secret, round_number, config))
}

/// Continuous live multiplier as a function of elapsed flight time.
///
/// Exponential growth from a shared start timestamp so every observer
/// converges on the same value; derived, never stored.
pub fn multiplier_at(elapsed_ms: u64, growth_rate_per_ms: f64) -> Multiplier {
    let value = (growth_rate_per_ms * elapsed_ms as f64).exp();
    let live = Multiplier::from_f64(value);
    if live < Multiplier::ONE {
        Multiplier::ONE
    } else {
        live
    }
}
