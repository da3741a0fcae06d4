/// Shared constants for the crash game engine
///
/// This module centralizes default tunables so the engine, tests, and any
/// auditing tooling agree on the same numbers. Everything here can be
/// overridden through the engine's environment configuration.

/// Default betting window duration in milliseconds (15 seconds)
pub const DEFAULT_BETTING_WINDOW_MS: u64 = 15_000;

/// Default countdown between betting close and flight start (3 seconds)
pub const DEFAULT_COUNTDOWN_MS: u64 = 3_000;

/// Default pause after payout before the next round opens (4 seconds)
pub const DEFAULT_PAYOUT_PAUSE_MS: u64 = 4_000;

/// Default flight tick for the auto-cash-out sweep (100 ms)
pub const DEFAULT_FLIGHT_TICK_MS: u64 = 100;

/// Default exponential growth rate of the live multiplier, per millisecond
///
/// multiplier(t) = e^(rate * t_ms), so 0.00006 doubles roughly every 11.5s.
pub const DEFAULT_GROWTH_RATE_PER_MS: f64 = 0.00006;

/// Default house edge in basis points (1%)
pub const DEFAULT_HOUSE_EDGE_BPS: u16 = 100;

/// Default instant-crash odds: one round in N crashes at exactly 1.00x
pub const DEFAULT_INSTANT_CRASH_ONE_IN: u64 = 33;

/// Default crash multiplier cap in hundredths (250.00x)
///
/// Bounds worst-case payout exposure regardless of formula output.
pub const DEFAULT_MAX_MULTIPLIER_HUNDREDTHS: u64 = 25_000;

/// Default claim amount tolerance in smallest settlement units
pub const DEFAULT_CLAIM_AMOUNT_TOLERANCE: u64 = 1;

/// Default minimum age before a persisted pending claim is eligible for
/// client-side recovery (30 seconds)
pub const DEFAULT_MIN_CLAIM_AGE_MS: i64 = 30_000;

/// Default maximum time a bet may sit in `claiming` before the server-side
/// sweep unlocks it (5 minutes)
pub const DEFAULT_MAX_CLAIMING_AGE_MS: i64 = 300_000;

/// Default interval between recovery sweep passes (1 minute)
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 60_000;

/// Domain separation tag prefixed to every claim authorization message
pub const CLAIM_MESSAGE_DOMAIN_TAG: &[u8] = b"crash-claim-v1";

/// Maximum consecutive failures before the round engine abandons the
/// current round and starts fresh
pub const MAX_PHASE_RETRIES: u32 = 5;
