/// Shared error taxonomy for the crash game engine
///
/// Design Philosophy:
/// - One category per caller-visible failure mode so clients can tell
///   recoverable outcomes (`Conflict`, `Pending`) apart from hard failures
/// - Categories map to HTTP status codes and logging severity
/// - Constructor helpers keep call sites terse and messages consistent
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error categories that map to HTTP status codes and logging severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Bad input shape or value (400 Bad Request)
    Validation,

    /// Wallet does not own the resource (403 Forbidden)
    Forbidden,

    /// Resource not found (404 Not Found)
    NotFound,

    /// Status precondition failed: already claiming, already claimed,
    /// ticket used, race lost (409 Conflict). Expected and recoverable.
    Conflict,

    /// Blockchain state not yet observable (202 Accepted). Not a true
    /// error; callers poll and retry.
    Pending,

    /// Upstream RPC/storage failure (503 Service Unavailable)
    Upstream,

    /// Internal invariant violated, e.g. commitment/reveal mismatch (500)
    Fatal,
}

impl ErrorCategory {
    /// Map error category to HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorCategory::Validation => 400,
            ErrorCategory::Forbidden => 403,
            ErrorCategory::NotFound => 404,
            ErrorCategory::Conflict => 409,
            ErrorCategory::Pending => 202,
            ErrorCategory::Upstream => 503,
            ErrorCategory::Fatal => 500,
        }
    }

    /// Map error category to log level
    pub fn log_level(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "warn",
            ErrorCategory::Forbidden => "warn",
            ErrorCategory::NotFound => "info",
            ErrorCategory::Conflict => "info",
            ErrorCategory::Pending => "debug",
            ErrorCategory::Upstream => "error",
            ErrorCategory::Fatal => "error",
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("pending: {0}")]
    Pending(String),

    #[error("upstream: {0}")]
    Upstream(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl EngineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::Validation(_) => ErrorCategory::Validation,
            EngineError::Forbidden(_) => ErrorCategory::Forbidden,
            EngineError::NotFound(_) => ErrorCategory::NotFound,
            EngineError::Conflict(_) => ErrorCategory::Conflict,
            EngineError::Pending(_) => ErrorCategory::Pending,
            EngineError::Upstream(_) => ErrorCategory::Upstream,
            EngineError::Fatal(_) => ErrorCategory::Fatal,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation(message.into())
    }

    pub fn upstream(error: impl fmt::Display) -> Self {
        EngineError::Upstream(error.to_string())
    }

    pub fn fatal(message: impl fmt::Display) -> Self {
        EngineError::Fatal(message.to_string())
    }

    // NotFound constructors
    pub fn bet_not_found(bet_id: impl fmt::Display) -> Self {
        EngineError::NotFound(format!("bet {} not found", bet_id))
    }

    pub fn ticket_not_found(ticket_id: impl fmt::Display) -> Self {
        EngineError::NotFound(format!("ticket {} not found", ticket_id))
    }

    pub fn round_not_found() -> Self {
        EngineError::NotFound("no active round".to_string())
    }

    // Forbidden constructors
    pub fn wallet_mismatch(wallet: impl fmt::Display) -> Self {
        EngineError::Forbidden(format!("wallet {} does not own this resource", wallet))
    }

    // Conflict constructors
    pub fn ticket_used(ticket_id: impl fmt::Display) -> Self {
        EngineError::Conflict(format!("ticket {} already consumed", ticket_id))
    }

    pub fn already_claimed(bet_id: impl fmt::Display) -> Self {
        EngineError::Conflict(format!("bet {} already claimed", bet_id))
    }

    pub fn claim_in_progress(bet_id: impl fmt::Display) -> Self {
        EngineError::Conflict(format!("claim already in progress for bet {}", bet_id))
    }

    pub fn not_claimable(bet_id: impl fmt::Display) -> Self {
        EngineError::Conflict(format!("bet {} is not in a claimable state", bet_id))
    }

    pub fn wrong_phase(expected: &str, actual: impl fmt::Display) -> Self {
        EngineError::Conflict(format!(
            "round is not {} (current phase: {})",
            expected, actual
        ))
    }

    // Validation constructors
    pub fn amount_mismatch(claimed: u64, computed: u64) -> Self {
        EngineError::Validation(format!(
            "claimed amount {} does not match computed winnings {}",
            claimed, computed
        ))
    }

    pub fn ticket_expired(ticket_id: impl fmt::Display) -> Self {
        EngineError::Validation(format!("ticket {} expired", ticket_id))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::Conflict(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, EngineError::Pending(_))
    }
}

// Convenience type alias
pub type Result<T> = std::result::Result<T, EngineError>;
