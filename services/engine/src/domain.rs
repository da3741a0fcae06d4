use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::types::Multiplier;
use uuid::Uuid;

/// Lifecycle phase of a round. `Idle` only appears in the read model when
/// no round is live; persisted rounds start at `Betting` and end at
/// `Payout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    Idle,
    Betting,
    Countdown,
    Flying,
    Crashed,
    Payout,
}

impl RoundPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundPhase::Idle => "idle",
            RoundPhase::Betting => "betting",
            RoundPhase::Countdown => "countdown",
            RoundPhase::Flying => "flying",
            RoundPhase::Crashed => "crashed",
            RoundPhase::Payout => "payout",
        }
    }

    pub fn parse(s: &str) -> Option<RoundPhase> {
        match s {
            "idle" => Some(RoundPhase::Idle),
            "betting" => Some(RoundPhase::Betting),
            "countdown" => Some(RoundPhase::Countdown),
            "flying" => Some(RoundPhase::Flying),
            "crashed" => Some(RoundPhase::Crashed),
            "payout" => Some(RoundPhase::Payout),
            _ => None,
        }
    }
}

impl std::fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One play of the crash game. Written only by the round engine task.
///
/// `crash_multiplier` is the pre-derived crash point; it is known
/// server-side from creation but must never be exposed through the read
/// model before the round crashes. `ended_multiplier` is the value at
/// which the round actually ended; it differs from `crash_multiplier`
/// only on operator force-crash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub round_id: Uuid,
    pub round_number: u64,
    /// Public commitment hash, published before betting opens (base58)
    pub commitment: String,
    /// Revealed secret (base58); None until the round crashes
    pub secret: Option<String>,
    pub crash_multiplier: Multiplier,
    pub ended_multiplier: Option<Multiplier>,
    pub phase: RoundPhase,
    pub started_at: DateTime<Utc>,
    pub flight_started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub total_wagered: u64,
    pub total_paid: u64,
    pub forced: bool,
}

impl Round {
    pub fn open(round_number: u64, commitment: String, crash_multiplier: Multiplier) -> Self {
        Self {
            round_id: Uuid::new_v4(),
            round_number,
            commitment,
            secret: None,
            crash_multiplier,
            ended_multiplier: None,
            phase: RoundPhase::Betting,
            started_at: Utc::now(),
            flight_started_at: None,
            ended_at: None,
            total_wagered: 0,
            total_paid: 0,
            forced: false,
        }
    }
}

/// A prepaid, single-use entry right. Minted by the external purchase
/// flow; the engine trusts tickets already validated as paid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: Uuid,
    pub wallet: String,
    /// Stake amount this ticket entitles, in smallest settlement units
    pub face_value: u64,
    pub funding_token: String,
    pub funding_amount: u64,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub consumed_by_round: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetStatus {
    Active,
    Won,
    Lost,
    Claiming,
    Claimed,
}

impl BetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BetStatus::Active => "active",
            BetStatus::Won => "won",
            BetStatus::Lost => "lost",
            BetStatus::Claiming => "claiming",
            BetStatus::Claimed => "claimed",
        }
    }

    pub fn parse(s: &str) -> Option<BetStatus> {
        match s {
            "active" => Some(BetStatus::Active),
            "won" => Some(BetStatus::Won),
            "lost" => Some(BetStatus::Lost),
            "claiming" => Some(BetStatus::Claiming),
            "claimed" => Some(BetStatus::Claimed),
            _ => None,
        }
    }
}

impl std::fmt::Display for BetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bet {
    pub bet_id: Uuid,
    pub round_id: Uuid,
    pub ticket_id: Uuid,
    pub wallet: String,
    pub stake: u64,
    pub auto_cashout_at: Option<Multiplier>,
    pub cashed_out_at: Option<Multiplier>,
    pub winnings: u64,
    pub status: BetStatus,
    pub created_at: DateTime<Utc>,
    /// Set while the bet holds the claiming lock
    pub claiming_since: Option<DateTime<Utc>>,
    /// Transaction hash of the confirmed on-chain claim
    pub claim_tx: Option<String>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Bet {
    pub fn place(
        round_id: Uuid,
        ticket: &Ticket,
        auto_cashout_at: Option<Multiplier>,
    ) -> Self {
        Self {
            bet_id: Uuid::new_v4(),
            round_id,
            ticket_id: ticket.ticket_id,
            wallet: ticket.wallet.clone(),
            stake: ticket.face_value,
            auto_cashout_at,
            cashed_out_at: None,
            winnings: 0,
            status: BetStatus::Active,
            created_at: Utc::now(),
            claiming_since: None,
            claim_tx: None,
            settled_at: None,
        }
    }
}

/// Field updates applied together with a conditional status transition.
#[derive(Debug, Clone, Default)]
pub struct BetPatch {
    pub cashed_out_at: Option<Multiplier>,
    pub winnings: Option<u64>,
    pub claiming_since: Option<DateTime<Utc>>,
    pub claim_tx: Option<String>,
    pub settled_at: Option<DateTime<Utc>>,
    /// Clear the claiming lock timestamp (unlock path)
    pub clear_claiming: bool,
}

/// The signed tuple a winner submits to the claim contract. Created
/// exactly once per bet while holding the claiming lock; never mutated
/// except for voiding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimAuthorization {
    pub bet_id: Uuid,
    pub wallet: String,
    pub amount: u64,
    pub round_commitment: String,
    pub nonce: u64,
    pub chain_id: u64,
    pub contract_address: String,
    /// Base58 ed25519 signature over the claim message
    pub signature: String,
    pub issued_at: DateTime<Utc>,
    pub voided: bool,
}

/// Phase-change notifications published by the round engine.
#[derive(Debug, Clone)]
pub enum RoundEvent {
    BettingOpened {
        round_id: Uuid,
        round_number: u64,
        commitment: String,
    },
    CountdownStarted {
        round_id: Uuid,
    },
    FlightStarted {
        round_id: Uuid,
    },
    Crashed {
        round_id: Uuid,
        multiplier: Multiplier,
        secret: String,
        forced: bool,
    },
    PayoutFinished {
        round_id: Uuid,
        total_wagered: u64,
        total_paid: u64,
    },
}

/// State-transition notifications published by the ledger and claim flow.
#[derive(Debug, Clone)]
pub enum LedgerEvent {
    BetPlaced {
        bet_id: Uuid,
        round_id: Uuid,
        wallet: String,
        stake: u64,
    },
    CashedOut {
        bet_id: Uuid,
        multiplier: Multiplier,
        winnings: u64,
        auto: bool,
    },
    BetLost {
        bet_id: Uuid,
    },
    ClaimLocked {
        bet_id: Uuid,
        nonce: u64,
    },
    ClaimSettled {
        bet_id: Uuid,
        tx_hash: String,
    },
    ClaimUnlocked {
        bet_id: Uuid,
    },
}
