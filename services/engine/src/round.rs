//! Round engine: the single writer of round state
//!
//! One task owns the phase machine (betting, countdown, flying, crashed,
//! payout) and loops forever. Handlers never mutate rounds; they read the
//! persisted state and send commands over the handle.

use backoff::backoff::Backoff;
use chrono::Utc;
use metrics::{counter, histogram};
use rand::rngs::OsRng;
use shared::errors::{EngineError, Result};
use shared::fairness::{commitment_of, crash_point, multiplier_at, FairnessConfig, SeedPair};
use shared::types::Multiplier;
use shared::MAX_PHASE_RETRIES;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use crate::config::GameConfig;
use crate::domain::{Round, RoundEvent, RoundPhase};
use crate::ledger::Ledger;
use crate::repository::RoundRepository;
use crate::retry::{is_transient, RetryPolicy};

#[derive(Debug, Clone, Copy)]
pub enum EngineCommand {
    /// Operator kill switch: crash the in-flight round at the current
    /// live multiplier.
    ForceCrash,
}

/// Cheap, cloneable handle for talking to the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
    events: broadcast::Sender<RoundEvent>,
}

impl EngineHandle {
    pub async fn force_crash(&self) -> Result<()> {
        self.commands
            .send(EngineCommand::ForceCrash)
            .await
            .map_err(|_| EngineError::upstream("round engine is not running"))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoundEvent> {
        self.events.subscribe()
    }
}

pub struct RoundEngine {
    rounds: Arc<dyn RoundRepository>,
    ledger: Arc<Ledger>,
    game: GameConfig,
    fairness: FairnessConfig,
    events: broadcast::Sender<RoundEvent>,
    commands: mpsc::Receiver<EngineCommand>,
}

impl RoundEngine {
    pub fn new(
        rounds: Arc<dyn RoundRepository>,
        ledger: Arc<Ledger>,
        game: GameConfig,
        fairness: FairnessConfig,
    ) -> (Self, EngineHandle) {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (event_tx, _) = broadcast::channel(256);
        let handle = EngineHandle {
            commands: command_tx,
            events: event_tx.clone(),
        };
        let engine = Self {
            rounds,
            ledger,
            game,
            fairness,
            events: event_tx,
            commands: command_rx,
        };
        (engine, handle)
    }

    /// Run rounds forever. A round that fails past its phase retries is
    /// abandoned and the loop backs off before opening the next one; it
    /// never exits on its own.
    pub async fn run(mut self) {
        let mut failure_backoff = RetryPolicy::new(MAX_PHASE_RETRIES).backoff();
        let mut consecutive_failures: u32 = 0;
        loop {
            match self.run_round().await {
                Ok(round_number) => {
                    consecutive_failures = 0;
                    failure_backoff.reset();
                    counter!("rounds_completed_total").increment(1);
                    info!(round_number, "Round completed");
                }
                Err(e) => {
                    consecutive_failures += 1;
                    counter!("round_failures_total").increment(1);
                    if let Err(abandon_err) = self.abandon_stuck_round().await {
                        error!(error = %abandon_err, "Could not abandon stuck round");
                    }
                    let wait = failure_backoff
                        .next_backoff()
                        .unwrap_or(Duration::from_secs(30));
                    error!(
                        error = %e,
                        consecutive_failures,
                        backoff_ms = wait.as_millis() as u64,
                        "Round failed, backing off"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Retry a phase-advancing write through transient upstream
    /// failures. Exhaustion or any non-transient error fails the round.
    async fn advance<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let policy = RetryPolicy::new(MAX_PHASE_RETRIES);
        let mut backoff = policy.backoff();
        let mut failures = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if is_transient(&e) => {
                    failures += 1;
                    if !policy.should_retry(failures) {
                        return Err(e);
                    }
                    let wait = backoff.next_backoff().unwrap_or(Duration::from_secs(15));
                    warn!(
                        error = %e,
                        what,
                        failures,
                        backoff_ms = wait.as_millis() as u64,
                        "Phase write failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn run_round(&mut self) -> Result<u64> {
        // Commands sent while no round was in flight are stale.
        while self.commands.try_recv().is_ok() {}

        let pair = SeedPair::generate(&mut OsRng);
        let round_number = self
            .advance("allocate round number", || self.rounds.next_round_number())
            .await?;
        let crash = crash_point(&pair.secret, round_number, &self.fairness);

        let mut round = Round::open(round_number, pair.commitment.to_string(), crash);
        self.advance("open betting", || self.rounds.insert(&round))
            .await?;
        info!(
            round_number,
            round_id = %round.round_id,
            commitment = %pair.commitment,
            "Betting opened"
        );
        let _ = self.events.send(RoundEvent::BettingOpened {
            round_id: round.round_id,
            round_number,
            commitment: round.commitment.clone(),
        });
        tokio::time::sleep(Duration::from_millis(self.game.betting_window_ms)).await;

        round.phase = RoundPhase::Countdown;
        self.advance("start countdown", || self.rounds.update(&round))
            .await?;
        let _ = self.events.send(RoundEvent::CountdownStarted {
            round_id: round.round_id,
        });
        tokio::time::sleep(Duration::from_millis(self.game.countdown_ms)).await;

        let flight_started_at = Utc::now();
        round.phase = RoundPhase::Flying;
        round.flight_started_at = Some(flight_started_at);
        self.advance("start flight", || self.rounds.update(&round))
            .await?;
        // A force-crash sent before the flight has no round to crash;
        // only commands arriving from here on apply.
        while self.commands.try_recv().is_ok() {}
        let _ = self.events.send(RoundEvent::FlightStarted {
            round_id: round.round_id,
        });

        // Auto cash-outs at or past the crash point never pay, even when
        // a tick overshoots the curve.
        let sweep_cap = Multiplier::from_hundredths(crash.as_hundredths().saturating_sub(1));
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.game.flight_tick_ms.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut forced = false;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let elapsed_ms =
                        (Utc::now() - flight_started_at).num_milliseconds().max(0) as u64;
                    let live = multiplier_at(elapsed_ms, self.game.growth_rate_per_ms);
                    // The next tick repeats the sweep, so a transient
                    // failure here only delays auto cash-outs.
                    if let Err(e) = self
                        .ledger
                        .auto_cashout_sweep(&round, live.min(sweep_cap))
                        .await
                    {
                        if !is_transient(&e) {
                            return Err(e);
                        }
                        warn!(error = %e, "Auto cash-out sweep failed, retrying next tick");
                    }
                    if live >= crash {
                        break;
                    }
                }
                Some(cmd) = self.commands.recv() => {
                    match cmd {
                        EngineCommand::ForceCrash => {
                            warn!(round_id = %round.round_id, "Force-crash requested");
                            let elapsed_ms = (Utc::now() - flight_started_at)
                                .num_milliseconds()
                                .max(0) as u64;
                            let live = multiplier_at(elapsed_ms, self.game.growth_rate_per_ms);
                            self.ledger
                                .auto_cashout_sweep(&round, live.min(sweep_cap))
                                .await?;
                            forced = true;
                            break;
                        }
                    }
                }
            }
        }

        let elapsed_ms = (Utc::now() - flight_started_at).num_milliseconds().max(0) as u64;
        let live = multiplier_at(elapsed_ms, self.game.growth_rate_per_ms);
        let ended = if forced { live.min(crash) } else { crash };

        // The reveal must match the published commitment or the round is
        // not auditable. This failing means corrupted engine state.
        if commitment_of(&pair.secret).to_string() != round.commitment {
            return Err(EngineError::fatal(format!(
                "commitment mismatch on reveal for round {}",
                round.round_id
            )));
        }

        round.phase = RoundPhase::Crashed;
        round.secret = Some(pair.secret.to_string());
        round.ended_multiplier = Some(ended);
        round.ended_at = Some(Utc::now());
        round.forced = forced;
        self.advance("reveal crash", || self.rounds.update(&round))
            .await?;
        info!(
            round_id = %round.round_id,
            multiplier = %ended,
            forced,
            "Round crashed"
        );
        histogram!("crash_multiplier_hundredths").record(ended.as_hundredths() as f64);
        let _ = self.events.send(RoundEvent::Crashed {
            round_id: round.round_id,
            multiplier: ended,
            secret: pair.secret.to_string(),
            forced,
        });

        let (total_wagered, total_paid) = self
            .advance("settle losses", || self.ledger.settle_round_losses(&round))
            .await?;
        round.phase = RoundPhase::Payout;
        round.total_wagered = total_wagered;
        round.total_paid = total_paid;
        self.advance("finish payout", || self.rounds.update(&round))
            .await?;
        let _ = self.events.send(RoundEvent::PayoutFinished {
            round_id: round.round_id,
            total_wagered,
            total_paid,
        });
        tokio::time::sleep(Duration::from_millis(self.game.payout_pause_ms)).await;

        Ok(round_number)
    }

    /// Drive a round that failed mid-flight to a terminal phase so at most
    /// one non-terminal round exists before the next one opens. Bets that
    /// were still active when the flight died settle as losses.
    async fn abandon_stuck_round(&self) -> Result<()> {
        let Some(mut round) = self.rounds.current().await? else {
            return Ok(());
        };
        if round.phase == RoundPhase::Payout {
            return Ok(());
        }
        warn!(
            round_id = %round.round_id,
            phase = %round.phase,
            "Abandoning stuck round"
        );

        let (total_wagered, total_paid) = self.ledger.settle_round_losses(&round).await?;
        round.phase = RoundPhase::Payout;
        round.ended_at = Some(Utc::now());
        round.total_wagered = total_wagered;
        round.total_paid = total_paid;
        self.rounds.update(&round).await?;
        counter!("rounds_abandoned_total").increment(1);
        let _ = self.events.send(RoundEvent::PayoutFinished {
            round_id: round.round_id,
            total_wagered,
            total_paid,
        });
        Ok(())
    }
}
