//! Bet ledger: placement, cash-out, and loss settlement
//!
//! Every status change goes through the repository's conditional
//! transition, so a manual cash-out racing the auto-cash-out sweep (or
//! the crash edge) resolves to exactly one winner.

use chrono::Utc;
use metrics::counter;
use shared::errors::{EngineError, Result};
use shared::fairness::multiplier_at;
use shared::types::Multiplier;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{Bet, BetPatch, BetStatus, LedgerEvent, Round, RoundPhase};
use crate::repository::{BetRepository, RoundRepository, TicketRepository};

pub struct Ledger {
    rounds: Arc<dyn RoundRepository>,
    tickets: Arc<dyn TicketRepository>,
    bets: Arc<dyn BetRepository>,
    events: broadcast::Sender<LedgerEvent>,
    growth_rate_per_ms: f64,
}

impl Ledger {
    pub fn new(
        rounds: Arc<dyn RoundRepository>,
        tickets: Arc<dyn TicketRepository>,
        bets: Arc<dyn BetRepository>,
        events: broadcast::Sender<LedgerEvent>,
        growth_rate_per_ms: f64,
    ) -> Self {
        Self {
            rounds,
            tickets,
            bets,
            events,
            growth_rate_per_ms,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    /// Place a bet into the current round, consuming the ticket.
    ///
    /// The ticket consumption is the conditional write: two requests for
    /// the same ticket can both pass validation, but only one consumes it.
    pub async fn place_bet(
        &self,
        wallet: &str,
        ticket_id: Uuid,
        auto_cashout_at: Option<Multiplier>,
    ) -> Result<Bet> {
        let round = self
            .rounds
            .current()
            .await?
            .ok_or_else(EngineError::round_not_found)?;
        if round.phase != RoundPhase::Betting {
            return Err(EngineError::wrong_phase("betting", round.phase));
        }

        if let Some(target) = auto_cashout_at {
            if target <= Multiplier::ONE {
                return Err(EngineError::validation(
                    "auto cash-out target must exceed 1.00x",
                ));
            }
        }

        let ticket = self
            .tickets
            .find_by_id(ticket_id)
            .await?
            .ok_or_else(|| EngineError::ticket_not_found(ticket_id))?;

        if ticket.wallet != wallet {
            return Err(EngineError::wallet_mismatch(wallet));
        }
        if ticket.used {
            return Err(EngineError::ticket_used(ticket_id));
        }
        if ticket.expires_at <= Utc::now() {
            return Err(EngineError::ticket_expired(ticket_id));
        }

        if !self.tickets.consume(ticket_id, round.round_id).await? {
            // Another request consumed the ticket between read and write.
            return Err(EngineError::ticket_used(ticket_id));
        }

        let bet = Bet::place(round.round_id, &ticket, auto_cashout_at);
        if let Err(e) = self.bets.insert(&bet).await {
            // Hand the ticket back instead of burning it with no bet on
            // record. The release only succeeds against our consumption.
            if let Err(release_err) = self.tickets.release(ticket_id, round.round_id).await {
                warn!(
                    ticket_id = %ticket_id,
                    error = %release_err,
                    "Could not release ticket after failed bet insert"
                );
            }
            return Err(e);
        }

        counter!("bets_placed_total").increment(1);
        info!(
            bet_id = %bet.bet_id,
            round_id = %round.round_id,
            wallet,
            stake = bet.stake,
            "Bet placed"
        );
        let _ = self.events.send(LedgerEvent::BetPlaced {
            bet_id: bet.bet_id,
            round_id: bet.round_id,
            wallet: bet.wallet.clone(),
            stake: bet.stake,
        });

        Ok(bet)
    }

    /// Manual cash-out at the current live multiplier.
    pub async fn cash_out(&self, wallet: &str, bet_id: Uuid) -> Result<Bet> {
        let bet = self
            .bets
            .find_by_id(bet_id)
            .await?
            .ok_or_else(|| EngineError::bet_not_found(bet_id))?;

        if bet.wallet != wallet {
            return Err(EngineError::wallet_mismatch(wallet));
        }
        if bet.status != BetStatus::Active {
            return Err(EngineError::Conflict(format!(
                "bet is {}, not active",
                bet.status
            )));
        }

        let round = self
            .rounds
            .find_by_id(bet.round_id)
            .await?
            .ok_or_else(EngineError::round_not_found)?;

        if round.phase != RoundPhase::Flying {
            return Err(EngineError::wrong_phase("flying", round.phase));
        }
        let flight_started_at = round
            .flight_started_at
            .ok_or_else(|| EngineError::fatal("flying round without flight start time"))?;

        let elapsed_ms = (Utc::now() - flight_started_at).num_milliseconds().max(0) as u64;
        let live = multiplier_at(elapsed_ms, self.growth_rate_per_ms);

        // The stored crash point is authoritative; the phase field may lag
        // a tick behind it.
        if live >= round.crash_multiplier {
            return Err(EngineError::Conflict("round already crashed".to_string()));
        }

        let winnings = live
            .winnings(bet.stake)
            .map_err(|e| EngineError::fatal(e.to_string()))?;

        let patch = BetPatch {
            cashed_out_at: Some(live),
            winnings: Some(winnings),
            ..Default::default()
        };
        if !self
            .bets
            .transition(bet_id, BetStatus::Active, BetStatus::Won, patch)
            .await?
        {
            return Err(EngineError::Conflict(
                "bet was settled concurrently".to_string(),
            ));
        }

        counter!("cashouts_total", "kind" => "manual").increment(1);
        info!(bet_id = %bet_id, multiplier = %live, winnings, "Manual cash-out");
        let _ = self.events.send(LedgerEvent::CashedOut {
            bet_id,
            multiplier: live,
            winnings,
            auto: false,
        });

        self.bets
            .find_by_id(bet_id)
            .await?
            .ok_or_else(|| EngineError::bet_not_found(bet_id))
    }

    /// Settle every active bet whose auto cash-out target the flight has
    /// reached. Pays at the requested target, not the live value.
    ///
    /// Called by the round engine each flight tick, before the crash edge
    /// is evaluated.
    pub async fn auto_cashout_sweep(&self, round: &Round, live: Multiplier) -> Result<usize> {
        let mut settled = 0;
        for bet in self.bets.find_by_round(round.round_id).await? {
            if bet.status != BetStatus::Active {
                continue;
            }
            let Some(target) = bet.auto_cashout_at else {
                continue;
            };
            if target > live {
                continue;
            }

            let winnings = target
                .winnings(bet.stake)
                .map_err(|e| EngineError::fatal(e.to_string()))?;
            let patch = BetPatch {
                cashed_out_at: Some(target),
                winnings: Some(winnings),
                ..Default::default()
            };
            if self
                .bets
                .transition(bet.bet_id, BetStatus::Active, BetStatus::Won, patch)
                .await?
            {
                settled += 1;
                counter!("cashouts_total", "kind" => "auto").increment(1);
                debug!(bet_id = %bet.bet_id, target = %target, winnings, "Auto cash-out");
                let _ = self.events.send(LedgerEvent::CashedOut {
                    bet_id: bet.bet_id,
                    multiplier: target,
                    winnings,
                    auto: true,
                });
            }
        }
        Ok(settled)
    }

    /// Mark every still-active bet lost and compute the round aggregates.
    ///
    /// Runs once per round from the engine task after the crash.
    pub async fn settle_round_losses(&self, round: &Round) -> Result<(u64, u64)> {
        let mut total_wagered: u64 = 0;
        let mut total_paid: u64 = 0;

        for bet in self.bets.find_by_round(round.round_id).await? {
            total_wagered = total_wagered.saturating_add(bet.stake);
            match bet.status {
                BetStatus::Active => {
                    if self
                        .bets
                        .transition(
                            bet.bet_id,
                            BetStatus::Active,
                            BetStatus::Lost,
                            BetPatch::default(),
                        )
                        .await?
                    {
                        counter!("bets_lost_total").increment(1);
                        let _ = self.events.send(LedgerEvent::BetLost { bet_id: bet.bet_id });
                    } else {
                        // A cash-out landed between the crash and this
                        // settlement pass; count it as paid.
                        warn!(bet_id = %bet.bet_id, "Bet settled during loss pass");
                        if let Some(late) = self.bets.find_by_id(bet.bet_id).await? {
                            total_paid = total_paid.saturating_add(late.winnings);
                        }
                    }
                }
                BetStatus::Won | BetStatus::Claiming | BetStatus::Claimed => {
                    total_paid = total_paid.saturating_add(bet.winnings);
                }
                BetStatus::Lost => {}
            }
        }

        Ok((total_wagered, total_paid))
    }

    pub async fn bet(&self, bet_id: Uuid) -> Result<Option<Bet>> {
        self.bets.find_by_id(bet_id).await
    }

    pub async fn bets_for_wallet(&self, wallet: &str, limit: i64) -> Result<Vec<Bet>> {
        self.bets.find_by_wallet(wallet, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Ticket;
    use crate::repository::MemoryRepository;
    use chrono::Duration;

    fn ledger_with_repo() -> (Arc<MemoryRepository>, Ledger) {
        let repo = Arc::new(MemoryRepository::new());
        let (tx, _rx) = broadcast::channel(64);
        let ledger = Ledger::new(
            repo.clone(),
            repo.clone(),
            repo.clone(),
            tx,
            shared::DEFAULT_GROWTH_RATE_PER_MS,
        );
        (repo, ledger)
    }

    fn ticket(wallet: &str, face_value: u64) -> Ticket {
        Ticket {
            ticket_id: Uuid::new_v4(),
            wallet: wallet.to_string(),
            face_value,
            funding_token: "SOL".to_string(),
            funding_amount: face_value,
            expires_at: Utc::now() + Duration::hours(1),
            used: false,
            consumed_by_round: None,
            created_at: Utc::now(),
        }
    }

    async fn betting_round(repo: &MemoryRepository) -> Round {
        let round = Round::open(
            1,
            "commitment".to_string(),
            Multiplier::from_hundredths(345),
        );
        RoundRepository::insert(repo, &round).await.unwrap();
        round
    }

    #[tokio::test]
    async fn test_place_bet_consumes_ticket_once() {
        let (repo, ledger) = ledger_with_repo();
        betting_round(&repo).await;
        let ticket = ticket("wallet-a", 10);
        TicketRepository::insert(repo.as_ref(), &ticket)
            .await
            .unwrap();

        let bet = ledger
            .place_bet("wallet-a", ticket.ticket_id, None)
            .await
            .unwrap();
        assert_eq!(bet.stake, 10);
        assert_eq!(bet.status, BetStatus::Active);

        let second = ledger.place_bet("wallet-a", ticket.ticket_id, None).await;
        assert!(second.unwrap_err().is_conflict());
    }

    /// Bet store that refuses inserts, for exercising the ticket
    /// hand-back path.
    struct RejectingBets(Arc<MemoryRepository>);

    #[async_trait::async_trait]
    impl BetRepository for RejectingBets {
        async fn insert(&self, _bet: &Bet) -> Result<()> {
            Err(EngineError::upstream("bet store unavailable"))
        }

        async fn find_by_id(&self, bet_id: Uuid) -> Result<Option<Bet>> {
            BetRepository::find_by_id(self.0.as_ref(), bet_id).await
        }

        async fn find_by_round(&self, round_id: Uuid) -> Result<Vec<Bet>> {
            self.0.find_by_round(round_id).await
        }

        async fn find_by_wallet(&self, wallet: &str, limit: i64) -> Result<Vec<Bet>> {
            self.0.find_by_wallet(wallet, limit).await
        }

        async fn transition(
            &self,
            bet_id: Uuid,
            from: BetStatus,
            to: BetStatus,
            patch: BetPatch,
        ) -> Result<bool> {
            self.0.transition(bet_id, from, to, patch).await
        }

        async fn find_claiming_older_than(
            &self,
            cutoff: chrono::DateTime<Utc>,
        ) -> Result<Vec<Bet>> {
            self.0.find_claiming_older_than(cutoff).await
        }
    }

    #[tokio::test]
    async fn test_failed_bet_insert_releases_ticket() {
        let repo = Arc::new(MemoryRepository::new());
        let (tx, _rx) = broadcast::channel(64);
        let ledger = Ledger::new(
            repo.clone(),
            repo.clone(),
            Arc::new(RejectingBets(repo.clone())),
            tx,
            shared::DEFAULT_GROWTH_RATE_PER_MS,
        );
        betting_round(&repo).await;
        let ticket = ticket("wallet-a", 10);
        TicketRepository::insert(repo.as_ref(), &ticket)
            .await
            .unwrap();

        let err = ledger
            .place_bet("wallet-a", ticket.ticket_id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Upstream(_)));

        // The ticket survives the failed placement and stays spendable.
        let stored = TicketRepository::find_by_id(repo.as_ref(), ticket.ticket_id)
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.used);
        assert!(stored.consumed_by_round.is_none());
    }

    #[tokio::test]
    async fn test_place_bet_rejects_wrong_wallet_and_phase() {
        let (repo, ledger) = ledger_with_repo();
        let mut round = betting_round(&repo).await;
        let ticket = ticket("wallet-a", 10);
        TicketRepository::insert(repo.as_ref(), &ticket)
            .await
            .unwrap();

        let err = ledger
            .place_bet("wallet-b", ticket.ticket_id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));

        round.phase = RoundPhase::Flying;
        RoundRepository::update(repo.as_ref(), &round).await.unwrap();
        let err = ledger
            .place_bet("wallet-a", ticket.ticket_id, None)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_place_bet_rejects_target_at_or_below_one() {
        let (repo, ledger) = ledger_with_repo();
        betting_round(&repo).await;
        let ticket = ticket("wallet-a", 10);
        TicketRepository::insert(repo.as_ref(), &ticket)
            .await
            .unwrap();

        let err = ledger
            .place_bet("wallet-a", ticket.ticket_id, Some(Multiplier::ONE))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_auto_cashout_pays_at_target() {
        let (repo, ledger) = ledger_with_repo();
        let mut round = betting_round(&repo).await;
        let ticket = ticket("wallet-a", 10);
        TicketRepository::insert(repo.as_ref(), &ticket)
            .await
            .unwrap();
        let bet = ledger
            .place_bet(
                "wallet-a",
                ticket.ticket_id,
                Some(Multiplier::from_hundredths(200)),
            )
            .await
            .unwrap();

        round.phase = RoundPhase::Flying;
        round.flight_started_at = Some(Utc::now());
        RoundRepository::update(repo.as_ref(), &round).await.unwrap();

        // Live below target: nothing settles.
        let settled = ledger
            .auto_cashout_sweep(&round, Multiplier::from_hundredths(150))
            .await
            .unwrap();
        assert_eq!(settled, 0);

        // Live at 2.10x: pays the 2.00x target, stake 10 -> 20.
        let settled = ledger
            .auto_cashout_sweep(&round, Multiplier::from_hundredths(210))
            .await
            .unwrap();
        assert_eq!(settled, 1);

        let stored = ledger.bet(bet.bet_id).await.unwrap().unwrap();
        assert_eq!(stored.status, BetStatus::Won);
        assert_eq!(stored.cashed_out_at, Some(Multiplier::from_hundredths(200)));
        assert_eq!(stored.winnings, 20);
    }

    #[tokio::test]
    async fn test_cash_out_rejects_after_crash_point() {
        let (repo, ledger) = ledger_with_repo();
        let mut round = betting_round(&repo).await;
        let ticket = ticket("wallet-a", 10);
        TicketRepository::insert(repo.as_ref(), &ticket)
            .await
            .unwrap();
        let bet = ledger
            .place_bet("wallet-a", ticket.ticket_id, None)
            .await
            .unwrap();

        // Crash point 3.45x; backdate the flight start far enough that the
        // live multiplier is past it.
        round.phase = RoundPhase::Flying;
        round.flight_started_at = Some(Utc::now() - Duration::hours(1));
        RoundRepository::update(repo.as_ref(), &round).await.unwrap();

        let err = ledger.cash_out("wallet-a", bet.bet_id).await.unwrap_err();
        assert!(err.is_conflict());

        let stored = ledger.bet(bet.bet_id).await.unwrap().unwrap();
        assert_eq!(stored.status, BetStatus::Active);
    }

    #[tokio::test]
    async fn test_cash_out_during_flight_wins() {
        let (repo, ledger) = ledger_with_repo();
        let mut round = betting_round(&repo).await;
        let ticket = ticket("wallet-a", 1_000);
        TicketRepository::insert(repo.as_ref(), &ticket)
            .await
            .unwrap();
        let bet = ledger
            .place_bet("wallet-a", ticket.ticket_id, None)
            .await
            .unwrap();

        round.phase = RoundPhase::Flying;
        round.flight_started_at = Some(Utc::now());
        RoundRepository::update(repo.as_ref(), &round).await.unwrap();

        let settled = ledger.cash_out("wallet-a", bet.bet_id).await.unwrap();
        assert_eq!(settled.status, BetStatus::Won);
        // Just after flight start the live multiplier is 1.00x.
        assert!(settled.winnings >= 1_000);

        // A second manual cash-out finds the bet already settled.
        let err = ledger.cash_out("wallet-a", bet.bet_id).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_settle_losses_and_aggregates() {
        let (repo, ledger) = ledger_with_repo();
        let mut round = betting_round(&repo).await;

        let winner_ticket = ticket("wallet-a", 10);
        let loser_ticket = ticket("wallet-b", 40);
        TicketRepository::insert(repo.as_ref(), &winner_ticket)
            .await
            .unwrap();
        TicketRepository::insert(repo.as_ref(), &loser_ticket)
            .await
            .unwrap();

        let winner = ledger
            .place_bet(
                "wallet-a",
                winner_ticket.ticket_id,
                Some(Multiplier::from_hundredths(200)),
            )
            .await
            .unwrap();
        let loser = ledger
            .place_bet("wallet-b", loser_ticket.ticket_id, None)
            .await
            .unwrap();

        round.phase = RoundPhase::Flying;
        round.flight_started_at = Some(Utc::now());
        RoundRepository::update(repo.as_ref(), &round).await.unwrap();
        ledger
            .auto_cashout_sweep(&round, Multiplier::from_hundredths(345))
            .await
            .unwrap();

        let (wagered, paid) = ledger.settle_round_losses(&round).await.unwrap();
        assert_eq!(wagered, 50);
        assert_eq!(paid, 20);

        assert_eq!(
            ledger.bet(winner.bet_id).await.unwrap().unwrap().status,
            BetStatus::Won
        );
        assert_eq!(
            ledger.bet(loser.bet_id).await.unwrap().unwrap().status,
            BetStatus::Lost
        );
    }
}
