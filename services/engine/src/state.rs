use crate::claims::{ClaimConfirmer, ClaimSigner};
use crate::config::Config;
use crate::ledger::Ledger;
use crate::repository::{RoundRepository, TicketRepository};
use crate::round::EngineHandle;
use shared::fairness::FairnessConfig;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub rounds: Arc<dyn RoundRepository>,
    pub tickets: Arc<dyn TicketRepository>,
    pub ledger: Arc<Ledger>,
    pub signer: Arc<ClaimSigner>,
    pub confirmer: Arc<ClaimConfirmer>,
    pub engine: EngineHandle,
    pub fairness: FairnessConfig,
}
