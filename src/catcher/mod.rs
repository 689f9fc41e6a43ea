//! Per-account catch sessions: event classification, routing, and the
//! registry that owns every account's state.

pub mod classifier;
mod challenge;
pub mod jitter;
pub mod manager;
pub mod rarity;
pub mod router;
mod spawn;
pub mod state;

pub use jitter::{FixedJitter, Jitter, RandomJitter};
pub use manager::{Overview, SessionError, SessionManager, SessionStatus};
pub use rarity::{RarityTable, RarityTag};
pub use router::EventRouter;
pub use state::{CatchStats, Lifecycle, PauseReason, PendingCatch, SessionMode, SessionState};

use crate::config::{CatchingConfig, Config};
use crate::notify::Notifier;
use crate::onboarding::Onboarding;
use crate::prediction::{ImageFetcher, Predictor};
use crate::solver::ChallengeSolver;
use std::sync::Arc;
use std::time::Duration;

/// Collaborators shared by every account's router.
pub struct CatcherServices {
    pub catching: CatchingConfig,
    pub solver_timeout: Duration,
    pub predictor: Option<Arc<dyn Predictor>>,
    pub images: Arc<dyn ImageFetcher>,
    pub solver: Option<Arc<dyn ChallengeSolver>>,
    pub onboarding: Option<Arc<dyn Onboarding>>,
    pub notifier: Arc<Notifier>,
    pub rarity: RarityTable,
    pub jitter: Arc<dyn Jitter>,
}

impl CatcherServices {
    /// Services with no predictor, solver or onboarding flow attached.
    pub fn new(config: &Config, images: Arc<dyn ImageFetcher>, notifier: Arc<Notifier>) -> Self {
        Self {
            catching: config.catching.clone(),
            solver_timeout: Duration::from_secs(config.solver.timeout_secs),
            predictor: None,
            images,
            solver: None,
            onboarding: None,
            notifier,
            rarity: RarityTable::from_config(&config.rarity),
            jitter: Arc::new(RandomJitter),
        }
    }

    pub fn with_predictor(mut self, predictor: Arc<dyn Predictor>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    pub fn with_solver(mut self, solver: Arc<dyn ChallengeSolver>) -> Self {
        self.solver = Some(solver);
        self
    }

    pub fn with_onboarding(mut self, onboarding: Arc<dyn Onboarding>) -> Self {
        self.onboarding = Some(onboarding);
        self
    }

    pub fn with_jitter(mut self, jitter: Arc<dyn Jitter>) -> Self {
        self.jitter = jitter;
        self
    }
}
