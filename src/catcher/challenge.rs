use super::router::{EventRouter, Tail};
use super::state::{Lifecycle, PauseReason};
use crate::channels::traits::ChatEvent;
use crate::health;
use crate::solver::{ChallengeSolver, SolverError};
use futures_util::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

impl EventRouter {
    /// Detection always pauses, whatever the current pause reason.
    pub(super) fn handle_challenge(&self, event: &ChatEvent) -> Option<Tail> {
        let (generation, start_solve) = {
            let mut state = self.state.lock();
            state.stats.challenges_detected += 1;
            state.lifecycle = Lifecycle::Paused(PauseReason::Challenge);
            let start = self.services.solver.is_some() && !state.solve_in_flight;
            if start {
                state.solve_in_flight = true;
            }
            (state.generation, start)
        };
        tracing::warn!(
            account = %self.account.id,
            channel = %event.channel_id,
            "Challenge detected; session paused"
        );
        self.services
            .notifier
            .challenge_detected(&self.account.username, &event.channel_label());

        if !start_solve {
            return None;
        }
        let solver = self.services.solver.clone()?;
        let this = self.clone();
        let channel_id = event.channel_id.clone();
        Some(async move { this.solve_challenge(solver, channel_id, generation).await }.boxed())
    }

    async fn solve_challenge(
        self,
        solver: Arc<dyn ChallengeSolver>,
        channel_id: String,
        generation: u64,
    ) {
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.services.solver_timeout, solver.solve(&self.account))
            .await
            .unwrap_or(Err(SolverError::Timeout));

        let current = {
            let mut state = self.state.lock();
            if state.generation == generation {
                state.solve_in_flight = false;
            }
            state.is_current(generation)
        };

        let payload = match outcome {
            Ok(payload) => {
                health::mark_component_ok(health::SOLVER);
                payload
            }
            Err(e) => {
                health::mark_component_error(health::SOLVER, &e);
                tracing::warn!(account = %self.account.id, "Challenge not solved; session stays paused: {e}");
                return;
            }
        };
        if !current {
            tracing::debug!(account = %self.account.id, "Session stopped while solving; bypass dropped");
            return;
        }

        if let Err(e) = self.channel.send(&channel_id, &payload).await {
            tracing::warn!(account = %self.account.id, "Bypass payload could not be sent: {e}");
            return;
        }
        let elapsed = started.elapsed();

        let grace = Duration::from_millis(self.services.catching.challenge_resume_grace_ms);
        tokio::time::sleep(grace).await;

        let resumed = {
            let mut state = self.state.lock();
            let waiting = state.generation == generation
                && state.lifecycle == Lifecycle::Paused(PauseReason::Challenge);
            if waiting {
                state.lifecycle = Lifecycle::Active;
            }
            waiting
        };
        tracing::info!(
            account = %self.account.id,
            solver = solver.name(),
            elapsed_ms = elapsed.as_millis(),
            resumed,
            "Challenge solved"
        );
        self.services
            .notifier
            .challenge_solved(&self.account.username, solver.name(), elapsed);
    }
}
