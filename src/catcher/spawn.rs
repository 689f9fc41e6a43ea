use super::classifier;
use super::router::{EventRouter, Tail};
use super::state::PendingCatch;
use crate::channels::traits::ChatEvent;
use crate::health;
use crate::prediction::PredictionError;
use futures_util::FutureExt;
use std::sync::Arc;
use std::time::Duration;

impl EventRouter {
    pub(super) fn handle_spawn(&self, event: &ChatEvent) -> Option<Tail> {
        let (generation, seq, probe) = {
            let mut state = self.state.lock();
            state.stats.spawns_detected += 1;
            let seq = state.note_spawn(&event.channel_id);
            let probe = state.take_balance_probe(self.account.display_name());
            (state.generation, seq, probe)
        };

        let image_url = classifier::spawn_image_url(event).map(str::to_string);
        if image_url.is_none() {
            tracing::debug!(
                account = %self.account.id,
                channel = %event.channel_id,
                "Spawn without an image reference"
            );
        }
        if probe.is_none() && image_url.is_none() {
            return None;
        }

        let this = self.clone();
        let channel_id = event.channel_id.clone();
        Some(
            async move {
                if let Some(token) = probe {
                    this.send_balance_probe(&channel_id, token).await;
                }
                if let Some(url) = image_url {
                    this.attempt_catch(&channel_id, &url, generation, seq).await;
                }
            }
            .boxed(),
        )
    }

    async fn send_balance_probe(&self, channel_id: &str, token: u64) {
        let state = Arc::clone(&self.state);
        let account = self.account.id.clone();
        let timeout = Duration::from_secs(self.services.catching.balance_timeout_secs);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let expired = state.lock().expire_balance_probe(token);
            if expired {
                tracing::debug!(account = %account, "Balance probe went unanswered");
            }
        });

        let command = self.services.catching.render_balance_command();
        if let Err(e) = self.channel.send(channel_id, &command).await {
            tracing::warn!(account = %self.account.id, "Balance probe failed: {e}");
        }
    }

    /// Download, predict, wait, then send. `seq` identifies this spawn; a newer
    /// spawn in the same channel makes the attempt stale at either checkpoint.
    async fn attempt_catch(&self, channel_id: &str, image_url: &str, generation: u64, seq: u64) {
        let Some(predictor) = self.services.predictor.clone() else {
            return;
        };

        let image = match self.services.images.fetch(image_url).await {
            Ok(image) => image,
            Err(e) => {
                {
                    let mut state = self.state.lock();
                    if state.generation == generation {
                        state.stats.failed += 1;
                    }
                }
                tracing::warn!(account = %self.account.id, channel = channel_id, "Spawn image unavailable: {e}");
                return;
            }
        };

        let prediction = match predictor.predict(image).await {
            Ok(prediction) => {
                health::mark_component_ok(health::PREDICTION);
                prediction
            }
            Err(e) => {
                if matches!(e, PredictionError::QuotaExhausted | PredictionError::Network(_)) {
                    health::mark_component_error(health::PREDICTION, &e);
                }
                tracing::debug!(
                    account = %self.account.id,
                    kind = e.kind(),
                    retry = e.should_retry(),
                    "Prediction dropped: {e}"
                );
                return;
            }
        };

        let rarity = self.services.rarity.lookup(&prediction.name);
        let delay = {
            let mut state = self.state.lock();
            if state.generation != generation || !state.is_active() {
                tracing::debug!(account = %self.account.id, "Session no longer active; prediction discarded");
                return;
            }
            if !state.is_latest_spawn(channel_id, seq) {
                tracing::debug!(
                    account = %self.account.id,
                    channel = channel_id,
                    pokemon = %prediction.name,
                    "Newer spawn in channel; prediction discarded"
                );
                return;
            }
            state.record_attempt(
                channel_id,
                PendingCatch {
                    predicted_name: prediction.name.clone(),
                    confidence: prediction.confidence,
                    rarity,
                    prediction_latency_ms: prediction.latency_ms,
                    quota_remaining: prediction.quota_remaining,
                },
            );
            self.catch_delay(rarity.is_some())
        };

        tracing::info!(
            account = %self.account.id,
            channel = channel_id,
            pokemon = %prediction.name,
            confidence = prediction.confidence,
            rarity = rarity.map(|tag| tag.as_str()),
            delay_ms = delay.as_millis(),
            "Catch attempt scheduled"
        );
        tokio::time::sleep(delay).await;

        let (active, latest) = {
            let mut state = self.state.lock();
            let current = state.generation == generation;
            let active = current && state.is_active();
            let latest = current && state.is_latest_spawn(channel_id, seq);
            if !active && latest {
                state.pending_by_channel.remove(channel_id);
            }
            (active, latest)
        };
        if !active {
            tracing::debug!(account = %self.account.id, "Session paused or stopped before catch command");
            return;
        }
        if !latest {
            tracing::debug!(
                account = %self.account.id,
                channel = channel_id,
                pokemon = %prediction.name,
                "Spawn replaced during catch delay; command dropped"
            );
            return;
        }

        let command = self.services.catching.render_catch_command(&prediction.name);
        if let Err(e) = self.channel.send(channel_id, &command).await {
            tracing::warn!(account = %self.account.id, channel = channel_id, "Catch command failed: {e}");
        }
    }

    /// Humanizing delay; rarity-tagged spawns get a shortened window.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn catch_delay(&self, rare: bool) -> Duration {
        let catching = &self.services.catching;
        let base = if catching.randomize {
            self.services
                .jitter
                .pick_ms(catching.min_delay_ms, catching.max_delay_ms)
        } else {
            catching.min_delay_ms
        };
        let millis = if rare {
            (base as f64 * catching.rare_delay_factor).round().max(0.0) as u64
        } else {
            base
        };
        Duration::from_millis(millis)
    }
}
