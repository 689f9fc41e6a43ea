//! First-use flow: the game bot refuses commands until a starter is picked.

use crate::accounts::{Account, AccountId};
use crate::catcher::jitter::Jitter;
use crate::channels::traits::Channel;
use crate::config::OnboardingConfig;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OnboardingError {
    #[error("onboarding already in progress for this account")]
    InProgress,
    #[error("onboarding is disabled")]
    Disabled,
    #[error("onboarding has no choices configured")]
    NoChoices,
    #[error("onboarding message failed: {0}")]
    Send(String),
}

/// Runs the scripted onboarding exchange in `channel_id`. Returns the choice made.
#[async_trait]
pub trait Onboarding: Send + Sync {
    async fn run(
        &self,
        account: &Account,
        channel: &dyn Channel,
        channel_id: &str,
    ) -> Result<String, OnboardingError>;
}

pub struct ScriptedOnboarding {
    config: OnboardingConfig,
    game_bot_id: String,
    jitter: Arc<dyn Jitter>,
    in_progress: Mutex<HashSet<AccountId>>,
}

struct InProgress<'a> {
    set: &'a Mutex<HashSet<AccountId>>,
    id: AccountId,
}

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.id);
    }
}

impl ScriptedOnboarding {
    pub fn new(config: OnboardingConfig, game_bot_id: &str, jitter: Arc<dyn Jitter>) -> Self {
        Self {
            config,
            game_bot_id: game_bot_id.to_string(),
            jitter,
            in_progress: Mutex::new(HashSet::new()),
        }
    }

    fn claim(&self, id: &AccountId) -> Option<InProgress<'_>> {
        if !self.in_progress.lock().insert(id.clone()) {
            return None;
        }
        Some(InProgress {
            set: &self.in_progress,
            id: id.clone(),
        })
    }

    fn start_command(&self) -> String {
        self.config.start_command.replace("{bot}", &self.game_bot_id)
    }

    fn pick_command(&self, choice: &str) -> String {
        self.config
            .pick_command
            .replace("{bot}", &self.game_bot_id)
            .replace("{choice}", choice)
    }
}

#[async_trait]
impl Onboarding for ScriptedOnboarding {
    async fn run(
        &self,
        account: &Account,
        channel: &dyn Channel,
        channel_id: &str,
    ) -> Result<String, OnboardingError> {
        if !self.config.enabled {
            return Err(OnboardingError::Disabled);
        }
        let choice = self
            .config
            .choices
            .get(self.jitter.pick_index(self.config.choices.len()))
            .cloned()
            .ok_or(OnboardingError::NoChoices)?;
        let Some(_guard) = self.claim(&account.id) else {
            return Err(OnboardingError::InProgress);
        };

        channel
            .send(channel_id, &self.start_command())
            .await
            .map_err(|e| OnboardingError::Send(e.to_string()))?;
        tracing::info!(account = %account.id, channel = channel_id, "Onboarding started");

        tokio::time::sleep(Duration::from_millis(self.config.step_delay_ms)).await;

        channel
            .send(channel_id, &self.pick_command(&choice))
            .await
            .map_err(|e| OnboardingError::Send(e.to_string()))?;
        tracing::info!(account = %account.id, choice = %choice, "Onboarding complete");

        Ok(choice)
    }
}
