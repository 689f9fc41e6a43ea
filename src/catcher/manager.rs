//! Registry of accounts and their sessions; the control surface.
//!
//! One `SessionState` per registered account, created on registration and
//! destroyed on removal. Starting a session subscribes a router to the
//! account's channel; stopping cancels that subscription before returning.

use super::CatcherServices;
use super::router::EventRouter;
use super::state::{CatchStats, Lifecycle, PauseReason, PendingCatch, SessionMode, SessionState};
use crate::accounts::{Account, AccountId};
use crate::channels::traits::{Channel, ChatEvent};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("unknown account {0}")]
    UnknownAccount(AccountId),
    #[error("account {0} is already registered")]
    DuplicateAccount(AccountId),
    #[error("session already running in {mode} mode")]
    AlreadyActive {
        mode: SessionMode,
        paused_reason: Option<PauseReason>,
    },
    #[error("session is not running")]
    NotActive,
    #[error("session is already paused ({0})")]
    AlreadyPaused(PauseReason),
    #[error("session is not paused")]
    NotPaused,
    #[error("prediction mode needs a configured prediction service")]
    PredictionUnavailable,
}

/// Point-in-time view of one account's session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub account_id: AccountId,
    pub username: String,
    pub lifecycle: Lifecycle,
    pub pause_reason: Option<PauseReason>,
    pub mode: Option<SessionMode>,
    pub auto_click: bool,
    pub stats: CatchStats,
    pub uptime_secs: Option<u64>,
    pub balance: Option<u64>,
    pub pending_channels: usize,
    pub awaiting_balance: bool,
    pub last_attempt: Option<PendingCatch>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Overview {
    pub active_sessions: usize,
    pub registered_accounts: usize,
    pub total_spawns: u64,
    pub total_catches: u64,
    pub balances: Vec<(String, Option<u64>)>,
    pub total_balance: u64,
}

struct Subscription {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Subscription {
    fn cancel(self) {
        self.cancel.cancel();
        for task in self.tasks {
            task.abort();
        }
    }
}

struct AccountEntry {
    account: Account,
    channel: Arc<dyn Channel>,
    state: Arc<Mutex<SessionState>>,
    subscription: Option<Subscription>,
}

impl AccountEntry {
    fn status(&self) -> SessionStatus {
        let state = self.state.lock();
        SessionStatus {
            account_id: self.account.id.clone(),
            username: self.account.username.clone(),
            lifecycle: state.lifecycle,
            pause_reason: state.lifecycle.pause_reason(),
            mode: state.mode,
            auto_click: state.auto_click,
            stats: state.stats.clone(),
            uptime_secs: state.uptime_secs(),
            balance: state.balance,
            pending_channels: state.pending_by_channel.len(),
            awaiting_balance: state.awaiting_balance.is_some(),
            last_attempt: state.last_attempt.clone(),
        }
    }

    fn stop(&mut self) -> Option<CatchStats> {
        let stats = {
            let mut state = self.state.lock();
            if !state.is_running() {
                return None;
            }
            state.end();
            state.stats.clone()
        };
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
        Some(stats)
    }
}

pub struct SessionManager {
    services: Arc<CatcherServices>,
    accounts: RwLock<HashMap<AccountId, AccountEntry>>,
}

impl SessionManager {
    pub fn new(services: Arc<CatcherServices>) -> Self {
        Self {
            services,
            accounts: RwLock::new(HashMap::new()),
        }
    }

    pub fn services(&self) -> &Arc<CatcherServices> {
        &self.services
    }

    pub fn register_account(
        &self,
        account: Account,
        channel: Arc<dyn Channel>,
    ) -> Result<(), SessionError> {
        let mut accounts = self.accounts.write();
        if accounts.contains_key(&account.id) {
            return Err(SessionError::DuplicateAccount(account.id));
        }
        tracing::debug!(account = %account.id, channel = channel.name(), "Account registered");
        accounts.insert(
            account.id.clone(),
            AccountEntry {
                account,
                channel,
                state: Arc::new(Mutex::new(SessionState::default())),
                subscription: None,
            },
        );
        Ok(())
    }

    /// Stop the session if running, then drop the account and its state.
    pub fn remove_account(&self, id: &AccountId) -> Result<(), SessionError> {
        let mut entry = self
            .accounts
            .write()
            .remove(id)
            .ok_or_else(|| SessionError::UnknownAccount(id.clone()))?;
        entry.stop();
        tracing::info!(account = %id, "Account removed");
        Ok(())
    }

    pub fn is_registered(&self, id: &AccountId) -> bool {
        self.accounts.read().contains_key(id)
    }

    pub fn start_session(&self, id: &AccountId, mode: SessionMode) -> Result<(), SessionError> {
        let mut accounts = self.accounts.write();
        let entry = accounts
            .get_mut(id)
            .ok_or_else(|| SessionError::UnknownAccount(id.clone()))?;

        {
            let mut state = entry.state.lock();
            if state.is_running() {
                return Err(SessionError::AlreadyActive {
                    mode: state.mode.unwrap_or(mode),
                    paused_reason: state.lifecycle.pause_reason(),
                });
            }
            if mode == SessionMode::Prediction && self.services.predictor.is_none() {
                return Err(SessionError::PredictionUnavailable);
            }
            state.begin(mode, self.services.catching.probe_balance_on_start);
        }

        if let Some(stale) = entry.subscription.take() {
            stale.cancel();
        }
        let router = EventRouter::new(
            entry.account.clone(),
            Arc::clone(&entry.channel),
            Arc::clone(&entry.state),
            Arc::clone(&self.services),
        );
        entry.subscription = Some(subscribe(id, Arc::clone(&entry.channel), router));

        tracing::info!(account = %id, mode = %mode, "Session started");
        Ok(())
    }

    /// Stop a running session, returning its final counters.
    pub fn stop_session(&self, id: &AccountId) -> Result<CatchStats, SessionError> {
        let mut accounts = self.accounts.write();
        let entry = accounts
            .get_mut(id)
            .ok_or_else(|| SessionError::UnknownAccount(id.clone()))?;
        let stats = entry.stop().ok_or(SessionError::NotActive)?;
        tracing::info!(
            account = %id,
            spawns = stats.spawns_detected,
            caught = stats.success,
            "Session stopped"
        );
        Ok(stats)
    }

    pub fn pause_session(&self, id: &AccountId, reason: PauseReason) -> Result<(), SessionError> {
        let state = self.state_of(id)?;
        let mut state = state.lock();
        match state.lifecycle {
            Lifecycle::Inactive => Err(SessionError::NotActive),
            Lifecycle::Paused(current) => Err(SessionError::AlreadyPaused(current)),
            Lifecycle::Active => {
                state.lifecycle = Lifecycle::Paused(reason);
                tracing::info!(account = %id, reason = %reason, "Session paused");
                Ok(())
            }
        }
    }

    pub fn resume_session(&self, id: &AccountId) -> Result<(), SessionError> {
        let state = self.state_of(id)?;
        let mut state = state.lock();
        match state.lifecycle {
            Lifecycle::Inactive => Err(SessionError::NotActive),
            Lifecycle::Active => Err(SessionError::NotPaused),
            Lifecycle::Paused(reason) => {
                state.lifecycle = Lifecycle::Active;
                tracing::info!(account = %id, was = %reason, "Session resumed");
                Ok(())
            }
        }
    }

    /// Opt in or out of the button auto-responder; persists across sessions.
    pub fn set_auto_click(&self, id: &AccountId, enabled: bool) -> Result<(), SessionError> {
        self.state_of(id)?.lock().auto_click = enabled;
        tracing::info!(account = %id, enabled, "Auto-click updated");
        Ok(())
    }

    pub fn status(&self, id: &AccountId) -> Result<SessionStatus, SessionError> {
        self.accounts
            .read()
            .get(id)
            .map(AccountEntry::status)
            .ok_or_else(|| SessionError::UnknownAccount(id.clone()))
    }

    /// Running sessions (active or paused), ordered by account id.
    pub fn list_active(&self) -> Vec<SessionStatus> {
        let mut running: Vec<SessionStatus> = self
            .accounts
            .read()
            .values()
            .map(AccountEntry::status)
            .filter(|status| status.lifecycle != Lifecycle::Inactive)
            .collect();
        running.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        running
    }

    pub fn overview(&self) -> Overview {
        let accounts = self.accounts.read();
        let mut statuses: Vec<SessionStatus> = accounts.values().map(AccountEntry::status).collect();
        statuses.sort_by(|a, b| a.account_id.cmp(&b.account_id));

        let mut overview = Overview {
            registered_accounts: statuses.len(),
            ..Overview::default()
        };
        for status in statuses {
            if status.lifecycle != Lifecycle::Inactive {
                overview.active_sessions += 1;
            }
            overview.total_spawns += status.stats.spawns_detected;
            overview.total_catches += status.stats.success;
            overview.total_balance += status.balance.unwrap_or(0);
            overview.balances.push((status.username, status.balance));
        }
        overview
    }

    /// Stop every running session; returns the usernames that were stopped.
    pub fn stop_all(&self) -> Vec<String> {
        let mut accounts = self.accounts.write();
        let mut stopped: Vec<String> = accounts
            .values_mut()
            .filter_map(|entry| entry.stop().map(|_| entry.account.username.clone()))
            .collect();
        stopped.sort();
        if !stopped.is_empty() {
            tracing::info!(count = stopped.len(), "Stopped all sessions");
        }
        stopped
    }

    fn state_of(&self, id: &AccountId) -> Result<Arc<Mutex<SessionState>>, SessionError> {
        self.accounts
            .read()
            .get(id)
            .map(|entry| Arc::clone(&entry.state))
            .ok_or_else(|| SessionError::UnknownAccount(id.clone()))
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        for entry in self.accounts.get_mut().values_mut() {
            if let Some(subscription) = entry.subscription.take() {
                subscription.cancel();
            }
        }
    }
}

/// Wire a channel's inbound events into a router. Events are handled in
/// arrival order; their tails run as independent tasks.
fn subscribe(id: &AccountId, channel: Arc<dyn Channel>, router: EventRouter) -> Subscription {
    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::channel::<ChatEvent>(EVENT_BUFFER);

    let listener = {
        let cancel = cancel.clone();
        let id = id.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                result = channel.listen(tx) => match result {
                    Ok(()) => tracing::debug!(account = %id, "Event stream ended"),
                    Err(e) => tracing::warn!(account = %id, "Event stream failed: {e}"),
                },
            }
        })
    };

    let dispatcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    event = rx.recv() => {
                        let Some(event) = event else { break };
                        if let Some(tail) = router.handle(event) {
                            tokio::spawn(tail);
                        }
                    }
                }
            }
        })
    };

    Subscription {
        cancel,
        tasks: vec![listener, dispatcher],
    }
}
