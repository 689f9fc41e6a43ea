use super::rarity::RarityTag;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Prediction,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prediction => f.write_str("prediction"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    Manual,
    Challenge,
    Onboarding,
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Manual => "manual",
            Self::Challenge => "challenge",
            Self::Onboarding => "onboarding",
        })
    }
}

/// A session is always in exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum Lifecycle {
    #[default]
    Inactive,
    Active,
    Paused(PauseReason),
}

impl Lifecycle {
    pub fn pause_reason(self) -> Option<PauseReason> {
        match self {
            Self::Paused(reason) => Some(reason),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatchStats {
    pub spawns_detected: u64,
    pub attempts: u64,
    pub success: u64,
    pub failed: u64,
    pub challenges_detected: u64,
    pub auto_clicks: u64,
    pub started_at: Option<DateTime<Utc>>,
}

/// A dispatched catch attempt awaiting the game bot's confirmation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingCatch {
    pub predicted_name: String,
    pub confidence: f64,
    pub rarity: Option<RarityTag>,
    pub prediction_latency_ms: Option<u64>,
    pub quota_remaining: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AwaitingBalance {
    pub expected_display_name: String,
    pub requested_at: Instant,
    /// Distinguishes this probe from a later one when its timeout fires.
    pub token: u64,
}

#[derive(Debug, Default)]
pub struct SessionState {
    pub lifecycle: Lifecycle,
    pub mode: Option<SessionMode>,
    pub stats: CatchStats,
    pub pending_by_channel: HashMap<String, PendingCatch>,
    pub awaiting_balance: Option<AwaitingBalance>,
    pub balance_check_due: bool,
    /// Button auto-responder opt-in; survives stop and start.
    pub auto_click: bool,
    pub balance: Option<u64>,
    pub last_attempt: Option<PendingCatch>,
    pub solve_in_flight: bool,
    /// Bumped on every start and stop. Async work captures it and drops its
    /// result when the value has moved on.
    pub generation: u64,
    next_probe_token: u64,
    /// Sequence of the newest spawn seen per channel.
    latest_spawn_by_channel: HashMap<String, u64>,
    next_spawn_seq: u64,
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        self.lifecycle == Lifecycle::Active
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle != Lifecycle::Inactive
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && self.is_running()
    }

    pub fn begin(&mut self, mode: SessionMode, probe_balance: bool) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.lifecycle = Lifecycle::Active;
        self.mode = Some(mode);
        self.stats = CatchStats {
            started_at: Some(Utc::now()),
            ..CatchStats::default()
        };
        self.pending_by_channel.clear();
        self.latest_spawn_by_channel.clear();
        self.awaiting_balance = None;
        self.balance_check_due = probe_balance;
        self.last_attempt = None;
        self.solve_in_flight = false;
        self.generation
    }

    pub fn end(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.lifecycle = Lifecycle::Inactive;
        self.mode = None;
        self.pending_by_channel.clear();
        self.latest_spawn_by_channel.clear();
        self.awaiting_balance = None;
        self.balance_check_due = false;
        self.solve_in_flight = false;
    }

    /// Note a spawn in `channel_id`. Any older spawn there is superseded.
    pub fn note_spawn(&mut self, channel_id: &str) -> u64 {
        self.next_spawn_seq = self.next_spawn_seq.wrapping_add(1);
        self.latest_spawn_by_channel
            .insert(channel_id.to_string(), self.next_spawn_seq);
        self.next_spawn_seq
    }

    pub fn is_latest_spawn(&self, channel_id: &str, seq: u64) -> bool {
        self.latest_spawn_by_channel.get(channel_id) == Some(&seq)
    }

    /// Record a dispatched attempt; a newer attempt in the same channel wins.
    pub fn record_attempt(&mut self, channel_id: &str, pending: PendingCatch) {
        self.stats.attempts += 1;
        self.last_attempt = Some(pending.clone());
        self.pending_by_channel.insert(channel_id.to_string(), pending);
    }

    /// Count a confirmed catch and flip the balance flag on 1, 1+N, 1+2N, ...
    pub fn record_success(&mut self, interval: u64) {
        self.stats.success += 1;
        let interval = interval.max(1);
        if (self.stats.success - 1) % interval == 0 {
            self.balance_check_due = true;
        }
    }

    /// Arm a balance probe if one is due. Returns the probe token.
    pub fn take_balance_probe(&mut self, expected_display_name: &str) -> Option<u64> {
        if !self.balance_check_due {
            return None;
        }
        self.balance_check_due = false;
        self.next_probe_token = self.next_probe_token.wrapping_add(1);
        self.awaiting_balance = Some(AwaitingBalance {
            expected_display_name: expected_display_name.to_string(),
            requested_at: Instant::now(),
            token: self.next_probe_token,
        });
        Some(self.next_probe_token)
    }

    /// Clear the awaited probe if it is still the one identified by `token`.
    pub fn expire_balance_probe(&mut self, token: u64) -> bool {
        if self
            .awaiting_balance
            .as_ref()
            .is_some_and(|awaiting| awaiting.token == token)
        {
            self.awaiting_balance = None;
            return true;
        }
        false
    }

    pub fn uptime_secs(&self) -> Option<u64> {
        if !self.is_running() {
            return None;
        }
        let started = self.stats.started_at?;
        u64::try_from((Utc::now() - started).num_seconds()).ok()
    }
}
