pub mod payload;
pub mod queue;
pub mod sink;

pub use payload::{CatchReport, EmbedStyle, WebhookEmbed, WebhookPayload};
pub use queue::{NotificationJob, NotificationQueue, QueueSettings};
pub use sink::{DeliveryError, HttpWebhookSink, WebhookSink};

use crate::config::NotificationConfig;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// What a notification is about; drives embed color and mention eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Shiny,
    Rare,
    HighIv,
    LowIv,
    Normal,
    Challenge,
    ChallengeSolved,
}

impl Classification {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Shiny => "shiny",
            Self::Rare => "rare",
            Self::HighIv => "high_iv",
            Self::LowIv => "low_iv",
            Self::Normal => "normal",
            Self::Challenge => "challenge",
            Self::ChallengeSolved => "challenge_solved",
        }
    }

    pub fn color(self) -> u32 {
        match self {
            Self::Shiny => 0x00ff_ff00,
            Self::Rare => 0x00ff_d700,
            Self::HighIv => 0x0080_0080,
            Self::LowIv => 0x0000_00ff,
            Self::Normal => 0x0000_ff00,
            Self::Challenge => 0x00ff_0000,
            Self::ChallengeSolved => 0x0000_ffff,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turns catch and challenge events into queued webhook jobs.
pub struct Notifier {
    catch_webhook: Option<String>,
    mirror_webhooks: Vec<String>,
    challenge_webhook: Option<String>,
    style: EmbedStyle,
    queue: NotificationQueue,
}

fn configured(url: Option<&String>) -> Option<String> {
    url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty())
}

impl Notifier {
    pub fn new(config: &NotificationConfig, queue: NotificationQueue) -> Self {
        Self {
            catch_webhook: configured(config.catch_webhook.as_ref()),
            mirror_webhooks: config
                .mirror_webhooks
                .iter()
                .filter_map(|url| configured(Some(url)))
                .collect(),
            challenge_webhook: configured(config.challenge_webhook.as_ref()),
            style: EmbedStyle::from_config(config),
            queue,
        }
    }

    pub fn queue(&self) -> &NotificationQueue {
        &self.queue
    }

    /// Queue one job per catch destination. Returns how many were queued.
    pub fn catch(&self, report: &CatchReport) -> usize {
        let classification = report.classification();
        let payload = self.style.wrap(payload::catch_embed(&self.style, report));
        let mut queued = 0;

        if let Some(destination) = &self.catch_webhook {
            self.queue.enqueue(NotificationJob {
                destination: destination.clone(),
                payload: payload.clone(),
                classification,
                mention: classification != Classification::Normal,
            });
            queued += 1;
        }
        for destination in &self.mirror_webhooks {
            self.queue.enqueue(NotificationJob {
                destination: destination.clone(),
                payload: payload.clone(),
                classification,
                mention: false,
            });
            queued += 1;
        }
        queued
    }

    pub fn challenge_detected(&self, account: &str, channel: &str) -> bool {
        let Some(destination) = &self.challenge_webhook else {
            return false;
        };
        let embed = payload::challenge_detected_embed(&self.style, account, channel);
        self.queue.enqueue(NotificationJob {
            destination: destination.clone(),
            payload: self.style.wrap(embed),
            classification: Classification::Challenge,
            mention: true,
        });
        true
    }

    pub fn challenge_solved(&self, account: &str, solver: &str, elapsed: Duration) -> bool {
        let Some(destination) = &self.challenge_webhook else {
            return false;
        };
        let embed = payload::challenge_solved_embed(&self.style, account, solver, elapsed);
        self.queue.enqueue(NotificationJob {
            destination: destination.clone(),
            payload: self.style.wrap(embed),
            classification: Classification::ChallengeSolved,
            mention: false,
        });
        true
    }
}
