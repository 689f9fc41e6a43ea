//! Single global FIFO of outbound notifications.
//!
//! One worker drains the queue, so deliveries never overlap. Every delivered
//! or dropped job is followed by a fixed cooldown; a rate-limited job goes
//! back to the head and is retried after a fixed backoff.

use super::Classification;
use super::payload::WebhookPayload;
use super::sink::WebhookSink;
use crate::config::NotificationConfig;
use crate::health;
use crate::util::truncate_with_ellipsis;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationJob {
    pub destination: String,
    pub payload: WebhookPayload,
    pub classification: Classification,
    pub mention: bool,
}

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub cooldown: Duration,
    pub rate_limit_backoff: Duration,
    pub alert_classes: Vec<String>,
    pub mention_text: String,
}

impl QueueSettings {
    pub fn from_config(config: &NotificationConfig) -> Self {
        Self {
            cooldown: Duration::from_millis(config.cooldown_ms),
            rate_limit_backoff: Duration::from_millis(config.rate_limit_backoff_ms),
            alert_classes: config.alert_classes.clone(),
            mention_text: config.mention_text.clone(),
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self::from_config(&NotificationConfig::default())
    }
}

struct QueueInner {
    jobs: Mutex<VecDeque<NotificationJob>>,
    wake: Notify,
    sink: Arc<dyn WebhookSink>,
    settings: QueueSettings,
    started: AtomicBool,
}

#[derive(Clone)]
pub struct NotificationQueue {
    inner: Arc<QueueInner>,
}

impl NotificationQueue {
    pub fn new(sink: Arc<dyn WebhookSink>, settings: QueueSettings) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                jobs: Mutex::new(VecDeque::new()),
                wake: Notify::new(),
                sink,
                settings,
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Append a job and wake the worker. Safe from any task.
    pub fn enqueue(&self, job: NotificationJob) {
        self.inner.jobs.lock().push_back(job);
        self.inner.wake.notify_one();
    }

    pub fn len(&self) -> usize {
        self.inner.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.jobs.lock().is_empty()
    }

    /// Jobs still waiting, head first.
    pub fn snapshot(&self) -> Vec<NotificationJob> {
        self.inner.jobs.lock().iter().cloned().collect()
    }

    /// Spawn the delivery worker once; later calls return `None`.
    pub fn start(&self) -> Option<JoinHandle<()>> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return None;
        }
        let queue = self.clone();
        Some(tokio::spawn(queue.run()))
    }

    /// Delivery loop. Runs until the task is dropped.
    pub async fn run(self) {
        loop {
            let job = self.next_job().await;
            self.deliver(job).await;
        }
    }

    async fn next_job(&self) -> NotificationJob {
        loop {
            let popped = self.inner.jobs.lock().pop_front();
            if let Some(job) = popped {
                return job;
            }
            self.inner.wake.notified().await;
        }
    }

    fn render(&self, job: &NotificationJob) -> WebhookPayload {
        let settings = &self.inner.settings;
        let mut payload = job.payload.clone();
        let alert_worthy = settings
            .alert_classes
            .iter()
            .any(|class| class == job.classification.as_str());
        payload.content = if job.mention && alert_worthy {
            settings.mention_text.clone()
        } else {
            String::new()
        };
        payload
    }

    async fn deliver(&self, job: NotificationJob) {
        let payload = self.render(&job);
        let settings = &self.inner.settings;

        match self.inner.sink.deliver(&job.destination, &payload).await {
            Ok(()) => {
                health::mark_component_ok(health::NOTIFICATIONS);
                tracing::debug!(
                    classification = job.classification.as_str(),
                    "Notification delivered"
                );
            }
            Err(e) if e.is_rate_limited() => {
                tracing::warn!(
                    classification = job.classification.as_str(),
                    backoff_ms = settings.rate_limit_backoff.as_millis(),
                    "Notification rate limited; retrying at head of queue"
                );
                self.inner.jobs.lock().push_front(job);
                tokio::time::sleep(settings.rate_limit_backoff).await;
                return;
            }
            Err(e) => {
                health::mark_component_error(health::NOTIFICATIONS, &e);
                tracing::warn!(
                    classification = job.classification.as_str(),
                    destination = %truncate_with_ellipsis(&job.destination, 40),
                    "Notification dropped: {e}"
                );
            }
        }

        tokio::time::sleep(settings.cooldown).await;
    }
}
