//! End-to-end session tests through the public control surface and the
//! JSON-lines bridge. Every external port (image download, prediction,
//! challenge solving, webhook delivery) is an in-memory fake, and time is
//! paused so humanizing delays and cooldowns advance deterministically.

use async_trait::async_trait;
use autocatcher::accounts::{Account, AccountId};
use autocatcher::catcher::{
    CatcherServices, FixedJitter, Lifecycle, PauseReason, SessionError, SessionManager,
    SessionMode,
};
use autocatcher::channels::{BridgeHub, ChatEvent, Embed, OutboundAction};
use autocatcher::channels::traits::Button;
use autocatcher::config::Config;
use autocatcher::notify::{
    Classification, DeliveryError, NotificationQueue, Notifier, QueueSettings, WebhookPayload,
    WebhookSink,
};
use autocatcher::prediction::{ImageError, ImageFetcher, Prediction, PredictionError, Predictor};
use autocatcher::solver::{ChallengeSolver, SolverError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream, Lines};

const BOT: &str = "716390085896962058";

// ─────────────────────────────────────────────────────────────────────────────
// Mock infrastructure
// ─────────────────────────────────────────────────────────────────────────────

struct StaticImages;

#[async_trait]
impl ImageFetcher for StaticImages {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>, ImageError> {
        Ok(vec![0xff, 0xd8, 0xff, 0xe0])
    }
}

/// Answers every image with the same creature after a short latency.
struct ScriptedPredictor {
    name: &'static str,
    confidence: f64,
}

#[async_trait]
impl Predictor for ScriptedPredictor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn predict(&self, _image: Vec<u8>) -> Result<Prediction, PredictionError> {
        tokio::time::sleep(Duration::from_millis(150)).await;
        Ok(Prediction {
            name: self.name.to_string(),
            confidence: self.confidence,
            latency_ms: Some(150),
            quota_remaining: Some(4_200),
        })
    }
}

struct SlowSolver {
    delay: Duration,
}

#[async_trait]
impl ChallengeSolver for SlowSolver {
    fn name(&self) -> &str {
        "scripted solver"
    }

    async fn solve(&self, account: &Account) -> Result<String, SolverError> {
        tokio::time::sleep(self.delay).await;
        account
            .credential()
            .map(|_| "CAPTCHA_BYPASSED".to_string())
            .ok_or_else(|| SolverError::Rejected("missing credential".into()))
    }
}

#[derive(Default)]
struct RecordingSink {
    delivered: Mutex<Vec<(String, WebhookPayload)>>,
}

#[async_trait]
impl WebhookSink for RecordingSink {
    async fn deliver(&self, destination: &str, payload: &WebhookPayload) -> Result<(), DeliveryError> {
        self.delivered
            .lock()
            .push((destination.to_string(), payload.clone()));
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fixture
// ─────────────────────────────────────────────────────────────────────────────

struct Fixture {
    manager: SessionManager,
    hub: Arc<BridgeHub>,
    outbound: Lines<BufReader<DuplexStream>>,
    queue: NotificationQueue,
    sink: Arc<RecordingSink>,
}

fn config() -> Config {
    let mut config = Config::default();
    config.rarity.legendary = vec!["mewtwo".into()];
    config.catching.probe_balance_on_start = false;
    config.notifications.catch_webhook = Some("https://hooks.test/catch".into());
    config.notifications.mirror_webhooks = vec!["https://hooks.test/mirror".into()];
    config.notifications.challenge_webhook = Some("https://hooks.test/challenge".into());
    config
}

fn fixture(config: &Config) -> Fixture {
    let sink = Arc::new(RecordingSink::default());
    let queue = NotificationQueue::new(sink.clone(), QueueSettings::from_config(&config.notifications));
    let notifier = Arc::new(Notifier::new(&config.notifications, queue.clone()));
    let services = CatcherServices::new(config, Arc::new(StaticImages), notifier)
        .with_predictor(Arc::new(ScriptedPredictor {
            name: "mewtwo",
            confidence: 91.2,
        }))
        .with_solver(Arc::new(SlowSolver {
            delay: Duration::from_secs(3),
        }))
        .with_jitter(Arc::new(FixedJitter::lower_bound()));
    let manager = SessionManager::new(Arc::new(services));

    let hub = BridgeHub::new();
    for (id, user, name) in [("main", "42", "ash"), ("alt", "77", "misty")] {
        let account = Account::new(id, user, name)
            .with_display_name(name.to_uppercase())
            .with_credential("opaque-token");
        let channel = Arc::new(hub.channel_for(AccountId::from(id)));
        manager.register_account(account, channel).unwrap();
    }

    let (writer, reader) = tokio::io::duplex(64 * 1024);
    let drain_hub = Arc::clone(&hub);
    tokio::spawn(async move { drain_hub.drain_outbound(writer).await });

    Fixture {
        manager,
        hub,
        outbound: BufReader::new(reader).lines(),
        queue,
        sink,
    }
}

impl Fixture {
    async fn start(&self, id: &str) {
        self.manager
            .start_session(&AccountId::from(id), SessionMode::Prediction)
            .unwrap();
        settle().await;
    }

    async fn deliver(&self, account: &str, event: &ChatEvent) {
        let line = serde_json::json!({ "account": account, "event": event }).to_string();
        assert!(self.hub.dispatch_line(&line).await, "event was not routed");
        settle().await;
    }

    async fn next_action(&mut self) -> OutboundAction {
        let line = tokio::time::timeout(Duration::from_secs(60), self.outbound.next_line())
            .await
            .expect("outbound action within a minute")
            .unwrap()
            .expect("bridge output still open");
        serde_json::from_str(&line).unwrap()
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

fn spawn_event(channel: &str) -> ChatEvent {
    ChatEvent::new(channel, BOT, "").with_embed(
        Embed::titled("A wild pokémon has appeared!")
            .with_description("Guess the pokémon and type @Pokétwo catch <pokémon> to catch it!")
            .with_image("https://cdn.test/spawns/1.png"),
    )
}

fn sent(account: &str, channel: &str, content: &str) -> OutboundAction {
    OutboundAction::Send {
        account: AccountId::from(account),
        channel_id: channel.into(),
        content: content.into(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenarios
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn legendary_spawn_is_caught_confirmed_and_reported_as_rare() {
    let config = config();
    let mut fx = fixture(&config);
    fx.start("main").await;

    fx.deliver("main", &spawn_event("c1")).await;
    assert_eq!(fx.next_action().await, sent("main", "c1", &format!("<@{BOT}> c mewtwo")));

    let confirmation = ChatEvent::new(
        "c1",
        BOT,
        "Congratulations <@42>! You caught a Level 70 Mewtwo (91.0%)!",
    );
    fx.deliver("main", &confirmation).await;

    let status = fx.manager.status(&AccountId::from("main")).unwrap();
    assert_eq!(status.stats.spawns_detected, 1);
    assert_eq!(status.stats.attempts, 1);
    assert_eq!(status.stats.success, 1);
    assert_eq!(status.pending_channels, 0);

    let jobs = fx.queue.snapshot();
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|job| job.classification == Classification::Rare));
    assert_eq!(jobs[0].destination, "https://hooks.test/catch");
    assert!(jobs[0].mention);
    assert!(!jobs[1].mention);
}

#[tokio::test(start_paused = true)]
async fn queue_worker_delivers_with_mention_only_on_primary_destination() {
    let config = config();
    let mut fx = fixture(&config);
    fx.queue.start().expect("first start spawns the worker");
    assert!(fx.queue.start().is_none());
    fx.start("main").await;

    fx.deliver("main", &spawn_event("c1")).await;
    fx.next_action().await;
    fx.deliver(
        "main",
        &ChatEvent::new("c1", BOT, "Congratulations <@42>! You caught a Level 70 Mewtwo (91.0%)!"),
    )
    .await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    let delivered = fx.sink.delivered.lock().clone();
    assert_eq!(delivered.len(), 2);
    let (primary, primary_payload) = &delivered[0];
    assert_eq!(primary, "https://hooks.test/catch");
    assert_eq!(primary_payload.content, config.notifications.mention_text);
    assert_eq!(primary_payload.embeds[0].title, "⭐ RARE MEWTWO CAUGHT!");
    let (mirror, mirror_payload) = &delivered[1];
    assert_eq!(mirror, "https://hooks.test/mirror");
    assert!(mirror_payload.content.is_empty());
}

#[tokio::test(start_paused = true)]
async fn accounts_only_see_their_own_stream() {
    let config = config();
    let mut fx = fixture(&config);
    fx.start("main").await;
    fx.start("alt").await;

    fx.deliver("alt", &spawn_event("c9")).await;
    assert_eq!(fx.next_action().await, sent("alt", "c9", &format!("<@{BOT}> c mewtwo")));

    let main = fx.manager.status(&AccountId::from("main")).unwrap();
    let alt = fx.manager.status(&AccountId::from("alt")).unwrap();
    assert_eq!(main.stats.spawns_detected, 0);
    assert_eq!(alt.stats.spawns_detected, 1);
}

#[tokio::test(start_paused = true)]
async fn challenge_overrides_manual_pause_then_resumes_after_solve() {
    let config = config();
    let mut fx = fixture(&config);
    let main = AccountId::from("main");
    fx.start("main").await;
    fx.manager.pause_session(&main, PauseReason::Manual).unwrap();

    let challenge = ChatEvent::new(
        "c1",
        BOT,
        "Whoa there. Please tell us you're human! https://verify.poketwo.net/captcha/42",
    );
    fx.deliver("main", &challenge).await;
    let status = fx.manager.status(&main).unwrap();
    assert_eq!(status.pause_reason, Some(PauseReason::Challenge));
    assert_eq!(status.stats.challenges_detected, 1);

    assert_eq!(fx.next_action().await, sent("main", "c1", "CAPTCHA_BYPASSED"));
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(fx.manager.status(&main).unwrap().lifecycle, Lifecycle::Active);

    let classes: Vec<Classification> = fx.queue.snapshot().iter().map(|job| job.classification).collect();
    assert_eq!(classes, vec![Classification::Challenge, Classification::ChallengeSolved]);
}

#[tokio::test(start_paused = true)]
async fn stop_during_catch_delay_sends_nothing() {
    let config = config();
    let mut fx = fixture(&config);
    let main = AccountId::from("main");
    fx.start("main").await;

    fx.deliver("main", &spawn_event("c1")).await;
    // Prediction has landed; the catch command is still waiting out its delay.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let stats = fx.manager.stop_session(&main).unwrap();
    assert_eq!(stats.attempts, 1);

    let quiet = tokio::time::timeout(Duration::from_secs(5), fx.outbound.next_line()).await;
    assert!(quiet.is_err(), "no action expected after stop");
    assert_eq!(fx.manager.stop_session(&main), Err(SessionError::NotActive));
}

#[tokio::test(start_paused = true)]
async fn balance_probe_on_start_commits_the_reported_balance() {
    let mut config = config();
    config.catching.probe_balance_on_start = true;
    let mut fx = fixture(&config);
    let main = AccountId::from("main");
    fx.start("main").await;

    fx.deliver("main", &spawn_event("c1")).await;
    assert_eq!(fx.next_action().await, sent("main", "c1", &format!("<@{BOT}> bal")));
    assert!(fx.manager.status(&main).unwrap().awaiting_balance);

    let reply = ChatEvent::new("c1", BOT, "")
        .with_embed(Embed::titled("ASH's balance").with_field("Pokécoins", "12,345"));
    fx.deliver("main", &reply).await;

    let status = fx.manager.status(&main).unwrap();
    assert_eq!(status.balance, Some(12_345));
    assert!(!status.awaiting_balance);
    assert_eq!(fx.manager.overview().total_balance, 12_345);
}

#[tokio::test(start_paused = true)]
async fn opted_in_account_clicks_confirm_buttons_addressed_to_it() {
    let config = config();
    let mut fx = fixture(&config);
    let main = AccountId::from("main");
    fx.manager.set_auto_click(&main, true).unwrap();
    fx.start("main").await;

    let mut prompt = ChatEvent::new("c1", BOT, "Are you sure you want to release this pokémon?")
        .with_mention("42")
        .with_buttons(vec![Button::new("Cancel", "release:no"), Button::new("Confirm", "release:yes")]);
    prompt.id = "m-100".into();
    fx.deliver("main", &prompt).await;

    assert_eq!(
        fx.next_action().await,
        OutboundAction::Click {
            account: main.clone(),
            channel_id: "c1".into(),
            message_id: "m-100".into(),
            custom_id: "release:yes".into(),
        }
    );
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(fx.manager.status(&main).unwrap().stats.auto_clicks, 1);
}
