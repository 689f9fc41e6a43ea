//! Per-account event dispatch.
//!
//! `handle` runs synchronously in arrival order and decides which handler owns
//! the event. Any slow follow-up (downloads, predictions, humanizing delays,
//! solver calls) comes back as a future for the caller to spawn, so a slow
//! spawn never holds up the next event.

use super::CatcherServices;
use super::classifier;
use super::state::{Lifecycle, PauseReason, SessionState};
use crate::accounts::Account;
use crate::channels::traits::{Channel, ChatEvent};
use crate::notify::CatchReport;
use crate::onboarding::OnboardingError;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::Arc;

/// Deferred part of handling one event.
pub type Tail = BoxFuture<'static, ()>;

#[derive(Clone)]
pub struct EventRouter {
    pub(super) account: Account,
    pub(super) channel: Arc<dyn Channel>,
    pub(super) state: Arc<Mutex<SessionState>>,
    pub(super) services: Arc<CatcherServices>,
}

impl EventRouter {
    pub fn new(
        account: Account,
        channel: Arc<dyn Channel>,
        state: Arc<Mutex<SessionState>>,
        services: Arc<CatcherServices>,
    ) -> Self {
        Self {
            account,
            channel,
            state,
            services,
        }
    }

    /// Route one event; first matching handler wins.
    pub fn handle(&self, event: ChatEvent) -> Option<Tail> {
        if let Some(tail) = self.try_auto_click(&event) {
            return Some(tail);
        }
        if event.author_id != self.services.catching.game_bot_id {
            return None;
        }
        if self.try_balance_reply(&event) {
            return None;
        }

        let running = self.state.lock().is_running();
        if !running {
            return None;
        }

        if classifier::is_success_marker(&event) {
            self.handle_confirmation(&event);
            return None;
        }
        if classifier::is_onboarding_prompt(&event) || classifier::is_terms_of_service(&event) {
            return self.handle_onboarding(&event);
        }
        if classifier::is_challenge(&event) {
            return self.handle_challenge(&event);
        }

        let active = self.state.lock().is_active();
        if !active {
            return None;
        }
        if classifier::is_spawn(&event) {
            return self.handle_spawn(&event);
        }
        None
    }

    /// Route one event and run its tail to completion.
    pub async fn dispatch(&self, event: ChatEvent) {
        if let Some(tail) = self.handle(event) {
            tail.await;
        }
    }

    fn try_auto_click(&self, event: &ChatEvent) -> Option<Tail> {
        let opted_in = self.state.lock().auto_click;
        if !opted_in
            || !event.has_buttons()
            || !classifier::is_addressed_for_click(event, &self.account)
        {
            return None;
        }
        let custom_id = classifier::confirm_button(event)?.to_string();
        let catching = &self.services.catching;
        let delay = self
            .services
            .jitter
            .delay(catching.click_delay_min_ms, catching.click_delay_max_ms);

        let this = self.clone();
        let event = event.clone();
        Some(
            async move {
                tokio::time::sleep(delay).await;
                match this.channel.click_button(&event, &custom_id).await {
                    Ok(()) => {
                        this.state.lock().stats.auto_clicks += 1;
                        tracing::info!(
                            account = %this.account.id,
                            channel = %event.channel_id,
                            button = %custom_id,
                            "Auto-clicked confirmation button"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(account = %this.account.id, "Auto-click failed: {e}");
                    }
                }
            }
            .boxed(),
        )
    }

    fn try_balance_reply(&self, event: &ChatEvent) -> bool {
        let mut state = self.state.lock();
        let Some(awaiting) = &state.awaiting_balance else {
            return false;
        };
        let Some(balance) = classifier::balance_reply(event, &awaiting.expected_display_name) else {
            return false;
        };
        let waited_ms = awaiting.requested_at.elapsed().as_millis();
        state.balance = Some(balance);
        state.awaiting_balance = None;
        drop(state);

        tracing::info!(account = %self.account.id, balance, waited_ms, "Balance updated");
        true
    }

    fn handle_confirmation(&self, event: &ChatEvent) {
        let Some(confirmation) = classifier::extract_confirmation(event) else {
            tracing::debug!(account = %self.account.id, "Success marker without a parsable confirmation");
            return;
        };
        if !classifier::is_for_account(event, &self.account) {
            return;
        }

        let mut state = self.state.lock();
        let Some(pending) = state.pending_by_channel.remove(&event.channel_id) else {
            tracing::debug!(
                account = %self.account.id,
                channel = %event.channel_id,
                "Confirmation without a pending attempt"
            );
            return;
        };
        state.record_success(self.services.catching.balance_check_interval);
        let success = state.stats.success;
        drop(state);

        // Report what was attempted; the bot's spelling only goes to the log.
        let rarity = pending
            .rarity
            .or_else(|| self.services.rarity.lookup(&pending.predicted_name));
        let report = CatchReport {
            account: self.account.username.clone(),
            name: pending.predicted_name,
            rarity,
            level: confirmation.level,
            iv_percent: confirmation.iv_percent,
            is_shiny: confirmation.is_shiny,
            confidence: Some(pending.confidence),
            latency_ms: pending.prediction_latency_ms,
            quota_remaining: pending.quota_remaining,
        };
        tracing::info!(
            account = %self.account.id,
            channel = %event.channel_id,
            pokemon = %report.name,
            confirmed_as = %confirmation.name,
            level = report.level,
            iv = report.iv_percent,
            shiny = report.is_shiny,
            classification = %report.classification(),
            success,
            "Catch confirmed"
        );
        self.services.notifier.catch(&report);
    }

    fn handle_onboarding(&self, event: &ChatEvent) -> Option<Tail> {
        let generation = {
            let mut state = self.state.lock();
            if state.is_active() {
                state.lifecycle = Lifecycle::Paused(PauseReason::Onboarding);
            }
            state.generation
        };
        tracing::warn!(
            account = %self.account.id,
            channel = %event.channel_id,
            "Onboarding prompt; session paused"
        );

        let onboarding = self.services.onboarding.clone()?;
        let this = self.clone();
        let channel_id = event.channel_id.clone();
        Some(
            async move {
                let outcome = onboarding
                    .run(&this.account, this.channel.as_ref(), &channel_id)
                    .await;
                match outcome {
                    Ok(choice) => {
                        let resumed = {
                            let mut state = this.state.lock();
                            let waiting = state.generation == generation
                                && state.lifecycle == Lifecycle::Paused(PauseReason::Onboarding);
                            if waiting {
                                state.lifecycle = Lifecycle::Active;
                            }
                            waiting
                        };
                        tracing::info!(
                            account = %this.account.id,
                            choice = %choice,
                            resumed,
                            "Onboarding finished"
                        );
                    }
                    Err(OnboardingError::InProgress) => {
                        tracing::debug!(account = %this.account.id, "Onboarding already running");
                    }
                    Err(e) => {
                        tracing::warn!(account = %this.account.id, "Onboarding failed; session stays paused: {e}");
                    }
                }
            }
            .boxed(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catcher::jitter::FixedJitter;
    use crate::catcher::state::SessionMode;
    use crate::channels::traits::{Button, Embed};
    use crate::config::Config;
    use crate::notify::{
        DeliveryError, NotificationQueue, Notifier, QueueSettings, WebhookPayload, WebhookSink,
    };
    use crate::onboarding::Onboarding;
    use crate::prediction::{ImageError, ImageFetcher, Prediction, PredictionError, Predictor};
    use crate::solver::{ChallengeSolver, SolverError};
    use async_trait::async_trait;
    use std::time::Duration;

    const BOT: &str = "716390085896962058";

    #[derive(Default)]
    struct RecordingChannel {
        pub sent: Mutex<Vec<(String, String)>>,
        pub clicks: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, channel_id: &str, content: &str) -> anyhow::Result<()> {
            self.sent.lock().push((channel_id.into(), content.into()));
            Ok(())
        }

        async fn click_button(&self, _event: &ChatEvent, custom_id: &str) -> anyhow::Result<()> {
            self.clicks.lock().push(custom_id.into());
            Ok(())
        }

        async fn listen(&self, _tx: tokio::sync::mpsc::Sender<ChatEvent>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct StaticImages {
        pub fail: bool,
    }

    #[async_trait]
    impl ImageFetcher for StaticImages {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>, ImageError> {
            if self.fail {
                Err(ImageError::Status(404))
            } else {
                Ok(vec![0xff, 0xd8, 0xff])
            }
        }
    }

    struct ScriptedPredictor {
        pub result: Result<Prediction, PredictionError>,
    }

    #[async_trait]
    impl Predictor for ScriptedPredictor {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn predict(&self, _image: Vec<u8>) -> Result<Prediction, PredictionError> {
            self.result.clone()
        }
    }

    /// Image bytes are the creature name from the URL's file stem; URLs under
    /// `/slow/` take five seconds to download.
    struct NamedImages;

    #[async_trait]
    impl ImageFetcher for NamedImages {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, ImageError> {
            if url.contains("/slow/") {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            let stem = url.rsplit('/').next().unwrap_or_default().trim_end_matches(".png");
            Ok(stem.as_bytes().to_vec())
        }
    }

    struct NameFromImage;

    #[async_trait]
    impl Predictor for NameFromImage {
        fn name(&self) -> &str {
            "name-from-image"
        }

        async fn predict(&self, image: Vec<u8>) -> Result<Prediction, PredictionError> {
            Ok(Prediction {
                name: String::from_utf8_lossy(&image).into_owned(),
                confidence: 80.0,
                latency_ms: None,
                quota_remaining: None,
            })
        }
    }

    struct ScriptedSolver {
        result: Result<String, SolverError>,
        delay: Duration,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl ChallengeSolver for ScriptedSolver {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn solve(&self, _account: &Account) -> Result<String, SolverError> {
            *self.calls.lock() += 1;
            tokio::time::sleep(self.delay).await;
            self.result.clone()
        }
    }

    struct InstantOnboarding;

    #[async_trait]
    impl Onboarding for InstantOnboarding {
        async fn run(
            &self,
            _account: &Account,
            channel: &dyn Channel,
            channel_id: &str,
        ) -> Result<String, OnboardingError> {
            channel
                .send(channel_id, "start")
                .await
                .map_err(|e| OnboardingError::Send(e.to_string()))?;
            Ok("bulbasaur".into())
        }
    }

    struct NullSink;

    #[async_trait]
    impl WebhookSink for NullSink {
        async fn deliver(&self, _: &str, _: &WebhookPayload) -> Result<(), DeliveryError> {
            Ok(())
        }
    }

    fn mewtwo() -> Prediction {
        Prediction {
            name: "mewtwo".into(),
            confidence: 91.2,
            latency_ms: Some(120),
            quota_remaining: Some(998),
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.rarity.legendary = vec!["mewtwo".into()];
        config.notifications.catch_webhook = Some("https://hooks/catch".into());
        config.notifications.challenge_webhook = Some("https://hooks/challenge".into());
        config
    }

    struct Harness {
        router: EventRouter,
        channel: Arc<RecordingChannel>,
        notifier: Arc<Notifier>,
    }

    fn harness_with(configure: impl FnOnce(CatcherServices) -> CatcherServices) -> Harness {
        let config = test_config();
        let queue = NotificationQueue::new(Arc::new(NullSink), QueueSettings::from_config(&config.notifications));
        let notifier = Arc::new(Notifier::new(&config.notifications, queue));
        let services = CatcherServices::new(&config, Arc::new(StaticImages { fail: false }), notifier.clone())
            .with_predictor(Arc::new(ScriptedPredictor { result: Ok(mewtwo()) }))
            .with_jitter(Arc::new(FixedJitter::lower_bound()));
        let services = Arc::new(configure(services));
        let channel = Arc::new(RecordingChannel::default());
        let state = Arc::new(Mutex::new(SessionState::default()));
        state.lock().begin(SessionMode::Prediction, false);
        let account = Account::new("main", "42", "ash").with_display_name("Ash").with_credential("tok");
        Harness {
            router: EventRouter::new(account, channel.clone(), state, services),
            channel,
            notifier,
        }
    }

    fn harness() -> Harness {
        harness_with(|services| services)
    }

    fn spawn_event(channel: &str) -> ChatEvent {
        ChatEvent::new(channel, BOT, "").with_embed(
            Embed::titled("A wild pokémon has appeared!")
                .with_description("Guess the pokémon and type @Pokétwo#8236 catch <pokémon> to catch it!")
                .with_image("https://cdn.example/spawn.png"),
        )
    }

    fn spawn_with_image(channel: &str, url: &str) -> ChatEvent {
        ChatEvent::new(channel, BOT, "")
            .with_embed(Embed::titled("A wild pokémon has appeared!").with_image(url))
    }

    fn named_harness() -> Harness {
        harness_with(|mut services| {
            services.images = Arc::new(NamedImages);
            services.with_predictor(Arc::new(NameFromImage))
        })
    }

    fn confirmation(channel: &str, text: &str) -> ChatEvent {
        ChatEvent::new(channel, BOT, text)
    }

    fn challenge_event() -> ChatEvent {
        ChatEvent::new("c1", BOT, "Whoa there. Please tell us you're human! https://verify.poketwo.net/captcha/42")
    }

    #[tokio::test(start_paused = true)]
    async fn spawn_predicts_waits_and_sends_catch_command() {
        let h = harness();
        let started = tokio::time::Instant::now();
        h.router.dispatch(spawn_event("c1")).await;

        // Legendary: 70% of the 1000ms lower bound.
        assert!(started.elapsed() >= Duration::from_millis(700));
        assert!(started.elapsed() < Duration::from_millis(1000));
        assert_eq!(
            *h.channel.sent.lock(),
            vec![("c1".to_string(), format!("<@{BOT}> c mewtwo"))]
        );
        let state = h.router.state.lock();
        assert_eq!(state.stats.spawns_detected, 1);
        assert_eq!(state.stats.attempts, 1);
        assert_eq!(state.pending_by_channel["c1"].predicted_name, "mewtwo");
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_consumes_pending_and_queues_rare_notification() {
        let h = harness();
        h.router.dispatch(spawn_event("c1")).await;
        h.router
            .dispatch(confirmation("c1", "Congratulations <@42>! You caught a Level 70 Mewtwo (91.0%)!"))
            .await;

        let state = h.router.state.lock();
        assert_eq!(state.stats.success, 1);
        assert!(state.pending_by_channel.is_empty());
        assert!(state.balance_check_due);
        let jobs = h.notifier.queue().snapshot();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].classification, crate::notify::Classification::Rare);
        assert!(jobs[0].mention);
    }

    #[tokio::test(start_paused = true)]
    async fn report_uses_the_attempted_name() {
        let h = harness();
        h.router.dispatch(spawn_event("c1")).await;
        h.router
            .dispatch(confirmation("c1", "Congratulations <@42>! You caught a Level 12 Pidgey (40.0%)!"))
            .await;

        let jobs = h.notifier.queue().snapshot();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].classification, crate::notify::Classification::Rare);
        assert_eq!(jobs[0].payload.embeds[0].title, "⭐ RARE MEWTWO CAUGHT!");
    }

    #[tokio::test(start_paused = true)]
    async fn newer_spawn_wins_over_slower_older_one() {
        let h = named_harness();
        let older = h
            .router
            .handle(spawn_with_image("c1", "https://cdn.example/slow/pidgey.png"))
            .unwrap();
        let newer = h
            .router
            .handle(spawn_with_image("c1", "https://cdn.example/rattata.png"))
            .unwrap();
        let older = tokio::spawn(older);
        let newer = tokio::spawn(newer);
        older.await.unwrap();
        newer.await.unwrap();

        let state = h.router.state.lock();
        assert_eq!(state.stats.spawns_detected, 2);
        assert_eq!(state.stats.attempts, 1);
        assert_eq!(state.pending_by_channel["c1"].predicted_name, "rattata");
        assert_eq!(
            *h.channel.sent.lock(),
            vec![("c1".to_string(), format!("<@{BOT}> c rattata"))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn spawn_replaced_during_catch_delay_sends_only_the_newer_command() {
        let h = named_harness();
        let older = tokio::spawn(
            h.router
                .handle(spawn_with_image("c1", "https://cdn.example/pidgey.png"))
                .unwrap(),
        );
        // The older attempt is recorded and waiting out its 1000ms delay.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(h.router.state.lock().pending_by_channel["c1"].predicted_name, "pidgey");

        let newer = tokio::spawn(
            h.router
                .handle(spawn_with_image("c1", "https://cdn.example/rattata.png"))
                .unwrap(),
        );
        older.await.unwrap();
        newer.await.unwrap();

        let state = h.router.state.lock();
        assert_eq!(state.stats.attempts, 2);
        assert_eq!(state.pending_by_channel["c1"].predicted_name, "rattata");
        assert_eq!(
            *h.channel.sent.lock(),
            vec![("c1".to_string(), format!("<@{BOT}> c rattata"))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn spawns_in_different_channels_do_not_supersede_each_other() {
        let h = named_harness();
        let first = tokio::spawn(
            h.router
                .handle(spawn_with_image("c1", "https://cdn.example/slow/pidgey.png"))
                .unwrap(),
        );
        let second = tokio::spawn(
            h.router
                .handle(spawn_with_image("c2", "https://cdn.example/rattata.png"))
                .unwrap(),
        );
        first.await.unwrap();
        second.await.unwrap();

        let mut sent = h.channel.sent.lock().clone();
        sent.sort();
        assert_eq!(
            sent,
            vec![
                ("c1".to_string(), format!("<@{BOT}> c pidgey")),
                ("c2".to_string(), format!("<@{BOT}> c rattata")),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_for_other_account_or_channel_is_ignored() {
        let h = harness();
        h.router.dispatch(spawn_event("c1")).await;
        h.router
            .dispatch(confirmation("c1", "Congratulations <@77>! You caught a Level 70 Mewtwo (91.0%)!"))
            .await;
        h.router
            .dispatch(confirmation("c2", "Congratulations <@42>! You caught a Level 70 Mewtwo (91.0%)!"))
            .await;

        let state = h.router.state.lock();
        assert_eq!(state.stats.success, 0);
        assert_eq!(state.pending_by_channel.len(), 1);
        assert!(h.notifier.queue().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn events_from_other_authors_are_ignored() {
        let h = harness();
        let mut event = spawn_event("c1");
        event.author_id = "someone".into();
        assert!(h.router.handle(event).is_none());
        assert_eq!(h.router.state.lock().stats.spawns_detected, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn image_failure_counts_as_failed() {
        let h = harness_with(|mut services| {
            services.images = Arc::new(StaticImages { fail: true });
            services
        });
        h.router.dispatch(spawn_event("c1")).await;
        let state = h.router.state.lock();
        assert_eq!(state.stats.failed, 1);
        assert_eq!(state.stats.attempts, 0);
        assert!(h.channel.sent.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn prediction_errors_are_silent_drops() {
        let h = harness_with(|services| {
            services.with_predictor(Arc::new(ScriptedPredictor {
                result: Err(PredictionError::QuotaExhausted),
            }))
        });
        h.router.dispatch(spawn_event("c1")).await;
        let state = h.router.state.lock();
        assert_eq!(state.stats.spawns_detected, 1);
        assert_eq!(state.stats.failed, 0);
        assert_eq!(state.stats.attempts, 0);
        assert!(h.channel.sent.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn spawn_without_image_is_not_a_failure() {
        let h = harness();
        let event = ChatEvent::new("c1", BOT, "").with_embed(Embed::titled("A wild pokémon has appeared!"));
        assert!(h.router.handle(event).is_none());
        let state = h.router.state.lock();
        assert_eq!(state.stats.spawns_detected, 1);
        assert_eq!(state.stats.failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn paused_session_ignores_spawns_but_still_confirms() {
        let h = harness();
        h.router.dispatch(spawn_event("c1")).await;
        h.router.state.lock().lifecycle = Lifecycle::Paused(PauseReason::Manual);

        assert!(h.router.handle(spawn_event("c2")).is_none());
        h.router
            .dispatch(confirmation("c1", "Congratulations <@42>! You caught a Level 70 Mewtwo (91.0%)!"))
            .await;
        let state = h.router.state.lock();
        assert_eq!(state.stats.spawns_detected, 1);
        assert_eq!(state.stats.success, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn inactive_session_ignores_game_events() {
        let h = harness();
        h.router.state.lock().end();
        assert!(h.router.handle(spawn_event("c1")).is_none());
        assert!(h.router.handle(challenge_event()).is_none());
        assert_eq!(h.router.state.lock().stats.challenges_detected, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn due_balance_probe_is_sent_once_and_expires() {
        let h = harness();
        h.router.state.lock().balance_check_due = true;
        h.router.dispatch(spawn_event("c1")).await;
        h.router.dispatch(spawn_event("c1")).await;

        let probes = h
            .channel
            .sent
            .lock()
            .iter()
            .filter(|(_, content)| content.ends_with(" bal"))
            .count();
        assert_eq!(probes, 1);
        assert!(h.router.state.lock().awaiting_balance.is_some());

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(h.router.state.lock().awaiting_balance.is_none());

        let reply = ChatEvent::new("c1", BOT, "")
            .with_embed(Embed::titled("Ash's balance").with_field("Pokécoins", "1,250"));
        h.router.dispatch(reply).await;
        assert_eq!(h.router.state.lock().balance, None);
    }

    #[tokio::test(start_paused = true)]
    async fn matching_balance_reply_commits_balance() {
        let h = harness();
        h.router.state.lock().balance_check_due = true;
        h.router.dispatch(spawn_event("c1")).await;

        let reply = ChatEvent::new("c1", BOT, "")
            .with_embed(Embed::titled("Ash's balance").with_field("Pokécoins", "1,250"));
        assert!(h.router.handle(reply).is_none());
        let state = h.router.state.lock();
        assert_eq!(state.balance, Some(1250));
        assert!(state.awaiting_balance.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn auto_click_requires_opt_in_and_addressing() {
        let h = harness();
        let prompt = ChatEvent::new("c1", BOT, "Are you sure?")
            .with_mention("42")
            .with_buttons(vec![Button::new("Cancel", "no"), Button::new("Confirm", "yes")]);
        assert!(h.router.handle(prompt.clone()).is_none());

        h.router.state.lock().auto_click = true;
        let started = tokio::time::Instant::now();
        h.router.dispatch(prompt).await;
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(*h.channel.clicks.lock(), vec!["yes".to_string()]);
        assert_eq!(h.router.state.lock().stats.auto_clicks, 1);

        let unaddressed = ChatEvent::new("c1", BOT, "Are you sure?")
            .with_buttons(vec![Button::new("Confirm", "yes")]);
        assert!(h.router.handle(unaddressed).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn challenge_pauses_solves_and_resumes_after_grace() {
        let h = harness_with(|services| {
            services.with_solver(Arc::new(ScriptedSolver {
                result: Ok("CAPTCHA_BYPASSED".into()),
                delay: Duration::from_secs(5),
                calls: Mutex::new(0),
            }))
        });
        let tail = h.router.handle(challenge_event()).expect("solver tail");
        assert_eq!(
            h.router.state.lock().lifecycle,
            Lifecycle::Paused(PauseReason::Challenge)
        );
        // A second prompt while solving still counts but starts no new solve.
        assert!(h.router.handle(challenge_event()).is_none());

        tail.await;
        let state = h.router.state.lock();
        assert_eq!(state.lifecycle, Lifecycle::Active);
        assert_eq!(state.stats.challenges_detected, 2);
        assert!(!state.solve_in_flight);
        assert_eq!(
            *h.channel.sent.lock(),
            vec![("c1".to_string(), "CAPTCHA_BYPASSED".to_string())]
        );
        let classes: Vec<_> = h
            .notifier
            .queue()
            .snapshot()
            .iter()
            .map(|job| job.classification)
            .collect();
        assert_eq!(
            classes,
            vec![
                crate::notify::Classification::Challenge,
                crate::notify::Classification::Challenge,
                crate::notify::Classification::ChallengeSolved,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn manual_pause_during_grace_is_not_clobbered() {
        let h = harness_with(|services| {
            services.with_solver(Arc::new(ScriptedSolver {
                result: Ok("CAPTCHA_BYPASSED".into()),
                delay: Duration::from_secs(1),
                calls: Mutex::new(0),
            }))
        });
        let tail = h.router.handle(challenge_event()).unwrap();
        let state = Arc::clone(&h.router.state);
        let solving = tokio::spawn(tail);

        tokio::time::sleep(Duration::from_millis(2000)).await;
        state.lock().lifecycle = Lifecycle::Paused(PauseReason::Manual);
        solving.await.unwrap();

        assert_eq!(state.lock().lifecycle, Lifecycle::Paused(PauseReason::Manual));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_solve_leaves_session_paused() {
        let h = harness_with(|services| {
            services.with_solver(Arc::new(ScriptedSolver {
                result: Err(SolverError::Rejected("invalid token".into())),
                delay: Duration::from_millis(10),
                calls: Mutex::new(0),
            }))
        });
        h.router.dispatch(challenge_event()).await;
        let state = h.router.state.lock();
        assert_eq!(state.lifecycle, Lifecycle::Paused(PauseReason::Challenge));
        assert!(!state.solve_in_flight);
        assert!(h.channel.sent.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_solver_is_bounded() {
        let h = harness_with(|services| {
            services.with_solver(Arc::new(ScriptedSolver {
                result: Ok("late".into()),
                delay: Duration::from_secs(120),
                calls: Mutex::new(0),
            }))
        });
        let started = tokio::time::Instant::now();
        h.router.dispatch(challenge_event()).await;
        assert!(started.elapsed() < Duration::from_secs(40));
        assert_eq!(
            h.router.state.lock().lifecycle,
            Lifecycle::Paused(PauseReason::Challenge)
        );
        assert!(h.channel.sent.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn onboarding_pauses_then_resumes() {
        let h = harness_with(|services| services.with_onboarding(Arc::new(InstantOnboarding)));
        let prompt = ChatEvent::new("c1", BOT, "Please pick a starter pokémon before using this command!");
        let tail = h.router.handle(prompt).expect("onboarding tail");
        assert_eq!(
            h.router.state.lock().lifecycle,
            Lifecycle::Paused(PauseReason::Onboarding)
        );
        tail.await;
        assert_eq!(h.router.state.lock().lifecycle, Lifecycle::Active);
        assert_eq!(h.channel.sent.lock()[0].1, "start");
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_prediction_discards_result() {
        let h = harness();
        let tail = h.router.handle(spawn_event("c1")).unwrap();
        h.router.state.lock().end();
        tail.await;
        let state = h.router.state.lock();
        assert_eq!(state.stats.attempts, 0);
        assert!(state.pending_by_channel.is_empty());
        assert!(h.channel.sent.lock().is_empty());
    }
}
