use crate::accounts::{Account, AccountId};
use crate::catcher::{CatcherServices, SessionManager, SessionMode};
use crate::channels::BridgeHub;
use crate::config::Config;
use crate::health;
use crate::notify::{HttpWebhookSink, NotificationQueue, Notifier, QueueSettings};
use crate::onboarding::ScriptedOnboarding;
use crate::prediction::{HttpImageFetcher, HttpPredictionClient};
use crate::solver::HttpChallengeSolver;
use anyhow::Result;
use chrono::Utc;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::task::JoinHandle;
use tokio::time::Duration;

const STATUS_FLUSH_SECONDS: u64 = 5;

pub async fn run(config: Config) -> Result<()> {
    let initial_backoff = config.reliability.initial_backoff_secs.max(1);
    let max_backoff = config.reliability.max_backoff_secs.max(initial_backoff);

    health::mark_component_ok("daemon");

    let services = build_services(&config)?;
    let queue = services.notifier.queue().clone();
    let manager = Arc::new(SessionManager::new(Arc::new(services)));
    let hub = BridgeHub::new();
    register_accounts(&config, &manager, &hub);

    let mut handles: Vec<JoinHandle<()>> = vec![spawn_state_writer(config.clone(), Arc::clone(&manager))];

    handles.push(spawn_component_supervisor(
        health::NOTIFICATIONS,
        initial_backoff,
        max_backoff,
        move || {
            let queue = queue.clone();
            async move {
                queue.run().await;
                Ok(())
            }
        },
    ));

    {
        let hub = Arc::clone(&hub);
        handles.push(spawn_component_supervisor(
            health::BRIDGE,
            initial_backoff,
            max_backoff,
            move || {
                let hub = Arc::clone(&hub);
                async move { hub.drain_outbound(tokio::io::stdout()).await }
            },
        ));
    }

    let running = manager.list_active().len();
    tracing::info!(
        accounts = config.accounts.len(),
        sessions = running,
        "Autocatcher daemon started; reading bridge events from stdin"
    );

    let inbound = hub.pump_inbound(BufReader::new(tokio::io::stdin()));
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Shutdown requested");
        }
        result = inbound => {
            if let Err(e) = result {
                tracing::error!("Bridge input failed: {e}");
            }
        }
    }
    health::mark_component_error("daemon", "shutdown requested");

    let stopped = manager.stop_all();
    if !stopped.is_empty() {
        tracing::info!(sessions = ?stopped, "Sessions stopped on shutdown");
    }

    for handle in &handles {
        handle.abort();
    }
    for handle in handles {
        let _ = handle.await;
    }

    Ok(())
}

/// Wire HTTP-backed collaborators from config. Optional services stay
/// unset when their endpoint is not configured.
pub fn build_services(config: &Config) -> Result<CatcherServices> {
    let images = HttpImageFetcher::new(Duration::from_secs(config.prediction.image_timeout_secs))?;
    let sink = HttpWebhookSink::new(Duration::from_secs(config.notifications.timeout_secs))?;
    let queue = NotificationQueue::new(
        Arc::new(sink),
        QueueSettings::from_config(&config.notifications),
    );
    let notifier = Arc::new(Notifier::new(&config.notifications, queue));

    let mut services = CatcherServices::new(config, Arc::new(images), notifier);

    match HttpPredictionClient::from_config(&config.prediction)? {
        Some(client) => services = services.with_predictor(Arc::new(client)),
        None => tracing::warn!("Prediction service not configured; sessions cannot start"),
    }
    match HttpChallengeSolver::from_config(&config.solver)? {
        Some(solver) => services = services.with_solver(Arc::new(solver)),
        None => tracing::info!("Challenge solver not configured; challenges pause until resumed"),
    }
    if config.onboarding.enabled {
        let onboarding = ScriptedOnboarding::new(
            config.onboarding.clone(),
            &config.catching.game_bot_id,
            Arc::clone(&services.jitter),
        );
        services = services.with_onboarding(Arc::new(onboarding));
    }
    Ok(services)
}

fn register_accounts(config: &Config, manager: &SessionManager, hub: &Arc<BridgeHub>) {
    for account_config in &config.accounts {
        let account = Account::from(account_config);
        let id = account.id.clone();
        let channel = Arc::new(hub.channel_for(id.clone()));
        if let Err(e) = manager.register_account(account, channel) {
            tracing::warn!(account = %id, "Skipping account: {e}");
            continue;
        }
        if account_config.auto_click {
            let _ = manager.set_auto_click(&id, true);
        }
        if account_config.autostart {
            autostart(manager, &id);
        }
    }
}

fn autostart(manager: &SessionManager, id: &AccountId) {
    if let Err(e) = manager.start_session(id, SessionMode::Prediction) {
        tracing::warn!(account = %id, "Session not started: {e}");
    }
}

pub fn state_file_path(config: &Config) -> PathBuf {
    config
        .config_path
        .parent()
        .map_or_else(|| PathBuf::from("."), PathBuf::from)
        .join("daemon_state.json")
}

/// Daemon state as written to disk and read back by the doctor.
pub fn state_json(manager: &SessionManager) -> serde_json::Value {
    let mut json = serde_json::to_value(health::snapshot()).unwrap_or_else(|_| serde_json::json!({}));
    if let Some(obj) = json.as_object_mut() {
        obj.insert("written_at".into(), serde_json::json!(Utc::now().to_rfc3339()));
        obj.insert(
            "overview".into(),
            serde_json::to_value(manager.overview()).unwrap_or_default(),
        );
        obj.insert(
            "sessions".into(),
            serde_json::to_value(manager.list_active()).unwrap_or_default(),
        );
    }
    json
}

fn spawn_state_writer(config: Config, manager: Arc<SessionManager>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let path = state_file_path(&config);
        if let Some(parent) = path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }

        let mut interval = tokio::time::interval(Duration::from_secs(STATUS_FLUSH_SECONDS));
        loop {
            interval.tick().await;
            let json = state_json(&manager);
            let data = serde_json::to_vec_pretty(&json).unwrap_or_else(|_| b"{}".to_vec());
            let _ = tokio::fs::write(&path, data).await;
        }
    })
}

fn spawn_component_supervisor<F, Fut>(
    name: &'static str,
    initial_backoff_secs: u64,
    max_backoff_secs: u64,
    mut run_component: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut backoff = initial_backoff_secs.max(1);
        let max_backoff = max_backoff_secs.max(backoff);

        loop {
            health::mark_component_ok(name);
            match run_component().await {
                Ok(()) => {
                    health::mark_component_error(name, "component exited unexpectedly");
                    tracing::warn!("Daemon component '{name}' exited unexpectedly");
                }
                Err(e) => {
                    health::mark_component_error(name, e.to_string());
                    tracing::error!("Daemon component '{name}' failed: {e}");
                }
            }

            health::bump_component_restart(name);
            tokio::time::sleep(Duration::from_secs(backoff)).await;
            backoff = backoff.saturating_mul(2).min(max_backoff);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catcher::Lifecycle;
    use crate::config::AccountConfig;
    use tempfile::TempDir;

    fn account(id: &str, autostart: bool, auto_click: bool) -> AccountConfig {
        AccountConfig {
            id: id.into(),
            user_id: format!("{id}-uid"),
            username: id.into(),
            display_name: None,
            credential: None,
            auto_click,
            autostart,
        }
    }

    #[test]
    fn state_file_path_uses_config_directory() {
        let tmp = TempDir::new().unwrap();
        let config = Config {
            config_path: tmp.path().join("config.toml"),
            ..Config::default()
        };
        assert_eq!(state_file_path(&config), tmp.path().join("daemon_state.json"));
    }

    #[tokio::test]
    async fn optional_services_stay_unset_without_endpoints() {
        let mut config = Config::default();
        config.onboarding.enabled = false;
        let services = build_services(&config).unwrap();
        assert!(services.predictor.is_none());
        assert!(services.solver.is_none());
        assert!(services.onboarding.is_none());
    }

    #[tokio::test]
    async fn accounts_register_and_autostart_when_prediction_is_configured() {
        let mut config = Config::default();
        config.prediction.api_url = Some("http://127.0.0.1:9/predict".into());
        config.prediction.api_key = Some("key".into());
        config.accounts = vec![account("main", true, true), account("alt", false, false)];

        let manager = SessionManager::new(Arc::new(build_services(&config).unwrap()));
        let hub = BridgeHub::new();
        register_accounts(&config, &manager, &hub);

        let main = manager.status(&AccountId::from("main")).unwrap();
        assert_eq!(main.lifecycle, Lifecycle::Active);
        assert!(main.auto_click);
        let alt = manager.status(&AccountId::from("alt")).unwrap();
        assert_eq!(alt.lifecycle, Lifecycle::Inactive);

        let state = state_json(&manager);
        assert_eq!(state["overview"]["registered_accounts"], 2);
        assert_eq!(state["sessions"].as_array().map(Vec::len), Some(1));
        manager.stop_all();
    }

    #[tokio::test]
    async fn supervisor_marks_error_and_restart_on_failure() {
        let handle = spawn_component_supervisor("daemon-test-fail", 1, 1, || async {
            anyhow::bail!("boom")
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
        let _ = handle.await;

        let component = health::component("daemon-test-fail").unwrap();
        assert_eq!(component.status, health::ComponentStatus::Error);
        assert!(component.restart_count >= 1);
        assert!(component.last_error.unwrap_or_default().contains("boom"));
    }

    #[tokio::test]
    async fn supervisor_marks_unexpected_exit_as_error() {
        let handle = spawn_component_supervisor("daemon-test-exit", 1, 1, || async { Ok(()) });

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
        let _ = handle.await;

        let component = health::component("daemon-test-exit").unwrap();
        assert_eq!(component.status, health::ComponentStatus::Error);
        assert!(
            component
                .last_error
                .unwrap_or_default()
                .contains("component exited unexpectedly")
        );
    }
}
