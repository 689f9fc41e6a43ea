use crate::config::Config;
use crate::prediction::HttpPredictionClient;
use crate::solver::HttpChallengeSolver;
use crate::util::group_thousands;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

const DAEMON_STALE_SECONDS: i64 = 30;
const COMPONENT_STALE_SECONDS: i64 = 300;

pub async fn run(config: &Config) -> Result<()> {
    println!("🩺 Autocatcher Doctor");
    check_config(config);
    check_prediction(config).await;
    check_daemon_state(config)
}

fn check_config(config: &Config) {
    if config.accounts.is_empty() {
        println!("  ❌ no accounts configured");
    } else {
        let autostart = config.accounts.iter().filter(|a| a.autostart).count();
        println!(
            "  ✅ {} account(s) configured, {autostart} set to autostart",
            config.accounts.len()
        );
    }
    for account in &config.accounts {
        if account.credential.is_none() {
            println!("  ℹ️ {} has no credential; challenges cannot be solved for it", account.id);
        }
    }

    match HttpChallengeSolver::from_config(&config.solver) {
        Ok(Some(solver)) => println!(
            "  ✅ challenge solver configured ({}, {}s timeout)",
            solver.endpoint(),
            config.solver.timeout_secs
        ),
        Ok(None) => {
            println!("  ℹ️ challenge solver not configured; challenges pause until resumed manually");
        }
        Err(e) => println!("  ❌ challenge solver could not be built: {e}"),
    }

    let notify = &config.notifications;
    let destinations = usize::from(notify.catch_webhook.is_some()) + notify.mirror_webhooks.len();
    if destinations == 0 {
        println!("  ℹ️ no catch webhooks configured");
    } else {
        println!("  ✅ {destinations} catch webhook destination(s)");
    }
    if notify.challenge_webhook.is_none() {
        println!("  ℹ️ no challenge webhook configured");
    }
}

async fn check_prediction(config: &Config) {
    let client = match HttpPredictionClient::from_config(&config.prediction) {
        Ok(Some(client)) => client,
        Ok(None) => {
            println!("  ❌ prediction service not configured (api_url and api_key required)");
            return;
        }
        Err(e) => {
            println!("  ❌ prediction client could not be built: {e}");
            return;
        }
    };

    match client.service_online().await {
        Ok(true) => println!("  ✅ prediction service online ({})", client.predict_url()),
        Ok(false) => println!("  ❌ prediction service reports offline"),
        Err(e) => println!("  ❌ prediction service unreachable: {e}"),
    }
    match client.quota().await {
        Ok(quota) => match quota.remaining {
            Some(0) => println!("  ❌ prediction quota exhausted"),
            Some(remaining) => println!("  ✅ prediction quota: {} remaining", group_thousands(remaining)),
            None => println!("  ℹ️ prediction quota not reported"),
        },
        Err(e) => println!("  ❌ prediction quota lookup failed: {e}"),
    }
}

fn check_daemon_state(config: &Config) -> Result<()> {
    let state_file = crate::daemon::state_file_path(config);
    if !state_file.exists() {
        println!("  ❌ daemon state file not found: {}", state_file.display());
        println!("  💡 Start daemon with: autocatcher run");
        return Ok(());
    }

    let raw = std::fs::read_to_string(&state_file)
        .with_context(|| format!("Failed to read {}", state_file.display()))?;
    let snapshot: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", state_file.display()))?;

    println!("  State file: {}", state_file.display());

    let written_at = snapshot
        .get("written_at")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("");
    match parse_rfc3339(written_at) {
        Some(ts) => {
            let age = Utc::now().signed_duration_since(ts).num_seconds();
            if age <= DAEMON_STALE_SECONDS {
                println!("  ✅ daemon heartbeat fresh ({age}s ago)");
            } else {
                println!("  ❌ daemon heartbeat stale ({age}s ago)");
            }
        }
        None => println!("  ❌ invalid daemon timestamp: {written_at}"),
    }

    if let Some(components) = snapshot
        .get("components")
        .and_then(serde_json::Value::as_object)
    {
        for (name, component) in components {
            let status_ok = component
                .get("status")
                .and_then(serde_json::Value::as_str)
                .is_some_and(|s| s == "ok");
            let age = component
                .get("last_ok")
                .and_then(serde_json::Value::as_str)
                .and_then(parse_rfc3339)
                .map_or(i64::MAX, |dt| {
                    Utc::now().signed_duration_since(dt).num_seconds()
                });
            if status_ok && age <= COMPONENT_STALE_SECONDS {
                println!("  ✅ {name} healthy (last ok {age}s ago)");
            } else {
                let error = component
                    .get("last_error")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("-");
                println!("  ❌ {name} unhealthy (status_ok={status_ok}, last error: {error})");
            }
        }
    }

    if let Some(overview) = snapshot.get("overview") {
        let field = |key: &str| overview.get(key).and_then(serde_json::Value::as_u64).unwrap_or(0);
        println!(
            "  Sessions: {} running of {} registered, {} spawns, {} catches, balance {}",
            field("active_sessions"),
            field("registered_accounts"),
            field("total_spawns"),
            field("total_catches"),
            group_thousands(field("total_balance")),
        );
    }

    Ok(())
}

fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
