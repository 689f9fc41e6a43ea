use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed at load time, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub catching: CatchingConfig,

    #[serde(default)]
    pub prediction: PredictionConfig,

    #[serde(default)]
    pub solver: SolverConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,

    #[serde(default)]
    pub rarity: RarityConfig,

    #[serde(default)]
    pub onboarding: OnboardingConfig,

    #[serde(default)]
    pub reliability: ReliabilityConfig,

    /// Accounts driven by this process. Credentials are opaque bootstrap inputs.
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

// ── Catching ──────────────────────────────────────────────────────

/// Timing and protocol knobs for the per-account catch loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatchingConfig {
    /// User id of the game bot whose messages drive the state machine.
    #[serde(default = "default_game_bot_id")]
    pub game_bot_id: String,
    /// Lower bound of the humanizing delay before a catch command.
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    /// Upper bound (inclusive) of the humanizing delay before a catch command.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// When false the lower bound is always used.
    #[serde(default = "default_true")]
    pub randomize: bool,
    /// Multiplier applied to the delay for rarity-tagged creatures.
    #[serde(default = "default_rare_delay_factor")]
    pub rare_delay_factor: f64,
    /// A balance probe becomes due on success counts 1, 1+N, 1+2N, ...
    #[serde(default = "default_balance_check_interval")]
    pub balance_check_interval: u64,
    #[serde(default = "default_balance_timeout_secs")]
    pub balance_timeout_secs: u64,
    /// Probe the balance on the first spawn after a session starts.
    #[serde(default = "default_true")]
    pub probe_balance_on_start: bool,
    #[serde(default = "default_click_delay_min_ms")]
    pub click_delay_min_ms: u64,
    #[serde(default = "default_click_delay_max_ms")]
    pub click_delay_max_ms: u64,
    /// Grace period between sending a bypass payload and resuming.
    #[serde(default = "default_challenge_resume_grace_ms")]
    pub challenge_resume_grace_ms: u64,
    /// Catch command template; `{bot}` and `{name}` are substituted.
    #[serde(default = "default_catch_command")]
    pub catch_command: String,
    /// Balance probe template; `{bot}` is substituted.
    #[serde(default = "default_balance_command")]
    pub balance_command: String,
}

fn default_game_bot_id() -> String {
    "716390085896962058".into()
}

fn default_min_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    2000
}

fn default_true() -> bool {
    true
}

fn default_rare_delay_factor() -> f64 {
    0.7
}

fn default_balance_check_interval() -> u64 {
    30
}

fn default_balance_timeout_secs() -> u64 {
    10
}

fn default_click_delay_min_ms() -> u64 {
    2000
}

fn default_click_delay_max_ms() -> u64 {
    3000
}

fn default_challenge_resume_grace_ms() -> u64 {
    2500
}

fn default_catch_command() -> String {
    "<@{bot}> c {name}".into()
}

fn default_balance_command() -> String {
    "<@{bot}> bal".into()
}

impl Default for CatchingConfig {
    fn default() -> Self {
        Self {
            game_bot_id: default_game_bot_id(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            randomize: true,
            rare_delay_factor: default_rare_delay_factor(),
            balance_check_interval: default_balance_check_interval(),
            balance_timeout_secs: default_balance_timeout_secs(),
            probe_balance_on_start: true,
            click_delay_min_ms: default_click_delay_min_ms(),
            click_delay_max_ms: default_click_delay_max_ms(),
            challenge_resume_grace_ms: default_challenge_resume_grace_ms(),
            catch_command: default_catch_command(),
            balance_command: default_balance_command(),
        }
    }
}

impl CatchingConfig {
    pub fn render_catch_command(&self, name: &str) -> String {
        self.catch_command
            .replace("{bot}", &self.game_bot_id)
            .replace("{name}", name)
    }

    pub fn render_balance_command(&self) -> String {
        self.balance_command.replace("{bot}", &self.game_bot_id)
    }
}

// ── Prediction ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionConfig {
    /// Base URL or full `/predict` endpoint of the image classifier.
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_prediction_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_image_timeout_secs")]
    pub image_timeout_secs: u64,
}

fn default_prediction_timeout_secs() -> u64 {
    10
}

fn default_image_timeout_secs() -> u64 {
    15
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            timeout_secs: default_prediction_timeout_secs(),
            image_timeout_secs: default_image_timeout_secs(),
        }
    }
}

// ── Challenge solver ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_solver_timeout_secs")]
    pub timeout_secs: u64,
    /// Sent into the channel when the solver reports success without a payload.
    #[serde(default = "default_bypass_payload")]
    pub bypass_payload: String,
}

fn default_solver_timeout_secs() -> u64 {
    35
}

fn default_bypass_payload() -> String {
    "CAPTCHA_BYPASSED".into()
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            timeout_secs: default_solver_timeout_secs(),
            bypass_payload: default_bypass_payload(),
        }
    }
}

// ── Notifications ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Primary catch log; eligible for mentions.
    #[serde(default)]
    pub catch_webhook: Option<String>,
    /// Extra catch destinations, never mentioned.
    #[serde(default)]
    pub mirror_webhooks: Vec<String>,
    #[serde(default)]
    pub challenge_webhook: Option<String>,
    /// Global pause between deliveries, across every destination.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Wait after an HTTP 429 before retrying the same job.
    #[serde(default = "default_rate_limit_backoff_ms")]
    pub rate_limit_backoff_ms: u64,
    #[serde(default = "default_notification_timeout_secs")]
    pub timeout_secs: u64,
    /// Classifications that may carry the mention prefix.
    #[serde(default = "default_alert_classes")]
    pub alert_classes: Vec<String>,
    #[serde(default = "default_mention_text")]
    pub mention_text: String,
    #[serde(default = "default_webhook_username")]
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default = "default_webhook_username")]
    pub footer_text: String,
    #[serde(default)]
    pub thumbnail_base_url: Option<String>,
}

fn default_cooldown_ms() -> u64 {
    2200
}

fn default_rate_limit_backoff_ms() -> u64 {
    5000
}

fn default_notification_timeout_secs() -> u64 {
    10
}

fn default_alert_classes() -> Vec<String> {
    ["shiny", "rare", "high_iv", "challenge"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_mention_text() -> String {
    "@here POKEMON ALERT!".into()
}

fn default_webhook_username() -> String {
    "Autocatcher".into()
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            catch_webhook: None,
            mirror_webhooks: Vec::new(),
            challenge_webhook: None,
            cooldown_ms: default_cooldown_ms(),
            rate_limit_backoff_ms: default_rate_limit_backoff_ms(),
            timeout_secs: default_notification_timeout_secs(),
            alert_classes: default_alert_classes(),
            mention_text: default_mention_text(),
            username: default_webhook_username(),
            avatar_url: None,
            footer_text: default_webhook_username(),
            thumbnail_base_url: None,
        }
    }
}

// ── Rarity ────────────────────────────────────────────────────────

/// Static name lists; lookups are case-insensitive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RarityConfig {
    #[serde(default)]
    pub mythical: Vec<String>,
    #[serde(default)]
    pub legendary: Vec<String>,
    #[serde(default)]
    pub ultra_beast: Vec<String>,
    #[serde(default)]
    pub regional: Vec<String>,
}

// ── Onboarding ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
    /// Start command template; `{bot}` is substituted.
    #[serde(default = "default_start_command")]
    pub start_command: String,
    /// Pick command template; `{bot}` and `{choice}` are substituted.
    #[serde(default = "default_pick_command")]
    pub pick_command: String,
    #[serde(default = "default_onboarding_choices")]
    pub choices: Vec<String>,
}

fn default_step_delay_ms() -> u64 {
    4000
}

fn default_start_command() -> String {
    "<@{bot}> start".into()
}

fn default_pick_command() -> String {
    "<@{bot}> pick {choice}".into()
}

fn default_onboarding_choices() -> Vec<String> {
    [
        "bulbasaur",
        "charmander",
        "squirtle",
        "chikorita",
        "cyndaquil",
        "totodile",
        "treecko",
        "torchic",
        "mudkip",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            step_delay_ms: default_step_delay_ms(),
            start_command: default_start_command(),
            pick_command: default_pick_command(),
            choices: default_onboarding_choices(),
        }
    }
}

// ── Reliability ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    /// Initial backoff for supervised daemon components.
    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,
    /// Max backoff for supervised daemon components.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
}

fn default_initial_backoff_secs() -> u64 {
    2
}

fn default_max_backoff_secs() -> u64 {
    60
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            initial_backoff_secs: default_initial_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
        }
    }
}

// ── Accounts ──────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Stable handle used by the control surface and the bridge.
    pub id: String,
    pub user_id: String,
    pub username: String,
    /// Name the game bot prints in balance titles; defaults to `username`.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Opaque credential forwarded to the challenge solver.
    #[serde(default)]
    pub credential: Option<String>,
    #[serde(default)]
    pub auto_click: bool,
    #[serde(default = "default_true")]
    pub autostart: bool,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("display_name", &self.display_name)
            .field("credential", &self.credential.as_ref().map(|_| "***"))
            .field("auto_click", &self.auto_click)
            .field("autostart", &self.autostart)
            .finish()
    }
}

// ── Loading ───────────────────────────────────────────────────────

impl Config {
    /// Load `~/.autocatcher/config.toml`, writing defaults on first run.
    pub fn load_or_init() -> Result<Self> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        let base_dir = home.join(".autocatcher");
        let config_path = base_dir.join("config.toml");

        if !base_dir.exists() {
            fs::create_dir_all(&base_dir).context("Failed to create .autocatcher directory")?;
        }

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let mut config = Config {
                config_path: config_path.clone(),
                ..Config::default()
            };
            config.save()?;
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Load an explicit config file; fails if it is missing or malformed.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.config_path = path.to_path_buf();
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        fs::write(&self.config_path, toml_str).context("Failed to write config file")?;
        Ok(())
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = non_empty_env("PREDICTION_API_URL") {
            self.prediction.api_url = Some(url);
        }
        if let Some(key) = non_empty_env("PREDICTION_API_KEY") {
            self.prediction.api_key = Some(key);
        }
        if let Some(url) = non_empty_env("CATCH_WEBHOOK_URL") {
            self.notifications.catch_webhook = Some(url);
        }
        if let Some(url) = non_empty_env("CAPTCHA_LOGGING_WEBHOOK") {
            self.notifications.challenge_webhook = Some(url);
        }
        if let Some(url) = non_empty_env("CAPTCHA_API_URL") {
            self.solver.api_url = Some(url);
        }
        if let Some(key) = non_empty_env("CAPTCHA_API_KEY") {
            self.solver.api_key = Some(key);
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}
