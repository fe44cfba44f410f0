//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API tokens, chat id) are referenced by env-var name in the
//! config and resolved at runtime via `std::env::var`. Every field has a
//! default so a partial file (or an empty one) is valid.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::types::BotError;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub forum: ForumConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub bumps: BumpsConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BotConfig {
    pub name: String,
    /// Directory holding `settings.json`, `watermark.json`, `bumps.json`.
    pub data_dir: PathBuf,
    /// Offset applied to timestamps in rendered messages.
    pub display_utc_offset_hours: i32,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "lztbot".into(),
            data_dir: PathBuf::from("data"),
            display_utc_offset_hours: 3,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ForumConfig {
    pub api_base: String,
    pub site_base: String,
    pub token_env: String,
    pub timeout_secs: u64,
    /// Minimum spacing between any two outbound API calls.
    pub min_call_spacing_ms: u64,
}

impl Default for ForumConfig {
    fn default() -> Self {
        Self {
            api_base: "https://prod-api.lolz.live".into(),
            site_base: "https://lolz.live".into(),
            token_env: "LZT_FORUM_TOKEN".into(),
            timeout_secs: 25,
            min_call_spacing_ms: 250,
        }
    }
}

impl ForumConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn min_call_spacing(&self) -> Duration {
        Duration::from_millis(self.min_call_spacing_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub startup_delay_secs: u64,
    pub fetch_limit: u32,
    /// Fetch `/notifications/{id}/content` for richer extraction.
    pub fetch_content: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 20,
            startup_delay_secs: 2,
            fetch_limit: 10,
            fetch_content: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BumpsConfig {
    pub enabled: bool,
    pub tick_secs: u64,
    pub startup_delay_secs: u64,
    /// Inclusive `[min, max]` seconds added after a successful bump.
    pub jitter_secs: [u64; 2],
    pub rate_limit_cap_secs: u64,
    pub retry_secs: u64,
    pub min_interval_minutes: u32,
    pub default_interval_minutes: u32,
}

impl Default for BumpsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_secs: 30,
            startup_delay_secs: 2,
            jitter_secs: [7, 25],
            rate_limit_cap_secs: 300,
            retry_secs: 60,
            min_interval_minutes: 5,
            default_interval_minutes: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token_env: String,
    pub chat_id_env: String,
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token_env: "TG_BOT_TOKEN".into(),
            chat_id_env: "ADMIN_USER_ID".into(),
            api_base: "https://api.telegram.org".into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    /// Listen address. Loopback unless deliberately exposed.
    pub bind: String,
    pub port: u16,
    /// Env var holding the bearer token required on `/api/*`.
    pub token_env: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1".into(),
            port: 8088,
            token_env: "LZTBOT_DASHBOARD_TOKEN".into(),
        }
    }
}

/// Upper bound for any backoff or jitter delay.
pub const MAX_DELAY_SECS: u64 = 86_400;

/// Characters accepted in API tokens. Anything else cannot be sent in an
/// HTTP header.
const TOKEN_SAFE_CHARS: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_.";

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), BotError> {
        let [lo, hi] = self.bumps.jitter_secs;
        if lo > hi {
            return Err(BotError::Config(format!(
                "bumps.jitter_secs must be [min, max], got [{lo}, {hi}]"
            )));
        }
        for (name, value) in [
            ("bumps.jitter_secs", hi),
            ("bumps.rate_limit_cap_secs", self.bumps.rate_limit_cap_secs),
            ("bumps.retry_secs", self.bumps.retry_secs),
        ] {
            if value > MAX_DELAY_SECS {
                return Err(BotError::Config(format!(
                    "{name} must be at most {MAX_DELAY_SECS}, got {value}"
                )));
            }
        }
        if self.bumps.min_interval_minutes == 0 {
            return Err(BotError::Config("bumps.min_interval_minutes must be > 0".into()));
        }
        if self.poller.fetch_limit == 0 {
            return Err(BotError::Config("poller.fetch_limit must be > 0".into()));
        }
        if self.dashboard.bind.parse::<IpAddr>().is_err() {
            return Err(BotError::Config(format!(
                "dashboard.bind is not an IP address: {}",
                self.dashboard.bind
            )));
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Resolve an API token and reject characters that would break the
    /// `Authorization` header.
    pub fn resolve_token(env_name: &str) -> Result<SecretString> {
        let token = Self::resolve_env(env_name)?;
        check_token(env_name, &token)?;
        Ok(SecretString::new(token))
    }

    pub fn resolve_chat_id(&self) -> Result<i64> {
        let raw = Self::resolve_env(&self.telegram.chat_id_env)?;
        raw.trim().parse().map_err(|_| {
            BotError::Config(format!("{} is not a numeric chat id", self.telegram.chat_id_env))
                .into()
        })
    }
}

fn check_token(name: &str, token: &str) -> Result<(), BotError> {
    if token.is_empty() {
        return Err(BotError::Config(format!("{name} is empty")));
    }
    let mut bad: Vec<char> = token.chars().filter(|c| !TOKEN_SAFE_CHARS.contains(*c)).collect();
    if bad.is_empty() {
        return Ok(());
    }
    bad.sort_unstable();
    bad.dedup();
    Err(BotError::Config(format!(
        "{name} contains invalid characters ({}), check the token",
        bad.into_iter().collect::<String>()
    )))
}
