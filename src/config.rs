//! Configuration loader and validator for the broadcaster.
//!
//! Values come from an optional YAML file, then `DATABASE_URL`, `BOT_TOKEN`
//! and `TIMEZONE` from the environment override it. The result is static for
//! the process lifetime.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub app: App,
    pub telegram: Telegram,
    pub rate_limit: RateLimit,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct App {
    pub database_url: String,
    pub timezone: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/app.db".into(),
            timezone: "UTC".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Telegram {
    pub bot_token: String,
}

/// Minimum spacing between sends. Loaded and validated, but not enforced by
/// the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimit {
    pub global_interval_seconds: f64,
    pub chat_interval_seconds: f64,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            global_interval_seconds: 5.0,
            chat_interval_seconds: 10.0,
        }
    }
}

impl Config {
    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty("DATABASE_URL") {
            self.app.database_url = url;
        }
        if let Some(token) = non_empty("BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(tz) = non_empty("TIMEZONE") {
            self.app.timezone = tz;
        }
    }
}

/// Load configuration and validate it.
/// - With `Some(path)` the YAML file must exist; with `None` defaults are used.
/// - Environment overrides are applied on top in both cases.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut cfg = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            serde_yaml::from_str(&content)?
        }
        None => Config::default(),
    };
    cfg.apply_overrides(|key| std::env::var(key).ok());
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.database_url.trim().is_empty() {
        return Err(ConfigError::Invalid("app.database_url must be non-empty"));
    }
    if cfg.app.timezone.trim().is_empty() {
        return Err(ConfigError::Invalid("app.timezone must be non-empty"));
    }
    if cfg.telegram.bot_token.trim().is_empty() {
        return Err(ConfigError::Invalid("telegram.bot_token must be non-empty"));
    }
    if !non_negative(cfg.rate_limit.global_interval_seconds) {
        return Err(ConfigError::Invalid(
            "rate_limit.global_interval_seconds must be >= 0",
        ));
    }
    if !non_negative(cfg.rate_limit.chat_interval_seconds) {
        return Err(ConfigError::Invalid(
            "rate_limit.chat_interval_seconds must be >= 0",
        ));
    }
    Ok(())
}

fn non_negative(secs: f64) -> bool {
    secs.is_finite() && secs >= 0.0
}

/// Caches the loaded configuration. `reload` is the only way to pick up a
/// changed file or environment, and exists for test isolation.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    path: Option<PathBuf>,
    cached: Option<Config>,
}

impl ConfigLoader {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path, cached: None }
    }

    pub fn get(&mut self) -> Result<&Config, ConfigError> {
        let cfg = match self.cached.take() {
            Some(cfg) => cfg,
            None => load(self.path.as_deref())?,
        };
        Ok(&*self.cached.insert(cfg))
    }

    pub fn reload(&mut self) -> Result<&Config, ConfigError> {
        self.cached = None;
        self.get()
    }
}

/// Returns an example YAML configuration.
pub fn example() -> &'static str {
    r#"app:
  database_url: "sqlite://data/app.db"
  timezone: "UTC"

telegram:
  bot_token: "YOUR_TELEGRAM_BOT_TOKEN"

rate_limit:
  global_interval_seconds: 5.0
  chat_interval_seconds: 10.0
"#
}
