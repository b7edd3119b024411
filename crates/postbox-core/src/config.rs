//! Runtime configuration.
//!
//! Sources, later ones winning: built-in defaults, an optional TOML file, then
//! environment variables (`PG_HOST`, `MAIL_PORT`, `POLL_INTERVAL_SECS`, ...).

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::mail::{DEFAULT_BODY_PREFIX, DEFAULT_FROM, DEFAULT_SUBJECT_PREFIX};
use crate::domain::{MailTemplate, MarkPolicy};
use crate::retry::{
    DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_DELAY, DEFAULT_DELIVERY_ATTEMPTS,
    DEFAULT_DELIVERY_BASE_DELAY, RetryPolicy,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub mail: MailConfig,
    pub schedule: ScheduleConfig,
    pub retry: RetryConfig,
    pub dispatch: DispatchConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            database: "postgres".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    /// `MAIL_USER` / `MAIL_PASS`. Ignored by the transport unless
    /// `authenticate` is set.
    pub username: Option<String>,
    pub password: Option<String>,
    /// Log in to the relay with `username` / `password`. Off by default: the
    /// relay is unauthenticated.
    pub authenticate: bool,
    pub from: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            host: "mailhog".to_string(),
            port: 1025,
            username: None,
            password: None,
            authenticate: false,
            from: DEFAULT_FROM.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub poll_interval_secs: u64,
    pub seed_interval_secs: u64,
    pub batch_size: usize,
    pub seed_enabled: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            seed_interval_secs: 10,
            batch_size: 5,
            seed_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub connect_attempts: u32,
    pub connect_delay_ms: u64,
    pub delivery_attempts: u32,
    pub delivery_base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            connect_delay_ms: DEFAULT_CONNECT_DELAY.as_millis() as u64,
            delivery_attempts: DEFAULT_DELIVERY_ATTEMPTS,
            delivery_base_delay_ms: DEFAULT_DELIVERY_BASE_DELAY.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub mark_policy: MarkPolicy,
    pub subject_prefix: String,
    pub body_prefix: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            mark_policy: MarkPolicy::Always,
            subject_prefix: DEFAULT_SUBJECT_PREFIX.to_string(),
            body_prefix: DEFAULT_BODY_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `trace` .. `error`; unset means TRACE in debug builds, INFO otherwise.
    pub level: Option<String>,

    /// Plain-text log file next to the console output. Empty disables it.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: None,
            file: Some(PathBuf::from("app.log")),
        }
    }
}

impl Config {
    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Override fields from environment-style `lookup`.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };

        env.string("PG_HOST", &mut self.store.host);
        env.parse("PG_PORT", &mut self.store.port)?;
        env.string("PG_USER", &mut self.store.user);
        env.string("PG_PASSWORD", &mut self.store.password);
        env.string("PG_DATABASE", &mut self.store.database);

        env.string("MAIL_HOST", &mut self.mail.host);
        env.parse("MAIL_PORT", &mut self.mail.port)?;
        env.optional("MAIL_USER", &mut self.mail.username);
        env.optional("MAIL_PASS", &mut self.mail.password);
        env.string("MAIL_FROM", &mut self.mail.from);

        env.parse("POLL_INTERVAL_SECS", &mut self.schedule.poll_interval_secs)?;
        env.parse("SEED_INTERVAL_SECS", &mut self.schedule.seed_interval_secs)?;
        env.parse("BATCH_SIZE", &mut self.schedule.batch_size)?;
        env.parse("SEED_ENABLED", &mut self.schedule.seed_enabled)?;

        env.parse("CONNECT_ATTEMPTS", &mut self.retry.connect_attempts)?;
        env.parse("CONNECT_DELAY_MS", &mut self.retry.connect_delay_ms)?;
        env.parse("DELIVERY_ATTEMPTS", &mut self.retry.delivery_attempts)?;
        env.parse("DELIVERY_BASE_DELAY_MS", &mut self.retry.delivery_base_delay_ms)?;

        if let Some(value) = (env.lookup)("MARK_POLICY") {
            self.dispatch.mark_policy = match value.trim() {
                "always" => MarkPolicy::Always,
                "delivered_only" => MarkPolicy::DeliveredOnly,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "MARK_POLICY",
                        value,
                        reason: "expected `always` or `delivered_only`".to_string(),
                    });
                }
            };
        }

        env.optional("LOG_LEVEL", &mut self.log.level);
        if let Some(file) = (env.lookup)("LOG_FILE") {
            self.log.file = (!file.is_empty()).then(|| PathBuf::from(file));
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.schedule.poll_interval_secs)
    }

    /// `None` when seeding is disabled.
    pub fn seed_interval(&self) -> Option<Duration> {
        self.schedule
            .seed_enabled
            .then(|| Duration::from_secs(self.schedule.seed_interval_secs))
    }

    pub fn connect_policy(&self) -> RetryPolicy {
        RetryPolicy::store_connect(
            self.retry.connect_attempts,
            Duration::from_millis(self.retry.connect_delay_ms),
        )
    }

    pub fn delivery_policy(&self) -> RetryPolicy {
        RetryPolicy::delivery(
            self.retry.delivery_attempts,
            Duration::from_millis(self.retry.delivery_base_delay_ms),
        )
    }

    pub fn mail_template(&self) -> MailTemplate {
        MailTemplate {
            from: self.mail.from.clone(),
            subject_prefix: self.dispatch.subject_prefix.clone(),
            body_prefix: self.dispatch.body_prefix.clone(),
        }
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str, target: &mut String) {
        if let Some(value) = (self.lookup)(key) {
            *target = value;
        }
    }

    fn optional(&self, key: &str, target: &mut Option<String>) {
        if let Some(value) = (self.lookup)(key) {
            *target = (!value.is_empty()).then_some(value);
        }
    }

    fn parse<T>(&self, key: &'static str, target: &mut T) -> Result<(), ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        if let Some(value) = (self.lookup)(key) {
            *target = value
                .trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidValue {
                    key,
                    value: value.clone(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }
}
