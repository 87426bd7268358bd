use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Error, Result};

/// Lower bound for a feed's `check_interval`, in seconds.
pub const MIN_CHECK_INTERVAL: u64 = 60;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Default bot token, used by every feed without its own override
    pub telegram_token: String,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Minimum spacing between two sends, in seconds
    #[serde(default = "default_publication_delay")]
    pub publication_delay: f64,
    /// Feed fetch timeout in seconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout: u64,
    /// Telegram send timeout in seconds
    #[serde(default = "default_send_timeout")]
    pub send_timeout: u64,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/feedbot.db")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_publication_delay() -> f64 {
    3.0
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_send_timeout() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
    pub target_chat_id: ChatId,
    #[serde(default)]
    pub telegram_token: Option<String>,
    /// Poll interval in seconds
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
    #[serde(default = "default_message_template")]
    pub message_template: String,
    /// Instant View template hash
    #[serde(default)]
    pub rhash: Option<String>,
}

fn default_check_interval() -> u64 {
    600
}

fn default_message_template() -> String {
    "📢 **{title}**\n\n{link}".to_string()
}

/// Telegram chat target: a numeric chat id or an `@username`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatId {
    Id(i64),
    Username(String),
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatId::Id(id) => write!(f, "{}", id),
            ChatId::Username(name) => f.write_str(name),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse and validate config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.telegram_token.trim().is_empty() {
            return Err(Error::Config("telegram_token must not be empty".into()));
        }
        if Duration::try_from_secs_f64(self.publication_delay).is_err() {
            return Err(Error::Config(
                "publication_delay must be a non-negative number of seconds".into(),
            ));
        }
        if self.fetch_timeout == 0 {
            return Err(Error::Config("fetch_timeout must be at least 1 second".into()));
        }
        if self.send_timeout == 0 {
            return Err(Error::Config("send_timeout must be at least 1 second".into()));
        }
        for feed in &self.feeds {
            feed.validate()?;
        }
        Ok(())
    }

    pub fn publication_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.publication_delay).unwrap_or_default()
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout)
    }
}

impl FeedConfig {
    fn validate(&self) -> Result<()> {
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(Error::Config(format!(
                "feed '{}': url must start with http:// or https://",
                self.name
            )));
        }
        if self.check_interval < MIN_CHECK_INTERVAL {
            return Err(Error::Config(format!(
                "feed '{}': check_interval must be at least {} seconds",
                self.name, MIN_CHECK_INTERVAL
            )));
        }
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    /// The feed's own token if set, otherwise `default`.
    pub fn token<'a>(&'a self, default: &'a str) -> &'a str {
        self.telegram_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .unwrap_or(default)
    }
}
