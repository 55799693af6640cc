//! Server configuration from environment variables

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use newsfeed_core::{parse_zone, CoreError, DEFAULT_REFERENCE_ZONE};
use newsfeed_feeds::{get_curated_feeds, load_feeds_file, FeedError, FeedSource, DEFAULT_SPAM_TOKENS};
use newsfeed_services::{
    ChangeNotifierConfig, FeedPollerConfig, RetryPolicy, SummarizationConfig,
};

const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Which store implementation backs the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StoreBackend::Sqlite),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(ConfigError::InvalidValue {
                field: "STORE_BACKEND",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store_backend: StoreBackend,
    pub database_path: PathBuf,
    pub feeds_file: Option<PathBuf>,
    pub poll_interval: Duration,
    pub poll_initial_delay: Duration,
    pub summarize_tick: Duration,
    pub summarize_initial_delay: Duration,
    pub summary_min_content_len: usize,
    /// Extra attempts after a failed summary, 0 disables retries
    pub summary_retry_attempts: u32,
    pub change_retry_delay: Duration,
    pub fallback_poll_delay: Duration,
    pub spam_tokens: Vec<String>,
    pub reference_zone: Tz,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_api_base: Option<String>,
    pub server_port: u16,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },

    #[error(transparent)]
    Zone(#[from] CoreError),

    #[error("Failed to load feeds: {0}")]
    Feeds(#[from] FeedError),
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let store_backend = match var("STORE_BACKEND") {
            Some(value) => value.parse()?,
            None => StoreBackend::Sqlite,
        };

        let spam_tokens = match var("SPAM_TOKENS") {
            Some(value) => value
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            None => DEFAULT_SPAM_TOKENS.iter().map(|t| t.to_string()).collect(),
        };

        let reference_zone = match var("REFERENCE_TZ") {
            Some(value) => parse_zone(&value)?,
            None => DEFAULT_REFERENCE_ZONE,
        };

        Ok(Self {
            store_backend,
            database_path: var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/newsfeed.db")),
            feeds_file: var("FEEDS_FILE").map(PathBuf::from),
            poll_interval: Duration::from_secs(positive(&var, "POLL_INTERVAL_SECS", 900)?),
            poll_initial_delay: Duration::from_secs(number(&var, "POLL_INITIAL_DELAY_SECS", 60)?),
            summarize_tick: Duration::from_secs(positive(&var, "SUMMARIZE_TICK_SECS", 15)?),
            summarize_initial_delay: Duration::from_secs(number(
                &var,
                "SUMMARIZE_INITIAL_DELAY_SECS",
                30,
            )?),
            summary_min_content_len: number(&var, "SUMMARY_MIN_CONTENT_LEN", 1000)?,
            summary_retry_attempts: number(&var, "SUMMARY_RETRY_ATTEMPTS", 0)?,
            change_retry_delay: Duration::from_millis(number(&var, "CHANGE_RETRY_DELAY_MS", 3000)?),
            fallback_poll_delay: Duration::from_millis(positive(
                &var,
                "FALLBACK_POLL_DELAY_MS",
                5000,
            )?),
            spam_tokens,
            reference_zone,
            openai_api_key: var("OPENAI_API_KEY"),
            openai_model: var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            openai_api_base: var("OPENAI_API_BASE"),
            server_port: number(&var, "SERVER_PORT", 3001)?,
        })
    }

    /// Feeds from `FEEDS_FILE`, or the curated list
    pub fn feeds(&self) -> Result<Vec<FeedSource>, ConfigError> {
        match &self.feeds_file {
            Some(path) => Ok(load_feeds_file(path)?),
            None => Ok(get_curated_feeds()),
        }
    }

    pub fn poller_config(&self) -> FeedPollerConfig {
        FeedPollerConfig {
            poll_interval: self.poll_interval,
            initial_delay: self.poll_initial_delay,
            summary_min_content_len: self.summary_min_content_len,
        }
    }

    pub fn notifier_config(&self) -> ChangeNotifierConfig {
        ChangeNotifierConfig {
            retry_delay: self.change_retry_delay,
            fallback_poll_delay: self.fallback_poll_delay,
            ..Default::default()
        }
    }

    pub fn summarization_config(&self) -> SummarizationConfig {
        let retry = match self.summary_retry_attempts {
            0 => RetryPolicy::Never,
            n => RetryPolicy::Requeue {
                max_attempts: n.saturating_add(1),
            },
        };
        SummarizationConfig {
            tick_interval: self.summarize_tick,
            initial_delay: self.summarize_initial_delay,
            min_content_len: self.summary_min_content_len,
            retry,
            ..Default::default()
        }
    }
}

fn number<T, F>(var: &F, field: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(field) {
        Some(value) => {
            let parsed = value.trim().parse();
            parsed.map_err(|_| ConfigError::InvalidValue { field, value })
        }
        None => Ok(default),
    }
}

/// Like `number`, for periods that drive an interval and must not be zero
fn positive<F>(var: &F, field: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match number(var, field, default)? {
        0 => Err(ConfigError::InvalidValue {
            field,
            value: "0".to_string(),
        }),
        value => Ok(value),
    }
}
