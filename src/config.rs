//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! tuning constants for the Telegram and LLM collaborators.

use crate::commenter::rate_limiter::DAY_WINDOW;
use crate::commenter::{DispatchConfig, RateLimitConfig};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default OpenAI-compatible API base
pub const DEFAULT_OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1";
/// Default text model
pub const DEFAULT_MODEL_NAME: &str = "openai/gpt-4o-mini";

/// Default HTTP timeout for LLM requests (seconds)
pub const LLM_HTTP_TIMEOUT_SECS: u64 = 30;
/// Maximum tokens requested per generated comment
pub const COMMENT_MAX_TOKENS: u32 = 300;
/// Sampling temperature for generated comments
pub const COMMENT_TEMPERATURE: f32 = 0.8;

// Telegram API retry policy
/// Initial backoff for retried Telegram calls (ms)
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Maximum backoff for retried Telegram calls (ms)
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;
/// Retries after the first failed Telegram call
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;

// Discussion root lookup
/// First wait for the automatic forward of a channel post (ms)
pub const DISCUSSION_ROOT_INITIAL_WAIT_MS: u64 = 500;
/// Longest single wait for the automatic forward (ms)
pub const DISCUSSION_ROOT_MAX_WAIT_MS: u64 = 4000;
/// Lookups attempted after the first miss
pub const DISCUSSION_ROOT_MAX_RETRIES: usize = 6;
/// Lifetime of a cached channel post -> discussion root mapping (seconds)
///
/// Outlives the daily rate window plus a margin, so a post held back by the
/// daily ceiling still finds its root once admitted.
pub const DISCUSSION_ROOT_CACHE_TTL_SECS: u64 = DAY_WINDOW.as_secs() + 6 * 60 * 60;
/// Maximum cached discussion root mappings
pub const DISCUSSION_ROOT_CACHE_MAX_SIZE: u64 = 10_000;

// Update polling
/// Long-polling timeout passed to `getUpdates` (seconds)
pub const POLL_TIMEOUT_SECS: u32 = 30;
/// Pause after a failed `getUpdates` call (seconds)
pub const POLL_ERROR_BACKOFF_SECS: u64 = 5;
/// Capacity of the listener -> dispatcher queue
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_token: String,

    /// Channels to monitor: `@handles` or numeric ids separated by commas,
    /// semicolons or whitespace
    #[serde(rename = "target_channel", default)]
    pub target_channels_str: String,

    /// `OpenRouter` API key
    pub openrouter_api_key: Option<String>,
    /// OpenAI-compatible API base URL
    #[serde(default = "default_openrouter_api_url")]
    pub openrouter_api_url: String,
    /// Text model
    #[serde(default = "default_model_name")]
    pub model_name: String,
    /// Model used when images are attached; text-only when unset
    pub vision_model_name: Option<String>,
    /// Commenter persona used as system prompt
    pub system_message: Option<String>,

    /// Comments allowed in any trailing hour
    #[serde(default = "default_max_per_hour")]
    pub max_comments_per_hour: usize,
    /// Comments allowed in any trailing day
    #[serde(default = "default_max_per_day")]
    pub max_comments_per_day: usize,
    /// Bot replies allowed per thread, the first comment included
    #[serde(default = "default_max_replies")]
    pub max_replies_per_thread: u32,
    /// Delay before every comment (seconds)
    #[serde(default = "default_comment_delay")]
    pub comment_delay_secs: u64,
    /// Wait between admission attempts while rate limited (seconds)
    #[serde(default = "default_cooldown")]
    pub rate_limit_cooldown_secs: u64,
    /// Idle time after which a thread is forgotten; unset keeps threads forever
    pub thread_ttl_secs: Option<u64>,
}

fn default_openrouter_api_url() -> String {
    DEFAULT_OPENROUTER_API_URL.to_string()
}

fn default_model_name() -> String {
    DEFAULT_MODEL_NAME.to_string()
}

const fn default_max_per_hour() -> usize {
    8
}

const fn default_max_per_day() -> usize {
    50
}

const fn default_max_replies() -> u32 {
    3
}

const fn default_comment_delay() -> u64 {
    15
}

const fn default_cooldown() -> u64 {
    60
}

/// Layered configuration source shared by every settings loader.
///
/// Order: `config/default`, `config/{RUN_MODE}`, `config/local`, `APP__*`
/// variables, then plain environment variables (empty values ignored).
///
/// # Errors
///
/// Returns a `ConfigError` if a present source cannot be read.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        // UPPER_SNAKE_CASE is mapped to snake_case keys
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl Settings {
    /// Load and validate settings from files and environment.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use channel_commenter::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a limit is invalid.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_config(build_config()?)
    }

    /// Deserialize and validate settings from an already built `Config`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if a key is missing or malformed or a limit is
    /// invalid.
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let settings: Self = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_comments_per_hour == 0 {
            return Err(ConfigError::Message(
                "max_comments_per_hour must be at least 1".to_string(),
            ));
        }
        if self.max_comments_per_day == 0 {
            return Err(ConfigError::Message(
                "max_comments_per_day must be at least 1".to_string(),
            ));
        }
        if self.max_replies_per_thread == 0 {
            return Err(ConfigError::Message(
                "max_replies_per_thread must be at least 1".to_string(),
            ));
        }
        if self.thread_ttl_secs == Some(0) {
            return Err(ConfigError::Message(
                "thread_ttl_secs must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Configured channel handles, in order, without duplicates
    #[must_use]
    pub fn target_channels(&self) -> Vec<String> {
        let mut handles: Vec<String> = Vec::new();
        for token in self
            .target_channels_str
            .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .filter(|token| !token.is_empty())
        {
            if !handles.iter().any(|h| h == token) {
                handles.push(token.to_string());
            }
        }
        handles
    }

    /// Rate limiter parameters
    #[must_use]
    pub const fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_per_hour: self.max_comments_per_hour,
            max_per_day: self.max_comments_per_day,
            initial_delay: Duration::from_secs(self.comment_delay_secs),
            cooldown: Duration::from_secs(self.rate_limit_cooldown_secs),
        }
    }

    /// Dispatcher parameters
    #[must_use]
    pub const fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            max_replies_per_thread: self.max_replies_per_thread,
        }
    }

    /// Idle lifetime of a tracked thread
    #[must_use]
    pub fn thread_ttl(&self) -> Option<Duration> {
        self.thread_ttl_secs.map(Duration::from_secs)
    }
}

/// Get LLM HTTP timeout from env or default.
///
/// Environment variable: `LLM_HTTP_TIMEOUT_SECS`.
#[must_use]
pub fn get_llm_http_timeout_secs() -> u64 {
    std::env::var("LLM_HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(LLM_HTTP_TIMEOUT_SECS)
}
