//! Gateway configuration.
//!
//! Every field has a default, so an empty JSON object is a valid configuration:
//!
//! ```
//! use turnstile::config::GatewayConfig;
//!
//! let cfg = GatewayConfig::from_json_str(r#"{ "chat": { "quota": 20 } }"#).unwrap();
//! assert_eq!(cfg.chat.quota, 20);
//! assert_eq!(cfg.chat.window_secs, 60);
//! assert_eq!(cfg.explain.quota, 5);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::backend::DEFAULT_CREDENTIAL_ENV;
use crate::chat::{
    DegradedReplies, PromptTemplate, DEFAULT_APOLOGY_MESSAGE, DEFAULT_HISTORY_TURNS,
    DEFAULT_SYSTEM_PROMPT, DEFAULT_UNAVAILABLE_MESSAGE,
};
use crate::rate_limit::{LimitsError, WindowLimits};
use crate::timeout::{TimeoutError, TimeoutPolicy};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid {capability} limits: {source}")]
    Limits { capability: &'static str, source: LimitsError },
    #[error("invalid upstream timeout: {0}")]
    Timeout(#[from] TimeoutError),
    #[error("sweep interval must be greater than zero")]
    ZeroSweepInterval,
}

/// Quota per window for one capability.
///
/// Inside a [`GatewayConfig`] either field may be omitted; the missing one is taken from
/// that capability's own default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitConfig {
    pub quota: u32,
    pub window_secs: u64,
}

impl LimitConfig {
    /// 5 requests per 60 seconds.
    pub const EXPLAIN_DEFAULT: Self = Self { quota: 5, window_secs: 60 };
    /// 10 requests per 60 seconds.
    pub const CHAT_DEFAULT: Self = Self { quota: 10, window_secs: 60 };

    pub fn limits(&self) -> Result<WindowLimits, LimitsError> {
        WindowLimits::per_seconds(self.quota, self.window_secs)
    }
}

#[derive(Deserialize)]
struct PartialLimits {
    quota: Option<u32>,
    window_secs: Option<u64>,
}

impl PartialLimits {
    fn or(self, base: LimitConfig) -> LimitConfig {
        LimitConfig {
            quota: self.quota.unwrap_or(base.quota),
            window_secs: self.window_secs.unwrap_or(base.window_secs),
        }
    }
}

fn deserialize_explain<'de, D: Deserializer<'de>>(deserializer: D) -> Result<LimitConfig, D::Error> {
    PartialLimits::deserialize(deserializer).map(|p| p.or(LimitConfig::EXPLAIN_DEFAULT))
}

fn deserialize_chat<'de, D: Deserializer<'de>>(deserializer: D) -> Result<LimitConfig, D::Error> {
    PartialLimits::deserialize(deserializer).map(|p| p.or(LimitConfig::CHAT_DEFAULT))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    #[serde(deserialize_with = "deserialize_explain")]
    pub explain: LimitConfig,
    #[serde(deserialize_with = "deserialize_chat")]
    pub chat: LimitConfig,
    pub chat_history_turns: usize,
    pub system_prompt: String,
    pub unavailable_message: String,
    pub apology_message: String,
    /// Deadline for each backend call; absent means wait indefinitely.
    pub upstream_timeout_ms: Option<u64>,
    /// How often idle client windows are evicted; absent disables eviction.
    pub sweep_interval_secs: Option<u64>,
    /// Environment variable holding the backend credential.
    pub credential_env: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            explain: LimitConfig::EXPLAIN_DEFAULT,
            chat: LimitConfig::CHAT_DEFAULT,
            chat_history_turns: DEFAULT_HISTORY_TURNS,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            unavailable_message: DEFAULT_UNAVAILABLE_MESSAGE.to_string(),
            apology_message: DEFAULT_APOLOGY_MESSAGE.to_string(),
            upstream_timeout_ms: None,
            sweep_interval_secs: None,
            credential_env: DEFAULT_CREDENTIAL_ENV.to_string(),
        }
    }
}

impl GatewayConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.explain_limits()?;
        self.chat_limits()?;
        self.upstream_timeout()?;
        self.sweep_interval()?;
        Ok(())
    }

    pub fn explain_limits(&self) -> Result<WindowLimits, ConfigError> {
        self.explain.limits().map_err(|source| ConfigError::Limits { capability: "explain", source })
    }

    pub fn chat_limits(&self) -> Result<WindowLimits, ConfigError> {
        self.chat.limits().map_err(|source| ConfigError::Limits { capability: "chat", source })
    }

    pub fn upstream_timeout(&self) -> Result<Option<TimeoutPolicy>, ConfigError> {
        self.upstream_timeout_ms
            .map(|ms| TimeoutPolicy::new(Duration::from_millis(ms)))
            .transpose()
            .map_err(ConfigError::from)
    }

    pub fn sweep_interval(&self) -> Result<Option<Duration>, ConfigError> {
        match self.sweep_interval_secs {
            Some(0) => Err(ConfigError::ZeroSweepInterval),
            Some(secs) => Ok(Some(Duration::from_secs(secs))),
            None => Ok(None),
        }
    }

    pub fn prompt_template(&self) -> PromptTemplate {
        PromptTemplate::new(self.system_prompt.clone(), self.chat_history_turns)
    }

    pub fn degraded_replies(&self) -> DegradedReplies {
        DegradedReplies {
            unavailable: self.unavailable_message.clone(),
            apology: self.apology_message.clone(),
        }
    }
}
