//! Run configuration
//!
//! Defaults match a short interactive task; every field can be overridden
//! from the environment (see `AgentConfig::from_env`) or per request.

use crate::error::AgentError;
use crate::models::UserPreferences;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

/// Limits and policy switches for a single run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    /// Hard cap on loop turns
    pub max_iterations: u32,
    #[serde(with = "duration_secs")]
    pub llm_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub tool_timeout: Duration,
    /// Route uncertain tool proposals through `request_verification`
    pub enable_verification: bool,
    /// Attach fallback actions to low-confidence or error-flagged decisions
    pub enable_fallbacks: bool,
    #[serde(default)]
    pub preferences: UserPreferences,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            llm_timeout: Duration::from_secs(DEFAULT_LLM_TIMEOUT_SECS),
            tool_timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
            enable_verification: true,
            enable_fallbacks: true,
            preferences: UserPreferences::default(),
        }
    }
}

impl AgentConfig {
    /// Build a config from `AGENT_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            max_iterations: env_parse("AGENT_MAX_ITERATIONS")?.unwrap_or(defaults.max_iterations),
            llm_timeout: env_parse("AGENT_LLM_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.llm_timeout),
            tool_timeout: env_parse("AGENT_TOOL_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.tool_timeout),
            enable_verification: env_flag("AGENT_ENABLE_VERIFICATION")?
                .unwrap_or(defaults.enable_verification),
            enable_fallbacks: env_flag("AGENT_ENABLE_FALLBACKS")?
                .unwrap_or(defaults.enable_fallbacks),
            preferences: UserPreferences::new(
                &env::var("AGENT_FAVORITE_COLOR").unwrap_or_default(),
                &env::var("AGENT_PREFERRED_LANGUAGE").unwrap_or_default(),
            ),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(AgentError::Config(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if self.llm_timeout.is_zero() || self.tool_timeout.is_zero() {
            return Err(AgentError::Config("timeouts must be non-zero".to_string()));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| AgentError::Config(format!("{} has invalid value '{}'", key, raw))),
        _ => Ok(None),
    }
}

fn env_flag(key: &str) -> Result<Option<bool>> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => parse_flag(&raw)
            .map(Some)
            .ok_or_else(|| AgentError::Config(format!("{} has invalid value '{}'", key, raw))),
        _ => Ok(None),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
