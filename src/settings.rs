use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TEMPERATURE: f32 = 0.4;
pub const DEFAULT_HISTORY_LIMIT: usize = 20;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    /// Most recent entries of the conversation kept when building a request.
    pub history_limit: usize,
    pub timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: None,
            model: DEFAULT_MODEL.into(),
            temperature: DEFAULT_TEMPERATURE,
            history_limit: DEFAULT_HISTORY_LIMIT,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsOverrides {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub history_limit: Option<usize>,
    pub timeout_secs: Option<u64>,
}

impl SettingsOverrides {
    pub fn capture_env() -> Self {
        Self {
            base_url: std::env::var("QO_BASE_URL").ok(),
            api_key: std::env::var("QO_API_KEY").ok(),
            model: std::env::var("QO_MODEL").ok(),
            temperature: std::env::var("QO_TEMPERATURE").ok().and_then(|v| v.parse().ok()),
            history_limit: std::env::var("QO_HISTORY_LIMIT").ok().and_then(|v| v.parse().ok()),
            timeout_secs: std::env::var("QO_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::default().overlay(SettingsOverrides::capture_env())
    }

    pub fn overlay(self, ov: SettingsOverrides) -> Self {
        Self {
            base_url: ov.base_url.unwrap_or(self.base_url),
            api_key: ov.api_key.or(self.api_key),
            model: ov.model.unwrap_or(self.model),
            temperature: ov.temperature.unwrap_or(self.temperature),
            history_limit: ov.history_limit.unwrap_or(self.history_limit),
            timeout_secs: ov.timeout_secs.unwrap_or(self.timeout_secs),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
