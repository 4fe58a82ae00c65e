use serde::Serialize;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

const API_KEY_VAR: &str = "GEMINI_API_KEY";
const MODEL_VAR: &str = "SUTRABOT_MODEL";
const API_BASE_VAR: &str = "SUTRABOT_API_BASE";
const TIMEOUT_VAR: &str = "SUTRABOT_TIMEOUT_SECS";
const OUTPUT_MODE_VAR: &str = "SUTRABOT_OUTPUT_MODE";

/// Sampling parameters sent with every request. Not adjustable per question.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
    pub response_mime_type: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 8192,
            response_mime_type: "text/plain".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Every question and answer is appended to a scrolling log.
    #[default]
    Transcript,
    /// Only the latest answer is shown.
    Single,
}

impl OutputMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "transcript" => Some(OutputMode::Transcript),
            "single" => Some(OutputMode::Single),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
    pub request_timeout: Duration,
    pub output_mode: OutputMode,
    pub generation: GenerationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            output_mode: OutputMode::default(),
            generation: GenerationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reads the process environment, after loading `.env` if one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank values behave as if the variable were missing.
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();
        config.api_key = get(API_KEY_VAR);

        if let Some(model) = get(MODEL_VAR) {
            config.model = model;
        }
        if let Some(base) = get(API_BASE_VAR) {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(raw) = get(TIMEOUT_VAR) {
            let secs = raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::InvalidTimeout {
                    name: TIMEOUT_VAR,
                    value: raw.clone(),
                })?;
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = get(OUTPUT_MODE_VAR) {
            config.output_mode =
                OutputMode::parse(&raw).ok_or(ConfigError::InvalidOutputMode {
                    name: OUTPUT_MODE_VAR,
                    value: raw.clone(),
                })?;
        }

        Ok(config)
    }
}
