//! devloop configuration types and loading

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::coordinator::CoordinatorConfig;
use crate::llm::{EndpointConfig, HttpSpecialistClient, LlmError, Specialists};
use crate::scheduler::SchedulerConfig;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model endpoints per specialist role
    pub specialists: SpecialistsConfig,

    /// Outer-loop knobs
    pub coordinator: CoordinatorConfig,

    /// Dimensional scheduler weights
    pub scheduler: SchedulerConfig,
}

impl Config {
    /// Load configuration with fallback chain: explicit path, project
    /// `.devloop.yml`, user config dir, defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".devloop.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("devloop").join("devloop.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// One specialist endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointSettings {
    /// Model identifier
    pub model: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Environment variable holding the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl EndpointSettings {
    fn with_model(model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..Self::default()
        }
    }

    fn endpoint(&self) -> EndpointConfig {
        EndpointConfig {
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            api_key_env: self.api_key_env.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            timeout_ms: 300_000,
        }
    }
}

/// The three specialist roles mapped to endpoints; no URL lives in code
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecialistsConfig {
    /// Most capable model: writes the code
    pub coding: EndpointSettings,

    /// Strong analytical model: plans and meta-reasons
    pub reasoning: EndpointSettings,

    /// Fast, cheap model: reviews and scans
    pub analysis: EndpointSettings,
}

impl Default for SpecialistsConfig {
    fn default() -> Self {
        Self {
            coding: EndpointSettings::with_model("claude-opus-4-20250514"),
            reasoning: EndpointSettings::with_model("claude-sonnet-4-20250514"),
            analysis: EndpointSettings::with_model("claude-haiku-3-5-20241022"),
        }
    }
}

impl SpecialistsConfig {
    /// Build the HTTP-backed specialist set from this mapping
    pub fn build(&self) -> Result<Specialists, LlmError> {
        Ok(Specialists::new(
            Arc::new(HttpSpecialistClient::new(self.coding.endpoint())?),
            Arc::new(HttpSpecialistClient::new(self.reasoning.endpoint())?),
            Arc::new(HttpSpecialistClient::new(self.analysis.endpoint())?),
        ))
    }
}
