//! Agent configuration

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use guardrail_lib::{FlagApiConfig, MonitorMode, ThresholdConfig};
use serde::Deserialize;

/// Config file read from the working directory when `GUARDRAIL_CONFIG` is unset
const DEFAULT_CONFIG_FILE: &str = "guardrail.toml";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Service name attached to every structured log line
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Port for the guardrail, health and metrics API
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Cooldown preset
    #[serde(default)]
    pub mode: MonitorMode,

    #[serde(default)]
    pub thresholds: ThresholdConfig,

    /// Flag control plane connection
    #[serde(default)]
    pub flag: FlagApiConfig,
}

fn default_service_name() -> String {
    "guardrail-agent".to_string()
}

fn default_api_port() -> u16 {
    8080
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            api_port: default_api_port(),
            mode: MonitorMode::default(),
            thresholds: ThresholdConfig::default(),
            flag: FlagApiConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from the optional config file and the environment
    pub fn load() -> Result<Self> {
        let path = std::env::var("GUARDRAIL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::from_file(&path)
    }

    /// Load configuration from `path` (if it exists), overridden by `GUARDRAIL_*` variables
    pub fn from_file(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("GUARDRAIL")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        let mut config: AgentConfig = settings
            .try_deserialize()
            .context("Invalid guardrail agent configuration")?;

        config
            .thresholds
            .validate()
            .context("Invalid [thresholds] configuration")?;

        if config.flag.api_token.as_deref().map_or(true, str::is_empty) {
            config.flag.api_token = std::env::var("LD_API_TOKEN")
                .ok()
                .filter(|token| !token.is_empty());
        }

        Ok(config)
    }
}
