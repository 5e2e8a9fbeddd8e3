use std::time::Duration;

use serde::Deserialize;

use crate::error::{AppError, Result};

/// Process-wide settings. Credentials are never part of configuration:
/// they arrive with each submission and are dropped when it finishes.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub greptile: GreptileConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GreptileConfig {
    #[serde(default = "default_greptile_url")]
    pub base_url: String,
    /// Git hosting remote the analysis service indexes from.
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default = "default_true")]
    pub reload: bool,
    #[serde(default = "default_true")]
    pub notify: bool,
    #[serde(default)]
    pub genius: bool,
    /// Query used when a submission does not carry its own.
    #[serde(default = "default_query")]
    pub default_query: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct GitHubConfig {
    /// Override for GitHub Enterprise or testing; `None` means api.github.com.
    #[serde(default)]
    pub api_base_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_greptile_url() -> String {
    "https://api.greptile.com/v2".to_string()
}

fn default_remote() -> String {
    "github".to_string()
}

fn default_true() -> bool {
    true
}

fn default_query() -> String {
    "Find the most valuable small fix in this repository (a bug, a typo, or a missing check) and implement it.".to_string()
}

fn default_stage_timeout() -> u64 {
    120
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for GreptileConfig {
    fn default() -> Self {
        Self {
            base_url: default_greptile_url(),
            remote: default_remote(),
            reload: true,
            notify: true,
            genius: false,
            default_query: default_query(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_timeout_secs: default_stage_timeout(),
        }
    }
}

impl PipelineConfig {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Load from file if specified
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            builder = builder.add_source(config::File::with_name("patchpilot").required(false));
        }

        // Environment variable overrides with PATCHPILOT_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("PATCHPILOT")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.pipeline.stage_timeout_secs == 0 {
            return Err(AppError::Config(
                "pipeline.stage_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.greptile.default_query.trim().is_empty() {
            return Err(AppError::Config(
                "greptile.default_query must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
