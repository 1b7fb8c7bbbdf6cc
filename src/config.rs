// src/config.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Options for a download manager instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ManagerConfig {
    /// Number of files transferred at the same time.
    pub concurrency: usize,
    /// Upper bound for each existence check, fetch and write.
    /// `None` lets a transfer run for as long as the collaborator takes.
    #[serde(with = "opt_secs")]
    pub transfer_timeout: Option<Duration>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            transfer_timeout: None,
        }
    }
}

impl ManagerConfig {
    pub fn with_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if self.transfer_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::Invalid("transfer_timeout must be positive".into()));
        }
        Ok(())
    }
}

/// Configuration for the command line tool, read from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL of the asset catalog API.
    pub api_base: String,
    /// Session token obtained from the OAuth flow, sent as a bearer token.
    pub token: Option<String>,
    /// Directory files are written into.
    pub storage_root: PathBuf,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub manager: ManagerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            token: None,
            storage_root: PathBuf::from("data"),
            request_timeout_secs: 60,
            user_agent: concat!("bundle-dl/", env!("CARGO_PKG_VERSION")).to_string(),
            manager: ManagerConfig::default(),
        }
    }
}

impl AppConfig {
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config: AppConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base.is_empty() {
            return Err(ConfigError::Invalid("api_base is required".into()));
        }
        if !self.api_base.starts_with("http://") && !self.api_base.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "api_base must be an http(s) url, got {}",
                self.api_base
            )));
        }
        self.manager.validate()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Serializes `Option<Duration>` as an optional number of seconds.
mod opt_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(d)?;
        secs.map(|s| {
            Duration::try_from_secs_f64(s)
                .map_err(|e| serde::de::Error::custom(format!("invalid timeout {s}: {e}")))
        })
        .transpose()
    }
}
