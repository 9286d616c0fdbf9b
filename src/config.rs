//! Crawl settings
//!
//! Loaded from an optional YAML file; every field has a default so an empty
//! file (or no file) gives the stock timings.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub discovery: DiscoverySettings,
    pub render: RenderSettings,
    pub crawl: CrawlSettings,
}

/// Homepage fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            user_agent: format!(
                "dealer-scout/{} (+inventory discovery)",
                env!("CARGO_PKG_VERSION")
            ),
        }
    }
}

impl DiscoverySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Headless rendering of inventory pages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub timeout_secs: u64,
    /// Extra wait after navigation for client-side rendering
    pub settle_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chrome_path: Option<PathBuf>,
    pub user_agent: String,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            settle_secs: 3,
            chrome_path: None,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
        }
    }
}

impl RenderSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }
}

/// Fleet-level crawl policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlSettings {
    /// Pause after each dealer
    pub throttle_secs: u64,
    /// Listing containers processed per container selector
    pub max_containers: usize,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            throttle_secs: 2,
            max_containers: 20,
        }
    }
}

impl CrawlSettings {
    pub fn throttle(&self) -> Duration {
        Duration::from_secs(self.throttle_secs)
    }
}

impl Settings {
    /// Load from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        // serde_yaml rejects an empty document for a struct
        let settings: Settings = if content.trim().is_empty() {
            Settings::default()
        } else {
            serde_yaml::from_str(content)?
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discovery.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "discovery.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.render.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "render.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.crawl.max_containers == 0 {
            return Err(ConfigError::Validation(
                "crawl.max_containers must be greater than 0".to_string(),
            ));
        }
        if self.discovery.user_agent.trim().is_empty() {
            return Err(ConfigError::Validation(
                "discovery.user_agent must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
