//! Configuration
//!
//! [`SillConfig`] is assembled by [`ConfigLoader`] from built-in defaults, an
//! optional TOML file and `SILL__`-prefixed environment variables, in that
//! order of precedence.

mod loader;

pub use loader::ConfigLoader;

use crate::enrichment::http::{DEFAULT_CNLL_ENDPOINT, DEFAULT_WIKIDATA_ENDPOINT};
use crate::error::ApiError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SillConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub recompile: RecompileConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SillConfig {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.recompile.interval_secs == 0 {
            return Err(ApiError::ConfigError(
                "recompile.interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.enrichment.enabled && self.enrichment.user_agent.trim().is_empty() {
            return Err(ApiError::ConfigError(
                "enrichment.user_agent cannot be empty when enrichment is enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Effective configuration as TOML
    pub fn to_toml(&self) -> Result<String, ApiError> {
        toml::to_string_pretty(self)
            .map_err(|e| ApiError::ConfigError(format!("Failed to render config: {}", e)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory of the sled database; unset means the platform data directory
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolve_path(&self) -> Result<PathBuf, ApiError> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        let project_dirs = directories::ProjectDirs::from("fr", "sill", "sill").ok_or_else(|| {
            ApiError::ConfigError(
                "Could not determine platform data directory for the catalog store".to_string(),
            )
        })?;
        Ok(project_dirs.data_dir().join("catalog"))
    }
}

fn default_interval_secs() -> u64 {
    4 * 3600
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecompileConfig {
    /// Seconds between scheduled passes
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Run one pass as soon as the server starts
    #[serde(default = "default_true")]
    pub on_startup: bool,
}

impl RecompileConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for RecompileConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            on_startup: default_true(),
        }
    }
}

fn default_wikidata_endpoint() -> String {
    DEFAULT_WIKIDATA_ENDPOINT.to_string()
}

fn default_cnll_endpoint() -> String {
    DEFAULT_CNLL_ENDPOINT.to_string()
}

fn default_user_agent() -> String {
    format!("sill/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Disabled means every lookup answers "absent"
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_wikidata_endpoint")]
    pub wikidata_endpoint: String,
    #[serde(default = "default_cnll_endpoint")]
    pub cnll_endpoint: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            wikidata_endpoint: default_wikidata_endpoint(),
            cnll_endpoint: default_cnll_endpoint(),
            user_agent: default_user_agent(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = SillConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.recompile.interval(), Duration::from_secs(4 * 3600));
        assert!(config.enrichment.user_agent.starts_with("sill/"));
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let mut config = SillConfig::default();
        config.recompile.interval_secs = 0;
        assert!(matches!(config.validate(), Err(ApiError::ConfigError(_))));
    }

    #[test]
    fn test_explicit_storage_path_wins() {
        let storage = StorageConfig {
            path: Some(PathBuf::from("/var/lib/sill")),
        };
        assert_eq!(storage.resolve_path().unwrap(), PathBuf::from("/var/lib/sill"));
    }

    #[test]
    fn test_rendered_toml_reads_back() {
        let config = SillConfig::default();
        let rendered = config.to_toml().unwrap();
        let parsed: SillConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
