//! Layered config loading on top of the `config` crate.

use super::SillConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// `$XDG_CONFIG_HOME/sill/config.toml` or the platform equivalent
    pub fn user_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("fr", "sill", "sill")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from the user config file when present, then the environment
    pub fn load() -> Result<SillConfig, ConfigError> {
        let mut builder = Self::builder_with_defaults()?;
        if let Some(path) = Self::user_config_path() {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }
        Self::finish(builder)
    }

    /// Load from an explicit file, which must exist, then the environment
    pub fn load_from_file(path: &Path) -> Result<SillConfig, ConfigError> {
        let builder = Self::builder_with_defaults()?
            .add_source(File::from(path).format(FileFormat::Toml).required(true));
        Self::finish(builder)
    }

    fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let defaults = Config::try_from(&SillConfig::default())?;
        Ok(Config::builder().add_source(defaults))
    }

    fn finish(builder: ConfigBuilder<DefaultState>) -> Result<SillConfig, ConfigError> {
        builder
            .add_source(
                Environment::with_prefix("SILL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
