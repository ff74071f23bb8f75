//! CLI Tooling
//!
//! The `sill` command: run the catalog engine with its recompilation
//! scheduler, trigger a one-off recompilation, or inspect the stored catalog.

use crate::compiler::Compiler;
use crate::config::{ConfigLoader, EnrichmentConfig, SillConfig};
use crate::enrichment::http::DEFAULT_GITHUB_API;
use crate::enrichment::{
    CnllProviderSource, Enrichers, GitHubLatestVersionSource, WikidataMetadataSource,
};
use crate::error::{ApiError, EnrichmentError, StorageError};
use crate::recompile::{recompile_once, Recompiler, RecompileTrigger};
use crate::store::{RowStore, SledRowStore};
use crate::transaction::TransactionCoordinator;
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// SILL catalog store
#[derive(Parser)]
#[command(name = "sill")]
#[command(about = "Transactional store for the interministerial free software catalog")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (overrides the user config file)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Catalog store directory (overrides storage.path)
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the engine and its recompilation scheduler until interrupted
    Serve,
    /// Recompile the catalog once and persist the result
    Recompile,
    /// Print the compiled catalog as JSON
    Export {
        /// Redact agent emails and declarations
        #[arg(long)]
        public: bool,
        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List catalogued software
    List {
        #[arg(long, value_enum, default_value_t = ListFormat::Text)]
        format: ListFormat,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListFormat {
    Text,
    Json,
}

impl Cli {
    /// Load configuration and apply command-line overrides
    pub fn load_config(&self) -> Result<SillConfig, ApiError> {
        let mut config = match &self.config {
            Some(path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load()?,
        };
        if let Some(store) = &self.store {
            config.storage.path = Some(store.clone());
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.logging.format = format.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

/// Enrichment collaborators described by the config
pub fn build_enrichers(config: &EnrichmentConfig) -> Result<Enrichers, ApiError> {
    if !config.enabled {
        return Ok(Enrichers::none());
    }
    let client_error = |e: EnrichmentError| ApiError::ConfigError(e.to_string());
    Ok(Enrichers {
        metadata: Arc::new(
            WikidataMetadataSource::new(config.wikidata_endpoint.clone(), &config.user_agent)
                .map_err(client_error)?,
        ),
        providers: Arc::new(
            CnllProviderSource::new(config.cnll_endpoint.clone(), &config.user_agent)
                .map_err(client_error)?,
        ),
        latest_version: Arc::new(
            GitHubLatestVersionSource::new(DEFAULT_GITHUB_API, &config.user_agent)
                .map_err(client_error)?,
        ),
    })
}

pub struct CliContext {
    config: SillConfig,
    store: Arc<SledRowStore>,
}

impl CliContext {
    pub fn new(config: SillConfig) -> Result<Self, ApiError> {
        let store_path = config.storage.resolve_path()?;
        std::fs::create_dir_all(&store_path).map_err(StorageError::IoError)?;
        let store = SledRowStore::new(&store_path)?;
        info!(store_path = %store_path.display(), "Opened catalog store");
        Ok(Self {
            config,
            store: Arc::new(store),
        })
    }

    pub fn config(&self) -> &SillConfig {
        &self.config
    }

    pub async fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Serve => self.serve().await,
            Commands::Recompile => {
                let coordinator = self.open_coordinator().await?;
                let report = recompile_once(&coordinator, RecompileTrigger::OnDemand).await?;
                coordinator.flush().await?;
                Ok(format!(
                    "Recompiled {} software in {} attempt(s), {} ms: {}",
                    coordinator.snapshot().compiled.len(),
                    report.attempts,
                    report.duration_ms,
                    if report.committed {
                        "new view persisted"
                    } else {
                        "view unchanged"
                    }
                ))
            }
            Commands::Export { public, output } => {
                let view = self.store.fetch_compiled_view().await?;
                let json = if *public {
                    serde_json::to_string_pretty(&view.public())
                } else {
                    serde_json::to_string_pretty(&view)
                }
                .map_err(StorageError::from)?;
                match output {
                    Some(path) => {
                        std::fs::write(path, json).map_err(StorageError::IoError)?;
                        Ok(format!("Exported {} software to {}", view.len(), path.display()))
                    }
                    None => Ok(json),
                }
            }
            Commands::List { format } => self.list(*format).await,
            Commands::Config => self.config.to_toml(),
        }
    }

    async fn open_coordinator(&self) -> Result<Arc<TransactionCoordinator>, ApiError> {
        let compiler = Compiler::new(build_enrichers(&self.config.enrichment)?);
        let store = Arc::clone(&self.store) as Arc<dyn RowStore>;
        Ok(Arc::new(TransactionCoordinator::open(store, compiler).await?))
    }

    async fn serve(&self) -> Result<String, ApiError> {
        let coordinator = self.open_coordinator().await?;
        let recompiler = Recompiler::new(Arc::clone(&coordinator));
        recompiler.start(
            self.config.recompile.interval(),
            self.config.recompile.on_startup,
        );
        info!("Catalog engine running; press Ctrl-C to stop");

        tokio::signal::ctrl_c()
            .await
            .map_err(StorageError::IoError)?;

        info!("Shutting down catalog engine");
        recompiler.stop().await;
        coordinator.flush().await?;
        Ok("Catalog engine stopped".to_string())
    }

    async fn list(&self, format: ListFormat) -> Result<String, ApiError> {
        let view = self.store.fetch_compiled_view().await?;
        if format == ListFormat::Json {
            return serde_json::to_string_pretty(&view.public())
                .map_err(|e| ApiError::StorageError(StorageError::from(e)));
        }

        let mut table = Table::new();
        table.load_preset(UTF8_BORDERS_ONLY);
        table.set_header(vec!["Id", "Name", "License", "Users", "Referents", "Status"]);
        for software in &view.software {
            let public = &software.public;
            let status = match &public.dereferencing {
                Some(_) => "dereferenced",
                None => "recommended",
            };
            table.add_row(vec![
                public.id.to_string(),
                public.name.clone(),
                public.license.clone(),
                software.users.len().to_string(),
                software.referents.len().to_string(),
                status.to_string(),
            ]);
        }
        Ok(table.to_string())
    }
}
