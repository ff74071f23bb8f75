//! Shared fixtures and scripted collaborators.

use async_trait::async_trait;
use parking_lot::Mutex;
use sill::compiler::{CompiledView, Compiler};
use sill::enrichment::{
    Enrichers, NoEnrichment, ProviderSource, ServiceProvider, SoftwareMetadata,
    SoftwareMetadataSource,
};
use sill::rows::{AgentRow, SoftwareReferentRow, SoftwareRow};
use sill::store::{MemoryRowStore, RowStore};
use sill::transaction::{FatalHandler, TransactionCoordinator};
use sill::types::SoftwareId;
use sill::{EnrichmentError, Rows, StorageError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

pub fn software(id: SoftwareId, name: &str, added_by: &str) -> SoftwareRow {
    SoftwareRow {
        id,
        name: name.to_string(),
        description: format!("{} description", name),
        license: "MPL-2.0".to_string(),
        version_min: "7.0".to_string(),
        categories: Vec::new(),
        similar_software: Vec::new(),
        wikidata_id: None,
        comptoir_du_libre_id: None,
        dereferencing: None,
        referenced_since_time: 1_600_000_000_000,
        added_by_agent_email: added_by.to_string(),
    }
}

pub fn agent(email: &str, organization: &str) -> AgentRow {
    AgentRow {
        email: email.to_string(),
        organization: organization.to_string(),
        about: None,
        is_public: false,
    }
}

pub fn referent(software_id: SoftwareId, email: &str) -> SoftwareReferentRow {
    SoftwareReferentRow {
        software_id,
        agent_email: email.to_string(),
        is_expert: false,
        use_case_description: "Suite bureautique".to_string(),
        service_url: None,
    }
}

/// Catalog with software 5 `foo`, added by `a@x.org`
pub fn catalog_rows() -> Rows {
    Rows {
        software: vec![software(5, "foo", "a@x.org")],
        agents: vec![agent("a@x.org", "DINUM")],
        ..Rows::default()
    }
}

/// Records every error handed to the fatal handler
#[derive(Clone, Default)]
pub struct RecordingFatal {
    pub errors: Arc<Mutex<Vec<String>>>,
}

impl RecordingFatal {
    pub fn handler(&self) -> FatalHandler {
        let errors = Arc::clone(&self.errors);
        Arc::new(move |e: &StorageError| errors.lock().push(e.to_string()))
    }

    pub fn count(&self) -> usize {
        self.errors.lock().len()
    }
}

pub async fn open(
    store: &Arc<MemoryRowStore>,
    enrichers: Enrichers,
    fatal: &RecordingFatal,
) -> Arc<TransactionCoordinator> {
    let coordinator = TransactionCoordinator::open_with_fatal_handler(
        Arc::clone(store) as Arc<dyn RowStore>,
        Compiler::new(enrichers),
        fatal.handler(),
    )
    .await
    .unwrap();
    Arc::new(coordinator)
}

pub fn memory_store(rows: Rows) -> Arc<MemoryRowStore> {
    Arc::new(MemoryRowStore::new(rows, CompiledView::default()))
}

fn metadata_for(wikidata_id: &str, revision: usize) -> SoftwareMetadata {
    SoftwareMetadata {
        wikidata_id: wikidata_id.to_string(),
        label: Some(format!("{} revision {}", wikidata_id, revision)),
        description: None,
        logo_url: None,
        website_url: None,
        source_url: None,
        documentation_url: None,
    }
}

/// Provider directory that counts how often it is consulted; one call per
/// compilation
#[derive(Default)]
pub struct CountingProviders {
    pub calls: AtomicUsize,
}

impl CountingProviders {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderSource for CountingProviders {
    async fn lookup_providers(
        &self,
    ) -> Result<HashMap<SoftwareId, Vec<ServiceProvider>>, EnrichmentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(HashMap::new())
    }
}

/// Metadata source whose first lookup blocks until released. Labels carry
/// the call number so every lookup yields a distinct answer.
#[derive(Default)]
pub struct GatedMetadata {
    pub calls: AtomicUsize,
    pub entered: Notify,
    pub release: Notify,
}

#[async_trait]
impl SoftwareMetadataSource for GatedMetadata {
    async fn lookup_software_metadata(
        &self,
        wikidata_id: &str,
    ) -> Result<Option<SoftwareMetadata>, EnrichmentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == 0 {
            self.entered.notify_one();
            self.release.notified().await;
        }
        Ok(Some(metadata_for(wikidata_id, call)))
    }
}

/// Metadata source answering every lookup with a server error
pub struct FailingMetadata;

#[async_trait]
impl SoftwareMetadataSource for FailingMetadata {
    async fn lookup_software_metadata(
        &self,
        wikidata_id: &str,
    ) -> Result<Option<SoftwareMetadata>, EnrichmentError> {
        Err(EnrichmentError::UnexpectedStatus {
            url: format!("https://www.wikidata.org/wiki/Special:EntityData/{}.json", wikidata_id),
            status: 503,
        })
    }
}

pub fn enrichers_with_failing_metadata() -> Enrichers {
    Enrichers {
        metadata: Arc::new(FailingMetadata),
        providers: Arc::new(NoEnrichment),
        latest_version: Arc::new(NoEnrichment),
    }
}

pub fn enrichers_with_providers(providers: Arc<CountingProviders>) -> Enrichers {
    Enrichers {
        metadata: Arc::new(NoEnrichment),
        providers,
        latest_version: Arc::new(NoEnrichment),
    }
}

pub fn enrichers_with_metadata(metadata: Arc<GatedMetadata>) -> Enrichers {
    Enrichers {
        metadata,
        providers: Arc::new(NoEnrichment),
        latest_version: Arc::new(NoEnrichment),
    }
}
