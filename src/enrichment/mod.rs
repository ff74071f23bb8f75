//! Enrichment Collaborators
//!
//! Read-only lookups against external catalogs. Each collaborator owns its
//! own caching and rate limiting; the compiler only sees answers. A "not
//! found" answer is `Ok(None)`, anything else that goes wrong is an
//! [`EnrichmentError`] and aborts the compilation that asked.

pub mod http;

use crate::error::EnrichmentError;
use crate::types::{SoftwareId, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub use http::{CnllProviderSource, GitHubLatestVersionSource, WikidataMetadataSource};

/// Metadata published for a software by the external knowledge base
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoftwareMetadata {
    pub wikidata_id: String,
    pub label: Option<String>,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub website_url: Option<String>,
    pub source_url: Option<String>,
    pub documentation_url: Option<String>,
}

/// A company offering support for a catalogued software
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceProvider {
    pub name: String,
    pub siren: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestVersion {
    pub version: String,
    pub publication_time: Timestamp,
}

/// Per-id metadata lookup
#[async_trait]
pub trait SoftwareMetadataSource: Send + Sync {
    async fn lookup_software_metadata(
        &self,
        wikidata_id: &str,
    ) -> Result<Option<SoftwareMetadata>, EnrichmentError>;
}

/// Whole-catalog provider directory
#[async_trait]
pub trait ProviderSource: Send + Sync {
    async fn lookup_providers(
        &self,
    ) -> Result<HashMap<SoftwareId, Vec<ServiceProvider>>, EnrichmentError>;
}

/// Latest published release of a source repository
#[async_trait]
pub trait LatestVersionSource: Send + Sync {
    async fn lookup_latest_version(
        &self,
        repo_url: &str,
    ) -> Result<Option<LatestVersion>, EnrichmentError>;
}

/// The set of collaborators a compilation consults
#[derive(Clone)]
pub struct Enrichers {
    pub metadata: Arc<dyn SoftwareMetadataSource>,
    pub providers: Arc<dyn ProviderSource>,
    pub latest_version: Arc<dyn LatestVersionSource>,
}

impl Enrichers {
    /// Collaborators that never know anything
    pub fn none() -> Self {
        let none = Arc::new(NoEnrichment);
        Self {
            metadata: none.clone(),
            providers: none.clone(),
            latest_version: none,
        }
    }
}

/// Null collaborator: every lookup is "not found"
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEnrichment;

#[async_trait]
impl SoftwareMetadataSource for NoEnrichment {
    async fn lookup_software_metadata(
        &self,
        _wikidata_id: &str,
    ) -> Result<Option<SoftwareMetadata>, EnrichmentError> {
        Ok(None)
    }
}

#[async_trait]
impl ProviderSource for NoEnrichment {
    async fn lookup_providers(
        &self,
    ) -> Result<HashMap<SoftwareId, Vec<ServiceProvider>>, EnrichmentError> {
        Ok(HashMap::new())
    }
}

#[async_trait]
impl LatestVersionSource for NoEnrichment {
    async fn lookup_latest_version(
        &self,
        _repo_url: &str,
    ) -> Result<Option<LatestVersion>, EnrichmentError> {
        Ok(None)
    }
}
