//! Compiled view types: the private form and its public projection.

use crate::enrichment::{LatestVersion, ServiceProvider, SoftwareMetadata};
use crate::rows::{Dereferencing, Os};
use crate::types::{InstanceId, SoftwareId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledReferent {
    pub email: String,
    pub organization: String,
    pub is_expert: bool,
    pub use_case_description: String,
    pub service_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledUser {
    pub email: String,
    pub organization: String,
    pub os: Option<Os>,
    pub version: String,
    pub service_url: Option<String>,
    pub use_case_description: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationCounts {
    pub user_count: usize,
    pub referent_count: usize,
}

/// An entry known only to the external metadata source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSoftware {
    pub wikidata_id: String,
    pub label: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SimilarSoftware {
    InCatalog {
        software_id: SoftwareId,
        software_name: String,
    },
    External(ExternalSoftware),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledInstance {
    pub id: InstanceId,
    pub organization: String,
    pub target_audience: String,
    pub public_url: Option<String>,
    pub other_software: Vec<ExternalSoftware>,
}

/// Everything about a software that may be shown without agent emails
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSoftware {
    pub id: SoftwareId,
    pub name: String,
    pub description: String,
    pub license: String,
    pub version_min: String,
    pub categories: Vec<String>,
    pub wikidata_id: Option<String>,
    pub comptoir_du_libre_id: Option<u64>,
    pub dereferencing: Option<Dereferencing>,
    pub referenced_since_time: Timestamp,
    pub wikidata: Option<SoftwareMetadata>,
    pub service_providers: Vec<ServiceProvider>,
    pub latest_version: Option<LatestVersion>,
    pub similar_software: Vec<SimilarSoftware>,
    pub instances: Vec<CompiledInstance>,
    pub user_and_referent_count_by_organization: BTreeMap<String, OrganizationCounts>,
    pub has_expert_referent: bool,
}

/// Private form: the public fields plus the declarations behind them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledSoftware {
    #[serde(flatten)]
    pub public: PublicSoftware,
    pub added_by_agent_email: String,
    pub referents: Vec<CompiledReferent>,
    pub users: Vec<CompiledUser>,
}

/// The derived view, one entry per software row, in row order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledView {
    pub software: Vec<CompiledSoftware>,
}

impl CompiledView {
    pub fn get(&self, id: SoftwareId) -> Option<&CompiledSoftware> {
        self.software.iter().find(|s| s.public.id == id)
    }

    /// Redacted projection safe to publish
    pub fn public(&self) -> Vec<PublicSoftware> {
        self.software.iter().map(|s| s.public.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.software.len()
    }

    pub fn is_empty(&self) -> bool {
        self.software.is_empty()
    }
}
