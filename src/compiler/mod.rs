//! Compiler
//!
//! Turns normalized rows plus enrichment answers into the [`CompiledView`].
//! Compilation is wholesale: the previous view is only ever a cache hint,
//! never patched. A software whose wikidata id is unchanged since the hinted
//! view keeps its metadata and latest version without a new lookup.

pub mod similar;
pub mod view;

use crate::enrichment::{Enrichers, LatestVersion, ServiceProvider, SoftwareMetadata};
use crate::error::{CompileError, EnrichmentError};
use crate::rows::{AgentRow, Rows, SimilarSoftwareRef};
use crate::types::SoftwareId;
use futures::future::try_join_all;
use similar::{SimilarNode, SimilarityGraph};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, error};

pub use view::{
    CompiledInstance, CompiledReferent, CompiledSoftware, CompiledUser, CompiledView,
    ExternalSoftware, OrganizationCounts, PublicSoftware, SimilarSoftware,
};

/// Enrichment attached to one software row
#[derive(Debug, Clone, Default, PartialEq)]
struct SoftwareEnrichment {
    metadata: Option<SoftwareMetadata>,
    latest_version: Option<LatestVersion>,
}

/// What a previous view already knows, keyed the way lookups are keyed
struct EnrichmentCache<'a> {
    software: HashMap<SoftwareId, &'a PublicSoftware>,
    external: HashMap<&'a str, &'a ExternalSoftware>,
}

impl<'a> EnrichmentCache<'a> {
    fn from_view(view: Option<&'a CompiledView>) -> Self {
        let mut software = HashMap::new();
        let mut external = HashMap::new();
        for compiled in view.map(|v| v.software.as_slice()).unwrap_or_default() {
            let public = &compiled.public;
            software.insert(public.id, public);
            for similar in &public.similar_software {
                if let SimilarSoftware::External(entry) = similar {
                    external.insert(entry.wikidata_id.as_str(), entry);
                }
            }
            for instance in &public.instances {
                for entry in &instance.other_software {
                    external.insert(entry.wikidata_id.as_str(), entry);
                }
            }
        }
        Self { software, external }
    }

    /// Cached enrichment, valid only if the external id did not move
    fn software(&self, id: SoftwareId, wikidata_id: &str) -> Option<SoftwareEnrichment> {
        let cached = self.software.get(&id)?;
        if cached.wikidata_id.as_deref() != Some(wikidata_id) {
            return None;
        }
        Some(SoftwareEnrichment {
            metadata: cached.wikidata.clone(),
            latest_version: cached.latest_version.clone(),
        })
    }
}

/// Compiles rows against a fixed set of enrichment collaborators
#[derive(Clone)]
pub struct Compiler {
    enrichers: Enrichers,
}

impl Compiler {
    pub fn new(enrichers: Enrichers) -> Self {
        Self { enrichers }
    }

    /// Compile `rows` into a fresh view.
    ///
    /// `cache` is the previous view; pass `None` to refresh every lookup.
    pub async fn compile(
        &self,
        rows: &Rows,
        cache: Option<&CompiledView>,
    ) -> Result<CompiledView, CompileError> {
        let start = Instant::now();

        if let Err(e) = check_integrity(rows) {
            error!(error = %e, "Row set violates referential integrity");
            return Err(e);
        }

        let cache = EnrichmentCache::from_view(cache);
        let (enrichment, lookups) = self.enrich_software(rows, &cache).await?;
        let externals = self.resolve_externals(rows, &cache, &enrichment).await?;
        let providers = self.enrichers.providers.lookup_providers().await?;

        let agents: HashMap<&str, &AgentRow> =
            rows.agents.iter().map(|a| (a.email.as_str(), a)).collect();
        let mut graph = SimilarityGraph::build(rows);
        let names: HashMap<SoftwareId, &str> =
            rows.software.iter().map(|s| (s.id, s.name.as_str())).collect();

        let mut compiled = Vec::with_capacity(rows.software.len());
        for row in &rows.software {
            // Integrity was checked above, so every email resolves
            let referents: Vec<CompiledReferent> = rows
                .software_referents
                .iter()
                .filter(|r| r.software_id == row.id)
                .filter_map(|r| {
                    agents.get(r.agent_email.as_str()).map(|agent| CompiledReferent {
                        email: r.agent_email.clone(),
                        organization: agent.organization.clone(),
                        is_expert: r.is_expert,
                        use_case_description: r.use_case_description.clone(),
                        service_url: r.service_url.clone(),
                    })
                })
                .collect();
            let users: Vec<CompiledUser> = rows
                .software_users
                .iter()
                .filter(|u| u.software_id == row.id)
                .filter_map(|u| {
                    agents.get(u.agent_email.as_str()).map(|agent| CompiledUser {
                        email: u.agent_email.clone(),
                        organization: agent.organization.clone(),
                        os: u.os,
                        version: u.version.clone(),
                        service_url: u.service_url.clone(),
                        use_case_description: u.use_case_description.clone(),
                    })
                })
                .collect();

            let mut counts: BTreeMap<String, OrganizationCounts> = BTreeMap::new();
            for referent in &referents {
                counts
                    .entry(referent.organization.clone())
                    .or_default()
                    .referent_count += 1;
            }
            for user in &users {
                counts.entry(user.organization.clone()).or_default().user_count += 1;
            }

            let similar_software = graph
                .closure(row.id)
                .into_iter()
                .map(|node| match node {
                    SimilarNode::Software(id) => SimilarSoftware::InCatalog {
                        software_id: id,
                        software_name: names.get(&id).copied().unwrap_or_default().to_string(),
                    },
                    SimilarNode::External(wikidata_id) => SimilarSoftware::External(
                        externals
                            .get(&wikidata_id)
                            .cloned()
                            .unwrap_or_else(|| unknown_external(&wikidata_id)),
                    ),
                })
                .collect();

            let instances = rows
                .instances
                .iter()
                .filter(|i| i.main_software_id == row.id)
                .map(|i| CompiledInstance {
                    id: i.id,
                    organization: i.organization.clone(),
                    target_audience: i.target_audience.clone(),
                    public_url: i.public_url.clone(),
                    other_software: i
                        .other_software_wikidata_ids
                        .iter()
                        .map(|w| externals.get(w).cloned().unwrap_or_else(|| unknown_external(w)))
                        .collect(),
                })
                .collect();

            let SoftwareEnrichment {
                metadata,
                latest_version,
            } = enrichment.get(&row.id).cloned().unwrap_or_default();

            compiled.push(CompiledSoftware {
                public: PublicSoftware {
                    id: row.id,
                    name: row.name.clone(),
                    description: row.description.clone(),
                    license: row.license.clone(),
                    version_min: row.version_min.clone(),
                    categories: row.categories.clone(),
                    wikidata_id: row.wikidata_id.clone(),
                    comptoir_du_libre_id: row.comptoir_du_libre_id,
                    dereferencing: row.dereferencing.clone(),
                    referenced_since_time: row.referenced_since_time,
                    wikidata: metadata,
                    service_providers: providers.get(&row.id).cloned().unwrap_or_default(),
                    latest_version,
                    similar_software,
                    instances,
                    user_and_referent_count_by_organization: counts,
                    has_expert_referent: referents.iter().any(|r| r.is_expert),
                },
                added_by_agent_email: row.added_by_agent_email.clone(),
                referents,
                users,
            });
        }

        debug!(
            software_count = compiled.len(),
            lookups,
            duration_ms = start.elapsed().as_millis() as u64,
            "Compiled catalog view"
        );

        Ok(CompiledView { software: compiled })
    }

    /// Metadata and latest version for every row carrying a wikidata id.
    ///
    /// Returns the enrichment by software id and the number of rows that
    /// needed a fresh lookup.
    async fn enrich_software(
        &self,
        rows: &Rows,
        cache: &EnrichmentCache<'_>,
    ) -> Result<(HashMap<SoftwareId, SoftwareEnrichment>, usize), CompileError> {
        let mut enrichment = HashMap::new();
        let mut pending = Vec::new();

        for row in &rows.software {
            let Some(wikidata_id) = row.wikidata_id.as_deref() else {
                continue;
            };
            match cache.software(row.id, wikidata_id) {
                Some(cached) => {
                    enrichment.insert(row.id, cached);
                }
                None => pending.push((row.id, wikidata_id)),
            }
        }

        let lookups = pending.len();
        let fresh = try_join_all(pending.into_iter().map(|(id, wikidata_id)| async move {
            let metadata = self
                .enrichers
                .metadata
                .lookup_software_metadata(wikidata_id)
                .await?;
            let latest_version = match metadata.as_ref().and_then(|m| m.source_url.as_deref()) {
                Some(repo_url) => {
                    self.enrichers
                        .latest_version
                        .lookup_latest_version(repo_url)
                        .await?
                }
                None => None,
            };
            Ok::<_, EnrichmentError>((
                id,
                SoftwareEnrichment {
                    metadata,
                    latest_version,
                },
            ))
        }))
        .await?;

        enrichment.extend(fresh);
        Ok((enrichment, lookups))
    }

    /// Label and description for every external id referenced by similarity
    /// lists or instances.
    async fn resolve_externals(
        &self,
        rows: &Rows,
        cache: &EnrichmentCache<'_>,
        enrichment: &HashMap<SoftwareId, SoftwareEnrichment>,
    ) -> Result<HashMap<String, ExternalSoftware>, CompileError> {
        let mut wanted: BTreeSet<&str> = BTreeSet::new();
        for row in &rows.software {
            for reference in &row.similar_software {
                if let SimilarSoftwareRef::External { wikidata_id } = reference {
                    wanted.insert(wikidata_id);
                }
            }
        }
        for instance in &rows.instances {
            wanted.extend(instance.other_software_wikidata_ids.iter().map(String::as_str));
        }

        let known: HashMap<&str, &SoftwareMetadata> = enrichment
            .values()
            .filter_map(|e| e.metadata.as_ref())
            .map(|m| (m.wikidata_id.as_str(), m))
            .collect();

        let mut resolved = HashMap::new();
        let mut pending = Vec::new();
        for wikidata_id in wanted {
            if let Some(entry) = cache.external.get(wikidata_id) {
                resolved.insert(wikidata_id.to_string(), (*entry).clone());
            } else if let Some(metadata) = known.get(wikidata_id) {
                resolved.insert(
                    wikidata_id.to_string(),
                    external_from(wikidata_id, Some(*metadata)),
                );
            } else {
                pending.push(wikidata_id);
            }
        }

        let fresh = try_join_all(pending.into_iter().map(|wikidata_id| async move {
            let metadata = self
                .enrichers
                .metadata
                .lookup_software_metadata(wikidata_id)
                .await?;
            Ok::<_, EnrichmentError>((
                wikidata_id.to_string(),
                external_from(wikidata_id, metadata.as_ref()),
            ))
        }))
        .await?;

        resolved.extend(fresh);
        Ok(resolved)
    }
}

fn external_from(wikidata_id: &str, metadata: Option<&SoftwareMetadata>) -> ExternalSoftware {
    ExternalSoftware {
        wikidata_id: wikidata_id.to_string(),
        label: metadata.and_then(|m| m.label.clone()),
        description: metadata.and_then(|m| m.description.clone()),
    }
}

fn unknown_external(wikidata_id: &str) -> ExternalSoftware {
    external_from(wikidata_id, None)
}

/// Fail if any declaration or instance points at a row that does not
/// exist, or if a (software, agent) pair is declared twice.
pub fn check_integrity(rows: &Rows) -> Result<(), CompileError> {
    let software_ids: HashSet<SoftwareId> = rows.software.iter().map(|s| s.id).collect();
    let emails: HashSet<&str> = rows.agents.iter().map(|a| a.email.as_str()).collect();

    let declarations = rows
        .software_referents
        .iter()
        .map(|r| ("referent", r.software_id, r.agent_email.as_str()))
        .chain(
            rows.software_users
                .iter()
                .map(|u| ("user", u.software_id, u.agent_email.as_str())),
        );

    let mut seen = HashSet::new();
    for (table, software_id, email) in declarations {
        if !software_ids.contains(&software_id) {
            return Err(CompileError::DanglingSoftware { table, software_id });
        }
        if !emails.contains(email) {
            return Err(CompileError::DanglingAgent {
                table,
                software_id,
                email: email.to_string(),
            });
        }
        if !seen.insert((table, software_id, email)) {
            return Err(CompileError::DuplicateDeclaration {
                table,
                software_id,
                email: email.to_string(),
            });
        }
    }

    for instance in &rows.instances {
        if !software_ids.contains(&instance.main_software_id) {
            return Err(CompileError::DanglingSoftware {
                table: "instance",
                software_id: instance.main_software_id,
            });
        }
    }

    Ok(())
}
