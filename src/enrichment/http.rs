//! HTTP adapters for the enrichment collaborators.
//!
//! Thin `reqwest` wrappers: fetch, map 404 to "not found", decode the few
//! fields the compiler consumes. Response parsing lives in free functions so
//! it can be tested without a network.

use super::{
    LatestVersion, LatestVersionSource, ProviderSource, ServiceProvider, SoftwareMetadata,
    SoftwareMetadataSource,
};
use crate::error::EnrichmentError;
use crate::types::SoftwareId;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

pub const DEFAULT_WIKIDATA_ENDPOINT: &str = "https://www.wikidata.org";
pub const DEFAULT_CNLL_ENDPOINT: &str = "https://annuaire.cnll.fr/api/prestataires-sill.json";
pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";

const PREFERRED_LANGUAGES: [&str; 2] = ["fr", "en"];

// Wikidata property ids
const OFFICIAL_WEBSITE: &str = "P856";
const SOURCE_REPOSITORY: &str = "P1324";
const USER_MANUAL_URL: &str = "P2078";
const LOGO_IMAGE: &str = "P154";

fn build_client(user_agent: &str) -> Result<reqwest::Client, EnrichmentError> {
    reqwest::Client::builder()
        .user_agent(user_agent.to_string())
        .build()
        .map_err(|e| EnrichmentError::Client {
            message: e.to_string(),
        })
}

async fn get_json(client: &reqwest::Client, url: &str) -> Result<Option<Value>, EnrichmentError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| EnrichmentError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        debug!(url, "Enrichment lookup not found");
        return Ok(None);
    }
    if !status.is_success() {
        return Err(EnrichmentError::UnexpectedStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response
        .json::<Value>()
        .await
        .map_err(|e| EnrichmentError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })?;
    Ok(Some(body))
}

/// Software metadata from Wikidata's entity-data endpoint
pub struct WikidataMetadataSource {
    client: reqwest::Client,
    endpoint: String,
}

impl WikidataMetadataSource {
    pub fn new(endpoint: impl Into<String>, user_agent: &str) -> Result<Self, EnrichmentError> {
        Ok(Self {
            client: build_client(user_agent)?,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SoftwareMetadataSource for WikidataMetadataSource {
    async fn lookup_software_metadata(
        &self,
        wikidata_id: &str,
    ) -> Result<Option<SoftwareMetadata>, EnrichmentError> {
        let url = format!(
            "{}/wiki/Special:EntityData/{}.json",
            self.endpoint, wikidata_id
        );
        match get_json(&self.client, &url).await? {
            Some(body) => Ok(parse_wikidata_entity(wikidata_id, &body)),
            None => Ok(None),
        }
    }
}

/// Extract metadata for `wikidata_id` from an entity-data document.
///
/// A document that does not contain the entity counts as "not found".
pub fn parse_wikidata_entity(wikidata_id: &str, body: &Value) -> Option<SoftwareMetadata> {
    let entity = body.get("entities")?.get(wikidata_id)?;

    let localized = |field: &str| -> Option<String> {
        let values = entity.get(field)?;
        PREFERRED_LANGUAGES
            .iter()
            .find_map(|lang| values.get(lang)?.get("value")?.as_str())
            .map(str::to_string)
    };

    let claim = |property: &str| -> Option<String> {
        entity
            .get("claims")?
            .get(property)?
            .as_array()?
            .iter()
            .find_map(|c| c.get("mainsnak")?.get("datavalue")?.get("value")?.as_str())
            .map(str::to_string)
    };

    Some(SoftwareMetadata {
        wikidata_id: wikidata_id.to_string(),
        label: localized("labels"),
        description: localized("descriptions"),
        logo_url: claim(LOGO_IMAGE).map(|file| {
            format!(
                "https://commons.wikimedia.org/wiki/Special:FilePath/{}",
                file.replace(' ', "_")
            )
        }),
        website_url: claim(OFFICIAL_WEBSITE),
        source_url: claim(SOURCE_REPOSITORY),
        documentation_url: claim(USER_MANUAL_URL),
    })
}

/// Support providers from the CNLL directory
pub struct CnllProviderSource {
    client: reqwest::Client,
    endpoint: String,
}

impl CnllProviderSource {
    pub fn new(endpoint: impl Into<String>, user_agent: &str) -> Result<Self, EnrichmentError> {
        Ok(Self {
            client: build_client(user_agent)?,
            endpoint: endpoint.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct CnllEntry {
    sill_id: SoftwareId,
    #[serde(default)]
    prestataires: Vec<CnllProvider>,
}

#[derive(Debug, Deserialize)]
struct CnllProvider {
    nom: String,
    #[serde(default)]
    siren: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[async_trait]
impl ProviderSource for CnllProviderSource {
    async fn lookup_providers(
        &self,
    ) -> Result<HashMap<SoftwareId, Vec<ServiceProvider>>, EnrichmentError> {
        match get_json(&self.client, &self.endpoint).await? {
            Some(body) => parse_cnll_directory(&body).map_err(|message| EnrichmentError::Decode {
                url: self.endpoint.clone(),
                message,
            }),
            None => Ok(HashMap::new()),
        }
    }
}

/// Group a CNLL directory document by catalog software id.
pub fn parse_cnll_directory(
    body: &Value,
) -> Result<HashMap<SoftwareId, Vec<ServiceProvider>>, String> {
    let entries: Vec<CnllEntry> =
        serde_json::from_value(body.clone()).map_err(|e| e.to_string())?;

    let mut by_software: HashMap<SoftwareId, Vec<ServiceProvider>> = HashMap::new();
    for entry in entries {
        by_software
            .entry(entry.sill_id)
            .or_default()
            .extend(entry.prestataires.into_iter().map(|p| ServiceProvider {
                name: p.nom,
                siren: p.siren,
                url: p.url,
            }));
    }
    Ok(by_software)
}

/// Latest release of GitHub-hosted repositories
///
/// Repositories hosted elsewhere are "not found".
pub struct GitHubLatestVersionSource {
    client: reqwest::Client,
    api: String,
}

impl GitHubLatestVersionSource {
    pub fn new(api: impl Into<String>, user_agent: &str) -> Result<Self, EnrichmentError> {
        Ok(Self {
            client: build_client(user_agent)?,
            api: api.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl LatestVersionSource for GitHubLatestVersionSource {
    async fn lookup_latest_version(
        &self,
        repo_url: &str,
    ) -> Result<Option<LatestVersion>, EnrichmentError> {
        let Some((owner, repo)) = github_repository(repo_url) else {
            return Ok(None);
        };
        let url = format!("{}/repos/{}/{}/releases/latest", self.api, owner, repo);
        match get_json(&self.client, &url).await? {
            Some(body) => Ok(parse_github_release(&body)),
            None => Ok(None),
        }
    }
}

/// `(owner, repo)` of a github.com repository URL
pub fn github_repository(repo_url: &str) -> Option<(String, String)> {
    let rest = repo_url
        .trim()
        .strip_prefix("https://github.com/")
        .or_else(|| repo_url.trim().strip_prefix("http://github.com/"))?;
    let mut parts = rest.trim_end_matches('/').split('/');
    let owner = parts.next().filter(|s| !s.is_empty())?;
    let repo = parts.next().filter(|s| !s.is_empty())?;
    Some((owner.to_string(), repo.trim_end_matches(".git").to_string()))
}

fn parse_github_release(body: &Value) -> Option<LatestVersion> {
    let tag = body.get("tag_name")?.as_str()?;
    let published = body.get("published_at")?.as_str()?;
    let publication_time = chrono::DateTime::parse_from_rfc3339(published)
        .ok()?
        .timestamp_millis();
    Some(LatestVersion {
        version: tag.trim_start_matches('v').to_string(),
        publication_time,
    })
}
