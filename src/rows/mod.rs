//! Normalized Rows
//!
//! The minimally processed tables the catalog is made of. The whole set is
//! small enough to be cloned, compared and rewritten wholesale on every
//! transaction, so every table is a plain `Vec` ordered by insertion.

pub mod validation;

use crate::types::{InstanceId, SoftwareId, Timestamp};
use serde::{Deserialize, Serialize};

pub use validation::{normalize_software_name, validate_email, validate_software_name};

/// Reference from one software to something it resembles
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SimilarSoftwareRef {
    /// Another catalogued software, by name
    InCatalog { software_name: String },
    /// An entry known only to the external metadata source
    External { wikidata_id: String },
}

/// Why and when a software left the recommended catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dereferencing {
    pub reason: Option<String>,
    pub time: Timestamp,
    pub last_recommended_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoftwareRow {
    pub id: SoftwareId,
    pub name: String,
    pub description: String,
    pub license: String,
    pub version_min: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub similar_software: Vec<SimilarSoftwareRef>,
    #[serde(default)]
    pub wikidata_id: Option<String>,
    #[serde(default)]
    pub comptoir_du_libre_id: Option<u64>,
    #[serde(default)]
    pub dereferencing: Option<Dereferencing>,
    pub referenced_since_time: Timestamp,
    pub added_by_agent_email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRow {
    pub email: String,
    pub organization: String,
    #[serde(default)]
    pub about: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoftwareReferentRow {
    pub software_id: SoftwareId,
    pub agent_email: String,
    pub is_expert: bool,
    pub use_case_description: String,
    #[serde(default)]
    pub service_url: Option<String>,
}

/// Operating system a user runs the software on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Windows,
    Linux,
    Mac,
    Android,
    Ios,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoftwareUserRow {
    pub software_id: SoftwareId,
    pub agent_email: String,
    #[serde(default)]
    pub os: Option<Os>,
    pub version: String,
    #[serde(default)]
    pub service_url: Option<String>,
    #[serde(default)]
    pub use_case_description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRow {
    pub id: InstanceId,
    pub main_software_id: SoftwareId,
    pub organization: String,
    pub target_audience: String,
    #[serde(default)]
    pub public_url: Option<String>,
    #[serde(default)]
    pub other_software_wikidata_ids: Vec<String>,
    pub added_by_agent_email: String,
}

/// The complete normalized dataset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rows {
    pub software: Vec<SoftwareRow>,
    pub agents: Vec<AgentRow>,
    pub software_referents: Vec<SoftwareReferentRow>,
    pub software_users: Vec<SoftwareUserRow>,
    pub instances: Vec<InstanceRow>,
}

impl Rows {
    pub fn software_by_id(&self, id: SoftwareId) -> Option<&SoftwareRow> {
        self.software.iter().find(|s| s.id == id)
    }

    pub fn software_by_id_mut(&mut self, id: SoftwareId) -> Option<&mut SoftwareRow> {
        self.software.iter_mut().find(|s| s.id == id)
    }

    /// Find a software by name, ignoring case and whitespace
    pub fn software_by_name(&self, name: &str) -> Option<&SoftwareRow> {
        let wanted = normalize_software_name(name);
        self.software
            .iter()
            .find(|s| normalize_software_name(&s.name) == wanted)
    }

    pub fn instance_by_id_mut(&mut self, id: InstanceId) -> Option<&mut InstanceRow> {
        self.instances.iter_mut().find(|i| i.id == id)
    }

    pub fn agent_by_email(&self, email: &str) -> Option<&AgentRow> {
        self.agents.iter().find(|a| a.email == email)
    }

    pub fn agent_by_email_mut(&mut self, email: &str) -> Option<&mut AgentRow> {
        self.agents.iter_mut().find(|a| a.email == email)
    }

    /// Next software id: one past the highest ever assigned, or 1 when empty
    pub fn next_software_id(&self) -> SoftwareId {
        self.software.iter().map(|s| s.id).max().map_or(1, |max| max + 1)
    }

    /// Next instance id: one past the highest ever assigned, or 1 when empty
    pub fn next_instance_id(&self) -> InstanceId {
        self.instances.iter().map(|i| i.id).max().map_or(1, |max| max + 1)
    }

    /// Make sure an agent row exists for `email`.
    ///
    /// An existing row keeps its organization.
    pub fn ensure_agent(&mut self, email: &str, organization: &str) {
        if self.agent_by_email(email).is_none() {
            self.agents.push(AgentRow {
                email: email.to_string(),
                organization: organization.to_string(),
                about: None,
                is_public: false,
            });
        }
    }

    pub fn is_referent(&self, software_id: SoftwareId, email: &str) -> bool {
        self.software_referents
            .iter()
            .any(|r| r.software_id == software_id && r.agent_email == email)
    }

    pub fn is_user(&self, software_id: SoftwareId, email: &str) -> bool {
        self.software_users
            .iter()
            .any(|u| u.software_id == software_id && u.agent_email == email)
    }

    /// Whether any table still points at the agent's email
    pub fn agent_is_referenced(&self, email: &str) -> bool {
        self.software_referents.iter().any(|r| r.agent_email == email)
            || self.software_users.iter().any(|u| u.agent_email == email)
            || self.software.iter().any(|s| s.added_by_agent_email == email)
            || self.instances.iter().any(|i| i.added_by_agent_email == email)
    }

    /// Drop the agent row once nothing references it anymore.
    ///
    /// Returns `true` if the row was removed.
    pub fn remove_agent_if_unreferenced(&mut self, email: &str) -> bool {
        if self.agent_is_referenced(email) {
            return false;
        }
        let before = self.agents.len();
        self.agents.retain(|a| a.email != email);
        self.agents.len() != before
    }

    /// Point in-catalog similarity references at a software's new name.
    ///
    /// Returns the number of references rewritten.
    pub fn rename_similar_references(&mut self, old_name: &str, new_name: &str) -> usize {
        let old_key = normalize_software_name(old_name);
        if old_key == normalize_software_name(new_name) {
            return 0;
        }
        let mut renamed = 0;
        for reference in self
            .software
            .iter_mut()
            .flat_map(|s| s.similar_software.iter_mut())
        {
            if let SimilarSoftwareRef::InCatalog { software_name } = reference {
                if normalize_software_name(software_name) == old_key {
                    *software_name = new_name.to_string();
                    renamed += 1;
                }
            }
        }
        renamed
    }

    /// Rewrite every occurrence of an agent email across all tables
    pub fn rename_agent_email(&mut self, old_email: &str, new_email: &str) {
        for agent in self.agents.iter_mut().filter(|a| a.email == old_email) {
            agent.email = new_email.to_string();
        }
        for referent in self
            .software_referents
            .iter_mut()
            .filter(|r| r.agent_email == old_email)
        {
            referent.agent_email = new_email.to_string();
        }
        for user in self
            .software_users
            .iter_mut()
            .filter(|u| u.agent_email == old_email)
        {
            user.agent_email = new_email.to_string();
        }
        for software in self
            .software
            .iter_mut()
            .filter(|s| s.added_by_agent_email == old_email)
        {
            software.added_by_agent_email = new_email.to_string();
        }
        for instance in self
            .instances
            .iter_mut()
            .filter(|i| i.added_by_agent_email == old_email)
        {
            instance.added_by_agent_email = new_email.to_string();
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_rename_similar_references_matches_normalized_name() {
        let mut first = software(1, "Foo", "a@x.org");
        first.similar_software = vec![
            SimilarSoftwareRef::InCatalog {
                software_name: " foo".to_string(),
            },
            SimilarSoftwareRef::External {
                wikidata_id: "Q1".to_string(),
            },
        ];
        let mut rows = Rows {
            software: vec![first],
            ..Rows::default()
        };

        assert_eq!(rows.rename_similar_references("Foo", "Bar"), 1);
        assert_eq!(
            rows.software[0].similar_software[0],
            SimilarSoftwareRef::InCatalog {
                software_name: "Bar".to_string()
            }
        );
        assert_eq!(rows.rename_similar_references("Bar", "BAR"), 0);
    }

    #[test]
    fn test_next_ids_start_at_one() {
        let rows = Rows::default();
        assert_eq!(rows.next_software_id(), 1);
        assert_eq!(rows.next_instance_id(), 1);
    }

    #[test]
    fn test_next_software_id_follows_max_not_len() {
        let mut rows = Rows::default();
        rows.software.push(software(3, "a", "x@y.org"));
        rows.software.push(software(9, "b", "x@y.org"));
        assert_eq!(rows.next_software_id(), 10);
    }

    #[test]
    fn test_software_by_name_ignores_case_and_spaces() {
        let mut rows = Rows::default();
        rows.software.push(software(1, "Libre Office", "x@y.org"));
        assert_eq!(rows.software_by_name("libreoffice").map(|s| s.id), Some(1));
        assert_eq!(rows.software_by_name(" LIBRE  office ").map(|s| s.id), Some(1));
        assert!(rows.software_by_name("libre-office").is_none());
    }

    #[test]
    fn test_agent_kept_while_referenced_anywhere() {
        let mut rows = Rows::default();
        rows.agents.push(agent("a@x.org", "DINUM"));
        rows.software.push(software(1, "Foo", "a@x.org"));
        assert!(!rows.remove_agent_if_unreferenced("a@x.org"));
        assert_eq!(rows.agents.len(), 1);

        rows.software[0].added_by_agent_email = "other@x.org".to_string();
        rows.software_users.push(user(1, "a@x.org"));
        assert!(!rows.remove_agent_if_unreferenced("a@x.org"));

        rows.software_users.clear();
        assert!(rows.remove_agent_if_unreferenced("a@x.org"));
        assert!(rows.agents.is_empty());
    }

    #[test]
    fn test_rename_agent_email_touches_every_table() {
        let mut rows = Rows::default();
        rows.agents.push(agent("old@x.org", "DINUM"));
        rows.software.push(software(1, "Foo", "old@x.org"));
        rows.software_referents.push(referent(1, "old@x.org", true));
        rows.software_users.push(user(1, "old@x.org"));

        rows.rename_agent_email("old@x.org", "new@x.org");

        assert!(!rows.agent_is_referenced("old@x.org"));
        assert!(rows.agent_by_email("new@x.org").is_some());
        assert_eq!(rows.software[0].added_by_agent_email, "new@x.org");
        assert!(rows.is_referent(1, "new@x.org"));
        assert!(rows.is_user(1, "new@x.org"));
    }

    #[test]
    fn test_rows_json_uses_camel_case() {
        let mut rows = Rows::default();
        rows.software.push(software(1, "Foo", "a@x.org"));
        rows.software[0]
            .similar_software
            .push(SimilarSoftwareRef::External {
                wikidata_id: "Q42".to_string(),
            });
        let json = serde_json::to_value(&rows).unwrap();
        assert!(json.get("softwareReferents").is_some());
        let similar = &json["software"][0]["similarSoftware"][0];
        assert_eq!(similar["kind"], "external");
        assert_eq!(similar["wikidataId"], "Q42");
        let back: Rows = serde_json::from_value(json).unwrap();
        assert_eq!(back, rows);
    }
}
