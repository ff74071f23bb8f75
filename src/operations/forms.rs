//! Input forms for catalog operations.

use crate::rows::{Os, SimilarSoftwareRef};
use crate::types::SoftwareId;
use serde::{Deserialize, Serialize};

/// The authenticated agent performing an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRef {
    pub email: String,
    pub organization: String,
}

impl AgentRef {
    pub fn new(email: impl Into<String>, organization: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            organization: organization.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoftwareForm {
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
}

impl SoftwareForm {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Which declaration table an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationKind {
    User,
    Referent,
}

impl DeclarationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclarationKind::User => "user",
            DeclarationKind::Referent => "referent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum DeclarationForm {
    User {
        os: Option<Os>,
        version: String,
        service_url: Option<String>,
        #[serde(default)]
        use_case_description: String,
    },
    Referent {
        is_expert: bool,
        use_case_description: String,
        service_url: Option<String>,
    },
}

impl DeclarationForm {
    pub fn kind(&self) -> DeclarationKind {
        match self {
            DeclarationForm::User { .. } => DeclarationKind::User,
            DeclarationForm::Referent { .. } => DeclarationKind::Referent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceForm {
    pub main_software_id: SoftwareId,
    pub organization: String,
    pub target_audience: String,
    #[serde(default)]
    pub public_url: Option<String>,
    #[serde(default)]
    pub other_software_wikidata_ids: Vec<String>,
}
