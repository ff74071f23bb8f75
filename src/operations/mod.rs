//! Catalog Operations
//!
//! The externally visible mutations. Each one validates against the cloned
//! rows handed over by [`TransactionCoordinator::execute`], edits them, and
//! names the change; none adds concurrency behavior of its own.

pub mod forms;

pub use forms::{AgentRef, DeclarationForm, DeclarationKind, InstanceForm, SoftwareForm};

use crate::error::ApiError;
use crate::rows::{
    validate_email, validate_software_name, Dereferencing, InstanceRow, SoftwareReferentRow,
    SoftwareRow, SoftwareUserRow,
};
use crate::transaction::{TransactionCoordinator, Transition};
use crate::types::{now_millis, InstanceId, SoftwareId, Timestamp};
use tracing::info;

fn committed<T>(outcome: Option<T>, operation: &str) -> Result<T, ApiError> {
    outcome.ok_or_else(|| ApiError::InvalidInput(format!("{} committed no change", operation)))
}

fn check_agent(agent: &AgentRef) -> Result<(), ApiError> {
    validate_email(&agent.email).map_err(ApiError::InvalidInput)?;
    if agent.organization.trim().is_empty() {
        return Err(ApiError::InvalidInput(
            "Agent organization cannot be empty".to_string(),
        ));
    }
    Ok(())
}

impl TransactionCoordinator {
    /// Reference a new software; returns its id
    pub async fn create_software(
        &self,
        form: SoftwareForm,
        agent: AgentRef,
    ) -> Result<SoftwareId, ApiError> {
        validate_software_name(&form.name).map_err(ApiError::InvalidInput)?;
        check_agent(&agent)?;

        let outcome = self
            .execute(move |mut rows| {
                if let Some(existing) = rows.software_by_name(&form.name) {
                    return Err(ApiError::DuplicateSoftwareName(existing.name.clone()));
                }
                let id = rows.next_software_id();
                rows.ensure_agent(&agent.email, &agent.organization);
                let message = format!("Add software {} (id {}) by {}", form.name, id, agent.email);
                rows.software.push(SoftwareRow {
                    id,
                    name: form.name,
                    description: form.description,
                    license: form.license,
                    version_min: form.version_min,
                    categories: form.categories,
                    similar_software: form.similar_software,
                    wikidata_id: form.wikidata_id,
                    comptoir_du_libre_id: form.comptoir_du_libre_id,
                    dereferencing: None,
                    referenced_since_time: now_millis(),
                    added_by_agent_email: agent.email,
                });
                Ok(Some(Transition::with_value(rows, message, id)))
            })
            .await?;
        committed(outcome, "create_software")
    }

    /// Replace the descriptive fields of a software
    pub async fn update_software(
        &self,
        software_id: SoftwareId,
        form: SoftwareForm,
    ) -> Result<(), ApiError> {
        validate_software_name(&form.name).map_err(ApiError::InvalidInput)?;

        self.execute(move |mut rows| {
            if let Some(other) = rows.software_by_name(&form.name) {
                if other.id != software_id {
                    return Err(ApiError::DuplicateSoftwareName(other.name.clone()));
                }
            }
            let software = rows
                .software_by_id_mut(software_id)
                .ok_or_else(|| ApiError::SoftwareNotFound(software_id.to_string()))?;
            let message = format!("Update software {} (id {})", form.name, software_id);
            let old_name = std::mem::replace(&mut software.name, form.name.clone());
            software.description = form.description;
            software.license = form.license;
            software.version_min = form.version_min;
            software.categories = form.categories;
            software.similar_software = form.similar_software;
            software.wikidata_id = form.wikidata_id;
            software.comptoir_du_libre_id = form.comptoir_du_libre_id;
            let renamed = rows.rename_similar_references(&old_name, &form.name);
            if renamed > 0 {
                info!(
                    software_id,
                    old_name = %old_name,
                    new_name = %form.name,
                    renamed,
                    "Rewrote similar-software references to renamed software"
                );
            }
            Ok(Some(Transition::new(rows, message)))
        })
        .await?;
        Ok(())
    }

    /// Declare `agent` as user or referent of a software
    pub async fn create_user_or_referent(
        &self,
        software_id: SoftwareId,
        agent: AgentRef,
        form: DeclarationForm,
    ) -> Result<(), ApiError> {
        check_agent(&agent)?;

        self.execute(move |mut rows| {
            let software_name = rows
                .software_by_id(software_id)
                .map(|s| s.name.clone())
                .ok_or_else(|| ApiError::SoftwareNotFound(software_id.to_string()))?;
            let kind = form.kind();

            match form {
                DeclarationForm::Referent {
                    is_expert,
                    use_case_description,
                    service_url,
                } => {
                    if rows.is_referent(software_id, &agent.email) {
                        return Err(ApiError::AlreadyReferent {
                            email: agent.email,
                            software_id,
                        });
                    }
                    rows.software_referents.push(SoftwareReferentRow {
                        software_id,
                        agent_email: agent.email.clone(),
                        is_expert,
                        use_case_description,
                        service_url,
                    });
                }
                DeclarationForm::User {
                    os,
                    version,
                    service_url,
                    use_case_description,
                } => {
                    if rows.is_user(software_id, &agent.email) {
                        return Err(ApiError::AlreadyUser {
                            email: agent.email,
                            software_id,
                        });
                    }
                    rows.software_users.push(SoftwareUserRow {
                        software_id,
                        agent_email: agent.email.clone(),
                        os,
                        version,
                        service_url,
                        use_case_description,
                    });
                }
            }
            rows.ensure_agent(&agent.email, &agent.organization);

            let message = format!(
                "{} is now {} of {} (id {})",
                agent.email,
                kind.as_str(),
                software_name,
                software_id
            );
            Ok(Some(Transition::new(rows, message)))
        })
        .await?;
        Ok(())
    }

    /// Withdraw a declaration; the agent row goes away with its last reference
    pub async fn remove_user_or_referent(
        &self,
        software_id: SoftwareId,
        agent_email: &str,
        kind: DeclarationKind,
    ) -> Result<(), ApiError> {
        let agent_email = agent_email.to_string();

        self.execute(move |mut rows| {
            let software_name = rows
                .software_by_id(software_id)
                .map(|s| s.name.clone())
                .ok_or_else(|| ApiError::SoftwareNotFound(software_id.to_string()))?;

            let removed = match kind {
                DeclarationKind::Referent => {
                    let before = rows.software_referents.len();
                    rows.software_referents
                        .retain(|r| !(r.software_id == software_id && r.agent_email == agent_email));
                    before != rows.software_referents.len()
                }
                DeclarationKind::User => {
                    let before = rows.software_users.len();
                    rows.software_users
                        .retain(|u| !(u.software_id == software_id && u.agent_email == agent_email));
                    before != rows.software_users.len()
                }
            };
            if !removed {
                return Err(ApiError::DeclarationNotFound {
                    email: agent_email,
                    software_id,
                    kind: kind.as_str(),
                });
            }

            if rows.remove_agent_if_unreferenced(&agent_email) {
                info!(agent_email = %agent_email, "Removed agent with no remaining references");
            }

            let message = format!(
                "{} is no longer {} of {} (id {})",
                agent_email,
                kind.as_str(),
                software_name,
                software_id
            );
            Ok(Some(Transition::new(rows, message)))
        })
        .await?;
        Ok(())
    }

    /// Register a deployment of a catalogued software; returns its id
    pub async fn create_instance(
        &self,
        form: InstanceForm,
        agent: AgentRef,
    ) -> Result<InstanceId, ApiError> {
        check_agent(&agent)?;

        let outcome = self
            .execute(move |mut rows| {
                if rows.software_by_id(form.main_software_id).is_none() {
                    return Err(ApiError::SoftwareNotFound(form.main_software_id.to_string()));
                }
                let id = rows.next_instance_id();
                rows.ensure_agent(&agent.email, &agent.organization);
                let message = format!(
                    "Add instance {} of software {} by {}",
                    id, form.main_software_id, agent.email
                );
                rows.instances.push(InstanceRow {
                    id,
                    main_software_id: form.main_software_id,
                    organization: form.organization,
                    target_audience: form.target_audience,
                    public_url: form.public_url,
                    other_software_wikidata_ids: form.other_software_wikidata_ids,
                    added_by_agent_email: agent.email,
                });
                Ok(Some(Transition::with_value(rows, message, id)))
            })
            .await?;
        committed(outcome, "create_instance")
    }

    pub async fn update_instance(
        &self,
        instance_id: InstanceId,
        form: InstanceForm,
    ) -> Result<(), ApiError> {
        self.execute(move |mut rows| {
            if rows.software_by_id(form.main_software_id).is_none() {
                return Err(ApiError::SoftwareNotFound(form.main_software_id.to_string()));
            }
            let instance = rows
                .instance_by_id_mut(instance_id)
                .ok_or(ApiError::InstanceNotFound(instance_id))?;
            instance.main_software_id = form.main_software_id;
            instance.organization = form.organization;
            instance.target_audience = form.target_audience;
            instance.public_url = form.public_url;
            instance.other_software_wikidata_ids = form.other_software_wikidata_ids;
            let message = format!("Update instance {}", instance_id);
            Ok(Some(Transition::new(rows, message)))
        })
        .await?;
        Ok(())
    }

    pub async fn change_agent_organization(
        &self,
        email: &str,
        organization: &str,
    ) -> Result<(), ApiError> {
        if organization.trim().is_empty() {
            return Err(ApiError::InvalidInput(
                "Agent organization cannot be empty".to_string(),
            ));
        }
        let email = email.to_string();
        let organization = organization.to_string();

        self.execute(move |mut rows| {
            let agent = rows
                .agent_by_email_mut(&email)
                .ok_or_else(|| ApiError::AgentNotFound(email.clone()))?;
            let message = format!(
                "Change organization of {} from {} to {}",
                email, agent.organization, organization
            );
            agent.organization = organization;
            Ok(Some(Transition::new(rows, message)))
        })
        .await?;
        Ok(())
    }

    /// Rename an agent everywhere its email appears.
    ///
    /// Unknown agents are ignored: the user directory reports every email
    /// change, including users who never declared anything.
    pub async fn update_agent_email(&self, old_email: &str, new_email: &str) -> Result<(), ApiError> {
        validate_email(new_email).map_err(ApiError::InvalidInput)?;
        let old_email = old_email.to_string();
        let new_email = new_email.to_string();

        self.execute(move |mut rows| {
            if old_email == new_email || rows.agent_by_email(&old_email).is_none() {
                return Ok(None);
            }
            if rows.agent_by_email(&new_email).is_some() {
                return Err(ApiError::AgentEmailTaken(new_email));
            }
            rows.rename_agent_email(&old_email, &new_email);
            let message = format!("Update agent email from {} to {}", old_email, new_email);
            Ok(Some(Transition::new(rows, message)))
        })
        .await?;
        Ok(())
    }

    /// Edit the free-text presentation and visibility of an agent
    pub async fn update_agent_profile(
        &self,
        email: &str,
        about: Option<String>,
        is_public: bool,
    ) -> Result<(), ApiError> {
        let email = email.to_string();

        self.execute(move |mut rows| {
            let agent = rows
                .agent_by_email_mut(&email)
                .ok_or_else(|| ApiError::AgentNotFound(email.clone()))?;
            agent.about = about;
            agent.is_public = is_public;
            let message = format!("Update profile of {}", email);
            Ok(Some(Transition::new(rows, message)))
        })
        .await?;
        Ok(())
    }

    /// Mark a software as no longer recommended; the row stays in the catalog
    pub async fn unreference_software(
        &self,
        software_name: &str,
        reason: Option<String>,
        time: Timestamp,
    ) -> Result<(), ApiError> {
        let software_name = software_name.to_string();

        self.execute(move |mut rows| {
            let id = rows
                .software_by_name(&software_name)
                .map(|s| s.id)
                .ok_or_else(|| ApiError::SoftwareNotFound(software_name.clone()))?;
            let Some(software) = rows.software_by_id_mut(id) else {
                return Err(ApiError::SoftwareNotFound(software_name));
            };
            software.dereferencing = Some(Dereferencing {
                reason,
                time,
                last_recommended_version: Some(software.version_min.clone()),
            });
            let message = format!("Dereference software {} (id {})", software.name, id);
            Ok(Some(Transition::new(rows, message)))
        })
        .await?;
        Ok(())
    }
}
