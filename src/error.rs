//! Error types for the catalog store.

use crate::types::{InstanceId, SoftwareId};
use thiserror::Error;

/// Failures of the durable row store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Failures of an external enrichment lookup.
///
/// A "not found" answer is not an error; collaborators return `Ok(None)` for it.
#[derive(Debug, Clone, Error)]
pub enum EnrichmentError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("malformed response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("failed to build HTTP client: {message}")]
    Client { message: String },
}

/// Failures while turning rows into the compiled view.
#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error("{table} row for software {software_id} references unknown agent {email}")]
    DanglingAgent {
        table: &'static str,
        software_id: SoftwareId,
        email: String,
    },

    #[error("{table} row references unknown software {software_id}")]
    DanglingSoftware {
        table: &'static str,
        software_id: SoftwareId,
    },

    #[error("duplicate {table} row for software {software_id} and agent {email}")]
    DuplicateDeclaration {
        table: &'static str,
        software_id: SoftwareId,
        email: String,
    },

    #[error("enrichment lookup failed: {0}")]
    Enrichment(#[from] EnrichmentError),
}

impl CompileError {
    /// Whether this error means the row set itself violates an invariant.
    pub fn is_integrity_violation(&self) -> bool {
        !matches!(self, CompileError::Enrichment(_))
    }
}

/// API errors surfaced by catalog operations
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("a software named {0:?} is already referenced")]
    DuplicateSoftwareName(String),

    #[error("software not found: {0}")]
    SoftwareNotFound(String),

    #[error("instance not found: {0}")]
    InstanceNotFound(InstanceId),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("agent {email} is already referent of software {software_id}")]
    AlreadyReferent {
        email: String,
        software_id: SoftwareId,
    },

    #[error("agent {email} is already user of software {software_id}")]
    AlreadyUser {
        email: String,
        software_id: SoftwareId,
    },

    #[error("agent {email} has no {kind} declaration for software {software_id}")]
    DeclarationNotFound {
        email: String,
        software_id: SoftwareId,
        kind: &'static str,
    },

    #[error("email already used by another agent: {0}")]
    AgentEmailTaken(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("compilation failed: {0}")]
    Compile(#[from] CompileError),

    #[error("storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("catalog is poisoned: a previous persistence failure left memory ahead of durable storage")]
    Poisoned,
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
