//! Row Store
//!
//! Durable home of the normalized rows and of the compiled view. Every write
//! carries a commit message that the backing store keeps as the audit label
//! of the change. Rows and the compiled view live in separate locations; the
//! view is read back from the "build" location.

pub mod memory;
pub mod persistence;

use crate::compiler::CompiledView;
use crate::error::StorageError;
use crate::rows::Rows;
use crate::types::Timestamp;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::{MemoryRowStore, StoreCommit};
pub use persistence::SledRowStore;

/// Which location a commit was written to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitTarget {
    Rows,
    Build,
}

/// One entry of the store's append-only history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub sequence: u64,
    pub time: Timestamp,
    pub target: CommitTarget,
    pub message: String,
}

/// Row Store interface
///
/// Reads always reflect the store's current reference. A store that has
/// never been written returns empty rows and an empty view.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn fetch_rows(&self) -> Result<Rows, StorageError>;
    async fn fetch_compiled_view(&self) -> Result<CompiledView, StorageError>;
    async fn persist_rows(&self, rows: &Rows, commit_message: &str) -> Result<(), StorageError>;
    async fn persist_compiled_view(
        &self,
        view: &CompiledView,
        commit_message: &str,
    ) -> Result<(), StorageError>;
}
