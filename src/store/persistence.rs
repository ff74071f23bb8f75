//! Sled-backed Row Store.
//!
//! Layout: a `rows` tree holding the serialized row set, a `build` tree
//! holding the private compiled view and its public projection, and an
//! `audit` tree of [`AuditEntry`] keyed by a monotonic sequence. Each persist
//! writes its payload and its audit entry in one transaction.

use super::{AuditEntry, CommitTarget, RowStore};
use crate::compiler::CompiledView;
use crate::error::StorageError;
use crate::rows::Rows;
use crate::types::now_millis;
use async_trait::async_trait;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::path::Path;
use tracing::debug;

const ROWS_TREE: &str = "rows";
const BUILD_TREE: &str = "build";
const AUDIT_TREE: &str = "audit";

const ROWS_KEY: &[u8] = b"rows";
const PRIVATE_VIEW_KEY: &[u8] = b"compiled_private";
const PUBLIC_VIEW_KEY: &[u8] = b"compiled_public";

pub struct SledRowStore {
    db: Db,
    rows: Tree,
    build: Tree,
    audit: Tree,
}

impl SledRowStore {
    pub fn new(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = sled::open(path)?;
        Ok(Self {
            rows: db.open_tree(ROWS_TREE)?,
            build: db.open_tree(BUILD_TREE)?,
            audit: db.open_tree(AUDIT_TREE)?,
            db,
        })
    }

    /// Full commit history, oldest first
    pub fn audit_log(&self) -> Result<Vec<AuditEntry>, StorageError> {
        self.audit
            .iter()
            .values()
            .map(|value| Ok(serde_json::from_slice(&value?)?))
            .collect()
    }

    fn audit_entry(
        &self,
        target: CommitTarget,
        message: &str,
    ) -> Result<(u64, Vec<u8>), StorageError> {
        let sequence = self.db.generate_id()?;
        let entry = AuditEntry {
            sequence,
            time: now_millis(),
            target,
            message: message.to_string(),
        };
        Ok((sequence, serde_json::to_vec(&entry)?))
    }

    fn commit(
        &self,
        data: &Tree,
        entries: Vec<(&'static [u8], Vec<u8>)>,
        target: CommitTarget,
        message: &str,
    ) -> Result<(), StorageError> {
        let (sequence, audit_value) = self.audit_entry(target, message)?;

        (data, &self.audit)
            .transaction(|(data_tx, audit_tx)| {
                for (key, value) in &entries {
                    data_tx.insert(*key, value.as_slice())?;
                }
                audit_tx.insert(sequence.to_be_bytes().to_vec(), audit_value.as_slice())?;
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(|e| match e {
                TransactionError::Storage(e) => StorageError::Sled(e),
                TransactionError::Abort(()) => {
                    StorageError::Unavailable("store transaction aborted".to_string())
                }
            })?;

        self.db.flush()?;
        debug!(sequence, ?target, message, "Committed to row store");
        Ok(())
    }
}

#[async_trait]
impl RowStore for SledRowStore {
    async fn fetch_rows(&self) -> Result<Rows, StorageError> {
        match self.rows.get(ROWS_KEY)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Rows::default()),
        }
    }

    async fn fetch_compiled_view(&self) -> Result<CompiledView, StorageError> {
        match self.build.get(PRIVATE_VIEW_KEY)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(CompiledView::default()),
        }
    }

    async fn persist_rows(&self, rows: &Rows, commit_message: &str) -> Result<(), StorageError> {
        let encoded = serde_json::to_vec(rows)?;
        self.commit(
            &self.rows,
            vec![(ROWS_KEY, encoded)],
            CommitTarget::Rows,
            commit_message,
        )
    }

    async fn persist_compiled_view(
        &self,
        view: &CompiledView,
        commit_message: &str,
    ) -> Result<(), StorageError> {
        let private = serde_json::to_vec(view)?;
        let public = serde_json::to_vec(&view.public())?;
        self.commit(
            &self.build,
            vec![(PRIVATE_VIEW_KEY, private), (PUBLIC_VIEW_KEY, public)],
            CommitTarget::Build,
            commit_message,
        )
    }
}
