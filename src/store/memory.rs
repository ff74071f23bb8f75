//! In-memory Row Store with commit history and failure injection.

use super::{CommitTarget, RowStore};
use crate::compiler::CompiledView;
use crate::error::StorageError;
use crate::rows::Rows;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

/// A persisted change as the store received it
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCommit {
    Rows { rows: Rows, message: String },
    Build { view: CompiledView, message: String },
}

impl StoreCommit {
    pub fn target(&self) -> CommitTarget {
        match self {
            StoreCommit::Rows { .. } => CommitTarget::Rows,
            StoreCommit::Build { .. } => CommitTarget::Build,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            StoreCommit::Rows { message, .. } | StoreCommit::Build { message, .. } => message,
        }
    }
}

#[derive(Default)]
struct Inner {
    rows: Rows,
    view: CompiledView,
    commits: Vec<StoreCommit>,
    fail_persists: bool,
}

pub struct MemoryRowStore {
    inner: Mutex<Inner>,
    gate: Arc<RwLock<()>>,
}

impl Default for MemoryRowStore {
    fn default() -> Self {
        Self::new(Rows::default(), CompiledView::default())
    }
}

impl MemoryRowStore {
    pub fn new(rows: Rows, view: CompiledView) -> Self {
        Self {
            inner: Mutex::new(Inner {
                rows,
                view,
                ..Inner::default()
            }),
            gate: Arc::new(RwLock::new(())),
        }
    }

    /// Every commit received so far, oldest first
    pub fn commits(&self) -> Vec<StoreCommit> {
        self.inner.lock().commits.clone()
    }

    /// Make every following persist fail
    pub fn set_fail_persists(&self, fail: bool) {
        self.inner.lock().fail_persists = fail;
    }

    /// Replace the stored rows behind the engine's back, as an external
    /// edit of the backing repository would
    pub fn overwrite_rows(&self, rows: Rows) {
        self.inner.lock().rows = rows;
    }

    /// Hold all persistence until the returned guard is dropped
    pub async fn pause(&self) -> OwnedRwLockWriteGuard<()> {
        Arc::clone(&self.gate).write_owned().await
    }

    fn check_failure(&self) -> Result<(), StorageError> {
        if self.inner.lock().fail_persists {
            return Err(StorageError::Unavailable(
                "injected persistence failure".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn fetch_rows(&self) -> Result<Rows, StorageError> {
        Ok(self.inner.lock().rows.clone())
    }

    async fn fetch_compiled_view(&self) -> Result<CompiledView, StorageError> {
        Ok(self.inner.lock().view.clone())
    }

    async fn persist_rows(&self, rows: &Rows, commit_message: &str) -> Result<(), StorageError> {
        let _open = self.gate.read().await;
        self.check_failure()?;
        let mut inner = self.inner.lock();
        inner.rows = rows.clone();
        inner.commits.push(StoreCommit::Rows {
            rows: rows.clone(),
            message: commit_message.to_string(),
        });
        Ok(())
    }

    async fn persist_compiled_view(
        &self,
        view: &CompiledView,
        commit_message: &str,
    ) -> Result<(), StorageError> {
        let _open = self.gate.read().await;
        self.check_failure()?;
        let mut inner = self.inner.lock();
        inner.view = view.clone();
        inner.commits.push(StoreCommit::Build {
            view: view.clone(),
            message: commit_message.to_string(),
        });
        Ok(())
    }
}
