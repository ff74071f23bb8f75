//! State Cache
//!
//! The engine's in-memory source of truth. Readers take an `Arc` snapshot
//! and never wait on a transaction; a commit swaps the whole snapshot.

use crate::compiler::CompiledView;
use crate::rows::Rows;
use parking_lot::RwLock;
use std::sync::Arc;

/// Rows together with the view compiled from exactly those rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogState {
    pub rows: Rows,
    pub compiled: CompiledView,
}

pub struct StateCache {
    current: RwLock<Arc<CatalogState>>,
}

impl StateCache {
    pub fn new(initial: CatalogState) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// Current published state
    pub fn snapshot(&self) -> Arc<CatalogState> {
        self.current.read().clone()
    }

    /// Replace the published state wholesale.
    ///
    /// Only the transaction engine and the recompile commit step call this,
    /// always while holding the transaction lock.
    pub(crate) fn publish(&self, next: CatalogState) -> Arc<CatalogState> {
        let next = Arc::new(next);
        *self.current.write() = Arc::clone(&next);
        next
    }
}
