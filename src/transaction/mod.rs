//! Transaction Engine
//!
//! Every catalog mutation goes through [`TransactionCoordinator::execute`]:
//! take the lock, clone the rows, let the mutator validate and edit the
//! clone, drop no-ops, compile, publish, then enqueue persistence. Callers
//! are released once the new state is published in memory.

mod persist;

pub use persist::{exit_process, FatalHandler};

use crate::compiler::Compiler;
use crate::error::ApiError;
use crate::rows::Rows;
use crate::state::{CatalogState, StateCache};
use crate::store::RowStore;
use persist::Persister;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Commit message used when rows changed outside the engine
pub const EXTERNAL_UPDATE_MESSAGE: &str = "Recompile after external update of the catalog rows";

/// What a mutator wants committed
#[derive(Debug, Clone)]
pub struct Transition<T = ()> {
    pub rows: Rows,
    pub commit_message: String,
    pub value: T,
}

impl Transition<()> {
    pub fn new(rows: Rows, commit_message: impl Into<String>) -> Self {
        Self::with_value(rows, commit_message, ())
    }
}

impl<T> Transition<T> {
    pub fn with_value(rows: Rows, commit_message: impl Into<String>, value: T) -> Self {
        Self {
            rows,
            commit_message: commit_message.into(),
            value,
        }
    }
}

/// Owns the transaction lock, the State Cache and the persistence worker
pub struct TransactionCoordinator {
    lock: Mutex<()>,
    state: StateCache,
    compiler: Compiler,
    store: Arc<dyn RowStore>,
    persister: Persister,
}

impl TransactionCoordinator {
    /// Load rows and the last compiled view from the store.
    ///
    /// Persistence failures terminate the process.
    pub async fn open(store: Arc<dyn RowStore>, compiler: Compiler) -> Result<Self, ApiError> {
        Self::open_with_fatal_handler(store, compiler, exit_process()).await
    }

    pub async fn open_with_fatal_handler(
        store: Arc<dyn RowStore>,
        compiler: Compiler,
        on_fatal: FatalHandler,
    ) -> Result<Self, ApiError> {
        let rows = store.fetch_rows().await?;
        let compiled = store.fetch_compiled_view().await?;
        info!(
            software_count = rows.software.len(),
            agent_count = rows.agents.len(),
            compiled_count = compiled.len(),
            "Loaded catalog from row store"
        );

        Ok(Self {
            lock: Mutex::new(()),
            state: StateCache::new(CatalogState { rows, compiled }),
            compiler,
            persister: Persister::spawn(Arc::clone(&store), on_fatal),
            store,
        })
    }

    /// Current published state; never waits on a transaction
    pub fn snapshot(&self) -> Arc<CatalogState> {
        self.state.snapshot()
    }

    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }

    /// Whether a persistence failure has stopped the engine
    pub fn is_poisoned(&self) -> bool {
        self.persister.is_poisoned()
    }

    /// Run one serialized transaction.
    ///
    /// The mutator receives a private clone of the current rows. Returning
    /// `Ok(None)`, or rows equal to the input, commits nothing and yields
    /// `Ok(None)`. An error from the mutator or from compiling its rows
    /// aborts with no visible effect.
    pub async fn execute<T, F>(&self, mutator: F) -> Result<Option<T>, ApiError>
    where
        F: FnOnce(Rows) -> Result<Option<Transition<T>>, ApiError> + Send,
        T: Send,
    {
        let guard = self.lock().await?;
        let current = self.state.snapshot();

        let Some(transition) = mutator(current.rows.clone())? else {
            debug!("Mutator declined; nothing to commit");
            return Ok(None);
        };
        if transition.rows == current.rows {
            debug!(
                commit_message = %transition.commit_message,
                "Transaction left rows unchanged; skipping commit"
            );
            return Ok(None);
        }

        let compiled = match self
            .compiler
            .compile(&transition.rows, Some(&current.compiled))
            .await
        {
            Ok(compiled) => compiled,
            Err(e) => {
                warn!(
                    error = %e,
                    commit_message = %transition.commit_message,
                    "Compilation failed; transaction aborted"
                );
                return Err(e.into());
            }
        };

        let Transition {
            rows,
            commit_message,
            value,
        } = transition;
        self.commit_locked(
            &guard,
            CatalogState { rows, compiled },
            true,
            commit_message,
        )?;
        Ok(Some(value))
    }

    /// Re-read rows from the store after the backing repository changed.
    ///
    /// Returns `true` if the rows differed and a new view was published.
    pub async fn notify_external_update(&self) -> Result<bool, ApiError> {
        let guard = self.lock().await?;
        // Queued commits must land first or the store reads behind memory
        self.persister.flush().await?;
        let rows = self.store.fetch_rows().await?;
        let current = self.state.snapshot();
        if rows == current.rows {
            debug!("External update notification with unchanged rows");
            return Ok(false);
        }

        let compiled = self.compiler.compile(&rows, Some(&current.compiled)).await?;
        info!(
            software_count = rows.software.len(),
            "Rows changed outside the engine; republishing"
        );
        self.commit_locked(
            &guard,
            CatalogState { rows, compiled },
            false,
            EXTERNAL_UPDATE_MESSAGE.to_string(),
        )?;
        Ok(true)
    }

    /// Wait until every commit published so far has been persisted
    pub async fn flush(&self) -> Result<(), ApiError> {
        self.persister.flush().await
    }

    /// Acquire the transaction lock, refusing once poisoned
    pub(crate) async fn lock(&self) -> Result<MutexGuard<'_, ()>, ApiError> {
        if self.persister.is_poisoned() {
            return Err(ApiError::Poisoned);
        }
        let guard = self.lock.lock().await;
        if self.persister.is_poisoned() {
            return Err(ApiError::Poisoned);
        }
        Ok(guard)
    }

    /// Publish `next` and queue it for persistence.
    ///
    /// The guard argument proves the caller holds the transaction lock.
    pub(crate) fn commit_locked(
        &self,
        _guard: &MutexGuard<'_, ()>,
        next: CatalogState,
        persist_rows: bool,
        commit_message: String,
    ) -> Result<(), ApiError> {
        let published = self.state.publish(next);
        info!(commit_message = %commit_message, persist_rows, "Published catalog state");
        self.persister.enqueue(published, persist_rows, commit_message)
    }
}
