//! Ordered background persistence.
//!
//! Commits are published in memory first and handed to a single worker task
//! that writes them to the Row Store in commit order. The first failure
//! poisons the engine and hands the error to the fatal handler; nothing after
//! it is written.

use crate::error::{ApiError, StorageError};
use crate::state::CatalogState;
use crate::store::RowStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

/// Called once when persistence fails; the default terminates the process
pub type FatalHandler = Arc<dyn Fn(&StorageError) + Send + Sync>;

/// Fatal handler that exits the process
pub fn exit_process() -> FatalHandler {
    Arc::new(|_error: &StorageError| std::process::exit(1))
}

pub(crate) enum PersistJob {
    Commit {
        state: Arc<CatalogState>,
        persist_rows: bool,
        message: String,
    },
    Flush(oneshot::Sender<()>),
}

pub(crate) struct Persister {
    sender: mpsc::UnboundedSender<PersistJob>,
    poisoned: Arc<AtomicBool>,
}

impl Persister {
    /// Start the worker. Must be called from within a tokio runtime.
    pub(crate) fn spawn(store: Arc<dyn RowStore>, on_fatal: FatalHandler) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let poisoned = Arc::new(AtomicBool::new(false));
        tokio::spawn(Self::worker_loop(
            store,
            receiver,
            Arc::clone(&poisoned),
            on_fatal,
        ));
        Self { sender, poisoned }
    }

    pub(crate) fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    pub(crate) fn enqueue(
        &self,
        state: Arc<CatalogState>,
        persist_rows: bool,
        message: String,
    ) -> Result<(), ApiError> {
        self.sender
            .send(PersistJob::Commit {
                state,
                persist_rows,
                message,
            })
            .map_err(|_| ApiError::Poisoned)
    }

    /// Wait until every job enqueued before this call has been written
    pub(crate) async fn flush(&self) -> Result<(), ApiError> {
        let (done, wait) = oneshot::channel();
        self.sender
            .send(PersistJob::Flush(done))
            .map_err(|_| ApiError::Poisoned)?;
        wait.await.map_err(|_| ApiError::Poisoned)
    }

    async fn worker_loop(
        store: Arc<dyn RowStore>,
        mut receiver: mpsc::UnboundedReceiver<PersistJob>,
        poisoned: Arc<AtomicBool>,
        on_fatal: FatalHandler,
    ) {
        while let Some(job) = receiver.recv().await {
            match job {
                PersistJob::Commit {
                    state,
                    persist_rows,
                    message,
                } => {
                    if let Err(e) = Self::write(store.as_ref(), &state, persist_rows, &message).await
                    {
                        poisoned.store(true, Ordering::SeqCst);
                        error!(
                            error = %e,
                            commit_message = %message,
                            "Persistence failed; in-memory catalog has diverged from durable storage"
                        );
                        on_fatal(&e);
                        return;
                    }
                    debug!(commit_message = %message, persist_rows, "Persisted commit");
                }
                PersistJob::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
    }

    async fn write(
        store: &dyn RowStore,
        state: &CatalogState,
        persist_rows: bool,
        message: &str,
    ) -> Result<(), StorageError> {
        if persist_rows {
            store.persist_rows(&state.rows, message).await?;
        }
        store.persist_compiled_view(&state.compiled, message).await
    }
}
