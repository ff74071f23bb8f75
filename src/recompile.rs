//! Recompilation Scheduler
//!
//! Refreshes the compiled view from external sources outside of any
//! transaction. A pass compiles a snapshot without holding the lock, then
//! commits only if the rows are still the ones it compiled; otherwise the
//! result is thrown away and the pass starts over.

use crate::error::ApiError;
use crate::state::CatalogState;
use crate::transaction::TransactionCoordinator;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// What started a recompilation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecompileTrigger {
    Startup,
    Interval,
    OnDemand,
}

impl RecompileTrigger {
    pub fn commit_message(&self) -> &'static str {
        match self {
            RecompileTrigger::Startup => "Recompile catalog at startup",
            RecompileTrigger::Interval => "Scheduled recompilation of the catalog",
            RecompileTrigger::OnDemand => "Recompilation requested by an operator",
        }
    }
}

/// Outcome of one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecompileReport {
    pub trigger: RecompileTrigger,
    /// Compilations run, including ones discarded as stale
    pub attempts: usize,
    /// Whether a new view was published; an identical view is not
    pub committed: bool,
    pub duration_ms: u64,
}

/// Run a single pass until it commits against up-to-date rows.
///
/// Enrichment is looked up afresh for every software. Lookup failures end
/// the pass with an error and leave the published view untouched.
pub async fn recompile_once(
    coordinator: &TransactionCoordinator,
    trigger: RecompileTrigger,
) -> Result<RecompileReport, ApiError> {
    let start = Instant::now();
    let mut attempts = 0;

    loop {
        attempts += 1;
        let base = coordinator.snapshot();
        let compiled = coordinator.compiler().compile(&base.rows, None).await?;

        let guard = coordinator.lock().await?;
        let current = coordinator.snapshot();
        if current.rows != base.rows {
            drop(guard);
            warn!(
                trigger = ?trigger,
                attempt = attempts,
                "Rows changed during recompilation; discarding stale view"
            );
            continue;
        }

        let committed = current.compiled != compiled;
        if committed {
            coordinator.commit_locked(
                &guard,
                CatalogState {
                    rows: current.rows.clone(),
                    compiled,
                },
                false,
                trigger.commit_message().to_string(),
            )?;
        } else {
            debug!(trigger = ?trigger, "Recompiled view is unchanged");
        }

        let report = RecompileReport {
            trigger,
            attempts,
            committed,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            trigger = ?report.trigger,
            attempts = report.attempts,
            committed = report.committed,
            duration_ms = report.duration_ms,
            "Recompilation pass finished"
        );
        return Ok(report);
    }
}

/// Background task running [`recompile_once`] on an interval and on request
pub struct Recompiler {
    coordinator: Arc<TransactionCoordinator>,
    notify: Arc<Notify>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Recompiler {
    pub fn new(coordinator: Arc<TransactionCoordinator>) -> Self {
        Self {
            coordinator,
            notify: Arc::new(Notify::new()),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// Recompile immediately on the caller's task
    pub async fn recompile_now(&self) -> Result<RecompileReport, ApiError> {
        recompile_once(&self.coordinator, RecompileTrigger::OnDemand).await
    }

    /// Ask the background task for an extra pass without waiting for it
    pub fn request(&self) {
        self.notify.notify_one();
    }

    /// Start the periodic task. Calling it twice is a no-op.
    pub fn start(&self, interval: Duration, on_startup: bool) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let coordinator = Arc::clone(&self.coordinator);
        let notify = Arc::clone(&self.notify);
        let running = Arc::clone(&self.running);

        let handle = tokio::spawn(async move {
            Self::run_loop(coordinator, notify, running, interval, on_startup).await;
        });
        *self.worker.lock() = Some(handle);
        info!(interval_secs = interval.as_secs(), on_startup, "Started recompilation scheduler");
    }

    /// Stop the periodic task, waiting for an in-flight pass to finish
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.notify.notify_one();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!("Stopped recompilation scheduler");
    }

    async fn run_loop(
        coordinator: Arc<TransactionCoordinator>,
        notify: Arc<Notify>,
        running: Arc<AtomicBool>,
        period: Duration,
        on_startup: bool,
    ) {
        if on_startup {
            Self::run_pass(&coordinator, RecompileTrigger::Startup).await;
        }

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while running.load(Ordering::SeqCst) {
            let trigger = tokio::select! {
                _ = ticker.tick() => RecompileTrigger::Interval,
                _ = notify.notified() => RecompileTrigger::OnDemand,
            };
            if !running.load(Ordering::SeqCst) {
                break;
            }
            Self::run_pass(&coordinator, trigger).await;
            if coordinator.is_poisoned() {
                error!("Catalog engine is poisoned; recompilation scheduler exiting");
                running.store(false, Ordering::SeqCst);
            }
        }
    }

    async fn run_pass(coordinator: &TransactionCoordinator, trigger: RecompileTrigger) {
        if let Err(e) = recompile_once(coordinator, trigger).await {
            match &e {
                ApiError::Compile(inner) if inner.is_integrity_violation() => error!(
                    error = %e,
                    trigger = ?trigger,
                    "Catalog rows violate integrity; recompilation aborted"
                ),
                _ => warn!(error = %e, trigger = ?trigger, "Recompilation pass failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{CompiledView, Compiler};
    use crate::enrichment::Enrichers;
    use crate::error::StorageError;
    use crate::rows::fixtures::{agent, software};
    use crate::rows::Rows;
    use crate::store::{CommitTarget, MemoryRowStore, RowStore};

    async fn coordinator(store: Arc<MemoryRowStore>) -> Arc<TransactionCoordinator> {
        Arc::new(
            TransactionCoordinator::open_with_fatal_handler(
                store as Arc<dyn RowStore>,
                Compiler::new(Enrichers::none()),
                Arc::new(|_: &StorageError| {}),
            )
            .await
            .unwrap(),
        )
    }

    fn rows() -> Rows {
        Rows {
            software: vec![software(1, "LibreOffice", "a@x.org")],
            agents: vec![agent("a@x.org", "DINUM")],
            ..Rows::default()
        }
    }

    #[tokio::test]
    async fn test_first_pass_publishes_view_without_touching_rows() {
        let store = Arc::new(MemoryRowStore::new(rows(), CompiledView::default()));
        let coordinator = coordinator(Arc::clone(&store)).await;

        let report = recompile_once(&coordinator, RecompileTrigger::Startup)
            .await
            .unwrap();
        coordinator.flush().await.unwrap();

        assert_eq!(report.attempts, 1);
        assert!(report.committed);
        assert_eq!(coordinator.snapshot().compiled.len(), 1);
        let commits = store.commits();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].target(), CommitTarget::Build);
        assert_eq!(commits[0].message(), "Recompile catalog at startup");
    }

    #[tokio::test]
    async fn test_identical_view_is_not_persisted_again() {
        let store = Arc::new(MemoryRowStore::new(rows(), CompiledView::default()));
        let coordinator = coordinator(Arc::clone(&store)).await;

        recompile_once(&coordinator, RecompileTrigger::OnDemand)
            .await
            .unwrap();
        let second = recompile_once(&coordinator, RecompileTrigger::Interval)
            .await
            .unwrap();
        coordinator.flush().await.unwrap();

        assert!(!second.committed);
        assert_eq!(store.commits().len(), 1);
    }

    #[tokio::test]
    async fn test_scheduler_request_runs_a_pass() {
        let store = Arc::new(MemoryRowStore::new(rows(), CompiledView::default()));
        let coordinator = coordinator(Arc::clone(&store)).await;
        let recompiler = Recompiler::new(Arc::clone(&coordinator));

        recompiler.start(Duration::from_secs(3600), false);
        recompiler.request();
        for _ in 0..100 {
            if !coordinator.snapshot().compiled.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        recompiler.stop().await;

        assert_eq!(coordinator.snapshot().compiled.len(), 1);
    }
}
