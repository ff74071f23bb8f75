use sill::compiler::Compiler;
use sill::enrichment::Enrichers;
use sill::store::{CommitTarget, RowStore, SledRowStore};
use sill::transaction::TransactionCoordinator;
use sill::{AgentRef, SoftwareForm, StorageError};
use std::sync::Arc;

async fn open_coordinator(store: Arc<SledRowStore>) -> TransactionCoordinator {
    TransactionCoordinator::open_with_fatal_handler(
        store as Arc<dyn RowStore>,
        Compiler::new(Enrichers::none()),
        Arc::new(|_: &StorageError| {}),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn catalog_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog");

    {
        let store = Arc::new(SledRowStore::new(&path).unwrap());
        let coordinator = open_coordinator(Arc::clone(&store)).await;
        coordinator
            .create_software(
                SoftwareForm::named("LibreOffice"),
                AgentRef::new("a@x.org", "DINUM"),
            )
            .await
            .unwrap();
        coordinator.flush().await.unwrap();

        let audit = store.audit_log().unwrap();
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[0].target, CommitTarget::Rows);
        assert_eq!(audit[1].target, CommitTarget::Build);
        assert!(audit[0].sequence < audit[1].sequence);

        // Release the database lock before reopening
        drop(coordinator);
        while Arc::strong_count(&store) > 1 {
            tokio::task::yield_now().await;
        }
    }

    let store = Arc::new(SledRowStore::new(&path).unwrap());
    let coordinator = open_coordinator(store).await;
    let state = coordinator.snapshot();
    assert_eq!(state.rows.software.len(), 1);
    assert_eq!(state.compiled.len(), 1);
    assert_eq!(state.compiled.software[0].public.name, "LibreOffice");
}
