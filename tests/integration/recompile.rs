use super::common::*;
use sill::recompile::{recompile_once, RecompileTrigger};
use sill::store::StoreCommit;
use sill::{AgentRef, SoftwareForm};
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stale_recompilation_is_discarded_and_retried() {
    let mut rows = catalog_rows();
    rows.software[0].wikidata_id = Some("Q1".to_string());
    let store = memory_store(rows);
    let fatal = RecordingFatal::default();
    let metadata = Arc::new(GatedMetadata::default());
    let coordinator = open(
        &store,
        enrichers_with_metadata(Arc::clone(&metadata)),
        &fatal,
    )
    .await;

    let pass = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { recompile_once(&coordinator, RecompileTrigger::Interval).await })
    };
    metadata.entered.notified().await;

    // Rows move on while the pass is still waiting on its first lookup
    coordinator
        .create_software(SoftwareForm::named("Bar"), AgentRef::new("a@x.org", "DINUM"))
        .await
        .unwrap();
    metadata.release.notify_one();

    let report = pass.await.unwrap().unwrap();
    coordinator.flush().await.unwrap();

    assert_eq!(report.attempts, 2);
    assert!(report.committed);
    assert_eq!(metadata.calls.load(Ordering::SeqCst), 3);

    let state = coordinator.snapshot();
    assert_eq!(state.compiled.len(), 2);
    let label = state.compiled.get(5).unwrap().public.wikidata.as_ref().unwrap().label.clone();
    assert_eq!(label.as_deref(), Some("Q1 revision 2"));

    let commits = store.commits();
    let scheduled: Vec<_> = commits
        .iter()
        .filter(|c| c.message() == RecompileTrigger::Interval.commit_message())
        .collect();
    assert_eq!(scheduled.len(), 1);
    for commit in commits {
        if let StoreCommit::Build { view, .. } = commit {
            assert_eq!(view.len(), 2, "a view compiled from stale rows was persisted");
        }
    }
}
