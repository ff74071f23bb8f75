use super::common::*;
use sill::enrichment::Enrichers;
use sill::store::{CommitTarget, RowStore, StoreCommit};
use sill::transaction::EXTERNAL_UPDATE_MESSAGE;
use sill::{
    AgentRef, ApiError, CompileError, DeclarationForm, DeclarationKind, EnrichmentError,
    SoftwareForm, Transition,
};
use std::collections::HashSet;
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creations_get_distinct_ids() {
    let store = memory_store(catalog_rows());
    let fatal = RecordingFatal::default();
    let coordinator = open(&store, Enrichers::none(), &fatal).await;

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .create_software(
                        SoftwareForm::named(format!("Logiciel {}", i)),
                        AgentRef::new(format!("agent{}@x.org", i), "DINUM"),
                    )
                    .await
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap().unwrap());
    }
    coordinator.flush().await.unwrap();

    assert_eq!(ids, (6..=21).collect::<HashSet<_>>());
    let state = coordinator.snapshot();
    assert_eq!(state.rows.software.len(), 17);
    assert_eq!(state.compiled.len(), 17);

    let commits = store.commits();
    assert_eq!(commits.len(), 32);
    let last_rows = commits.iter().rev().find_map(|c| match c {
        StoreCommit::Rows { rows, .. } => Some(rows.clone()),
        StoreCommit::Build { .. } => None,
    });
    assert_eq!(last_rows.as_ref(), Some(&state.rows));
}

#[tokio::test]
async fn commits_persist_rows_then_view_in_order() {
    let store = memory_store(catalog_rows());
    let fatal = RecordingFatal::default();
    let coordinator = open(&store, Enrichers::none(), &fatal).await;

    coordinator
        .create_software(SoftwareForm::named("Bar"), AgentRef::new("a@x.org", "DINUM"))
        .await
        .unwrap();
    coordinator
        .change_agent_organization("a@x.org", "Etalab")
        .await
        .unwrap();
    coordinator.flush().await.unwrap();

    let targets: Vec<CommitTarget> = store.commits().iter().map(|c| c.target()).collect();
    assert_eq!(
        targets,
        vec![
            CommitTarget::Rows,
            CommitTarget::Build,
            CommitTarget::Rows,
            CommitTarget::Build
        ]
    );
    let commits = store.commits();
    assert_eq!(commits[0].message(), commits[1].message());
    assert!(commits[0].message().contains("Bar"));
}

#[tokio::test]
async fn duplicate_name_is_case_and_space_insensitive() {
    let store = memory_store(catalog_rows());
    let fatal = RecordingFatal::default();
    let coordinator = open(&store, Enrichers::none(), &fatal).await;

    let err = coordinator
        .create_software(SoftwareForm::named("Foo"), AgentRef::new("a@x.org", "DINUM"))
        .await
        .unwrap_err();
    coordinator.flush().await.unwrap();

    assert!(matches!(err, ApiError::DuplicateSoftwareName(_)));
    assert_eq!(coordinator.snapshot().rows, catalog_rows());
    assert!(store.commits().is_empty());
}

#[tokio::test]
async fn second_referent_declaration_is_rejected() {
    let store = memory_store(catalog_rows());
    let fatal = RecordingFatal::default();
    let coordinator = open(&store, Enrichers::none(), &fatal).await;
    let form = DeclarationForm::Referent {
        is_expert: false,
        use_case_description: "Messagerie".to_string(),
        service_url: None,
    };

    coordinator
        .create_user_or_referent(5, AgentRef::new("a@x.org", "DINUM"), form.clone())
        .await
        .unwrap();
    let err = coordinator
        .create_user_or_referent(5, AgentRef::new("a@x.org", "DINUM"), form)
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::AlreadyReferent { software_id: 5, .. }));
    let state = coordinator.snapshot();
    assert_eq!(
        state
            .rows
            .software_referents
            .iter()
            .filter(|r| r.software_id == 5 && r.agent_email == "a@x.org")
            .count(),
        1
    );
    assert_eq!(state.compiled.get(5).unwrap().referents.len(), 1);
}

#[tokio::test]
async fn removing_sole_declaration_removes_agent() {
    let mut rows = catalog_rows();
    rows.agents.push(agent("b@y.org", "Insee"));
    rows.software_referents.push(referent(5, "b@y.org"));
    let store = memory_store(rows);
    let fatal = RecordingFatal::default();
    let coordinator = open(&store, Enrichers::none(), &fatal).await;

    coordinator
        .remove_user_or_referent(5, "b@y.org", DeclarationKind::Referent)
        .await
        .unwrap();
    coordinator.flush().await.unwrap();

    let state = coordinator.snapshot();
    assert!(state.rows.agent_by_email("b@y.org").is_none());
    assert!(state.rows.software_referents.is_empty());
    let persisted = store.fetch_rows().await.unwrap();
    assert!(persisted.agent_by_email("b@y.org").is_none());
}

#[tokio::test]
async fn no_op_mutation_skips_compile_and_persistence() {
    let store = memory_store(catalog_rows());
    let fatal = RecordingFatal::default();
    let providers = Arc::new(CountingProviders::default());
    let coordinator = open(
        &store,
        enrichers_with_providers(Arc::clone(&providers)),
        &fatal,
    )
    .await;

    let unchanged = coordinator
        .execute(|rows| Ok(Some(Transition::new(rows, "touch nothing"))))
        .await
        .unwrap();
    let declined = coordinator
        .execute::<(), _>(|_rows| Ok(None))
        .await
        .unwrap();
    coordinator
        .update_agent_email("ghost@x.org", "ghost@y.org")
        .await
        .unwrap();
    coordinator.flush().await.unwrap();

    assert!(unchanged.is_none());
    assert!(declined.is_none());
    assert_eq!(providers.calls(), 0);
    assert!(store.commits().is_empty());
}

#[tokio::test]
async fn callers_return_before_persistence_lands() {
    let store = memory_store(catalog_rows());
    let fatal = RecordingFatal::default();
    let coordinator = open(&store, Enrichers::none(), &fatal).await;

    let paused = store.pause().await;
    let id = coordinator
        .create_software(SoftwareForm::named("Bar"), AgentRef::new("a@x.org", "DINUM"))
        .await
        .unwrap();

    assert!(coordinator.snapshot().rows.software_by_id(id).is_some());
    assert!(coordinator.snapshot().compiled.get(id).is_some());
    assert!(store.commits().is_empty());

    drop(paused);
    coordinator.flush().await.unwrap();
    assert_eq!(store.commits().len(), 2);
}

#[tokio::test]
async fn persistence_failure_poisons_and_reports() {
    let store = memory_store(catalog_rows());
    let fatal = RecordingFatal::default();
    let coordinator = open(&store, Enrichers::none(), &fatal).await;
    store.set_fail_persists(true);

    coordinator
        .create_software(SoftwareForm::named("Bar"), AgentRef::new("a@x.org", "DINUM"))
        .await
        .unwrap();
    assert!(matches!(coordinator.flush().await, Err(ApiError::Poisoned)));

    assert!(coordinator.is_poisoned());
    assert_eq!(fatal.count(), 1);
    let err = coordinator
        .create_software(SoftwareForm::named("Baz"), AgentRef::new("a@x.org", "DINUM"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Poisoned));
    assert!(store.commits().is_empty());
}

#[tokio::test]
async fn external_update_republishes_changed_rows() {
    let store = memory_store(catalog_rows());
    let fatal = RecordingFatal::default();
    let coordinator = open(&store, Enrichers::none(), &fatal).await;

    let mut edited = catalog_rows();
    edited.software.push(software(6, "Thunderbird", "a@x.org"));
    store.overwrite_rows(edited.clone());

    assert!(coordinator.notify_external_update().await.unwrap());
    assert!(!coordinator.notify_external_update().await.unwrap());
    coordinator.flush().await.unwrap();

    let state = coordinator.snapshot();
    assert_eq!(state.rows, edited);
    assert_eq!(state.compiled.len(), 2);
    let commits = store.commits();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].target(), CommitTarget::Build);
    assert_eq!(commits[0].message(), EXTERNAL_UPDATE_MESSAGE);
}

#[tokio::test]
async fn external_update_waits_for_queued_commits() {
    let store = memory_store(catalog_rows());
    let fatal = RecordingFatal::default();
    let coordinator = open(&store, Enrichers::none(), &fatal).await;

    let paused = store.pause().await;
    let id = coordinator
        .create_software(SoftwareForm::named("Bar"), AgentRef::new("a@x.org", "DINUM"))
        .await
        .unwrap();

    let notify = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.notify_external_update().await })
    };
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    drop(paused);

    // The store only lags behind memory; nothing changed outside the engine
    assert!(!notify.await.unwrap().unwrap());
    coordinator.flush().await.unwrap();

    assert!(coordinator.snapshot().rows.software_by_id(id).is_some());
    let persisted = store.fetch_rows().await.unwrap();
    assert_eq!(persisted, coordinator.snapshot().rows);
    assert!(!store
        .commits()
        .iter()
        .any(|c| c.message() == EXTERNAL_UPDATE_MESSAGE));
}

#[tokio::test]
async fn dangling_row_from_mutator_aborts_transaction() {
    let store = memory_store(catalog_rows());
    let fatal = RecordingFatal::default();
    let coordinator = open(&store, Enrichers::none(), &fatal).await;
    let before = coordinator.snapshot();

    let err = coordinator
        .execute(|mut rows| {
            rows.software_referents.push(referent(5, "nobody@x.org"));
            Ok(Some(Transition::new(rows, "Add referent without agent")))
        })
        .await
        .unwrap_err();
    coordinator.flush().await.unwrap();

    match err {
        ApiError::Compile(inner) => assert!(inner.is_integrity_violation()),
        other => panic!("expected compile error, got {:?}", other),
    }
    assert!(Arc::ptr_eq(&before, &coordinator.snapshot()));
    assert!(store.commits().is_empty());
}

#[tokio::test]
async fn failed_lookup_aborts_update() {
    let store = memory_store(catalog_rows());
    let fatal = RecordingFatal::default();
    let coordinator = open(&store, enrichers_with_failing_metadata(), &fatal).await;
    let before = coordinator.snapshot();

    let mut form = SoftwareForm::named("foo");
    form.wikidata_id = Some("Q42".to_string());
    let err = coordinator.update_software(5, form).await.unwrap_err();
    coordinator.flush().await.unwrap();

    assert!(matches!(
        err,
        ApiError::Compile(CompileError::Enrichment(EnrichmentError::UnexpectedStatus {
            status: 503,
            ..
        }))
    ));
    assert!(Arc::ptr_eq(&before, &coordinator.snapshot()));
    assert_eq!(coordinator.snapshot().rows.software[0].wikidata_id, None);
    assert!(store.commits().is_empty());
}
