//! End-to-end pipeline behavior over in-memory backends

use async_trait::async_trait;
use mockall::mock;
use odsync_core::{Pipeline, SyncConfig};
use odsync_events::{ChangeEvent, Operation};
use odsync_model::{Dataset, Entity, EntityId, EntityKind, EntityRef, MemoryStore, Status};
use odsync_queue::{Backoff, FailureReason, TaskStatus};
use odsync_rdf::{Iri, MemoryTripleStore, SparqlUpdate, Term, TripleStore, TripleStoreError};
use odsync_search::{CheckRun, MemoryIndex, SearchDocument};
use odsync_test_utils::{
    indexed, memory_backends, subject, titles_of, ts, PortalFixture, CATEGORY, ORG,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn config() -> SyncConfig {
    SyncConfig::new().with_workers(2).with_backoff(Backoff::None)
}

fn start(store: &Arc<MemoryStore>) -> (Pipeline, Arc<MemoryTripleStore>, Arc<MemoryIndex>) {
    let (triples, index) = memory_backends();
    let pipeline = Pipeline::builder(config(), store.clone())
        .with_triple_store(triples.clone())
        .with_search_index(index.clone())
        .build()
        .unwrap();
    (pipeline, triples, index)
}

fn portal() -> Arc<MemoryStore> {
    PortalFixture::new()
        .dataset(10, "Air quality", ts(2024, 1, 1))
        .dataset(11, "Water levels", ts(2024, 2, 1))
        .dataset(12, "Noise", ts(2024, 3, 1))
        .resource(20, 10)
        .resource(42, 12)
        .into_store()
}

fn succeeded(status: &TaskStatus) -> bool {
    matches!(status, TaskStatus::Succeeded { .. })
}

fn org_count(index: &MemoryIndex) -> Option<serde_json::Value> {
    index
        .document(EntityRef::new(EntityKind::Organization, ORG))
        .and_then(|d| d.get("published_datasets_count").cloned())
}

#[tokio::test]
async fn repeated_update_leaves_the_same_triples() {
    let store = portal();
    let (pipeline, triples, _index) = start(&store);

    let status = pipeline.create_graph(EntityKind::Dataset, 10).unwrap().wait().await;
    assert!(succeeded(&status));
    pipeline.update_graph(EntityKind::Dataset, 10).unwrap().wait().await;
    let first = triples.triples();
    pipeline.update_graph(EntityKind::Dataset, 10).unwrap().wait().await;

    assert!(!first.is_empty());
    assert_eq!(triples.triples(), first);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn license_title_change_reaches_every_dataset() {
    let store = portal();
    let (pipeline, triples, _index) = start(&store);
    for id in [10, 11, 12] {
        pipeline.create_graph(EntityKind::Dataset, id).unwrap();
    }
    pipeline.wait_idle().await;

    store.modify(EntityRef::new(EntityKind::License, 3), |row| {
        if let Entity::License(license) = row {
            license.title = "Creative Commons Attribution 4.0".into();
        }
    });
    let status = pipeline
        .update_related_graph(EntityKind::License, 3)
        .unwrap()
        .wait()
        .await;
    assert!(succeeded(&status));

    for id in [10, 11, 12] {
        let embedded = subject(EntityKind::Dataset, id).fragment("license");
        assert_eq!(
            titles_of(&triples, &embedded),
            vec!["Creative Commons Attribution 4.0".to_owned()],
            "dataset {id}"
        );
    }
    pipeline.shutdown().await;
}

#[tokio::test]
async fn unpublished_dataset_leaves_graph_and_index_but_not_the_store() {
    let store = portal();
    let (pipeline, triples, index) = start(&store);
    let dataset = EntityRef::new(EntityKind::Dataset, 10);
    pipeline.publish(&ChangeEvent::new(dataset, Operation::Published));
    pipeline.wait_idle().await;
    assert!(indexed(&index, EntityKind::Dataset, 10));
    assert!(!triples.describe(&subject(EntityKind::Dataset, 10)).is_empty());

    store.modify(dataset, |row| row.lifecycle_mut().status = Status::Draft);
    pipeline.publish(&ChangeEvent::new(dataset, Operation::Updated).with_changed_fields(["status"]));
    pipeline.wait_idle().await;

    assert!(!indexed(&index, EntityKind::Dataset, 10));
    assert!(triples.describe(&subject(EntityKind::Dataset, 10)).is_empty());
    let row = store.get(dataset).unwrap();
    assert!(!row.lifecycle().is_removed);
    assert_eq!(row.lifecycle().status, Status::Draft);
    assert!(pipeline.failures().is_empty());
    pipeline.shutdown().await;
}

#[tokio::test]
async fn unpublished_organization_drops_the_publisher_node() {
    let store = portal();
    let (pipeline, triples, _index) = start(&store);
    let org = EntityRef::new(EntityKind::Organization, ORG);
    pipeline.publish(&ChangeEvent::new(org, Operation::Published));
    pipeline.publish(&ChangeEvent::new(EntityRef::new(EntityKind::Dataset, 10), Operation::Published));
    pipeline.wait_idle().await;
    let publisher = subject(EntityKind::Dataset, 10).fragment("publisher");
    assert!(!triples.describe(&publisher).is_empty());

    store.modify(org, |row| row.lifecycle_mut().status = Status::Draft);
    pipeline.publish(&ChangeEvent::new(org, Operation::Updated).with_changed_fields(["status"]));
    pipeline.wait_idle().await;

    assert!(triples.describe(&subject(EntityKind::Organization, ORG)).is_empty());
    assert!(triples.describe(&publisher).is_empty());
    assert_eq!(
        titles_of(&triples, &subject(EntityKind::Dataset, 10)),
        vec!["Air quality".to_owned()]
    );
    assert!(pipeline.failures().is_empty());
    pipeline.shutdown().await;
}

#[tokio::test]
async fn removed_category_drops_the_theme_node() {
    let store = portal();
    let (pipeline, triples, _index) = start(&store);
    let category = EntityRef::new(EntityKind::Category, CATEGORY);
    pipeline.publish(&ChangeEvent::new(category, Operation::Published));
    pipeline.publish(&ChangeEvent::new(EntityRef::new(EntityKind::Dataset, 10), Operation::Published));
    pipeline.wait_idle().await;
    let theme = subject(EntityKind::Dataset, 10).fragment(&format!("theme-{CATEGORY}"));
    assert!(!triples.describe(&theme).is_empty());

    store.soft_delete(category);
    pipeline.publish(&ChangeEvent::new(category, Operation::Removed));
    pipeline.wait_idle().await;

    assert!(triples.describe(&subject(EntityKind::Category, CATEGORY)).is_empty());
    assert!(triples.describe(&theme).is_empty());
    assert!(!triples.describe(&subject(EntityKind::Dataset, 10)).is_empty());
    assert!(pipeline.failures().is_empty());
    pipeline.shutdown().await;
}

#[tokio::test]
async fn cascade_with_named_related_still_reaches_store_dependents() {
    let store = portal();
    let (pipeline, triples, _index) = start(&store);
    let dataset = EntityRef::new(EntityKind::Dataset, 10);
    pipeline.publish(&ChangeEvent::new(dataset, Operation::Published));
    pipeline.wait_idle().await;
    assert!(!triples.describe(&subject(EntityKind::Resource, 20)).is_empty());

    store.modify(dataset, |row| row.lifecycle_mut().status = Status::Draft);
    pipeline.publish(
        &ChangeEvent::new(dataset, Operation::Updated)
            .with_changed_fields(["status"])
            .with_related([EntityRef::new(EntityKind::Organization, ORG)]),
    );
    pipeline.wait_idle().await;

    assert!(triples.describe(&subject(EntityKind::Dataset, 10)).is_empty());
    assert!(triples.describe(&subject(EntityKind::Resource, 20)).is_empty());
    assert!(!triples.describe(&subject(EntityKind::Organization, ORG)).is_empty());
    assert!(pipeline.failures().is_empty());
    pipeline.shutdown().await;
}

#[tokio::test]
async fn removed_dataset_updates_the_organization_count() {
    let store = portal();
    let (pipeline, _triples, index) = start(&store);
    for id in [10, 11, 12] {
        pipeline.update_document(EntityKind::Dataset, id).unwrap();
    }
    pipeline.wait_idle().await;
    assert_eq!(org_count(&index), Some(json!(3)));

    let removed = EntityRef::new(EntityKind::Dataset, 11);
    store.soft_delete(removed);
    pipeline.publish(&ChangeEvent::new(removed, Operation::Removed));
    pipeline.wait_idle().await;

    assert_eq!(org_count(&index), Some(json!(2)));
    assert!(!indexed(&index, EntityKind::Dataset, 11));
    assert!(store.get(removed).is_some_and(|row| row.lifecycle().is_removed));
    pipeline.shutdown().await;
}

#[tokio::test]
async fn catalog_modified_follows_the_newest_visible_dataset() {
    let store = PortalFixture::new()
        .dataset(1, "D1", ts(2024, 1, 1))
        .into_store();
    let (pipeline, _triples, _index) = start(&store);
    let catalog = pipeline.graph().catalog();

    pipeline.create_graph(EntityKind::Dataset, 1).unwrap().wait().await;
    assert_eq!(catalog.catalog_modified().await.unwrap(), Some(ts(2024, 1, 1)));

    store.upsert(Entity::from(Dataset::new(2, ORG, "D2")).created_at(ts(2024, 6, 1)));
    pipeline.create_graph(EntityKind::Dataset, 2).unwrap().wait().await;
    assert_eq!(catalog.catalog_modified().await.unwrap(), Some(ts(2024, 6, 1)));

    store.hard_delete(EntityRef::new(EntityKind::Dataset, 2));
    let status = pipeline.delete_graph(EntityKind::Dataset, 2).unwrap().wait().await;
    assert!(succeeded(&status));
    assert_eq!(catalog.catalog_modified().await.unwrap(), Some(ts(2024, 1, 1)));
    pipeline.shutdown().await;
}

#[tokio::test]
async fn hard_deleted_resource_is_removed_from_graph_and_parent_document() {
    let store = portal();
    let (pipeline, triples, index) = start(&store);
    let resource = EntityRef::new(EntityKind::Resource, 42);
    let parent = EntityRef::new(EntityKind::Dataset, 12);
    pipeline.publish(&ChangeEvent::new(parent, Operation::Created));
    pipeline.publish(&ChangeEvent::new(resource, Operation::Created));
    pipeline.wait_idle().await;
    assert!(!triples.describe(&subject(EntityKind::Resource, 42)).is_empty());

    store.hard_delete(resource);
    pipeline.publish(&ChangeEvent::new(resource, Operation::Deleted).with_related([parent]));
    pipeline.wait_idle().await;

    assert!(triples.describe(&subject(EntityKind::Resource, 42)).is_empty());
    assert!(!indexed(&index, EntityKind::Resource, 42));
    assert!(indexed(&index, EntityKind::Dataset, 12));
    assert!(pipeline.failures().is_empty());

    let status = pipeline.delete_graph(EntityKind::Resource, 42).unwrap().wait().await;
    assert!(succeeded(&status));
    pipeline.shutdown().await;
}

#[tokio::test]
async fn only_committed_transactions_reach_the_queue() {
    let store = portal();
    let (pipeline, triples, index) = start(&store);

    let mut tx = pipeline.transaction();
    tx.record(ChangeEvent::new(EntityRef::new(EntityKind::Dataset, 10), Operation::Published));
    let report = tx.commit();
    assert!(report.is_clean());

    let mut tx = pipeline.transaction();
    tx.record(ChangeEvent::new(EntityRef::new(EntityKind::Dataset, 11), Operation::Published));
    assert_eq!(tx.rollback(), 1);
    pipeline.wait_idle().await;

    // one graph task and one search task
    assert_eq!(pipeline.stats().enqueued, 2);
    assert!(indexed(&index, EntityKind::Dataset, 10));
    assert!(!indexed(&index, EntityKind::Dataset, 11));
    assert_eq!(
        titles_of(&triples, &subject(EntityKind::Dataset, 10)),
        vec!["Air quality".to_owned()]
    );
    pipeline.shutdown().await;
}

#[tokio::test]
async fn consistency_check_reports_stray_documents() {
    let store = portal();
    let (pipeline, _triples, index) = start(&store);
    for id in [10, 11, 12] {
        pipeline.update_document(EntityKind::Dataset, id).unwrap();
    }
    pipeline.wait_idle().await;

    let run = pipeline.check_consistency(EntityKind::Dataset).await.unwrap();
    assert!(run.is_complete());
    assert!(run.report().is_consistent());

    index.seed(SearchDocument::new(
        EntityKind::Dataset,
        EntityId(99),
        serde_json::Map::new(),
    ));
    let CheckRun::Completed(report) = pipeline.check_consistency(EntityKind::Dataset).await.unwrap()
    else {
        panic!("check was not interrupted");
    };
    assert_eq!(report.extra_in_index.into_iter().collect::<Vec<_>>(), vec![EntityId(99)]);
    assert!(report.missing_in_index.is_empty());
    pipeline.shutdown().await;
}

mock! {
    Refusing {}

    #[async_trait]
    impl TripleStore for Refusing {
        async fn update(&self, update: &SparqlUpdate) -> Result<(), TripleStoreError>;
        async fn objects(&self, subject: &Iri, predicate: &Iri) -> Result<Vec<Term>, TripleStoreError>;
    }
}

impl std::fmt::Debug for MockRefusing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRefusing").finish_non_exhaustive()
    }
}

#[tokio::test]
async fn refused_connections_are_retried_then_recorded() {
    let store = portal();
    let mut endpoint = MockRefusing::new();
    endpoint
        .expect_update()
        .times(6)
        .returning(|_| Err(TripleStoreError::ConnectionRefused("localhost:3030".into())));
    endpoint.expect_objects().returning(|_, _| Ok(Vec::new()));

    let pipeline = Pipeline::builder(config(), store.clone())
        .with_triple_store(Arc::new(endpoint))
        .with_search_index(Arc::new(MemoryIndex::new()))
        .build()
        .unwrap();

    let status = pipeline
        .update_graph(EntityKind::Organization, ORG)
        .unwrap()
        .wait()
        .await;
    assert!(matches!(status, TaskStatus::Failed { attempts: 6, .. }));

    let failures = pipeline.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].attempts, 6);
    assert_eq!(failures[0].reason, FailureReason::RetriesExhausted);
    pipeline.shutdown().await;
}
