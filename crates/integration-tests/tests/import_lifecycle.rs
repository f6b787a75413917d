//! Import lifecycle: engine and queue driver against in-memory ports
//!
//! All tests run on paused tokio time, so 30 minute deadlines finish instantly.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use import_tagger_core::application::{EngineConfig, LifecycleEngine, QueueDriver, WorkerConfig};
use import_tagger_core::domain::{Disposition, EntityRef, ImportStatus, Tag, TagOutcome, Verdict};
use import_tagger_core::port::entity_catalog::mocks::MockEntityCatalog;
use import_tagger_core::port::import_status::mocks::ScriptedStatusSource;
use import_tagger_core::port::queue_transport::mocks::InMemoryQueue;
use import_tagger_core::port::{CatalogError, ImportStatusSource, StatusQueryError};
use serde_json::json;

fn import_payload() -> Vec<u8> {
    json!({
        "target_name": "svc-a",
        "branch": "main",
        "tags": [{"key": "team", "value": "payments"}],
        "org_id": "org1",
        "import_job_url": "https://api.example.com/rest/orgs/org1/imports/job1"
    })
    .to_string()
    .into_bytes()
}

fn engine_with(status: ScriptedStatusSource, catalog: &Arc<MockEntityCatalog>) -> LifecycleEngine {
    LifecycleEngine::new(Arc::new(status), catalog.clone(), EngineConfig::default())
}

fn svc_a_catalog() -> Arc<MockEntityCatalog> {
    Arc::new(MockEntityCatalog::new(vec![EntityRef::new("e1", "svc-a", "main")]))
}

/// Two pending polls, then complete; one entity tagged
#[tokio::test(start_paused = true)]
async fn test_completed_import_tags_single_entity() {
    let catalog = svc_a_catalog();
    let status = ScriptedStatusSource::complete_after(2);
    let engine = engine_with(status, &catalog);

    let outcome = engine.process(&import_payload(), 1).await;

    assert_eq!(outcome.disposition, Disposition::Delete);
    match outcome.verdict {
        Verdict::Tagged(report) => {
            assert_eq!(report.attempted, 1);
            assert_eq!(report.succeeded, 1);
            assert_eq!(
                report.outcomes,
                vec![TagOutcome {
                    entity_id: "e1".to_string(),
                    succeeded: true,
                    error: None,
                }]
            );
        }
        other => panic!("expected Tagged, got {:?}", other),
    }
    assert!(catalog.has_tag("e1", &Tag::new("team", "payments")));
}

/// Nothing matches the target; no tag calls
#[tokio::test(start_paused = true)]
async fn test_no_matching_entities_deletes_without_tagging() {
    let catalog = Arc::new(MockEntityCatalog::new(vec![EntityRef::new("e9", "svc-b", "main")]));
    let engine = engine_with(ScriptedStatusSource::always(ImportStatus::Complete), &catalog);

    let outcome = engine.process(&import_payload(), 1).await;

    assert_eq!(outcome.disposition, Disposition::Delete);
    assert!(matches!(outcome.verdict, Verdict::NoEntities));
    assert_eq!(catalog.find_calls(), 1);
    assert!(catalog.tag_calls().is_empty());
}

/// Still pending at the deadline on attempt 1 of 5
#[tokio::test(start_paused = true)]
async fn test_pending_at_deadline_requeues() {
    let catalog = svc_a_catalog();
    let engine = engine_with(ScriptedStatusSource::always(ImportStatus::Pending), &catalog);

    let started = tokio::time::Instant::now();
    let outcome = engine.process(&import_payload(), 1).await;

    assert_eq!(outcome.disposition, Disposition::Requeue);
    assert!(matches!(outcome.verdict, Verdict::StillPending));
    assert!(!outcome.is_exhausted());
    assert!(started.elapsed() <= Duration::from_secs(30 * 60));
    assert_eq!(catalog.find_calls(), 0);
}

/// Still pending at the deadline on attempt 5 of 5
#[tokio::test(start_paused = true)]
async fn test_pending_on_last_attempt_deletes() {
    let catalog = svc_a_catalog();
    let engine = engine_with(ScriptedStatusSource::always(ImportStatus::Pending), &catalog);

    let outcome = engine.process(&import_payload(), 5).await;

    assert_eq!(outcome.disposition, Disposition::Delete);
    assert!(matches!(outcome.verdict, Verdict::StillPending));
    assert!(outcome.is_exhausted());
}

/// Upstream import failed; nothing is resolved or tagged
#[tokio::test(start_paused = true)]
async fn test_failed_import_deletes_without_tagging() {
    let catalog = svc_a_catalog();
    let status = ScriptedStatusSource::always(ImportStatus::Failed("import job reported status 'failed'".into()));
    let engine = engine_with(status, &catalog);

    let outcome = engine.process(&import_payload(), 1).await;

    assert_eq!(outcome.disposition, Disposition::Delete);
    assert!(matches!(outcome.verdict, Verdict::ImportFailed(_)));
    assert_eq!(catalog.find_calls(), 0);
    assert!(catalog.tag_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_malformed_payload_deleted_on_every_attempt() {
    let catalog = svc_a_catalog();
    let engine = engine_with(ScriptedStatusSource::always(ImportStatus::Complete), &catalog);
    let payloads: [&[u8]; 3] = [
        b"not json",
        br#"{"target_name":"svc-a","branch":"main","org_id":"org1"}"#,
        br#"{"target_name":"svc-a","branch":"main","tags":"team","org_id":"org1","import_job_url":"x"}"#,
    ];

    for attempt in 1..=5 {
        for payload in payloads {
            let outcome = engine.process(payload, attempt).await;
            assert_eq!(outcome.disposition, Disposition::Delete, "attempt {}", attempt);
            assert!(matches!(outcome.verdict, Verdict::Malformed(_)));
        }
    }
    assert_eq!(catalog.find_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_retagging_redelivered_message_succeeds() {
    let catalog = svc_a_catalog();
    let engine = engine_with(ScriptedStatusSource::always(ImportStatus::Complete), &catalog);

    let first = engine.process(&import_payload(), 1).await;
    let second = engine.process(&import_payload(), 2).await;

    assert!(matches!(first.verdict, Verdict::Tagged(_)));
    assert_eq!(second.disposition, Disposition::Delete);
    assert!(matches!(second.verdict, Verdict::Tagged(ref r) if r.succeeded == 1));
    assert_eq!(catalog.tag_calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_last_attempt_never_requeues() {
    let max_attempts = EngineConfig::default().max_attempts;

    // Resolution failure
    let catalog = svc_a_catalog();
    catalog.fail_lookup(CatalogError::Transport("connection reset".into()));
    let engine = engine_with(ScriptedStatusSource::always(ImportStatus::Complete), &catalog);
    let outcome = engine.process(&import_payload(), max_attempts).await;
    assert_eq!(outcome.disposition, Disposition::Delete);
    assert!(matches!(outcome.verdict, Verdict::ResolutionFailed(_)));

    // Partial tagging
    let catalog = Arc::new(MockEntityCatalog::new(vec![
        EntityRef::new("e1", "svc-a", "main"),
        EntityRef::new("e2", "svc-a(main):pom.xml", "main"),
    ]));
    catalog.fail_tag("e2", "team", CatalogError::Api { status: 500, message: "boom".into() });
    let engine = engine_with(ScriptedStatusSource::always(ImportStatus::Complete), &catalog);
    let outcome = engine.process(&import_payload(), max_attempts).await;
    assert_eq!(outcome.disposition, Disposition::Delete);
    assert!(outcome.is_exhausted());
    match outcome.verdict {
        Verdict::TaggingIncomplete(report) => {
            assert_eq!(report.succeeded, 1);
            assert_eq!(report.failures.len(), 1);
            assert_eq!(report.failures[0].entity_id, "e2");
        }
        other => panic!("expected TaggingIncomplete, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_partial_tagging_recovers_on_redelivery() {
    let catalog = Arc::new(MockEntityCatalog::new(vec![
        EntityRef::new("e1", "svc-a", "main"),
        EntityRef::new("e2", "svc-a(main):pom.xml", "main"),
    ]));
    catalog.fail_tag("e2", "team", CatalogError::Transport("timeout".into()));
    let engine = engine_with(ScriptedStatusSource::always(ImportStatus::Complete), &catalog);

    let first = engine.process(&import_payload(), 1).await;
    assert_eq!(first.disposition, Disposition::Requeue);

    catalog.clear_tag_failures();
    let second = engine.process(&import_payload(), 2).await;
    assert_eq!(second.disposition, Disposition::Delete);
    assert!(matches!(second.verdict, Verdict::Tagged(_)));
    assert!(catalog.has_tag("e2", &Tag::new("team", "payments")));
}

/// Status source that panics on the first query
struct PanickingStatusSource;

#[async_trait]
impl ImportStatusSource for PanickingStatusSource {
    async fn get_status(&self, _job_reference: &str) -> Result<ImportStatus, StatusQueryError> {
        panic!("status decoder bug");
    }
}

fn panicking_driver(queue: &Arc<InMemoryQueue>) -> QueueDriver {
    let engine = Arc::new(LifecycleEngine::new(
        Arc::new(PanickingStatusSource),
        svc_a_catalog(),
        EngineConfig::default(),
    ));
    QueueDriver::new(queue.clone(), engine, WorkerConfig::default())
}

#[tokio::test(start_paused = true)]
async fn test_driver_contains_engine_panic() {
    let queue = Arc::new(InMemoryQueue::new());
    let driver = panicking_driver(&queue);
    queue.enqueue(import_payload());

    assert_eq!(driver.process_next_batch().await.unwrap(), 1);

    // A crash is retryable: the message stays queued for redelivery
    assert!(queue.deleted().is_empty());
    assert_eq!(queue.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_driver_abandons_crash_on_last_attempt() {
    let queue = Arc::new(InMemoryQueue::new());
    let driver = panicking_driver(&queue);
    let max_attempts = EngineConfig::default().max_attempts;
    let id = queue.enqueue_with_dequeue_count(import_payload(), max_attempts - 1);

    assert_eq!(driver.process_next_batch().await.unwrap(), 1);

    assert_eq!(queue.deleted(), vec![id]);
}

#[tokio::test(start_paused = true)]
async fn test_driver_redelivers_until_attempts_exhausted() {
    let queue = Arc::new(InMemoryQueue::new());
    let catalog = svc_a_catalog();
    let config = EngineConfig {
        max_processing: Duration::from_secs(60),
        max_attempts: 3,
        ..EngineConfig::default()
    };
    let engine = Arc::new(LifecycleEngine::new(
        Arc::new(ScriptedStatusSource::always(ImportStatus::Pending)),
        catalog,
        config,
    ));
    let driver = QueueDriver::new(queue.clone(), engine, WorkerConfig::default());
    let id = queue.enqueue(import_payload());

    for _ in 0..2 {
        assert_eq!(driver.process_next_batch().await.unwrap(), 1);
        assert!(queue.deleted().is_empty());
        queue.expire_leases();
    }

    assert_eq!(driver.process_next_batch().await.unwrap(), 1);
    assert_eq!(queue.deleted(), vec![id]);
    assert!(queue.is_empty());
}
