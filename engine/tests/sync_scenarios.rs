//! End-to-end synchronization scenarios for hybrid-engine
//!
//! Each test wires a local store and an in-memory bucket through a
//! synchronizer and checks the state of both sides afterwards.

use hybrid_engine::storage::ListPage;
use hybrid_engine::{
    AsyncStorage, Commit, HybridStorage, ImmediateScheduler, LocalStore, MemoryObjectClient,
    NoopObserver, ObjectClient, ObjectError, ObjectStoreStorage, SyncConfig, SyncEvent,
    SyncObserver, SyncState, Synchronizer,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Remote = ObjectStoreStorage<MemoryObjectClient>;

struct Harness {
    local: Arc<LocalStore>,
    remote: Arc<Remote>,
    sync: Synchronizer,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn harness_with(observer: Arc<dyn SyncObserver>) -> Harness {
    init_tracing();
    let local = Arc::new(LocalStore::in_memory("docs"));
    let remote = Arc::new(ObjectStoreStorage::new("docs", MemoryObjectClient::new()));
    let sync = Synchronizer::with_hooks(
        local.clone(),
        remote.clone(),
        &SyncConfig::new("docs"),
        Arc::new(ImmediateScheduler),
        observer,
    )
    .unwrap();
    Harness {
        local,
        remote,
        sync,
    }
}

fn harness() -> Harness {
    harness_with(Arc::new(NoopObserver))
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn local_edit_then_sync() {
    let h = harness();
    h.local.set("a", json!(1)).await.unwrap();
    h.sync
        .commit_local_change(Commit::local_write("a", json!(1)), false)
        .await
        .unwrap();

    assert_eq!(h.sync.synchronize().await, SyncState::Synchronized);

    assert_eq!(h.remote.get("a").await.unwrap(), Some(json!(1)));
    let local_index = h.local.meta_index().await.unwrap();
    let remote_index = h.remote.meta_index().await.unwrap();
    assert_eq!(local_index.fingerprint("a"), remote_index.fingerprint("a"));
    assert!(local_index.fingerprint("a").is_some());
}

#[tokio::test]
async fn remote_added_item() {
    let h = harness();
    h.remote.set("b", json!({"x": 1})).await.unwrap();

    assert_eq!(h.sync.pull().await.unwrap(), 1);
    assert_eq!(h.local.get("b").await.unwrap(), Some(json!({"x": 1})));
}

#[tokio::test]
async fn divergent_fingerprints_remote_wins() {
    let h = harness();
    let f1 = h.local.set("c", json!(1)).await.unwrap();
    let f2 = h.remote.set("c", json!(2)).await.unwrap();
    assert_ne!(f1, f2);

    h.sync.pull().await.unwrap();

    assert_eq!(h.local.get("c").await.unwrap(), Some(json!(2)));
    assert_eq!(
        h.local.meta_index().await.unwrap().fingerprint("c"),
        Some(f2.as_str())
    );
}

#[tokio::test]
async fn remote_removal() {
    let h = harness();
    h.local.set("d", json!("gone soon")).await.unwrap();

    h.sync.pull().await.unwrap();

    assert!(h.local.get("d").await.unwrap().is_none());
    assert!(!h.local.meta_index().await.unwrap().contains("d"));
}

#[tokio::test]
async fn pull_converges_indexes() {
    let h = harness();
    h.local.set("same", json!(0)).await.unwrap();
    h.remote.set("same", json!(0)).await.unwrap();
    h.local.set("stale", json!(1)).await.unwrap();
    h.remote.set("stale", json!(2)).await.unwrap();
    h.local.set("orphan", json!(3)).await.unwrap();
    h.remote.set("fresh", json!(4)).await.unwrap();

    assert_eq!(h.sync.pull().await.unwrap(), 3);
    assert_eq!(
        h.local.meta_index().await.unwrap(),
        h.remote.meta_index().await.unwrap()
    );
    assert_eq!(h.sync.pull().await.unwrap(), 0);
}

#[tokio::test]
async fn local_delete_reaches_remote() {
    let h = harness();
    h.remote.set("a", json!(1)).await.unwrap();
    h.sync.pull().await.unwrap();

    h.local.remove("a").await.unwrap();
    h.sync
        .commit_local_change(Commit::local_delete("a"), false)
        .await
        .unwrap();
    h.sync.push().await.unwrap();

    assert!(h.remote.get("a").await.unwrap().is_none());
}

#[tokio::test]
async fn reserved_remote_names_do_not_block_pull() {
    let h = harness();
    h.remote
        .client()
        .put_object("docs/@evil.json", b"{}".to_vec())
        .await
        .unwrap();
    h.remote.set("good", json!("ok")).await.unwrap();

    assert_eq!(h.sync.synchronize().await, SyncState::Synchronized);
    assert_eq!(h.local.get("good").await.unwrap(), Some(json!("ok")));
    assert_eq!(h.local.keys().await.unwrap(), vec!["good"]);

    // Still pullable on the next round.
    assert_eq!(h.sync.synchronize().await, SyncState::Synchronized);
}

#[tokio::test]
async fn zero_slice_timeout_still_pushes() {
    init_tracing();
    let local = Arc::new(LocalStore::in_memory("docs"));
    let remote = Arc::new(ObjectStoreStorage::new("docs", MemoryObjectClient::new()));
    let sync = Synchronizer::new(
        local.clone(),
        remote.clone(),
        &SyncConfig::new("docs").with_slice_timeout(Duration::ZERO),
    )
    .unwrap();

    local.set("a", json!(1)).await.unwrap();
    sync.commit_local_change(Commit::local_write("a", json!(1)), false)
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(2), sync.push())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(remote.get("a").await.unwrap(), Some(json!(1)));
}

// ============================================================================
// Failure handling
// ============================================================================

#[tokio::test]
async fn failed_pull_skips_push() {
    let h = harness();
    h.local.set("a", json!(1)).await.unwrap();
    h.sync
        .commit_local_change(Commit::local_write("a", json!(1)), false)
        .await
        .unwrap();
    h.remote.client().set_offline(true);

    assert_eq!(h.sync.synchronize().await, SyncState::Failed);
    assert_eq!(h.sync.queue().len().await, 1);
    assert_eq!(h.remote.client().put_calls(), 0);

    // Not retried automatically; an explicit synchronize recovers.
    h.remote.client().set_offline(false);
    assert_eq!(h.sync.synchronize().await, SyncState::Synchronized);
    assert!(h.sync.queue().is_empty().await);
    assert_eq!(h.remote.get("a").await.unwrap(), Some(json!(1)));
}

#[tokio::test]
async fn failed_push_keeps_commit_for_retry() {
    let h = harness();
    h.local.set("a", json!(1)).await.unwrap();
    h.sync
        .commit_local_change(Commit::local_write("a", json!(1)), false)
        .await
        .unwrap();

    // The next two uploads fail.
    h.remote.client().fail_next("503 slow down");
    h.remote.client().fail_next("503 slow down");
    let first = h.sync.push().await;
    assert!(first.is_err());
    assert_eq!(h.sync.queue().len().await, 1);

    let second = h.sync.push().await;
    assert!(second.is_err());

    h.sync.push().await.unwrap();
    assert!(h.sync.queue().is_empty().await);
    assert_eq!(h.remote.get("a").await.unwrap(), Some(json!(1)));
}

// ============================================================================
// Facade
// ============================================================================

#[tokio::test]
async fn hybrid_storage_auto_push() {
    init_tracing();
    let storage = HybridStorage::with_object_store(
        Arc::new(LocalStore::in_memory("notes")),
        MemoryObjectClient::new(),
        &SyncConfig::new("notes").with_page_size(2),
    )
    .unwrap();

    for i in 0..5 {
        storage.set(&format!("k{i}"), json!(i)).await.unwrap();
    }
    storage.remove("k0").await.unwrap();

    let queue = storage.synchronizer().queue();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !queue.is_empty().await || queue.is_running() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();

    let remote = storage.synchronizer().stores().remote();
    assert_eq!(remote.keys().await.unwrap(), vec!["k1", "k2", "k3", "k4"]);
    assert_eq!(storage.keys().await.unwrap(), vec!["k1", "k2", "k3", "k4"]);
}

#[tokio::test]
async fn two_instances_share_a_bucket() {
    init_tracing();
    let client = Arc::new(MemoryObjectClient::new());
    let writer = ObjectStoreStorage::new("docs", SharedClient(client.clone()));
    let reader_remote = Arc::new(ObjectStoreStorage::new("docs", SharedClient(client)));

    writer.set("shared", json!("hello")).await.unwrap();

    let reader_local = Arc::new(LocalStore::in_memory("docs"));
    let reader = Synchronizer::with_hooks(
        reader_local.clone(),
        reader_remote,
        &SyncConfig::new("docs"),
        Arc::new(ImmediateScheduler),
        Arc::new(NoopObserver),
    )
    .unwrap();

    assert_eq!(reader.synchronize().await, SyncState::Synchronized);
    assert_eq!(
        reader_local.get("shared").await.unwrap(),
        Some(json!("hello"))
    );
}

/// Lets two adapters talk to the same in-memory bucket.
struct SharedClient(Arc<MemoryObjectClient>);

#[async_trait::async_trait]
impl ObjectClient for SharedClient {
    async fn get_object(&self, name: &str) -> Result<Vec<u8>, ObjectError> {
        self.0.get_object(name).await
    }

    async fn put_object(
        &self,
        name: &str,
        body: Vec<u8>,
    ) -> Result<String, ObjectError> {
        self.0.put_object(name, body).await
    }

    async fn delete_object(&self, name: &str) -> Result<(), ObjectError> {
        self.0.delete_object(name).await
    }

    async fn list_objects(
        &self,
        prefix: &str,
        marker: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage, ObjectError> {
        self.0.list_objects(prefix, marker, max_keys).await
    }
}

// ============================================================================
// Observer
// ============================================================================

#[derive(Default)]
struct Recorder(Mutex<Vec<String>>);

impl SyncObserver for Recorder {
    fn on_event(&self, event: &SyncEvent<'_>) {
        let label = match event {
            SyncEvent::DrainStarted { .. } => "drain-started".to_string(),
            SyncEvent::DrainYielded { .. } => "drain-yielded".to_string(),
            SyncEvent::DrainFinished { delivered, .. } => format!("drain-finished:{delivered}"),
            SyncEvent::PatchesComputed { patches } => format!("patches:{}", patches.len()),
            SyncEvent::CommitApplied { commit } => format!("applied:{}", commit.key()),
            SyncEvent::CommitFailed { commit, .. } => format!("failed:{}", commit.key()),
            SyncEvent::StateChanged { state } => format!("state:{state:?}"),
        };
        self.0.lock().unwrap().push(label);
    }
}

#[tokio::test]
async fn observer_sees_lifecycle() {
    let recorder = Arc::new(Recorder::default());
    let h = harness_with(recorder.clone());
    h.remote.set("r", json!(1)).await.unwrap();
    h.local.set("l", json!(2)).await.unwrap();
    h.remote.set("l", json!(2)).await.unwrap();
    h.sync
        .commit_local_change(Commit::local_write("l", json!(3)), false)
        .await
        .unwrap();

    h.sync.synchronize().await;

    assert_eq!(
        recorder.0.lock().unwrap().clone(),
        vec![
            "state:Synchronizing",
            "patches:1",
            "applied:r",
            "drain-started",
            "applied:l",
            "drain-finished:1",
            "state:Synchronized",
        ]
    );
}
