use anyhow::{anyhow, Result};
use async_trait::async_trait;
use report_ingestion::app::App;
use report_ingestion::conf::Settings;
use report_ingestion::decode::gzip;
use report_ingestion::processor::{Context, Pipeline, Processor};
use report_ingestion::storage::{BlobStore, MemoryStore};
use report_ingestion::trigger::Trigger;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Delete(String, String),
    Put(String, String),
    Process(&'static str, Value),
}

type Log = Arc<Mutex<Vec<Call>>>;

/// A memory store that records deletions and writes.
struct RecordingStore {
    inner: MemoryStore,
    log: Log,
}

#[async_trait]
impl BlobStore for RecordingStore {
    async fn delete_blob(&self, container: &str, name: &str) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(Call::Delete(container.to_string(), name.to_string()));
        self.inner.delete_blob(container, name).await
    }

    async fn get_blob(&self, container: &str, name: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get_blob(container, name).await
    }

    async fn put_blob(&self, container: &str, name: &str, content: Vec<u8>) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(Call::Put(container.to_string(), name.to_string()));
        self.inner.put_blob(container, name, content).await
    }
}

/// A processor that records what it's given, takes a little while,
/// and tracks how many processors are running at once.
struct Recorder {
    name: &'static str,
    fail: bool,
    log: Log,
    running: Arc<AtomicUsize>,
    max_running: Arc<AtomicUsize>,
}

#[async_trait]
impl Processor for Recorder {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn process(&self, _context: &Context<'_>, report: &Value) -> Result<()> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        self.log
            .lock()
            .unwrap()
            .push(Call::Process(self.name, report.clone()));
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        if self.fail {
            Err(anyhow!("{} exploded", self.name))
        } else {
            Ok(())
        }
    }
}

struct Harness {
    log: Log,
    max_running: Arc<AtomicUsize>,
    store: RecordingStore,
    app: App,
}

/// Builds an app with raw, v1 and v2 recorders, v2 disabled, and
/// `failing` naming a recorder that errors.
async fn harness(failing: Option<&'static str>) -> Harness {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let running = Arc::new(AtomicUsize::new(0));
    let max_running = Arc::new(AtomicUsize::new(0));
    let recorder = |name: &'static str| -> Box<dyn Processor> {
        Box::new(Recorder {
            name,
            fail: failing == Some(name),
            log: log.clone(),
            running: running.clone(),
            max_running: max_running.clone(),
        })
    };
    let pipeline = Pipeline::new()
        .register(recorder("raw"), true)
        .register(recorder("v1"), true)
        .register(recorder("v2"), false);
    let app = App::with_pipeline(Settings::default(), pipeline).unwrap();
    let store = RecordingStore {
        inner: MemoryStore::new(),
        log: log.clone(),
    };
    Harness {
        log,
        max_running,
        store,
        app,
    }
}

async fn upload(store: &RecordingStore, name: &str, content: &[u8]) -> Trigger {
    store
        .inner
        .put_blob("uploads", name, content.to_vec())
        .await
        .unwrap();
    Trigger::new(name, content.to_vec())
}

async fn compressed(report: &Value) -> Vec<u8> {
    gzip(serde_json::to_vec(report).unwrap()).await.unwrap()
}

#[tokio::test]
async fn deletes_then_runs_enabled_processors_in_order() {
    let h = harness(None).await;
    let report = json!({"tests": []});
    let trigger = upload(&h.store, "report123.json.gz", &compressed(&report).await).await;

    h.app.handle(trigger, &h.store).await.unwrap();

    assert_eq!(
        *h.log.lock().unwrap(),
        vec![
            Call::Delete(String::from("uploads"), String::from("report123.json.gz")),
            Call::Process("raw", report.clone()),
            Call::Process("v1", report.clone()),
        ]
    );
    assert!(h.store.inner.names("uploads").await.is_empty());
}

#[tokio::test]
async fn processors_receive_the_original_document() {
    let h = harness(None).await;
    let report = json!({
        "metadata": {"commitSHA": "abc", "branch": "main", "commitTimestamp": 1700000000000i64},
        "suites": [{"file": "a.spec.ts", "specs": [], "suites": []}],
        "unicode": "ünïcødé ✓",
        "numbers": [1, -2, 3.5, null, true]
    });
    let trigger = upload(&h.store, "r.json.gz", &compressed(&report).await).await;

    h.app.handle(trigger, &h.store).await.unwrap();

    let received: Vec<Value> = h
        .log
        .lock()
        .unwrap()
        .iter()
        .filter_map(|call| match call {
            Call::Process(_, value) => Some(value.clone()),
            Call::Delete(..) | Call::Put(..) => None,
        })
        .collect();
    assert_eq!(received, vec![report.clone(), report]);
}

#[tokio::test]
async fn processors_never_overlap() {
    let h = harness(None).await;
    let trigger = upload(&h.store, "r.json.gz", &compressed(&json!({})).await).await;

    h.app.handle(trigger, &h.store).await.unwrap();

    assert_eq!(h.max_running.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn undecodable_uploads_reach_no_processor() {
    for content in [
        b"{\"tests\":[]}".to_vec(),
        gzip(vec![0xff, 0xfe, 0xfd]).await.unwrap(),
        gzip(b"{\"tests\":".to_vec()).await.unwrap(),
    ] {
        let h = harness(None).await;
        let trigger = upload(&h.store, "bad.json.gz", &content).await;

        assert!(h.app.handle(trigger, &h.store).await.is_err());
        assert_eq!(
            *h.log.lock().unwrap(),
            vec![Call::Delete(
                String::from("uploads"),
                String::from("bad.json.gz")
            )]
        );
    }
}

#[tokio::test]
async fn failing_processor_stops_the_sequence() {
    let h = harness(Some("raw")).await;
    let report = json!({"tests": []});
    let trigger = upload(&h.store, "r.json.gz", &compressed(&report).await).await;

    let err = h.app.handle(trigger, &h.store).await.unwrap_err();

    assert!(format!("{:#}", err).contains("raw exploded"));
    assert_eq!(
        *h.log.lock().unwrap(),
        vec![
            Call::Delete(String::from("uploads"), String::from("r.json.gz")),
            Call::Process("raw", report),
        ]
    );
}

#[tokio::test]
async fn failed_deletion_stops_everything() {
    let h = harness(None).await;
    let trigger = Trigger::new("missing.json.gz", compressed(&json!({})).await);

    assert!(h.app.handle(trigger, &h.store).await.is_err());
    assert_eq!(h.log.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn dashboards_are_written_for_enabled_processors_only() {
    let store = MemoryStore::new();
    let app = App::new(Settings::default()).unwrap();
    let report = json!({
        "metadata": {"commitSHA": "abc", "branch": "main", "commitTimestamp": 5},
        "suites": [{
            "file": "a.spec.ts",
            "specs": [{"title": "works", "tests": [
                {"projectName": "chromium", "results": [{"status": "failed"}, {"status": "passed"}]}
            ]}]
        }]
    });
    let content = compressed(&report).await;
    store
        .put_blob("uploads", "report123.json.gz", content.clone())
        .await
        .unwrap();

    app.handle(Trigger::new("report123.json.gz", content), &store)
        .await
        .unwrap();

    assert!(store.names("uploads").await.is_empty());
    assert_eq!(
        store.names("dashboards").await,
        vec![
            String::from("raw/main/abc/report123.json.gz"),
            String::from("v1/main.json"),
        ]
    );
    let v1: Value =
        serde_json::from_slice(&store.get_blob("dashboards", "v1/main.json").await.unwrap().unwrap())
            .unwrap();
    assert_eq!(v1[0]["sha"], "abc");
    assert_eq!(v1[0]["flaky"][0]["title"], "works");
}

#[tokio::test]
async fn enabled_v2_dashboard_runs_last() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let store = RecordingStore {
        inner: MemoryStore::new(),
        log: log.clone(),
    };
    let app = App::new(Settings {
        enable_dashboard_v2: true,
        ..Settings::default()
    })
    .unwrap();
    let report = json!({
        "metadata": {"commitSHA": "abc", "branch": "main", "commitTimestamp": 5},
        "suites": [{
            "file": "a.spec.ts",
            "specs": [{"title": "works", "tests": [
                {"projectName": "chromium", "results": [{"status": "passed"}]}
            ]}]
        }]
    });
    let trigger = upload(&store, "report123.json.gz", &compressed(&report).await).await;

    app.handle(trigger, &store).await.unwrap();

    let dashboards = |name: &str| Call::Put(String::from("dashboards"), String::from(name));
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            Call::Delete(String::from("uploads"), String::from("report123.json.gz")),
            dashboards("raw/main/abc/report123.json.gz"),
            dashboards("v1/main.json"),
            dashboards("v2/main.json"),
        ]
    );
    let v2: Value = serde_json::from_slice(
        &store
            .get_blob("dashboards", "v2/main.json")
            .await
            .unwrap()
            .unwrap(),
    )
    .unwrap();
    assert_eq!(v2["a.spec.ts > works [chromium]"]["expected"], 1);
}
