//! Unit tests for graph evaluation

use super::*;
use crate::graph::Graph;
use crate::lifecycle::Lifecycle;
use crate::resource::Reaper;
use crate::state::MemoryStateStore;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Barrier;

type Calls = Arc<Mutex<Vec<String>>>;

struct TestResource {
    name: &'static str,
    deps: Vec<ResourceId>,
    value: Arc<Mutex<Value>>,
    lifecycle: Lifecycle,
    calls: Calls,
    fail: Arc<AtomicBool>,
    barrier: Option<Arc<Barrier>>,
}

impl TestResource {
    fn new(name: &'static str, deps: &[ResourceId], calls: &Calls) -> Self {
        Self {
            name,
            deps: deps.to_vec(),
            value: Arc::new(Mutex::new(json!(1))),
            lifecycle: Lifecycle::update(),
            calls: Arc::clone(calls),
            fail: Arc::new(AtomicBool::new(false)),
            barrier: None,
        }
    }

    fn log(&self, verb: &str) {
        self.calls.lock().unwrap().push(format!("{}:{}", verb, self.name));
    }
}

#[async_trait::async_trait]
impl Resource for TestResource {
    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.clone()
    }

    fn inputs(&self, upstream: &Resolved<'_>) -> Result<Value, GraphError> {
        let mut names = Vec::new();
        for dep in &self.deps {
            names.push(upstream.string(dep, "/name")?);
        }
        Ok(json!({
            "value": self.value.lock().unwrap().clone(),
            "upstream": names,
        }))
    }

    async fn create(&self, _inputs: &Value) -> Result<Value, ProviderError> {
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            self.log("fail");
            return Err(format!("{} rejected by API", self.name).into());
        }
        self.log("create");
        Ok(json!({"name": self.name}))
    }

    async fn update(&self, _prior: &ResourceRecord, _inputs: &Value) -> Result<Value, ProviderError> {
        self.log("update");
        Ok(json!({"name": self.name}))
    }

    async fn delete(&self, _prior: &ResourceRecord) -> Result<(), ProviderError> {
        self.log("delete");
        Ok(())
    }
}

struct TestReaper {
    calls: Calls,
    refuse: Option<&'static str>,
}

impl TestReaper {
    fn new(calls: &Calls) -> Self {
        Self {
            calls: Arc::clone(calls),
            refuse: None,
        }
    }
}

#[async_trait::async_trait]
impl Reaper for TestReaper {
    async fn delete(&self, record: &ResourceRecord) -> Result<(), ProviderError> {
        if self.refuse == Some(record.id.name()) {
            return Err(format!("{} is protected", record.id).into());
        }
        self.calls.lock().unwrap().push(format!("reap:{}", record.id.name()));
        Ok(())
    }
}

fn id(name: &str) -> ResourceId {
    ResourceId::new("test", name)
}

fn calls() -> Calls {
    Arc::new(Mutex::new(Vec::new()))
}

fn taken(calls: &Calls) -> Vec<String> {
    std::mem::take(&mut *calls.lock().unwrap())
}

/// lb -> config -> server-{0,1} -> apply-{0,1} -> bootstrap
fn pipeline(calls: &Calls) -> Graph {
    let mut builder = Graph::builder();
    builder.add(id("lb"), TestResource::new("lb", &[], calls), &[]).unwrap();
    builder
        .add(id("config"), TestResource::new("config", &[id("lb")], calls), &[id("lb")])
        .unwrap();
    for (server, apply) in [("server-0", "apply-0"), ("server-1", "apply-1")] {
        builder
            .add(id(server), TestResource::new(server, &[id("config")], calls), &[id("config")])
            .unwrap();
        builder
            .add(id(apply), TestResource::new(apply, &[id(server)], calls), &[id(server)])
            .unwrap();
    }
    let mut bootstrap = TestResource::new("bootstrap", &[], calls);
    bootstrap.lifecycle = Lifecycle::create_only();
    builder
        .add(id("bootstrap"), bootstrap, &[id("apply-0"), id("apply-1")])
        .unwrap();
    builder.build().unwrap()
}

#[tokio::test]
async fn test_dependencies_complete_before_dependents() {
    let calls = calls();
    let graph = pipeline(&calls);
    let report = Engine::new(MemoryStateStore::default()).evaluate(&graph).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.count(Action::Create), 7);

    let order = &report.completion_order;
    let pos = |name: &str| order.iter().position(|i| *i == id(name)).unwrap();
    assert!(pos("lb") < pos("config"));
    assert!(pos("config") < pos("server-0"));
    assert!(pos("apply-0") < pos("bootstrap"));
    assert!(pos("apply-1") < pos("bootstrap"));
    assert_eq!(pos("bootstrap"), 6);
}

#[tokio::test]
async fn test_reevaluation_is_convergent() {
    let calls = calls();
    let graph = pipeline(&calls);
    let store = MemoryStateStore::default();

    Engine::new(store.clone()).evaluate(&graph).await.unwrap();
    taken(&calls);

    let report = Engine::new(store.clone()).evaluate(&graph).await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.count(Action::Same), 7);
    assert!(report.changes().is_empty());
    assert!(taken(&calls).is_empty(), "no provider calls on an unchanged graph");
}

#[tokio::test]
async fn test_failure_blocks_dependents_only() {
    let calls = calls();
    let mut builder = Graph::builder();
    let broken = TestResource::new("server-0", &[], &calls);
    broken.fail.store(true, Ordering::SeqCst);
    builder.add(id("server-0"), broken, &[]).unwrap();
    builder.add(id("server-1"), TestResource::new("server-1", &[], &calls), &[]).unwrap();
    builder
        .add(id("apply-0"), TestResource::new("apply-0", &[id("server-0")], &calls), &[id("server-0")])
        .unwrap();
    builder
        .add(id("apply-1"), TestResource::new("apply-1", &[id("server-1")], &calls), &[id("server-1")])
        .unwrap();
    builder
        .add(
            id("bootstrap"),
            TestResource::new("bootstrap", &[], &calls),
            &[id("apply-0"), id("apply-1")],
        )
        .unwrap();
    let graph = builder.build().unwrap();

    let report = Engine::new(MemoryStateStore::default()).evaluate(&graph).await.unwrap();

    assert!(!report.is_success());
    assert_eq!(
        report.status(&id("server-0")),
        Some(&Status::Failed("server-0 rejected by API".to_string()))
    );
    assert_eq!(report.status(&id("apply-1")), Some(&Status::Done(Action::Create)));
    assert_eq!(report.blocked(), vec![&id("apply-0"), &id("bootstrap")]);
    assert!(!taken(&calls).contains(&"create:bootstrap".to_string()));
    assert!(report.into_result().is_err());
}

#[tokio::test]
async fn test_failed_evaluation_resumes() {
    let calls = calls();
    let flaky = TestResource::new("server-0", &[], &calls);
    let fail = Arc::clone(&flaky.fail);
    fail.store(true, Ordering::SeqCst);

    let mut builder = Graph::builder();
    builder.add(id("server-0"), flaky, &[]).unwrap();
    builder.add(id("server-1"), TestResource::new("server-1", &[], &calls), &[]).unwrap();
    builder
        .add(
            id("bootstrap"),
            TestResource::new("bootstrap", &[], &calls),
            &[id("server-0"), id("server-1")],
        )
        .unwrap();
    let graph = builder.build().unwrap();
    let store = MemoryStateStore::default();

    Engine::new(store.clone()).evaluate(&graph).await.unwrap();
    taken(&calls);

    fail.store(false, Ordering::SeqCst);
    let report = Engine::new(store.clone()).evaluate(&graph).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.status(&id("server-1")), Some(&Status::Done(Action::Same)));
    let mut made = taken(&calls);
    made.sort();
    assert_eq!(made, vec!["create:bootstrap".to_string(), "create:server-0".to_string()]);
}

#[tokio::test]
async fn test_independent_resources_run_concurrently() {
    let calls = calls();
    let barrier = Arc::new(Barrier::new(2));
    let mut a = TestResource::new("a", &[], &calls);
    a.barrier = Some(Arc::clone(&barrier));
    let mut b = TestResource::new("b", &[], &calls);
    b.barrier = Some(barrier);

    let mut builder = Graph::builder();
    builder.add(id("a"), a, &[]).unwrap();
    builder.add(id("b"), b, &[]).unwrap();
    let graph = builder.build().unwrap();

    // Each create waits for the other; sequential evaluation would never finish
    let engine = Engine::new(MemoryStateStore::default());
    let report = tokio::time::timeout(Duration::from_secs(5), engine.evaluate(&graph))
        .await
        .expect("independent resources must be evaluated concurrently")
        .unwrap();
    assert_eq!(report.count(Action::Create), 2);
}

#[tokio::test]
async fn test_update_and_replace_policies() {
    let calls = calls();
    let updatable = TestResource::new("apply", &[], &calls);
    let apply_value = Arc::clone(&updatable.value);
    let mut replaceable = TestResource::new("server", &[], &calls);
    replaceable.lifecycle = Lifecycle::replace();
    let server_value = Arc::clone(&replaceable.value);

    let mut builder = Graph::builder();
    builder.add(id("apply"), updatable, &[]).unwrap();
    builder.add(id("server"), replaceable, &[]).unwrap();
    let graph = builder.build().unwrap();
    let store = MemoryStateStore::default();

    Engine::new(store.clone()).evaluate(&graph).await.unwrap();
    taken(&calls);

    *apply_value.lock().unwrap() = json!(2);
    *server_value.lock().unwrap() = json!(2);
    let report = Engine::new(store.clone()).evaluate(&graph).await.unwrap();

    assert_eq!(report.status(&id("apply")), Some(&Status::Done(Action::Update)));
    assert_eq!(report.status(&id("server")), Some(&Status::Done(Action::Replace)));
    let made = taken(&calls);
    let delete = made.iter().position(|c| c == "delete:server").unwrap();
    let create = made.iter().position(|c| c == "create:server").unwrap();
    assert!(delete < create, "replacement deletes before creating");
    assert!(made.contains(&"update:apply".to_string()));

    let record = store.snapshot().unwrap().get(&id("apply")).cloned().unwrap();
    assert_eq!(record.inputs["value"], json!(2));
}

#[tokio::test]
async fn test_create_only_is_never_reissued() {
    let calls = calls();
    let mut once = TestResource::new("bootstrap", &[], &calls);
    once.lifecycle = Lifecycle::create_only();
    let value = Arc::clone(&once.value);

    let mut builder = Graph::builder();
    builder.add(id("bootstrap"), once, &[]).unwrap();
    let graph = builder.build().unwrap();
    let store = MemoryStateStore::default();

    Engine::new(store.clone()).evaluate(&graph).await.unwrap();
    *value.lock().unwrap() = json!("different node");
    Engine::new(store.clone()).evaluate(&graph).await.unwrap();
    Engine::new(store).evaluate(&graph).await.unwrap();

    assert_eq!(taken(&calls), vec!["create:bootstrap".to_string()]);
}

#[tokio::test]
async fn test_preview_does_not_call_providers() {
    let calls = calls();
    let graph = pipeline(&calls);
    let store = MemoryStateStore::default();

    let preview = Engine::preview(store.clone()).evaluate(&graph).await.unwrap();
    assert_eq!(preview.status(&id("lb")), Some(&Status::Done(Action::Create)));
    assert_eq!(preview.status(&id("config")), Some(&Status::Pending));
    assert_eq!(preview.status(&id("bootstrap")), Some(&Status::Pending));
    assert!(taken(&calls).is_empty());
    assert!(store.snapshot().unwrap().resources.is_empty());

    Engine::new(store.clone()).evaluate(&graph).await.unwrap();
    taken(&calls);

    let preview = Engine::preview(store).evaluate(&graph).await.unwrap();
    assert_eq!(preview.count(Action::Same), 7);
    assert!(taken(&calls).is_empty());
}

#[tokio::test]
async fn test_data_source_runs_every_time_without_record() {
    let calls = calls();
    let mut render = TestResource::new("render", &[], &calls);
    render.lifecycle = Lifecycle::data_source();

    let mut builder = Graph::builder();
    builder.add(id("render"), render, &[]).unwrap();
    let graph = builder.build().unwrap();
    let store = MemoryStateStore::default();

    Engine::new(store.clone()).evaluate(&graph).await.unwrap();
    let report = Engine::new(store.clone()).evaluate(&graph).await.unwrap();

    assert_eq!(report.status(&id("render")), Some(&Status::Done(Action::Read)));
    assert_eq!(taken(&calls).len(), 2);
    assert!(store.snapshot().unwrap().resources.is_empty());
}

#[tokio::test]
async fn test_undeclared_resources_are_pruned() {
    let calls = calls();
    let store = MemoryStateStore::default();

    let mut builder = Graph::builder();
    builder.add(id("server-0"), TestResource::new("server-0", &[], &calls), &[]).unwrap();
    builder.add(id("server-1"), TestResource::new("server-1", &[], &calls), &[]).unwrap();
    Engine::new(store.clone()).evaluate(&builder.build().unwrap()).await.unwrap();
    taken(&calls);

    let mut builder = Graph::builder();
    builder.add(id("server-0"), TestResource::new("server-0", &[], &calls), &[]).unwrap();
    builder.reaper("test", TestReaper::new(&calls));
    let report = Engine::new(store.clone()).evaluate(&builder.build().unwrap()).await.unwrap();

    assert_eq!(report.pruned, vec![id("server-1")]);
    assert_eq!(taken(&calls), vec!["reap:server-1".to_string()]);
    assert!(store.snapshot().unwrap().get(&id("server-1")).is_none());
}

#[tokio::test]
async fn test_undeclared_resources_without_reaper_are_forgotten() {
    let calls = calls();
    let store = MemoryStateStore::default();

    let mut builder = Graph::builder();
    builder.add(id("apply-0"), TestResource::new("apply-0", &[], &calls), &[]).unwrap();
    Engine::new(store.clone()).evaluate(&builder.build().unwrap()).await.unwrap();

    let graph = Graph::builder().build().unwrap();
    let report = Engine::new(store.clone()).evaluate(&graph).await.unwrap();

    assert_eq!(report.orphaned, vec![id("apply-0")]);
    assert!(store.snapshot().unwrap().resources.is_empty());
}

/// namespace <- release <- route, named so id order is the reverse of
/// dependency order
fn layered(calls: &Calls) -> Graph {
    let mut builder = Graph::builder();
    builder
        .add(id("a-namespace"), TestResource::new("a-namespace", &[], calls), &[])
        .unwrap();
    builder
        .add(
            id("b-release"),
            TestResource::new("b-release", &[id("a-namespace")], calls),
            &[id("a-namespace")],
        )
        .unwrap();
    builder
        .add(
            id("c-route"),
            TestResource::new("c-route", &[id("b-release")], calls),
            &[id("b-release")],
        )
        .unwrap();
    builder.build().unwrap()
}

#[tokio::test]
async fn test_records_keep_declared_dependencies() {
    let calls = calls();
    let store = MemoryStateStore::default();
    Engine::new(store.clone()).evaluate(&layered(&calls)).await.unwrap();

    let state = store.snapshot().unwrap();
    assert_eq!(state.get(&id("b-release")).unwrap().depends_on, vec![id("a-namespace")]);
    assert!(state.get(&id("a-namespace")).unwrap().depends_on.is_empty());
}

#[tokio::test]
async fn test_unchanged_records_regain_missing_dependencies() {
    let calls = calls();
    let store = MemoryStateStore::default();
    Engine::new(store.clone()).evaluate(&layered(&calls)).await.unwrap();

    // State written before edges were recorded
    let mut state = store.snapshot().unwrap();
    for record in state.resources.values_mut() {
        record.depends_on.clear();
    }
    store.save(&state).unwrap();

    let report = Engine::new(store.clone()).evaluate(&layered(&calls)).await.unwrap();
    assert_eq!(report.count(Action::Same), 3);
    assert_eq!(
        store.snapshot().unwrap().get(&id("c-route")).unwrap().depends_on,
        vec![id("b-release")]
    );
}

#[tokio::test]
async fn test_orphans_are_pruned_dependents_first() {
    let calls = calls();
    let store = MemoryStateStore::default();
    Engine::new(store.clone()).evaluate(&layered(&calls)).await.unwrap();
    taken(&calls);

    let mut builder = Graph::builder();
    builder.reaper("test", TestReaper::new(&calls));
    let report = Engine::new(store.clone()).evaluate(&builder.build().unwrap()).await.unwrap();

    assert_eq!(report.pruned, vec![id("c-route"), id("b-release"), id("a-namespace")]);
    assert_eq!(
        taken(&calls),
        vec!["reap:c-route", "reap:b-release", "reap:a-namespace"]
    );
    assert!(store.snapshot().unwrap().resources.is_empty());
}

#[tokio::test]
async fn test_failed_orphan_delete_keeps_what_it_depends_on() {
    let calls = calls();
    let store = MemoryStateStore::default();
    Engine::new(store.clone()).evaluate(&layered(&calls)).await.unwrap();
    taken(&calls);

    let mut builder = Graph::builder();
    builder.reaper(
        "test",
        TestReaper {
            calls: Arc::clone(&calls),
            refuse: Some("b-release"),
        },
    );
    let report = Engine::new(store.clone()).evaluate(&builder.build().unwrap()).await.unwrap();

    assert!(!report.is_success());
    assert_eq!(report.pruned, vec![id("c-route")]);
    assert!(matches!(report.status(&id("b-release")), Some(Status::Failed(_))));
    assert_eq!(report.status(&id("a-namespace")), Some(&Status::Blocked));
    assert_eq!(taken(&calls), vec!["reap:c-route"]);

    let state = store.snapshot().unwrap();
    assert!(state.get(&id("b-release")).is_some());
    assert!(state.get(&id("a-namespace")).is_some());
}
