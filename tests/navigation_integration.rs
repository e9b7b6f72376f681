//! View switching, explicit refresh and navigation supersession

mod common;

use async_trait::async_trait;
use common::{drivers, vehicles, wait_until};
use fleet_coordinator::api::{EntityType, InMemoryGateway};
use fleet_coordinator::cancel::{CancellableOperation, CancellationScope};
use fleet_coordinator::config::Config;
use fleet_coordinator::collection::MutationRequest;
use fleet_coordinator::error::{LoadError, MutationError, NavigationError, ViewError};
use fleet_coordinator::fleet::Fleet;
use fleet_coordinator::view::{
    ActivationContext, ActivationOutcome, NavigationRequest, RetentionPolicy, ShellEvent, StatusReporter, View,
    ViewFactory, ViewLifecycle, ViewLifecycleManager,
};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn fleet_fixture() -> (Arc<InMemoryGateway>, Fleet, ViewLifecycleManager) {
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.seed(EntityType::Drivers, drivers(30));
    gateway.seed(EntityType::Vehicles, vehicles(12));
    let mut config = Config::default();
    config.paging.default_page_size = 10;

    let fleet = Fleet::new(gateway.clone(), &config, StatusReporter::disabled());
    let mut manager = ViewLifecycleManager::new(CancellationScope::root("shell"));
    fleet.register_views(&mut manager);
    (gateway, fleet, manager)
}

#[tokio::test]
async fn test_activating_drivers_twice_loads_twice() {
    let (gateway, fleet, manager) = fleet_fixture();

    assert_eq!(manager.activate("drivers", Value::Null).await, Ok(ActivationOutcome::Activated));
    assert_eq!(manager.activate("drivers", Value::Null).await, Ok(ActivationOutcome::Refreshed));

    let loader = fleet.collection(EntityType::Drivers).loader();
    assert_eq!(loader.stats().committed, 2);
    assert_eq!(gateway.stats().fetches_completed, 2);
    assert_eq!(loader.snapshot().len(), 10);
}

#[tokio::test]
async fn test_activation_parameter_sets_page_size() {
    let (_gateway, fleet, manager) = fleet_fixture();

    manager.activate("vehicles", json!({"page_size": 5})).await.unwrap();
    let state = fleet.collection(EntityType::Vehicles).snapshot();
    assert_eq!(state.page_size, 5);
    assert_eq!(state.len(), 5);
    assert_eq!(state.total_count, Some(12));
}

#[tokio::test]
async fn test_unknown_view_fails_without_side_effects() {
    let (gateway, _fleet, manager) = fleet_fixture();
    manager.activate("drivers", Value::Null).await.unwrap();

    let result = manager.activate("trailers", Value::Null).await;

    assert_eq!(result, Err(NavigationError::UnknownView("trailers".into())));
    assert_eq!(manager.active_view().as_deref(), Some("drivers"));
    assert_eq!(gateway.stats().fetches_started, 1);
}

#[tokio::test]
async fn test_newer_navigation_cancels_activation_in_progress() {
    let (gateway, fleet, manager) = fleet_fixture();
    let manager = Arc::new(manager);

    gateway.close_gate();
    let slow = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.activate("drivers", Value::Null).await })
    };
    wait_until(|| gateway.stats().fetches_started == 1).await;
    assert_eq!(manager.lifecycle("drivers"), Some(ViewLifecycle::Activating));

    let fast = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.activate("vehicles", Value::Null).await })
    };
    assert_eq!(slow.await.unwrap(), Err(NavigationError::Cancelled));
    gateway.open_gate();
    assert_eq!(fast.await.unwrap(), Ok(ActivationOutcome::Activated));

    assert_eq!(manager.active_view().as_deref(), Some("vehicles"));
    assert_eq!(manager.lifecycle("drivers"), Some(ViewLifecycle::Inactive));
    assert!(fleet.collection(EntityType::Drivers).snapshot().is_unloaded());
    assert_eq!(fleet.collection(EntityType::Vehicles).snapshot().len(), 10);
}

#[tokio::test]
async fn test_deactivation_waits_for_work_in_the_view_scope() {
    let (gateway, fleet, manager) = fleet_fixture();
    manager.activate("drivers", Value::Null).await.unwrap();
    let before = fleet.collection(EntityType::Drivers).snapshot();
    let scope = manager.active_scope().await.unwrap();

    gateway.close_gate();
    let scroll = {
        let loader = fleet.collection(EntityType::Drivers).loader().clone();
        let scope = scope.clone();
        tokio::spawn(async move { loader.extend(&scope).await })
    };
    wait_until(|| gateway.stats().fetches_started == 2).await;

    manager.deactivate("drivers").await.unwrap();
    assert_eq!(scope.pending_operations(), 0);
    assert!(scope.is_cancelled());
    assert_eq!(scroll.await.unwrap(), Err(LoadError::Cancelled));

    // Nothing lands after navigation away
    gateway.open_gate();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(fleet.collection(EntityType::Drivers).snapshot().loaded_items, before.loaded_items);
    assert_eq!(manager.active_view(), None);
}

#[tokio::test]
async fn test_navigation_loop_last_request_wins() {
    let (_gateway, fleet, manager) = fleet_fixture();
    let manager = Arc::new(manager);
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    for view in ["drivers", "vehicles", "nowhere", "routes"] {
        tx.send(NavigationRequest::new(view)).unwrap();
    }
    drop(tx);
    manager.clone().run(rx).await;

    assert_eq!(manager.active_view().as_deref(), Some("routes"));
    assert_eq!(manager.lifecycle("drivers"), Some(ViewLifecycle::Inactive));
    assert_eq!(manager.lifecycle("vehicles"), Some(ViewLifecycle::Inactive));
    assert_eq!(fleet.collection(EntityType::Routes).snapshot().total_count, Some(0));
}

#[tokio::test]
async fn test_shell_receives_navigation_and_failure_events() {
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.seed(EntityType::Drivers, drivers(3));
    let (status, mut events) = StatusReporter::channel();
    let fleet = Fleet::new(gateway.clone(), &Config::default(), status.clone());
    let mut manager = ViewLifecycleManager::new(CancellationScope::root("shell")).with_status(status);
    fleet.register_views(&mut manager);

    gateway.fail_next_fetch(fleet_coordinator::error::GatewayError::Backend("disk full".into()));
    let outcome = manager.activate("drivers", Value::Null).await.unwrap();
    assert!(matches!(outcome, ActivationOutcome::Degraded { .. }));

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen.iter().any(|e| matches!(e, ShellEvent::NavigationChanged { view, .. } if view == "drivers")));
    assert!(seen.iter().any(|e| matches!(e, ShellEvent::StatusChanged { message, .. } if message.contains("disk full"))));
}

/// View that starts background work in its scope and records when it unwinds
struct Recorder {
    name: &'static str,
    journal: Arc<Mutex<Vec<String>>>,
    scopes: Arc<Mutex<Vec<CancellationScope>>>,
}

#[async_trait]
impl View for Recorder {
    fn title(&self) -> &str {
        self.name
    }

    async fn on_activate(&mut self, ctx: ActivationContext) -> Result<(), ViewError> {
        let previous_cancelled = self.scopes.lock().unwrap().iter().all(|s| s.is_cancelled());
        self.journal
            .lock()
            .unwrap()
            .push(format!("{} hook (others cancelled: {})", self.name, previous_cancelled));
        self.scopes.lock().unwrap().push(ctx.scope.clone());

        let op = CancellableOperation::begin("poll", &ctx.scope);
        let journal = self.journal.clone();
        let name = self.name;
        tokio::spawn(async move {
            op.scope().cancelled().await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            journal.lock().unwrap().push(format!("{name} background unwound"));
            drop(op);
        });
        Ok(())
    }
}

#[tokio::test]
async fn test_previous_scope_is_cancelled_and_drained_before_next_hook() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let scopes = Arc::new(Mutex::new(Vec::new()));
    let mut manager = ViewLifecycleManager::new(CancellationScope::root("shell"));
    for name in ["a", "b"] {
        let (journal, scopes) = (journal.clone(), scopes.clone());
        manager.register(name, move || -> Box<dyn View> {
            Box::new(Recorder { name, journal: journal.clone(), scopes: scopes.clone() })
        });
    }

    manager.activate("a", Value::Null).await.unwrap();
    manager.activate("b", Value::Null).await.unwrap();

    assert_eq!(
        *journal.lock().unwrap(),
        vec![
            "a hook (others cancelled: true)",
            "a background unwound",
            "b hook (others cancelled: true)",
        ]
    );
}

#[tokio::test]
async fn test_slow_write_cannot_hold_navigation_past_request_timeout() {
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.seed(EntityType::Drivers, drivers(30));
    let mut config = Config::default();
    config.paging.default_page_size = 10;
    config.resilience.request_timeout_ms = 50;
    let fleet = Fleet::new(gateway.clone(), &config, StatusReporter::disabled());
    let mut manager = ViewLifecycleManager::new(CancellationScope::root("shell"));
    fleet.register_views(&mut manager);

    manager.activate("drivers", Value::Null).await.unwrap();
    let scope = manager.active_scope().await.unwrap();
    let collection = fleet.collection(EntityType::Drivers).clone();
    let before = collection.snapshot();

    gateway.set_latency(Some(Duration::from_secs(2)));
    let submit = {
        let collection = collection.clone();
        let request = MutationRequest::create(json!({"full_name": "Slow", "license_number": "L-slow"}));
        tokio::spawn(async move { collection.mutator().submit(request, &scope).await })
    };
    wait_until(|| collection.mutator().pending() == 1).await;

    let started = tokio::time::Instant::now();
    manager.deactivate("drivers").await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(500), "deactivation took {:?}", started.elapsed());

    let result = submit.await.unwrap();
    assert!(
        matches!(&result, Err(MutationError::MutationFailed(reason)) if reason.contains("timed out")),
        "{result:?}"
    );
    let after = collection.snapshot();
    assert_eq!(after.loaded_items, before.loaded_items);
    assert_eq!(after.total_count, Some(30));
}

struct Plain(&'static str);

#[async_trait]
impl View for Plain {
    fn title(&self) -> &str {
        self.0
    }

    async fn on_activate(&mut self, _ctx: ActivationContext) -> Result<(), ViewError> {
        Ok(())
    }
}

/// Counts how many view objects it has built
struct CountingFactory {
    name: &'static str,
    retention: RetentionPolicy,
    built: Arc<AtomicUsize>,
}

impl ViewFactory for CountingFactory {
    fn create(&self) -> Box<dyn View> {
        self.built.fetch_add(1, Ordering::SeqCst);
        Box::new(Plain(self.name))
    }

    fn retention(&self) -> RetentionPolicy {
        self.retention
    }
}

#[tokio::test]
async fn test_discard_on_exit_builds_a_fresh_view_each_activation() {
    let discarded = Arc::new(AtomicUsize::new(0));
    let kept = Arc::new(AtomicUsize::new(0));
    let mut manager = ViewLifecycleManager::new(CancellationScope::root("shell"));
    manager.register(
        "wizard",
        CountingFactory { name: "wizard", retention: RetentionPolicy::DiscardOnExit, built: discarded.clone() },
    );
    manager.register("list", CountingFactory { name: "list", retention: RetentionPolicy::Keep, built: kept.clone() });

    for view in ["wizard", "list", "wizard", "list", "wizard"] {
        assert_eq!(manager.activate(view, Value::Null).await, Ok(ActivationOutcome::Activated));
    }

    assert_eq!(discarded.load(Ordering::SeqCst), 3);
    assert_eq!(kept.load(Ordering::SeqCst), 1);
    assert_eq!(manager.lifecycle("list"), Some(ViewLifecycle::Inactive));
}
