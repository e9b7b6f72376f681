//! Ordering of mutations against loads and against each other

mod common;

use common::{gateway_with_drivers, ids, loader, mutator, wait_until};
use fleet_coordinator::api::EntityType;
use fleet_coordinator::cancel::CancellationScope;
use fleet_coordinator::collection::{CreatePlacement, LoadMode, MutationRequest, SingleFlightMutator};
use fleet_coordinator::error::{GatewayError, MutationError};
use serde_json::json;
use std::time::Duration;

fn new_driver(name: &str) -> MutationRequest {
    MutationRequest::create(json!({"full_name": name, "license_number": format!("L-{name}")}))
}

#[tokio::test]
async fn test_create_then_concurrent_replace_keeps_record_once() {
    let gateway = gateway_with_drivers(3);
    let drivers = loader(&gateway, EntityType::Drivers, 10);
    let writer = mutator(&gateway, &drivers);
    let scope = CancellationScope::root("drivers");
    drivers.reload(&scope).await.unwrap();

    // The create holds the collection while the backend is slow
    gateway.set_latency(Some(Duration::from_millis(30)));
    let create = {
        let (writer, scope) = (writer.clone(), scope.clone());
        tokio::spawn(async move { writer.submit(new_driver("Zed"), &scope).await })
    };
    wait_until(|| writer.pending() == 1).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let reload = {
        let (drivers, scope) = (drivers.clone(), scope.clone());
        tokio::spawn(async move { drivers.load_page(1, 10, LoadMode::Replace, &scope).await })
    };

    let created = create.await.unwrap().unwrap();
    let reloaded = reload.await.unwrap().unwrap();

    let state = drivers.snapshot();
    assert_eq!(state.generation, reloaded.generation);
    assert_eq!(ids(&state.loaded_items), vec![1, 2, 3, created.id]);
    assert_eq!(state.total_count, Some(4));
}

#[tokio::test]
async fn test_replace_then_concurrent_create_keeps_record_once() {
    let gateway = gateway_with_drivers(3);
    let drivers = loader(&gateway, EntityType::Drivers, 10);
    let writer = mutator(&gateway, &drivers);
    let scope = CancellationScope::root("drivers");
    drivers.reload(&scope).await.unwrap();

    gateway.close_gate();
    let reload = {
        let (drivers, scope) = (drivers.clone(), scope.clone());
        tokio::spawn(async move { drivers.load_page(1, 10, LoadMode::Replace, &scope).await })
    };
    wait_until(|| gateway.stats().fetches_started == 2).await;
    let create = {
        let (writer, scope) = (writer.clone(), scope.clone());
        tokio::spawn(async move { writer.submit(new_driver("Zed"), &scope).await })
    };
    wait_until(|| writer.pending() == 1).await;

    // The create is queued behind the load and has not reached the backend
    assert_eq!(gateway.stats().writes, 0);
    gateway.open_gate();

    reload.await.unwrap().unwrap();
    let created = create.await.unwrap().unwrap();

    let state = drivers.snapshot();
    assert_eq!(ids(&state.loaded_items), vec![1, 2, 3, created.id]);
    assert_eq!(state.total_count, Some(4));
    assert_eq!(created.snapshot.as_ref(), state.as_ref());
}

#[tokio::test]
async fn test_queued_mutations_apply_in_submission_order() {
    let gateway = gateway_with_drivers(0);
    let drivers = loader(&gateway, EntityType::Drivers, 10);
    let writer = mutator(&gateway, &drivers);
    let scope = CancellationScope::root("drivers");
    drivers.reload(&scope).await.unwrap();
    gateway.set_latency(Some(Duration::from_millis(20)));

    let mut handles = Vec::new();
    for name in ["first", "second", "third"] {
        let (writer, scope) = (writer.clone(), scope.clone());
        handles.push(tokio::spawn(async move { writer.submit(new_driver(name), &scope).await }));
        // Let the submit reach the collection queue before the next one
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(writer.pending(), 3);
    for result in futures::future::join_all(handles).await {
        result.unwrap().unwrap();
    }

    let names: Vec<_> = drivers
        .snapshot()
        .loaded_items
        .iter()
        .map(|r| r.data["full_name"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(names, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_delete_of_missing_id_fails_and_changes_nothing() {
    let gateway = gateway_with_drivers(5);
    let drivers = loader(&gateway, EntityType::Drivers, 10);
    let writer = mutator(&gateway, &drivers);
    let scope = CancellationScope::root("drivers");
    let before = drivers.reload(&scope).await.unwrap();

    let result = writer.submit(MutationRequest::delete(77), &scope).await;

    assert!(matches!(result, Err(MutationError::MutationFailed(_))));
    assert_eq!(drivers.snapshot(), before);
    assert_eq!(gateway.stats().writes, 0);
}

#[tokio::test]
async fn test_backend_rejection_leaves_collection_untouched() {
    let gateway = gateway_with_drivers(2);
    let drivers = loader(&gateway, EntityType::Drivers, 10);
    let writer = mutator(&gateway, &drivers);
    let scope = CancellationScope::root("drivers");
    let before = drivers.reload(&scope).await.unwrap();

    gateway.fail_next_write(GatewayError::Rejected("license already registered".into()));
    let result = writer.submit(new_driver("Dup"), &scope).await;

    assert_eq!(
        result.unwrap_err(),
        MutationError::MutationFailed("backend rejected request: license already registered".into())
    );
    assert_eq!(drivers.snapshot(), before);
}

#[tokio::test]
async fn test_delete_adjusts_count_without_reload() {
    let gateway = gateway_with_drivers(4);
    let drivers = loader(&gateway, EntityType::Drivers, 10);
    let writer = mutator(&gateway, &drivers);
    let scope = CancellationScope::root("drivers");
    drivers.reload(&scope).await.unwrap();
    let fetches = gateway.stats().fetches_started;

    let outcome = writer.submit(MutationRequest::delete(2), &scope).await.unwrap();

    assert_eq!(ids(&outcome.snapshot.loaded_items), vec![1, 3, 4]);
    assert_eq!(outcome.snapshot.total_count, Some(3));
    assert_eq!(gateway.stats().fetches_started, fetches);
}

#[tokio::test]
async fn test_superseding_load_does_not_cancel_mutations() {
    let gateway = gateway_with_drivers(3);
    let drivers = loader(&gateway, EntityType::Drivers, 10);
    let writer = mutator(&gateway, &drivers);
    let scope = CancellationScope::root("drivers");
    drivers.reload(&scope).await.unwrap();

    gateway.close_gate();
    let stale = {
        let (drivers, scope) = (drivers.clone(), scope.clone());
        tokio::spawn(async move { drivers.reload(&scope).await })
    };
    wait_until(|| gateway.stats().fetches_started == 2).await;
    let create = {
        let (writer, scope) = (writer.clone(), scope.clone());
        tokio::spawn(async move { writer.submit(new_driver("Queued"), &scope).await })
    };
    wait_until(|| writer.pending() == 1).await;

    // A newer load supersedes the stale one; the queued create survives
    let fresh = {
        let (drivers, scope) = (drivers.clone(), scope.clone());
        tokio::spawn(async move { drivers.reload(&scope).await })
    };
    assert!(stale.await.unwrap().is_err());
    gateway.open_gate();

    let created = create.await.unwrap().unwrap();
    fresh.await.unwrap().unwrap();
    let state = drivers.snapshot();
    assert_eq!(state.loaded_items.iter().filter(|r| r.id == created.id).count(), 1);
    assert_eq!(state.total_count, Some(4));
}

#[tokio::test]
async fn test_reload_placement_shows_created_record_once() {
    let gateway = gateway_with_drivers(3);
    let drivers = loader(&gateway, EntityType::Drivers, 10);
    let writer = SingleFlightMutator::new(drivers.clone(), gateway.clone()).with_placement(CreatePlacement::Reload);
    let scope = CancellationScope::root("drivers");
    drivers.reload(&scope).await.unwrap();
    let fetches = gateway.stats().fetches_completed;

    let created = writer.submit(new_driver("Reloaded"), &scope).await.unwrap();

    // The outcome carries the reloaded page, not the optimistic append
    assert_eq!(gateway.stats().fetches_completed, fetches + 1);
    assert_eq!(ids(&created.snapshot.loaded_items), vec![1, 2, 3, created.id]);
    assert_eq!(created.snapshot.total_count, Some(4));
    assert_eq!(drivers.snapshot().loaded_items, created.snapshot.loaded_items);
    assert_eq!(drivers.stats().committed, 2);
}

#[tokio::test]
async fn test_reconcile_reload_runs_and_stops_with_its_scope() {
    let gateway = gateway_with_drivers(3);
    let drivers = loader(&gateway, EntityType::Drivers, 10);
    let writer = SingleFlightMutator::new(drivers.clone(), gateway.clone()).with_reconcile(true);
    let view = CancellationScope::root("shell").child("drivers");
    drivers.reload(&view).await.unwrap();

    let created = writer.submit(new_driver("Background"), &view).await.unwrap();
    wait_until(|| drivers.stats().committed == 2).await;
    assert_eq!(ids(&drivers.snapshot().loaded_items), vec![1, 2, 3, created.id]);

    // The next reconcile blocks in the backend until the view goes away
    gateway.close_gate();
    writer.submit(MutationRequest::delete(1), &view).await.unwrap();
    wait_until(|| drivers.stats().started == 3).await;
    let after_delete = drivers.snapshot();

    view.cancel_and_wait().await;
    assert_eq!(view.pending_operations(), 0);
    assert_eq!(drivers.stats().cancelled, 1);

    gateway.open_gate();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(drivers.snapshot(), after_delete);
    assert_eq!(ids(&after_delete.loaded_items), vec![2, 3, created.id]);
}
