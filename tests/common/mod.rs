//! Shared fixtures for the integration tests
#![allow(dead_code)]

use fleet_coordinator::api::{EntityType, InMemoryGateway, ResilienceConfig};
use fleet_coordinator::collection::{PaginatedLoader, SingleFlightMutator};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

pub fn drivers(n: usize) -> Vec<Value> {
    (1..=n)
        .map(|i| json!({"full_name": format!("Driver {i}"), "license_number": format!("L-{i}")}))
        .collect()
}

pub fn vehicles(n: usize) -> Vec<Value> {
    (1..=n)
        .map(|i| json!({"plate_number": format!("P-{i}"), "model": "Transit"}))
        .collect()
}

pub fn gateway_with_drivers(n: usize) -> Arc<InMemoryGateway> {
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.seed(EntityType::Drivers, drivers(n));
    gateway
}

pub fn loader(gateway: &Arc<InMemoryGateway>, entity: EntityType, page_size: usize) -> Arc<PaginatedLoader> {
    Arc::new(
        PaginatedLoader::new(entity, gateway.clone(), page_size).with_resilience(&ResilienceConfig::disabled()),
    )
}

pub fn mutator(gateway: &Arc<InMemoryGateway>, loader: &Arc<PaginatedLoader>) -> Arc<SingleFlightMutator> {
    Arc::new(SingleFlightMutator::new(loader.clone(), gateway.clone()))
}

/// Poll `condition` until it holds, failing the test after a second
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

pub fn ids(items: &[fleet_coordinator::Record]) -> Vec<i64> {
    items.iter().map(|r| r.id).collect()
}
