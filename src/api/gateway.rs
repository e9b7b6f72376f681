//! The CRUD data-access seam the coordinator drives

use async_trait::async_trait;
use serde_json::Value;

use super::models::{EntityType, Page, Record, RecordId};
use crate::error::GatewayError;

/// Per-entity paged fetch, count and write access to the backing store.
///
/// Cancellation is expressed by dropping the returned future: implementations
/// must tolerate being dropped at any await point. Fetches are treated as safe
/// to retry; `create` is not assumed idempotent and is never retried.
#[async_trait]
pub trait CrudGateway: Send + Sync {
    /// Fetch one 1-based page, ordered consistently across calls, plus the current total
    async fn fetch_page(&self, entity: EntityType, page: usize, page_size: usize) -> Result<Page, GatewayError>;

    /// Current number of records in the collection
    async fn fetch_count(&self, entity: EntityType) -> Result<usize, GatewayError>;

    /// Insert a record; the backend assigns id and version
    async fn create(&self, entity: EntityType, data: &Value) -> Result<Record, GatewayError>;

    /// Merge `data` into an existing record if its version still equals `expected_version`
    async fn update(
        &self,
        entity: EntityType,
        id: RecordId,
        expected_version: i64,
        data: &Value,
    ) -> Result<Record, GatewayError>;

    async fn delete(&self, entity: EntityType, id: RecordId) -> Result<(), GatewayError>;
}

/// Shallow-merge the fields of `patch` into `base` (both JSON objects)
pub(crate) fn merge_fields(base: &mut Value, patch: &Value) {
    match (base.as_object_mut(), patch.as_object()) {
        (Some(target), Some(fields)) => {
            for (key, value) in fields {
                target.insert(key.clone(), value.clone());
            }
        }
        _ => *base = patch.clone(),
    }
}
