//! In-process backend used by tests and for local demos.
//!
//! Besides plain CRUD it can hold fetches at a gate, inject failures and apply
//! edits "from another user", which lets callers reproduce concurrent
//! interleavings deterministically.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;

use super::gateway::{CrudGateway, merge_fields};
use super::models::{EntityType, Page, Record, RecordId};
use crate::error::GatewayError;

/// Counters for calls reaching the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    pub fetches_started: usize,
    pub fetches_completed: usize,
    pub counts: usize,
    pub writes: usize,
}

#[derive(Default)]
struct Injected {
    fetch: VecDeque<GatewayError>,
    write: VecDeque<GatewayError>,
}

pub struct InMemoryGateway {
    tables: Mutex<HashMap<EntityType, Vec<Record>>>,
    next_id: AtomicI64,
    gate: watch::Sender<bool>,
    latency: Mutex<Option<Duration>>,
    injected: Mutex<Injected>,
    fetches_started: AtomicUsize,
    fetches_completed: AtomicUsize,
    counts: AtomicUsize,
    writes: AtomicUsize,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryGateway {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            tables: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            gate,
            latency: Mutex::new(None),
            injected: Mutex::new(Injected::default()),
            fetches_started: AtomicUsize::new(0),
            fetches_completed: AtomicUsize::new(0),
            counts: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Insert records directly, bypassing counters and gates
    pub fn seed(&self, entity: EntityType, rows: impl IntoIterator<Item = Value>) -> Vec<Record> {
        let mut tables = locked(&self.tables);
        let table = tables.entry(entity).or_default();
        let mut created = Vec::new();
        for data in rows {
            let record = Record::new(self.next_id.fetch_add(1, Ordering::SeqCst), data);
            table.push(record.clone());
            created.push(record);
        }
        created
    }

    pub fn records(&self, entity: EntityType) -> Vec<Record> {
        locked(&self.tables).get(&entity).cloned().unwrap_or_default()
    }

    /// Hold every subsequent fetch until [`open_gate`](Self::open_gate) is called
    pub fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        *locked(&self.latency) = latency;
    }

    /// The next fetch (page or count) fails with `error`
    pub fn fail_next_fetch(&self, error: GatewayError) {
        locked(&self.injected).fetch.push_back(error);
    }

    /// The next create/update/delete fails with `error`
    pub fn fail_next_write(&self, error: GatewayError) {
        locked(&self.injected).write.push_back(error);
    }

    /// Delete a record as another user would, without going through the coordinator
    pub fn external_delete(&self, entity: EntityType, id: RecordId) -> bool {
        let mut tables = locked(&self.tables);
        let table = tables.entry(entity).or_default();
        let before = table.len();
        table.retain(|r| r.id != id);
        table.len() != before
    }

    /// Edit a record as another user would, bumping its version
    pub fn external_update(&self, entity: EntityType, id: RecordId, patch: &Value) -> bool {
        let mut tables = locked(&self.tables);
        match tables.entry(entity).or_default().iter_mut().find(|r| r.id == id) {
            Some(record) => {
                merge_fields(&mut record.data, patch);
                record.version += 1;
                true
            }
            None => false,
        }
    }

    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            fetches_started: self.fetches_started.load(Ordering::SeqCst),
            fetches_completed: self.fetches_completed.load(Ordering::SeqCst),
            counts: self.counts.load(Ordering::SeqCst),
            writes: self.writes.load(Ordering::SeqCst),
        }
    }

    async fn pass_gate(&self) -> Result<(), GatewayError> {
        let mut gate = self.gate.subscribe();
        gate.wait_for(|open| *open)
            .await
            .map_err(|_| GatewayError::Unavailable("gateway shut down".to_string()))?;
        Ok(())
    }

    async fn simulate_latency(&self) {
        let latency = *locked(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn take_fetch_failure(&self) -> Option<GatewayError> {
        locked(&self.injected).fetch.pop_front()
    }

    fn take_write_failure(&self) -> Option<GatewayError> {
        locked(&self.injected).write.pop_front()
    }
}

#[async_trait]
impl CrudGateway for InMemoryGateway {
    async fn fetch_page(&self, entity: EntityType, page: usize, page_size: usize) -> Result<Page, GatewayError> {
        self.fetches_started.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await?;
        self.simulate_latency().await;

        if let Some(error) = self.take_fetch_failure() {
            return Err(error);
        }
        if page == 0 || page_size == 0 {
            return Err(GatewayError::Rejected("page and page size start at 1".to_string()));
        }

        let page_result = {
            let tables = locked(&self.tables);
            let table = tables.get(&entity).map(Vec::as_slice).unwrap_or(&[]);
            let offset = (page - 1).saturating_mul(page_size);
            Page {
                items: table.iter().skip(offset).take(page_size).cloned().collect(),
                total_count: table.len(),
            }
        };
        self.fetches_completed.fetch_add(1, Ordering::SeqCst);
        Ok(page_result)
    }

    async fn fetch_count(&self, entity: EntityType) -> Result<usize, GatewayError> {
        self.counts.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await?;
        self.simulate_latency().await;

        if let Some(error) = self.take_fetch_failure() {
            return Err(error);
        }
        Ok(locked(&self.tables).get(&entity).map_or(0, Vec::len))
    }

    async fn create(&self, entity: EntityType, data: &Value) -> Result<Record, GatewayError> {
        self.simulate_latency().await;
        if let Some(error) = self.take_write_failure() {
            return Err(error);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);

        let record = Record::new(self.next_id.fetch_add(1, Ordering::SeqCst), data.clone());
        locked(&self.tables).entry(entity).or_default().push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        entity: EntityType,
        id: RecordId,
        expected_version: i64,
        data: &Value,
    ) -> Result<Record, GatewayError> {
        self.simulate_latency().await;
        if let Some(error) = self.take_write_failure() {
            return Err(error);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);

        let mut tables = locked(&self.tables);
        let record = tables
            .entry(entity)
            .or_default()
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(GatewayError::NotFound(id))?;
        if record.version != expected_version {
            return Err(GatewayError::Conflict { id, expected: expected_version });
        }
        merge_fields(&mut record.data, data);
        record.version += 1;
        Ok(record.clone())
    }

    async fn delete(&self, entity: EntityType, id: RecordId) -> Result<(), GatewayError> {
        self.simulate_latency().await;
        if let Some(error) = self.take_write_failure() {
            return Err(error);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);

        let mut tables = locked(&self.tables);
        let table = tables.entry(entity).or_default();
        let before = table.len();
        table.retain(|r| r.id != id);
        if table.len() == before {
            return Err(GatewayError::NotFound(id));
        }
        Ok(())
    }
}
