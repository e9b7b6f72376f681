//! Paginated loading of one entity collection.
//!
//! At most one load per collection is ever in flight: a new request cancels
//! the load it supersedes, then queues on the collection lock, which the
//! superseded load only releases after it has observed cancellation and
//! unwound. Loads commit a complete new [`PageState`] or nothing.

use arc_swap::ArcSwap;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::lock::{CollectionGuard, CollectionLock};
use super::page::{LoadMode, PageState};
use crate::api::models::EntityType;
use crate::api::resilience::{ResilienceConfig, RetryPolicy};
use crate::api::CrudGateway;
use crate::cancel::{CancellableOperation, CancellationScope};
use crate::error::LoadError;
use crate::view::shell::StatusReporter;

/// Load counters, mostly for tests and diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderStats {
    pub started: usize,
    pub committed: usize,
    pub cancelled: usize,
    pub failed: usize,
}

struct Flight {
    id: u64,
    scope: CancellationScope,
}

/// Clears the flight slot if it still names this load
struct FlightGuard<'a> {
    loader: &'a PaginatedLoader,
    id: u64,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.loader.flight.lock().unwrap_or_else(|p| p.into_inner());
        if slot.as_ref().is_some_and(|flight| flight.id == self.id) {
            *slot = None;
        }
    }
}

/// Clears the published `in_flight` marker if the load unwinds without committing
struct InFlightMarker<'a> {
    loader: &'a PaginatedLoader,
}

impl Drop for InFlightMarker<'_> {
    fn drop(&mut self) {
        self.loader.publish_in_flight(false);
    }
}

enum PageRequest {
    At { page: usize, page_size: usize, mode: LoadMode },
    Next,
}

pub struct PaginatedLoader {
    entity: EntityType,
    gateway: Arc<dyn CrudGateway>,
    state: ArcSwap<PageState>,
    lock: CollectionLock,
    flight: Mutex<Option<Flight>>,
    next_flight: AtomicU64,
    retry: RetryPolicy,
    request_timeout: Option<Duration>,
    status: StatusReporter,
    started: AtomicUsize,
    committed: AtomicUsize,
    cancelled: AtomicUsize,
    failed: AtomicUsize,
}

impl PaginatedLoader {
    pub fn new(entity: EntityType, gateway: Arc<dyn CrudGateway>, default_page_size: usize) -> Self {
        let resilience = ResilienceConfig::default();
        Self {
            entity,
            gateway,
            state: ArcSwap::from_pointee(PageState::new(entity, default_page_size)),
            lock: CollectionLock::new(),
            flight: Mutex::new(None),
            next_flight: AtomicU64::new(1),
            retry: RetryPolicy::new(resilience.retry),
            request_timeout: resilience.request_timeout,
            status: StatusReporter::disabled(),
            started: AtomicUsize::new(0),
            committed: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    pub fn with_resilience(mut self, resilience: &ResilienceConfig) -> Self {
        self.retry = RetryPolicy::new(resilience.retry.clone());
        self.request_timeout = resilience.request_timeout;
        self
    }

    pub fn with_status(mut self, status: StatusReporter) -> Self {
        self.status = status;
        self
    }

    pub fn entity(&self) -> EntityType {
        self.entity
    }

    /// Read-only view of the last committed state
    pub fn snapshot(&self) -> Arc<PageState> {
        self.state.load_full()
    }

    pub fn stats(&self) -> LoaderStats {
        LoaderStats {
            started: self.started.load(Ordering::SeqCst),
            committed: self.committed.load(Ordering::SeqCst),
            cancelled: self.cancelled.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }

    /// Load one page. `Replace` discards loaded items; `Append` must name the
    /// next unfetched page with the current page size.
    pub async fn load_page(
        &self,
        page: usize,
        page_size: usize,
        mode: LoadMode,
        scope: &CancellationScope,
    ) -> Result<Arc<PageState>, LoadError> {
        if page == 0 || page_size == 0 {
            return Err(LoadError::InvalidPage { requested: page, expected: 1 });
        }
        self.load(PageRequest::At { page, page_size, mode }, scope).await
    }

    /// Replace with the first page at the current page size
    pub async fn reload(&self, scope: &CancellationScope) -> Result<Arc<PageState>, LoadError> {
        let page_size = self.snapshot().page_size;
        self.load_page(1, page_size, LoadMode::Replace, scope).await
    }

    /// Append the next unfetched page; returns the current state without
    /// fetching when everything is already loaded
    pub async fn extend(&self, scope: &CancellationScope) -> Result<Arc<PageState>, LoadError> {
        self.load(PageRequest::Next, scope).await
    }

    /// Re-fetch only the total and apply the shrink policy to loaded items
    pub async fn refresh_count(&self, scope: &CancellationScope) -> Result<Arc<PageState>, LoadError> {
        let (op, _flight) = self.start_flight("refresh_count", scope);
        let result = self.refresh_count_locked(&op).await;
        self.finish(&op, result)
    }

    pub(crate) fn lock(&self) -> &CollectionLock {
        &self.lock
    }

    /// Publish a new state; the guard proves the caller holds the collection
    pub(crate) fn commit(&self, _guard: &CollectionGuard, state: PageState) -> Arc<PageState> {
        let state = Arc::new(state);
        self.state.store(state.clone());
        state
    }

    async fn load(&self, request: PageRequest, scope: &CancellationScope) -> Result<Arc<PageState>, LoadError> {
        let (op, _flight) = self.start_flight("load_page", scope);
        let result = self.load_locked(&op, request).await;
        self.finish(&op, result)
    }

    /// Register a new flight, cancelling the one it supersedes
    fn start_flight(&self, name: &'static str, scope: &CancellationScope) -> (CancellableOperation, FlightGuard<'_>) {
        let id = self.next_flight.fetch_add(1, Ordering::SeqCst);
        let flight_scope = scope.child(format!("{}:{}#{}", self.entity, name, id));
        {
            let mut slot = self.flight.lock().unwrap_or_else(|p| p.into_inner());
            if let Some(previous) = slot.replace(Flight { id, scope: flight_scope.clone() }) {
                debug!("{} load #{} supersedes #{}", self.entity, id, previous.id);
                previous.scope.cancel();
            }
        }
        self.started.fetch_add(1, Ordering::SeqCst);

        let op = CancellableOperation::begin(name, &flight_scope).with_timeout(self.request_timeout);
        (op, FlightGuard { loader: self, id })
    }

    async fn load_locked(&self, op: &CancellableOperation, request: PageRequest) -> Result<Arc<PageState>, LoadError> {
        let guard = self.lock.acquire(op).await?;
        let current = self.snapshot();

        let (page, page_size, mode) = match request {
            PageRequest::Next if current.is_complete() => {
                debug!("[{}] {} fully loaded, nothing to extend", op.id(), self.entity);
                return Ok(current);
            }
            PageRequest::Next => (current.next_page(), current.page_size, LoadMode::Append),
            PageRequest::At { page, page_size, mode } => (page, page_size, mode),
        };
        if mode == LoadMode::Append {
            let expected = current.next_page();
            let size_changed = !current.is_empty() && page_size != current.page_size;
            if page != expected || size_changed {
                return Err(LoadError::InvalidPage { requested: page, expected });
            }
        }

        self.publish_in_flight(true);
        let _marker = InFlightMarker { loader: self };

        op.checkpoint("before_fetch")?;
        debug!("[{}] fetching {} page {} (size {}, {:?})", op.id(), self.entity, page, page_size, mode);
        let fetched = self
            .retry
            .execute(op, || self.gateway.fetch_page(self.entity, page, page_size))
            .await?;
        op.checkpoint("before_commit")?;

        let mut next = (*self.snapshot()).clone();
        let dropped = next.apply_page(mode, page, page_size, fetched);
        next.in_flight = false;
        let committed = self.commit(&guard, next);
        self.report_truncation(dropped, &committed);

        info!(
            "[{}] {} page {} committed: {} loaded of {:?}",
            op.id(),
            self.entity,
            page,
            committed.len(),
            committed.total_count
        );
        Ok(committed)
    }

    async fn refresh_count_locked(&self, op: &CancellableOperation) -> Result<Arc<PageState>, LoadError> {
        let guard = self.lock.acquire(op).await?;
        self.publish_in_flight(true);
        let _marker = InFlightMarker { loader: self };

        op.checkpoint("before_fetch")?;
        let total = self.retry.execute(op, || self.gateway.fetch_count(self.entity)).await?;
        op.checkpoint("before_commit")?;

        let mut next = (*self.snapshot()).clone();
        if next.total_count != Some(total) {
            next.generation += 1;
        }
        let dropped = next.reconcile_count(total);
        next.in_flight = false;
        let committed = self.commit(&guard, next);
        self.report_truncation(dropped, &committed);

        debug!("[{}] {} count refreshed: {}", op.id(), self.entity, total);
        Ok(committed)
    }

    fn finish(&self, op: &CancellableOperation, result: Result<Arc<PageState>, LoadError>) -> Result<Arc<PageState>, LoadError> {
        match &result {
            Ok(_) => {
                self.committed.fetch_add(1, Ordering::SeqCst);
            }
            Err(LoadError::Cancelled) => {
                self.cancelled.fetch_add(1, Ordering::SeqCst);
                debug!("[{}] {} {} cancelled after {:?}", op.id(), self.entity, op.name(), op.elapsed());
            }
            Err(LoadError::LoadFailed(cause)) => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                warn!("[{}] {} {} failed: {}", op.id(), self.entity, op.name(), cause);
                self.status
                    .warn(format!("Could not load {}: {}. Showing last loaded data.", self.entity.title(), cause));
            }
            Err(error @ LoadError::InvalidPage { .. }) => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                warn!("[{}] {} {} rejected: {}", op.id(), self.entity, op.name(), error);
            }
        }
        result
    }

    fn report_truncation(&self, dropped: usize, state: &PageState) {
        if dropped > 0 {
            warn!(
                "{} shrank to {} elsewhere; dropped {} loaded item(s)",
                self.entity,
                state.len(),
                dropped
            );
            self.status.warn(format!(
                "{} list shortened to {} item(s) because records were deleted elsewhere; reload to see current data",
                self.entity.title(),
                state.len()
            ));
        }
    }

    /// Only called by the lock holder
    fn publish_in_flight(&self, in_flight: bool) {
        let current = self.state.load();
        if current.in_flight != in_flight {
            let mut next = (**current).clone();
            next.in_flight = in_flight;
            self.state.store(Arc::new(next));
        }
    }
}
