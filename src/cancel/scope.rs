//! Lifetime-bound cancellation scopes
//!
//! A scope pairs a cancellation token with a task tracker. Child scopes inherit
//! cancellation from their parent but can be cancelled on their own, and every
//! operation registered in a child is also tracked by all of its ancestors, so
//! `cancel_and_wait` on a view scope waits for the loads and mutations derived
//! from it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TaskTrackerToken;

#[derive(Clone)]
pub struct CancellationScope {
    inner: Arc<ScopeInner>,
}

struct ScopeInner {
    name: String,
    token: CancellationToken,
    tracker: TaskTracker,
    parent: Option<CancellationScope>,
    /// Checkpoint label -> number of times an operation in this scope passed it
    checkpoints: Mutex<HashMap<&'static str, u64>>,
}

impl CancellationScope {
    /// Top-level scope owned by the shell
    pub fn root(name: impl Into<String>) -> Self {
        Self::build(name.into(), CancellationToken::new(), None)
    }

    /// Scope cancelled together with `self`, or independently via its own `cancel`
    pub fn child(&self, name: impl Into<String>) -> Self {
        Self::build(name.into(), self.inner.token.child_token(), Some(self.clone()))
    }

    fn build(name: String, token: CancellationToken, parent: Option<CancellationScope>) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                name,
                token,
                tracker: TaskTracker::new(),
                parent,
                checkpoints: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Fire the signal without waiting for operations to unwind
    pub fn cancel(&self) {
        self.inner.token.cancel();
    }

    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.token.cancelled()
    }

    /// Cancel, then wait until every operation registered in this scope or any
    /// descendant has released its registration.
    pub async fn cancel_and_wait(&self) {
        self.inner.token.cancel();
        self.inner.tracker.close();
        let pending = self.inner.tracker.len();
        if pending > 0 {
            log::debug!("Scope '{}' waiting for {} operation(s) to unwind", self.inner.name, pending);
        }
        self.inner.tracker.wait().await;
    }

    /// Operations currently registered here (including descendants)
    pub fn pending_operations(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Register one operation with this scope and all of its ancestors
    pub(crate) fn register(&self) -> Vec<TaskTrackerToken> {
        let mut registrations = Vec::new();
        let mut scope = Some(self);
        while let Some(current) = scope {
            registrations.push(current.inner.tracker.token());
            scope = current.inner.parent.as_ref();
        }
        registrations
    }

    /// Count a checkpoint here and in every ancestor
    pub(crate) fn record_checkpoint(&self, label: &'static str) {
        let mut scope = Some(self);
        while let Some(current) = scope {
            let mut checkpoints = current.inner.checkpoints.lock().unwrap_or_else(|p| p.into_inner());
            *checkpoints.entry(label).or_insert(0) += 1;
            scope = current.inner.parent.as_ref();
        }
    }

    /// How many times operations in this scope (or a descendant) reached `label`
    pub fn checkpoint_hits(&self, label: &str) -> u64 {
        let checkpoints = self.inner.checkpoints.lock().unwrap_or_else(|p| p.into_inner());
        checkpoints.get(label).copied().unwrap_or(0)
    }
}

impl fmt::Debug for CancellationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationScope")
            .field("name", &self.inner.name)
            .field("cancelled", &self.is_cancelled())
            .field("pending", &self.inner.tracker.len())
            .finish()
    }
}
