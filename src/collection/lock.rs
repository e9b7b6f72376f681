//! Per-collection exclusion token shared by the loader and the mutator.
//!
//! Waiters are served in FIFO order (tokio's mutex is fair), which gives
//! queued mutations their submission order and orders loads against them.

use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::cancel::CancellableOperation;
use crate::error::Cancelled;

#[derive(Clone, Default)]
pub struct CollectionLock {
    inner: Arc<Mutex<()>>,
}

/// Proof that the holder owns the collection until dropped
pub struct CollectionGuard {
    _guard: OwnedMutexGuard<()>,
}

impl CollectionLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the token, giving up if `op` is cancelled while queued
    pub async fn acquire(&self, op: &CancellableOperation) -> Result<CollectionGuard, Cancelled> {
        op.checkpoint("acquire")?;
        let token = op.scope().token().clone();
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                log::debug!("[{}] {} cancelled while queued for the collection", op.id(), op.name());
                Err(Cancelled)
            }
            guard = self.inner.clone().lock_owned() => Ok(CollectionGuard { _guard: guard }),
        }
    }

    /// Whether someone currently holds the token
    pub fn is_held(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}
