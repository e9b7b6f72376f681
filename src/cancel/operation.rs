//! One async unit of work bound to a cancellation scope.
//!
//! Cancellation is cooperative. An operation observes its signal at
//! checkpoints: explicitly through [`CancellableOperation::checkpoint`], and
//! implicitly at every await routed through [`CancellableOperation::run`] or
//! [`CancellableOperation::sleep`], which race the awaited future against the
//! signal. Awaits made through `run` and `run_to_completion` are also bounded
//! by the operation's timeout, so a caller waiting for a cancelled operation
//! never waits longer than that timeout plus the synchronous stretch between
//! two awaits.

use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::task::task_tracker::TaskTrackerToken;
use uuid::Uuid;

use super::scope::CancellationScope;
use crate::error::Cancelled;

/// Why a `run` call stopped before its future resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Cancelled,
    TimedOut(Duration),
}

impl From<Cancelled> for Interrupt {
    fn from(_: Cancelled) -> Self {
        Interrupt::Cancelled
    }
}

pub struct CancellableOperation {
    id: Uuid,
    name: &'static str,
    scope: CancellationScope,
    timeout: Option<Duration>,
    started: Instant,
    // Released on drop, which is what `cancel_and_wait` waits for
    _registration: Vec<TaskTrackerToken>,
}

impl CancellableOperation {
    pub fn begin(name: &'static str, scope: &CancellationScope) -> Self {
        let id = Uuid::new_v4();
        log::debug!("[{}] {} started in scope '{}'", id, name, scope.name());
        Self {
            id,
            name,
            scope: scope.clone(),
            timeout: None,
            started: Instant::now(),
            _registration: scope.register(),
        }
    }

    /// Bound every `run` await by `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Correlation id used in log lines
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn scope(&self) -> &CancellationScope {
        &self.scope
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_cancelled(&self) -> bool {
        self.scope.is_cancelled()
    }

    /// Observe the cancellation signal at a named point
    pub fn checkpoint(&self, label: &'static str) -> Result<(), Cancelled> {
        self.scope.record_checkpoint(label);
        if self.scope.is_cancelled() {
            log::debug!("[{}] {} cancelled at checkpoint '{}'", self.id, self.name, label);
            return Err(Cancelled);
        }
        Ok(())
    }

    /// Checkpoint, then await `future` unless cancellation or the timeout wins first.
    /// A future abandoned this way is dropped.
    pub async fn run<F>(&self, label: &'static str, future: F) -> Result<F::Output, Interrupt>
    where
        F: Future,
    {
        self.checkpoint(label)?;
        let token = self.scope.token();

        match self.timeout {
            Some(limit) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        log::debug!("[{}] {} cancelled during '{}'", self.id, self.name, label);
                        Err(Interrupt::Cancelled)
                    }
                    result = tokio::time::timeout(limit, future) => {
                        result.map_err(|_| {
                            log::warn!("[{}] {} timed out during '{}' after {:?}", self.id, self.name, label, limit);
                            Interrupt::TimedOut(limit)
                        })
                    }
                }
            }
            None => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        log::debug!("[{}] {} cancelled during '{}'", self.id, self.name, label);
                        Err(Interrupt::Cancelled)
                    }
                    output = future => Ok(output),
                }
            }
        }
    }

    /// Checkpoint, then await `future` regardless of later cancellation.
    /// Used for writes that must not be abandoned once issued; only the
    /// operation's timeout can cut them short.
    pub async fn run_to_completion<F>(&self, label: &'static str, future: F) -> Result<F::Output, Interrupt>
    where
        F: Future,
    {
        self.checkpoint(label)?;
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, future).await.map_err(|_| {
                log::warn!("[{}] {} timed out during '{}' after {:?}", self.id, self.name, label, limit);
                Interrupt::TimedOut(limit)
            }),
            None => Ok(future.await),
        }
    }

    /// Cancellation-aware sleep
    pub async fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        tokio::select! {
            biased;
            _ = self.scope.cancelled() => Err(Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

impl Drop for CancellableOperation {
    fn drop(&mut self) {
        log::debug!("[{}] {} finished after {:?}", self.id, self.name, self.started.elapsed());
    }
}
