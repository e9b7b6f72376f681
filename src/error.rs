//! Error taxonomy for the coordinator.
//!
//! Every component catches its own failures at its boundary and converts them
//! into one of these types plus a status event. `Cancelled` is an expected
//! outcome and is never reported as a fault.

use std::time::Duration;
use thiserror::Error;

use crate::api::models::RecordId;

/// Failures reported by a [`CrudGateway`](crate::api::CrudGateway) backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("record {0} not found")]
    NotFound(RecordId),

    #[error("record {id} was modified by another user (expected version {expected})")]
    Conflict { id: RecordId, expected: i64 },

    #[error("backend rejected request: {0}")]
    Rejected(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl GatewayError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Unavailable(_) => true,
            GatewayError::Timeout(_) => true,
            GatewayError::NotFound(_) => false,
            GatewayError::Conflict { .. } => false,
            GatewayError::Rejected(_) => false,
            GatewayError::Backend(_) => false,
        }
    }
}

/// Outcome of a failed or abandoned page/count load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// Superseded by a newer load or the owning view navigated away
    #[error("load cancelled")]
    Cancelled,

    #[error("load failed: {0}")]
    LoadFailed(#[source] GatewayError),

    /// Append requested a page other than the next unfetched one, or a zero page/size
    #[error("invalid page request: page {requested} (expected {expected})")]
    InvalidPage { requested: usize, expected: usize },
}

/// Outcome of a rejected or abandoned mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("mutation cancelled")]
    Cancelled,

    #[error("mutation failed: {0}")]
    MutationFailed(String),

    #[error("record {id} was changed by someone else; reload before editing")]
    ConcurrentMutationConflict { id: RecordId },
}

/// Errors returned by the view lifecycle manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavigationError {
    /// Navigation requested a view that was never registered
    #[error("unknown view '{0}'")]
    UnknownView(String),

    /// A newer navigation request superseded this one
    #[error("navigation cancelled")]
    Cancelled,
}

/// Error returned from a view's activation or deactivation hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error("{0}")]
    Other(String),
}

impl ViewError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            ViewError::Load(LoadError::Cancelled) | ViewError::Mutation(MutationError::Cancelled)
        )
    }
}

/// Marker returned when an operation observed its cancellation signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

impl From<Cancelled> for LoadError {
    fn from(_: Cancelled) -> Self {
        LoadError::Cancelled
    }
}

impl From<Cancelled> for MutationError {
    fn from(_: Cancelled) -> Self {
        MutationError::Cancelled
    }
}
