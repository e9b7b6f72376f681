//! Cooperative cancellation: scopes and the operations that run inside them

pub mod operation;
pub mod scope;

pub use operation::{CancellableOperation, Interrupt};
pub use scope::CancellationScope;
