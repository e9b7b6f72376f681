//! The view seam: what a navigable screen implements

use async_trait::async_trait;
use serde_json::Value;

use super::lifecycle::RetentionPolicy;
use crate::cancel::CancellationScope;
use crate::error::ViewError;

/// Handed to a view when it becomes active
#[derive(Debug, Clone)]
pub struct ActivationContext {
    /// Cancelled when the view is deactivated (or the refresh is superseded)
    pub scope: CancellationScope,
    pub parameter: Value,
    /// The view was already active and is being explicitly refreshed
    pub refresh: bool,
}

#[async_trait]
pub trait View: Send {
    fn title(&self) -> &str;

    /// Start the view's work. Long-running work must observe `ctx.scope`.
    async fn on_activate(&mut self, ctx: ActivationContext) -> Result<(), ViewError>;

    /// Runs after the view's scope has been cancelled and drained
    async fn on_deactivate(&mut self) -> Result<(), ViewError> {
        Ok(())
    }
}

/// Builds view objects for one registered name
pub trait ViewFactory: Send + Sync {
    fn create(&self) -> Box<dyn View>;

    fn retention(&self) -> RetentionPolicy {
        RetentionPolicy::Keep
    }
}

impl<F> ViewFactory for F
where
    F: Fn() -> Box<dyn View> + Send + Sync,
{
    fn create(&self) -> Box<dyn View> {
        self()
    }
}
