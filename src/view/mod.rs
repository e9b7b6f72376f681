//! Views and the manager that keeps exactly one of them active

pub mod collection_view;
pub mod lifecycle;
pub mod manager;
pub mod shell;
#[allow(clippy::module_inception)]
pub mod view;

pub use collection_view::CollectionView;
pub use lifecycle::{RetentionPolicy, ViewLifecycle};
pub use manager::{ActivationOutcome, ViewLifecycleManager};
pub use shell::{NavigationRequest, Severity, ShellEvent, StatusReporter};
pub use view::{ActivationContext, View, ViewFactory};
