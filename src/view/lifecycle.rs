//! Lifecycle states of a registered view and what happens to it on exit

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ViewLifecycle {
    #[default]
    Inactive,
    Activating,
    Active,
    Deactivating,
}

impl fmt::Display for ViewLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ViewLifecycle::Inactive => "inactive",
            ViewLifecycle::Activating => "activating",
            ViewLifecycle::Active => "active",
            ViewLifecycle::Deactivating => "deactivating",
        };
        f.write_str(label)
    }
}

/// What the manager does with a view object after it is deactivated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Cache the view and reactivate the same object next time
    #[default]
    Keep,
    /// Drop the view; the next navigation builds a fresh one
    DiscardOnExit,
}
