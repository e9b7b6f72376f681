//! Owns the registered views and keeps exactly one of them active.
//!
//! Every navigation is an *attempt*. Starting an attempt cancels the attempt
//! it supersedes; attempts then queue on the manager state in arrival order,
//! so a superseded attempt unwinds before the next one touches any view.
//! Switching views cancels the previous view's scope and waits for everything
//! registered in it before the next view's activation hook runs.

use log::{debug, error, info, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::lifecycle::{RetentionPolicy, ViewLifecycle};
use super::shell::{NavigationRequest, StatusReporter};
use super::view::{ActivationContext, View, ViewFactory};
use crate::cancel::CancellationScope;
use crate::error::{NavigationError, ViewError};

/// How an `activate` call ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// The view became active
    Activated,
    /// The view was already active and its activation hook ran again
    Refreshed,
    /// The view was already active and refresh on reactivation is disabled
    AlreadyActive,
    /// The view is active but its activation hook failed; it shows stale or no data
    Degraded { reason: String },
}

struct Registration {
    factory: Arc<dyn ViewFactory>,
    retention: RetentionPolicy,
}

#[derive(Default)]
struct ViewSlot {
    view: Option<Box<dyn View>>,
    scope: Option<CancellationScope>,
}

#[derive(Default)]
struct Registry {
    lifecycles: HashMap<String, ViewLifecycle>,
    active: Option<String>,
}

#[derive(Clone)]
struct Attempt {
    id: u64,
    token: CancellationToken,
}

pub struct ViewLifecycleManager {
    registrations: HashMap<String, Registration>,
    root: CancellationScope,
    refresh_on_reactivate: bool,
    status: StatusReporter,
    slots: tokio::sync::Mutex<HashMap<String, ViewSlot>>,
    registry: Mutex<Registry>,
    attempt: Mutex<Option<Attempt>>,
    next_attempt: AtomicU64,
}

impl ViewLifecycleManager {
    pub fn new(root: CancellationScope) -> Self {
        Self {
            registrations: HashMap::new(),
            root,
            refresh_on_reactivate: true,
            status: StatusReporter::disabled(),
            slots: tokio::sync::Mutex::new(HashMap::new()),
            registry: Mutex::new(Registry::default()),
            attempt: Mutex::new(None),
            next_attempt: AtomicU64::new(1),
        }
    }

    /// Whether activating the active view runs its activation hook again
    pub fn with_refresh_on_reactivate(mut self, refresh: bool) -> Self {
        self.refresh_on_reactivate = refresh;
        self
    }

    pub fn with_status(mut self, status: StatusReporter) -> Self {
        self.status = status;
        self
    }

    pub fn register(&mut self, name: impl Into<String>, factory: impl ViewFactory + 'static) {
        let name = name.into();
        let retention = factory.retention();
        debug!("Registered view '{}' ({:?})", name, retention);
        self.registry().lifecycles.insert(name.clone(), ViewLifecycle::Inactive);
        self.registrations.insert(
            name,
            Registration {
                factory: Arc::new(factory),
                retention,
            },
        );
    }

    pub fn views(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.registrations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn root_scope(&self) -> &CancellationScope {
        &self.root
    }

    pub fn active_view(&self) -> Option<String> {
        self.registry().active.clone()
    }

    /// `None` for names that were never registered
    pub fn lifecycle(&self, name: &str) -> Option<ViewLifecycle> {
        self.registry().lifecycles.get(name).copied()
    }

    /// Scope of the active view, for work the presentation layer starts on its behalf
    pub async fn active_scope(&self) -> Option<CancellationScope> {
        let name = self.active_view()?;
        let slots = self.slots.lock().await;
        slots.get(&name).and_then(|slot| slot.scope.clone())
    }

    /// Make `name` the active view, deactivating the current one first
    pub async fn activate(&self, name: &str, parameter: Value) -> Result<ActivationOutcome, NavigationError> {
        self.ensure_registered(name)?;
        let attempt = self.begin_attempt();
        let result = self.activate_attempt(name, parameter, &attempt).await;
        self.end_attempt(&attempt);
        result
    }

    /// Deactivate `name` if it is the active view
    pub async fn deactivate(&self, name: &str) -> Result<(), NavigationError> {
        self.ensure_registered(name)?;
        let attempt = self.begin_attempt();
        let mut slots = self.slots.lock().await;
        if self.active_view().as_deref() == Some(name) {
            self.deactivate_locked(&mut slots, name).await;
        }
        drop(slots);
        self.end_attempt(&attempt);
        Ok(())
    }

    /// Serve navigation requests until the sender side closes. Each request
    /// supersedes the previous one in arrival order; the last request wins.
    pub async fn run(self: Arc<Self>, mut requests: mpsc::UnboundedReceiver<NavigationRequest>) {
        let tracker = TaskTracker::new();
        while let Some(request) = requests.recv().await {
            if self.ensure_registered(&request.view).is_err() {
                continue;
            }
            let attempt = self.begin_attempt();
            let manager = self.clone();
            tracker.spawn(async move {
                match manager.activate_attempt(&request.view, request.parameter, &attempt).await {
                    Ok(outcome) => debug!("Navigation to '{}' ended: {:?}", request.view, outcome),
                    Err(e) => debug!("Navigation to '{}' ended: {}", request.view, e),
                }
                manager.end_attempt(&attempt);
            });
        }
        tracker.close();
        tracker.wait().await;
        debug!("Navigation loop stopped");
    }

    /// Deactivate the active view and tear down the root scope
    pub async fn shutdown(&self) {
        let attempt = self.begin_attempt();
        let mut slots = self.slots.lock().await;
        if let Some(active) = self.active_view() {
            self.deactivate_locked(&mut slots, &active).await;
        }
        drop(slots);
        self.end_attempt(&attempt);
        self.root.cancel_and_wait().await;
        info!("View manager shut down");
    }

    fn ensure_registered(&self, name: &str) -> Result<(), NavigationError> {
        if self.registrations.contains_key(name) {
            return Ok(());
        }
        error!("Navigation requested unknown view '{}'", name);
        self.status.error(format!("There is no view called '{}'", name));
        Err(NavigationError::UnknownView(name.to_string()))
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_lifecycle(&self, name: &str, lifecycle: ViewLifecycle) {
        debug!("View '{}' -> {}", name, lifecycle);
        let mut registry = self.registry();
        registry.lifecycles.insert(name.to_string(), lifecycle);
        match lifecycle {
            ViewLifecycle::Active => registry.active = Some(name.to_string()),
            ViewLifecycle::Inactive if registry.active.as_deref() == Some(name) => registry.active = None,
            _ => {}
        }
    }

    fn begin_attempt(&self) -> Attempt {
        let attempt = Attempt {
            id: self.next_attempt.fetch_add(1, Ordering::SeqCst),
            token: self.root.token().child_token(),
        };
        let mut slot = self.attempt.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = slot.replace(attempt.clone()) {
            debug!("Navigation #{} supersedes #{}", attempt.id, previous.id);
            previous.token.cancel();
        }
        attempt
    }

    fn end_attempt(&self, attempt: &Attempt) {
        let mut slot = self.attempt.lock().unwrap_or_else(|p| p.into_inner());
        if slot.as_ref().is_some_and(|current| current.id == attempt.id) {
            *slot = None;
        }
    }

    async fn activate_attempt(
        &self,
        name: &str,
        parameter: Value,
        attempt: &Attempt,
    ) -> Result<ActivationOutcome, NavigationError> {
        let registration = self
            .registrations
            .get(name)
            .ok_or_else(|| NavigationError::UnknownView(name.to_string()))?;

        let mut slots = tokio::select! {
            biased;
            _ = attempt.token.cancelled() => return Err(NavigationError::Cancelled),
            slots = self.slots.lock() => slots,
        };
        if attempt.token.is_cancelled() {
            return Err(NavigationError::Cancelled);
        }

        if self.active_view().as_deref() == Some(name) {
            if !self.refresh_on_reactivate {
                debug!("View '{}' already active; refresh disabled", name);
                return Ok(ActivationOutcome::AlreadyActive);
            }
            return self.refresh_locked(&mut slots, name, parameter, attempt).await;
        }

        if let Some(previous) = self.active_view() {
            self.deactivate_locked(&mut slots, &previous).await;
        }
        if attempt.token.is_cancelled() {
            return Err(NavigationError::Cancelled);
        }

        let slot = slots.entry(name.to_string()).or_default();
        let view = slot.view.get_or_insert_with(|| registration.factory.create());
        let scope = self.root.child(name);
        slot.scope = Some(scope.clone());
        self.set_lifecycle(name, ViewLifecycle::Activating);

        let ctx = ActivationContext {
            scope: scope.clone(),
            parameter,
            refresh: false,
        };
        let result = run_hook(view.as_mut(), ctx, &scope, attempt).await;
        let title = view.title().to_string();

        match result {
            Err(e) if e.is_cancelled() || attempt.token.is_cancelled() => {
                debug!("Activation of '{}' cancelled ({})", name, e);
                self.deactivate_locked(&mut slots, name).await;
                Err(NavigationError::Cancelled)
            }
            Ok(()) if attempt.token.is_cancelled() => {
                debug!("Activation of '{}' superseded after its hook finished", name);
                self.deactivate_locked(&mut slots, name).await;
                Err(NavigationError::Cancelled)
            }
            Ok(()) => {
                self.set_lifecycle(name, ViewLifecycle::Active);
                self.status.navigation_changed(name);
                info!("Activated view '{}'", name);
                Ok(ActivationOutcome::Activated)
            }
            Err(e) => {
                self.set_lifecycle(name, ViewLifecycle::Active);
                self.status.navigation_changed(name);
                warn!("View '{}' activated without data: {}", name, e);
                self.status.error(format!("{}: {}", title, e));
                Ok(ActivationOutcome::Degraded { reason: e.to_string() })
            }
        }
    }

    async fn refresh_locked(
        &self,
        slots: &mut HashMap<String, ViewSlot>,
        name: &str,
        parameter: Value,
        attempt: &Attempt,
    ) -> Result<ActivationOutcome, NavigationError> {
        let Some(slot) = slots.get_mut(name) else {
            return Err(NavigationError::UnknownView(name.to_string()));
        };
        let (Some(view), Some(view_scope)) = (slot.view.as_mut(), slot.scope.as_ref()) else {
            return Err(NavigationError::UnknownView(name.to_string()));
        };

        let refresh_scope = view_scope.child(format!("{}:refresh", name));
        let ctx = ActivationContext {
            scope: refresh_scope.clone(),
            parameter,
            refresh: true,
        };
        info!("Refreshing active view '{}'", name);
        match run_hook(view.as_mut(), ctx, &refresh_scope, attempt).await {
            Ok(()) => Ok(ActivationOutcome::Refreshed),
            Err(e) if e.is_cancelled() => Err(NavigationError::Cancelled),
            Err(e) => {
                warn!("Refresh of '{}' failed: {}", name, e);
                self.status.error(format!("{}: {}", view.title(), e));
                Ok(ActivationOutcome::Degraded { reason: e.to_string() })
            }
        }
    }

    /// Cancel the view's scope, wait for everything in it, then run its deactivation hook
    async fn deactivate_locked(&self, slots: &mut HashMap<String, ViewSlot>, name: &str) {
        let Some(slot) = slots.get_mut(name) else { return };
        self.set_lifecycle(name, ViewLifecycle::Deactivating);

        if let Some(scope) = slot.scope.take() {
            scope.cancel_and_wait().await;
        }
        if let Some(view) = slot.view.as_mut() {
            if let Err(e) = view.on_deactivate().await {
                warn!("Deactivation hook of '{}' failed: {}", name, e);
                self.status.warn(format!("{}: {}", view.title(), e));
            }
        }
        if self.registrations.get(name).map(|r| r.retention) == Some(RetentionPolicy::DiscardOnExit) {
            slot.view = None;
        }
        self.set_lifecycle(name, ViewLifecycle::Inactive);
        info!("Deactivated view '{}'", name);
    }
}

/// Run an activation hook; a superseding attempt cancels `hook_scope` and the
/// hook is then awaited until it unwinds
async fn run_hook(
    view: &mut dyn View,
    ctx: ActivationContext,
    hook_scope: &CancellationScope,
    attempt: &Attempt,
) -> Result<(), ViewError> {
    let hook = view.on_activate(ctx);
    tokio::pin!(hook);
    tokio::select! {
        result = &mut hook => result,
        _ = attempt.token.cancelled() => {
            hook_scope.cancel();
            hook.await
        }
    }
}
