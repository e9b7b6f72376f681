//! Serialized create/update/delete against a loaded collection.
//!
//! A submit holds the collection lock from validation until its result is
//! merged, so it never interleaves with another submit or with a load. Queued
//! submits are served in arrival order.

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::loader::PaginatedLoader;
use super::page::PageState;
use crate::api::models::{EntityType, FieldReference, Record, RecordId, reference_value};
use crate::api::{CrudGateway, ResilienceConfig};
use crate::cancel::{CancellableOperation, CancellationScope, Interrupt};
use crate::error::{GatewayError, LoadError, MutationError};
use crate::view::shell::StatusReporter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

/// Which record a mutation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordKey {
    New,
    Id(RecordId),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum Validation {
    #[default]
    Pending,
    Valid,
    Invalid(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationRequest {
    pub kind: MutationKind,
    pub target: RecordKey,
    pub payload: Value,
    pub validation: Validation,
}

impl MutationRequest {
    pub fn create(payload: Value) -> Self {
        Self {
            kind: MutationKind::Create,
            target: RecordKey::New,
            payload,
            validation: Validation::Pending,
        }
    }

    /// Merge `payload` into record `id`
    pub fn update(id: RecordId, payload: Value) -> Self {
        Self {
            kind: MutationKind::Update,
            target: RecordKey::Id(id),
            payload,
            validation: Validation::Pending,
        }
    }

    pub fn delete(id: RecordId) -> Self {
        Self {
            kind: MutationKind::Delete,
            target: RecordKey::Id(id),
            payload: Value::Null,
            validation: Validation::Pending,
        }
    }
}

/// Where a successful create shows up in the loaded collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreatePlacement {
    /// Append the new record locally
    #[default]
    Append,
    /// Reload the first page so the record lands where the backend sorts it
    Reload,
}

#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub kind: MutationKind,
    pub id: RecordId,
    /// The record as stored by the backend; `None` for deletes
    pub record: Option<Record>,
    pub snapshot: Arc<PageState>,
}

struct PendingGuard<'a>(&'a AtomicUsize);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct SingleFlightMutator {
    entity: EntityType,
    gateway: Arc<dyn CrudGateway>,
    loader: Arc<PaginatedLoader>,
    references: Vec<(FieldReference, Arc<PaginatedLoader>)>,
    placement: CreatePlacement,
    reconcile: bool,
    request_timeout: Option<Duration>,
    status: StatusReporter,
    pending: AtomicUsize,
}

impl SingleFlightMutator {
    pub fn new(loader: Arc<PaginatedLoader>, gateway: Arc<dyn CrudGateway>) -> Self {
        Self {
            entity: loader.entity(),
            gateway,
            loader,
            references: Vec::new(),
            placement: CreatePlacement::default(),
            reconcile: false,
            request_timeout: ResilienceConfig::default().request_timeout,
            status: StatusReporter::disabled(),
            pending: AtomicUsize::new(0),
        }
    }

    /// Check `reference.field` against the records loaded by `target`
    pub fn with_reference(mut self, reference: FieldReference, target: Arc<PaginatedLoader>) -> Self {
        self.references.push((reference, target));
        self
    }

    pub fn with_placement(mut self, placement: CreatePlacement) -> Self {
        self.placement = placement;
        self
    }

    /// Issue a background reload after every successful mutation
    pub fn with_reconcile(mut self, reconcile: bool) -> Self {
        self.reconcile = reconcile;
        self
    }

    /// Writes are never retried, so only the request timeout applies
    pub fn with_resilience(mut self, resilience: &ResilienceConfig) -> Self {
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

    /// Submits queued or running
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub async fn submit(
        &self,
        mut request: MutationRequest,
        scope: &CancellationScope,
    ) -> Result<MutationOutcome, MutationError> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let _pending = PendingGuard(&self.pending);
        let op = CancellableOperation::begin("submit", scope).with_timeout(self.request_timeout);

        let guard = self.loader.lock().acquire(&op).await.map_err(|cancelled| {
            debug!("[{}] {} {:?} cancelled while queued", op.id(), self.entity, request.kind);
            MutationError::from(cancelled)
        })?;
        let current = self.loader.snapshot();

        request.validation = self.validate(&request, &current);
        if let Validation::Invalid(problems) = &request.validation {
            let reason = problems.join("; ");
            warn!("[{}] {} {:?} rejected: {}", op.id(), self.entity, request.kind, reason);
            self.status.warn(format!("{} not saved: {}", self.entity.title(), reason));
            return Err(MutationError::MutationFailed(reason));
        }

        // Writes are not abandoned once issued, only timed out
        let written = match op.run_to_completion("before_write", self.write(&request, &current)).await {
            Ok(written) => written,
            Err(Interrupt::Cancelled) => {
                debug!("[{}] {} {:?} cancelled before write", op.id(), self.entity, request.kind);
                return Err(MutationError::Cancelled);
            }
            Err(Interrupt::TimedOut(limit)) => Err(GatewayError::Timeout(limit)),
        };

        let (id, record) = match written {
            Ok(written) => written,
            Err(GatewayError::Conflict { id, .. }) => {
                error!("[{}] {} {} was modified by another user", op.id(), self.entity, id);
                self.status.error(format!(
                    "{} {} was changed by someone else. Reload before editing.",
                    self.entity.title(),
                    id
                ));
                return Err(MutationError::ConcurrentMutationConflict { id });
            }
            Err(cause) => {
                warn!("[{}] {} {:?} failed: {}", op.id(), self.entity, request.kind, cause);
                self.status.warn(format!("{} not saved: {}", self.entity.title(), cause));
                return Err(MutationError::MutationFailed(cause.to_string()));
            }
        };

        let mut next = (*self.loader.snapshot()).clone();
        match (&request.kind, &record) {
            (MutationKind::Create, Some(created)) => next.apply_created(created.clone()),
            (MutationKind::Update, Some(updated)) => {
                next.apply_updated(updated.clone());
            }
            _ => {
                next.apply_deleted(id);
            }
        }
        let mut snapshot = self.loader.commit(&guard, next);
        drop(guard);

        info!("[{}] {} {:?} committed for id {}", op.id(), self.entity, request.kind, id);
        self.status.info(format!("{} {} {}", self.entity.title(), id, past_tense(request.kind)));

        if request.kind == MutationKind::Create && self.placement == CreatePlacement::Reload {
            match self.loader.reload(scope).await {
                Ok(reloaded) => snapshot = reloaded,
                Err(LoadError::Cancelled) => debug!("[{}] placement reload cancelled", op.id()),
                Err(e) => warn!("[{}] placement reload failed: {}", op.id(), e),
            }
        } else if self.reconcile {
            self.spawn_reconcile(scope);
        }

        Ok(MutationOutcome {
            kind: request.kind,
            id,
            record,
            snapshot,
        })
    }

    fn spawn_reconcile(&self, scope: &CancellationScope) {
        let loader = self.loader.clone();
        let scope = scope.clone();
        tokio::spawn(async move {
            if let Err(e) = loader.reload(&scope).await {
                debug!("Reconcile reload of {} ended: {}", loader.entity(), e);
            }
        });
    }

    async fn write(
        &self,
        request: &MutationRequest,
        current: &PageState,
    ) -> Result<(RecordId, Option<Record>), GatewayError> {
        match (request.kind, request.target) {
            (MutationKind::Create, RecordKey::New) => {
                let record = self.gateway.create(self.entity, &request.payload).await?;
                Ok((record.id, Some(record)))
            }
            (MutationKind::Update, RecordKey::Id(id)) => {
                let version = current.get(id).map_or(1, |r| r.version);
                let record = self.gateway.update(self.entity, id, version, &request.payload).await?;
                Ok((id, Some(record)))
            }
            (MutationKind::Delete, RecordKey::Id(id)) => {
                self.gateway.delete(self.entity, id).await?;
                Ok((id, None))
            }
            (kind, target) => Err(GatewayError::Rejected(format!("{:?} cannot target {:?}", kind, target))),
        }
    }

    /// Local, best-effort checks; the backend still has the final word
    fn validate(&self, request: &MutationRequest, current: &PageState) -> Validation {
        let mut problems = Vec::new();

        match (request.kind, request.target) {
            (MutationKind::Create, RecordKey::Id(id)) => problems.push(format!("create cannot target existing id {id}")),
            (MutationKind::Update | MutationKind::Delete, RecordKey::New) => {
                problems.push(format!("{:?} needs a record id", request.kind).to_lowercase())
            }
            (MutationKind::Update | MutationKind::Delete, RecordKey::Id(id)) if !current.contains(id) => {
                problems.push(format!("{} {} is not loaded", self.entity, id))
            }
            _ => {}
        }

        if request.kind != MutationKind::Delete {
            match request.payload.as_object() {
                None => problems.push("payload must be an object".to_string()),
                Some(fields) => {
                    let schema = self.entity.schema();
                    for field in schema.required {
                        match fields.get(*field) {
                            Some(value) if !is_blank(value) => {}
                            Some(_) => problems.push(format!("{field} cannot be empty")),
                            None if request.kind == MutationKind::Create => problems.push(format!("{field} is required")),
                            None => {}
                        }
                    }
                    if request.kind == MutationKind::Update && fields.is_empty() {
                        problems.push("nothing to update".to_string());
                    }
                    self.check_references(fields, &mut problems);
                }
            }
        }

        if problems.is_empty() { Validation::Valid } else { Validation::Invalid(problems) }
    }

    fn check_references(&self, fields: &serde_json::Map<String, Value>, problems: &mut Vec<String>) {
        for (reference, target) in &self.references {
            let Some(value) = fields.get(reference.field) else { continue };
            if is_blank(value) {
                continue;
            }
            let Some(id) = reference_value(value) else {
                problems.push(format!("{} must be a record id", reference.field));
                continue;
            };
            let loaded = target.snapshot();
            // Only a fully loaded collection can prove a reference wrong
            if loaded.is_complete() && !loaded.contains(id) {
                problems.push(format!("{} {} does not match any {}", reference.field, id, reference.target));
            }
        }
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn past_tense(kind: MutationKind) -> &'static str {
    match kind {
        MutationKind::Create => "created",
        MutationKind::Update => "updated",
        MutationKind::Delete => "deleted",
    }
}
