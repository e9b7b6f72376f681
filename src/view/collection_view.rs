//! List view over one entity collection

use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use std::sync::Arc;

use super::view::{ActivationContext, View};
use crate::collection::LoadMode;
use crate::error::ViewError;
use crate::fleet::EntityCollection;

/// Shows one collection. Activation (and explicit refresh) loads the first
/// page; the parameter may carry `{"page_size": n}`.
pub struct CollectionView {
    collection: Arc<EntityCollection>,
    default_page_size: usize,
    activations: usize,
}

impl CollectionView {
    pub fn new(collection: Arc<EntityCollection>, default_page_size: usize) -> Self {
        Self {
            collection,
            default_page_size,
            activations: 0,
        }
    }

    fn page_size(&self, parameter: &Value) -> usize {
        parameter
            .get("page_size")
            .and_then(Value::as_u64)
            .and_then(|size| usize::try_from(size).ok())
            .filter(|size| *size > 0)
            .unwrap_or(self.default_page_size)
    }
}

#[async_trait]
impl View for CollectionView {
    fn title(&self) -> &str {
        self.collection.entity().title()
    }

    async fn on_activate(&mut self, ctx: ActivationContext) -> Result<(), ViewError> {
        self.activations += 1;
        let page_size = self.page_size(&ctx.parameter);
        let state = self
            .collection
            .loader()
            .load_page(1, page_size, LoadMode::Replace, &ctx.scope)
            .await?;
        debug!(
            "{} view activation #{} loaded {} of {:?}",
            self.collection.entity(),
            self.activations,
            state.len(),
            state.total_count
        );
        Ok(())
    }

    async fn on_deactivate(&mut self) -> Result<(), ViewError> {
        debug!("{} view deactivated", self.collection.entity());
        Ok(())
    }
}
