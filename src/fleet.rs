//! Wiring of the three fleet collections and their views

use log::debug;
use std::sync::Arc;

use crate::api::models::EntityType;
use crate::api::CrudGateway;
use crate::collection::{PageState, PaginatedLoader, SingleFlightMutator};
use crate::config::Config;
use crate::view::collection_view::CollectionView;
use crate::view::shell::StatusReporter;
use crate::view::{View, ViewLifecycleManager};

/// One entity's loader and the mutator sharing its collection lock
pub struct EntityCollection {
    loader: Arc<PaginatedLoader>,
    mutator: SingleFlightMutator,
}

impl EntityCollection {
    pub fn entity(&self) -> EntityType {
        self.loader.entity()
    }

    pub fn loader(&self) -> &Arc<PaginatedLoader> {
        &self.loader
    }

    pub fn mutator(&self) -> &SingleFlightMutator {
        &self.mutator
    }

    pub fn snapshot(&self) -> Arc<PageState> {
        self.loader.snapshot()
    }
}

pub struct Fleet {
    routes: Arc<EntityCollection>,
    drivers: Arc<EntityCollection>,
    vehicles: Arc<EntityCollection>,
    default_page_size: usize,
}

impl Fleet {
    pub fn new(gateway: Arc<dyn CrudGateway>, config: &Config, status: StatusReporter) -> Self {
        let resilience = config.resilience();
        let page_size = config.paging.default_page_size;
        let loader = |entity| {
            Arc::new(
                PaginatedLoader::new(entity, gateway.clone(), page_size)
                    .with_resilience(&resilience)
                    .with_status(status.clone()),
            )
        };
        let loaders = [
            loader(EntityType::Routes),
            loader(EntityType::Drivers),
            loader(EntityType::Vehicles),
        ];
        let target = |entity: EntityType| loaders.iter().find(|l| l.entity() == entity).cloned();

        let collection = |loader: &Arc<PaginatedLoader>| {
            let mut mutator = SingleFlightMutator::new(loader.clone(), gateway.clone())
                .with_placement(config.collections.create_placement)
                .with_reconcile(config.collections.reconcile_after_mutation)
                .with_resilience(&resilience)
                .with_status(status.clone());
            for reference in loader.entity().schema().references {
                if let Some(target) = target(reference.target) {
                    mutator = mutator.with_reference(*reference, target);
                }
            }
            Arc::new(EntityCollection {
                loader: loader.clone(),
                mutator,
            })
        };

        let [routes, drivers, vehicles] = &loaders;
        debug!("Fleet collections ready (page size {})", page_size);
        Self {
            routes: collection(routes),
            drivers: collection(drivers),
            vehicles: collection(vehicles),
            default_page_size: page_size,
        }
    }

    pub fn collection(&self, entity: EntityType) -> &Arc<EntityCollection> {
        match entity {
            EntityType::Routes => &self.routes,
            EntityType::Drivers => &self.drivers,
            EntityType::Vehicles => &self.vehicles,
        }
    }

    pub fn collections(&self) -> [&Arc<EntityCollection>; 3] {
        [&self.routes, &self.drivers, &self.vehicles]
    }

    /// Register one list view per entity, named after the entity
    pub fn register_views(&self, manager: &mut ViewLifecycleManager) {
        for collection in self.collections() {
            let collection = collection.clone();
            let page_size = self.default_page_size;
            manager.register(collection.entity().name(), move || -> Box<dyn View> {
                Box::new(CollectionView::new(collection.clone(), page_size))
            });
        }
    }
}
