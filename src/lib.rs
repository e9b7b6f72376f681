pub mod api;
pub mod cancel;
pub mod collection;
pub mod config;
pub mod error;
pub mod fleet;
pub mod view;

pub use api::{CrudGateway, EntityType, InMemoryGateway, Record, RecordId, SqliteGateway};
pub use cancel::{CancellableOperation, CancellationScope};
pub use collection::{LoadMode, MutationRequest, PageState, PaginatedLoader, SingleFlightMutator};
pub use config::Config;
pub use error::{GatewayError, LoadError, MutationError, NavigationError, ViewError};
pub use fleet::{EntityCollection, Fleet};
pub use view::{ActivationOutcome, NavigationRequest, ShellEvent, StatusReporter, ViewLifecycleManager};
