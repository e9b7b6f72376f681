//! Entity collections: page state, the per-collection exclusion token, and the
//! loader and mutator that share it.

pub mod loader;
pub mod lock;
pub mod mutator;
pub mod page;

pub use loader::{LoaderStats, PaginatedLoader};
pub use lock::{CollectionGuard, CollectionLock};
pub use mutator::{
    CreatePlacement, MutationKind, MutationOutcome, MutationRequest, RecordKey, SingleFlightMutator, Validation,
};
pub use page::{LoadMode, PageState};
