//! Data access for the fleet collections
//!
//! The coordinator only talks to a [`CrudGateway`]. Two backends ship with the
//! crate: an in-process one for tests and demos and a SQLite one for the binary.

pub mod gateway;
pub mod memory;
pub mod models;
pub mod resilience;
pub mod sqlite;

pub use gateway::CrudGateway;
pub use memory::{GatewayStats, InMemoryGateway};
pub use models::{EntitySchema, EntityType, FieldReference, Page, Record, RecordId};
pub use resilience::{ResilienceConfig, RetryConfig, RetryPolicy};
pub use sqlite::SqliteGateway;
