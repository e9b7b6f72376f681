//! Resilience for gateway calls
//!
//! Provides retry policies and per-request timeouts for fetches issued by the
//! paginated loaders.

pub mod config;
pub mod retry;

pub use config::{ResilienceConfig, ResilienceConfigBuilder};
pub use retry::{RetryConfig, RetryPolicy};
