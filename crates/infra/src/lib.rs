//! Infrastructure layer: grant store, catalog reader, rate limiting.
//!
//! Each boundary is a trait with an in-memory implementation (dev/tests) and a
//! persistent one (Postgres, Redis behind the `redis` feature).

pub mod catalog;
pub mod rate_limit;
pub mod store;

pub use catalog::{Catalog, InMemoryCatalog, PostgresCatalog};
pub use rate_limit::{InMemoryRateLimiter, RateKey, RateLimitPolicy, RateLimiter, MAX_WINDOW_SECS};
pub use store::{
    AccessStore, InMemoryAccessStore, PostgresAccessStore, Review, StoreError, StoreResult,
    TransitionTarget, UnitOfWork,
};
