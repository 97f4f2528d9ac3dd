//! Transactional store for owned domain entities.
//!
//! Defines the store boundary used by resource lifecycle and resolution, with
//! an in-memory implementation for tests/dev and a Postgres implementation.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEntityStore;
pub use postgres::PostgresEntityStore;
pub use r#trait::{DanglingResource, EntityRecord, EntityStore, StoreError, StoreTransaction};
