//! Backing-store boundary.
//!
//! The lease protocol is written purely against [`BackingStore`]; this module
//! provides the in-memory implementation used by tests/dev and, behind the
//! `redis` feature, the Redis implementation used in production.

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod r#trait;

pub use in_memory::{InMemoryCluster, InMemoryStore};
#[cfg(feature = "redis")]
pub use redis::{RedisConnector, RedisStore};
pub use r#trait::{BackingStore, StoreConnector};
