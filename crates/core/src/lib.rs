//! `leasewq-core`: primitives of the lease-based work queue.
//!
//! This crate contains **pure** types (no store or network concerns): job
//! payloads and their fingerprints, session identity, store endpoints and the
//! shared error model.

pub mod endpoint;
pub mod error;
pub mod id;
pub mod job;

pub use endpoint::{Endpoint, EndpointPair};
pub use error::{QueueError, QueueResult};
pub use id::SessionId;
pub use job::{Fingerprint, Job};
