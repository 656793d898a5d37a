//! Lease-based work queue client: store adapters, the lease protocol,
//! endpoint discovery, the HA client and the resilient processor.
//!
//! Control flow: [`processor::ResilientProcessor`] → [`ha_client::HaClient`]
//! → [`queue::WorkQueue`] → [`store::BackingStore`], with
//! [`discovery::EndpointResolver`] consulted on every (re)connect.

pub mod config;
pub mod discovery;
pub mod ha_client;
pub mod processor;
pub mod queue;
pub mod store;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::{ProcessorConfig, QueueConfig, SentinelConfig, StoreConfig};
pub use ha_client::HaClient;
pub use processor::{Emptiness, ResilientProcessor};
pub use queue::{Completion, WorkQueue};
pub use worker::{JobOutcome, Worker, WorkerConfig, WorkerHandle, WorkerStats};
