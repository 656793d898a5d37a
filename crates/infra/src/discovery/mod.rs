//! Endpoint discovery.
//!
//! A [`Discovery`] answers "who is the primary, and which replicas exist" for
//! a logical cluster name. The [`EndpointResolver`] turns that answer into the
//! (primary, secondary) pair the HA client connects to.

pub mod resolver;
#[cfg(feature = "redis")]
pub mod sentinel;
pub mod static_topology;

pub use resolver::EndpointResolver;
#[cfg(feature = "redis")]
pub use sentinel::SentinelDiscovery;
pub use static_topology::StaticDiscovery;

use std::sync::Arc;

use leasewq_core::{Endpoint, QueueResult};

/// Discovery service boundary.
///
/// Implementations report an unreachable service as
/// `QueueError::DiscoveryUnavailable`. Answers may change between calls
/// (failover); callers must not cache them beyond one reconnect.
pub trait Discovery: Send + Sync {
    /// Current primary of `cluster`, or `None` if the service knows of none.
    fn primary(&self, cluster: &str) -> QueueResult<Option<Endpoint>>;

    /// Healthy secondaries of `cluster`; may be empty.
    fn secondaries(&self, cluster: &str) -> QueueResult<Vec<Endpoint>>;
}

impl<D> Discovery for Arc<D>
where
    D: Discovery + ?Sized,
{
    fn primary(&self, cluster: &str) -> QueueResult<Option<Endpoint>> {
        (**self).primary(cluster)
    }

    fn secondaries(&self, cluster: &str) -> QueueResult<Vec<Endpoint>> {
        (**self).secondaries(cluster)
    }
}
