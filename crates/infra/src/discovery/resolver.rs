use rand::seq::IndexedRandom;
use tracing::{debug, warn};

use leasewq_core::{EndpointPair, QueueError, QueueResult};

use super::Discovery;

/// Resolves a logical cluster name to the endpoints a client should use.
#[derive(Debug, Clone)]
pub struct EndpointResolver<D> {
    discovery: D,
}

impl<D: Discovery> EndpointResolver<D> {
    pub fn new(discovery: D) -> Self {
        Self { discovery }
    }

    pub fn discovery(&self) -> &D {
        &self.discovery
    }

    /// Current primary plus one secondary picked uniformly at random.
    ///
    /// The pick is not sticky across calls. When the cluster reports no
    /// secondaries, reads fall back to the primary.
    pub fn resolve(&self, cluster: &str) -> QueueResult<EndpointPair> {
        let primary = self.discovery.primary(cluster)?.ok_or_else(|| {
            QueueError::discovery(format!("no primary known for cluster {cluster:?}"))
        })?;
        let secondaries = self.discovery.secondaries(cluster)?;

        let secondary = match secondaries.choose(&mut rand::rng()) {
            Some(s) => s.clone(),
            None => {
                warn!(
                    cluster,
                    primary = %primary,
                    "no secondaries reported; reading from primary"
                );
                primary.clone()
            }
        };

        debug!(cluster, primary = %primary, secondary = %secondary, "resolved endpoints");
        Ok(EndpointPair::new(primary, secondary))
    }
}
