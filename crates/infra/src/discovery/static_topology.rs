use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

use leasewq_core::{Endpoint, QueueError, QueueResult};

use super::Discovery;

#[derive(Debug, Clone)]
struct Topology {
    primary: Endpoint,
    secondaries: Vec<Endpoint>,
}

/// Discovery backed by a mutable in-process table.
///
/// Used for fixed deployments without a discovery service, and in tests to
/// simulate failover (`promote`) and outages (`set_reachable(false)`).
#[derive(Debug)]
pub struct StaticDiscovery {
    clusters: RwLock<HashMap<String, Topology>>,
    reachable: AtomicBool,
    primary_lookups: AtomicU64,
}

impl Default for StaticDiscovery {
    fn default() -> Self {
        Self {
            clusters: RwLock::new(HashMap::new()),
            reachable: AtomicBool::new(true),
            primary_lookups: AtomicU64::new(0),
        }
    }
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-cluster table.
    pub fn single(
        cluster: impl Into<String>,
        primary: Endpoint,
        secondaries: Vec<Endpoint>,
    ) -> Self {
        let discovery = Self::new();
        discovery.set_topology(cluster, primary, secondaries);
        discovery
    }

    pub fn set_topology(
        &self,
        cluster: impl Into<String>,
        primary: Endpoint,
        secondaries: Vec<Endpoint>,
    ) {
        if let Ok(mut clusters) = self.clusters.write() {
            clusters.insert(
                cluster.into(),
                Topology {
                    primary,
                    secondaries,
                },
            );
        }
    }

    /// Fail over: `new_primary` takes over and leaves the secondary set; the
    /// old primary becomes a secondary.
    pub fn promote(&self, cluster: &str, new_primary: Endpoint) {
        let Ok(mut clusters) = self.clusters.write() else {
            return;
        };
        let Some(topology) = clusters.get_mut(cluster) else {
            return;
        };
        let old = std::mem::replace(&mut topology.primary, new_primary.clone());
        topology.secondaries.retain(|s| *s != new_primary);
        if old != new_primary {
            topology.secondaries.push(old);
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Number of primary lookups served so far (one per resolve).
    pub fn primary_lookups(&self) -> u64 {
        self.primary_lookups.load(Ordering::SeqCst)
    }

    fn topology(&self, cluster: &str) -> QueueResult<Option<Topology>> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(QueueError::discovery("discovery service unreachable"));
        }
        let clusters = self
            .clusters
            .read()
            .map_err(|_| QueueError::discovery("topology table lock poisoned"))?;
        Ok(clusters.get(cluster).cloned())
    }
}

impl Discovery for StaticDiscovery {
    fn primary(&self, cluster: &str) -> QueueResult<Option<Endpoint>> {
        self.primary_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.topology(cluster)?.map(|t| t.primary))
    }

    fn secondaries(&self, cluster: &str) -> QueueResult<Vec<Endpoint>> {
        Ok(self
            .topology(cluster)?
            .map(|t| t.secondaries)
            .unwrap_or_default())
    }
}
