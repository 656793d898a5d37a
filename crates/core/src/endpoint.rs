//! Backing-store endpoints.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// Network address of one store instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl core::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = QueueError;

    /// Parses `host:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| QueueError::config(format!("endpoint {s:?} is missing a port")))?;
        if host.is_empty() {
            return Err(QueueError::config(format!("endpoint {s:?} is missing a host")));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| QueueError::config(format!("endpoint {s:?}: {e}")))?;
        Ok(Self::new(host, port))
    }
}

/// Current primary and one chosen secondary of a logical cluster.
///
/// The secondary serves cheap read-only size checks; it may be the primary
/// itself when the cluster reports no replicas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointPair {
    pub primary: Endpoint,
    pub secondary: Endpoint,
}

impl EndpointPair {
    pub fn new(primary: Endpoint, secondary: Endpoint) -> Self {
        Self { primary, secondary }
    }

    pub fn reads_from_primary(&self) -> bool {
        self.primary == self.secondary
    }
}
