//! Redis Sentinel discovery (optional).
//!
//! Sentinels are asked in configured order; the first one that answers wins.
//!
//! - **Primary**: `SENTINEL get-master-addr-by-name <group>`
//! - **Secondaries**: `SENTINEL replicas <group>`, skipping replicas flagged
//!   `s_down`, `o_down` or `disconnected`

use std::collections::HashMap;

use tracing::{debug, instrument, warn};

use leasewq_core::{Endpoint, QueueError, QueueResult};

use super::Discovery;
use crate::config::SentinelConfig;

const UNHEALTHY_FLAGS: [&str; 3] = ["s_down", "o_down", "disconnected"];

/// Discovery through a set of Redis Sentinels.
///
/// The cluster name passed to [`Discovery`] methods is the sentinel master
/// group name.
#[derive(Debug, Clone)]
pub struct SentinelDiscovery {
    config: SentinelConfig,
}

impl SentinelDiscovery {
    pub fn new(config: SentinelConfig) -> QueueResult<Self> {
        if config.hosts.is_empty() {
            return Err(QueueError::config("at least one sentinel host is required"));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &SentinelConfig {
        &self.config
    }

    fn connect(&self, host: &str) -> QueueResult<redis::Connection> {
        let info = redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(host.to_string(), self.config.port),
            redis: redis::RedisConnectionInfo::default(),
        };
        let unreachable =
            |e: redis::RedisError| QueueError::discovery(format!("sentinel {host}: {e}"));

        let client = redis::Client::open(info).map_err(unreachable)?;
        let conn = client
            .get_connection_with_timeout(self.config.timeout)
            .map_err(unreachable)?;
        conn.set_read_timeout(Some(self.config.timeout))
            .map_err(unreachable)?;
        conn.set_write_timeout(Some(self.config.timeout))
            .map_err(unreachable)?;
        Ok(conn)
    }

    /// Run `query` against the first sentinel that answers.
    fn ask<T>(
        &self,
        query: impl Fn(&mut redis::Connection) -> redis::RedisResult<T>,
    ) -> QueueResult<T> {
        let mut last_error = None;
        for host in &self.config.hosts {
            let attempt = self.connect(host).and_then(|mut conn| {
                query(&mut conn)
                    .map_err(|e| QueueError::discovery(format!("sentinel {host}: {e}")))
            });
            match attempt {
                Ok(answer) => return Ok(answer),
                Err(e) => {
                    warn!(sentinel = %host, error = %e, "sentinel query failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| QueueError::discovery("no sentinels configured")))
    }
}

fn parse_port(raw: &str) -> QueueResult<u16> {
    raw.parse()
        .map_err(|e| QueueError::discovery(format!("sentinel reported bad port {raw:?}: {e}")))
}

/// Healthy replica endpoints from a `SENTINEL replicas` reply.
fn healthy_replicas(replicas: Vec<HashMap<String, String>>) -> Vec<Endpoint> {
    replicas
        .into_iter()
        .filter(|r| {
            let flags = r.get("flags").map(String::as_str).unwrap_or_default();
            !flags.split(',').any(|f| UNHEALTHY_FLAGS.contains(&f))
        })
        .filter_map(|r| {
            let host = r.get("ip")?.clone();
            let port = parse_port(r.get("port")?).ok()?;
            Some(Endpoint::new(host, port))
        })
        .collect()
}

impl Discovery for SentinelDiscovery {
    #[instrument(skip(self), err)]
    fn primary(&self, cluster: &str) -> QueueResult<Option<Endpoint>> {
        let reply: Option<(String, String)> = self.ask(|conn| {
            redis::cmd("SENTINEL")
                .arg("get-master-addr-by-name")
                .arg(cluster)
                .query(conn)
        })?;

        let Some((host, port)) = reply else {
            return Ok(None);
        };
        let primary = Endpoint::new(host, parse_port(&port)?);
        debug!(cluster, primary = %primary, "sentinel reported primary");
        Ok(Some(primary))
    }

    #[instrument(skip(self), err)]
    fn secondaries(&self, cluster: &str) -> QueueResult<Vec<Endpoint>> {
        let replicas: Vec<HashMap<String, String>> = self.ask(|conn| {
            redis::cmd("SENTINEL")
                .arg("replicas")
                .arg(cluster)
                .query(conn)
        })?;
        Ok(healthy_replicas(replicas))
    }
}
