//! Configuration loading and representation.
//!
//! Every recognized option is an explicit field with a default. Each struct
//! can be deserialized (missing fields take defaults) or read from
//! `LEASEWQ_*` environment variables.

use std::time::Duration;

use serde::Deserialize;

use leasewq_core::{QueueError, QueueResult};

/// Connection options for one store instance.
///
/// `host`/`port` address a standalone store; when endpoints come from
/// discovery only the remaining options are used.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    /// Logical database index.
    pub db: i64,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            username: None,
            password: None,
            connect_timeout: Duration::from_secs(1),
        }
    }
}

impl StoreConfig {
    pub fn with_db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Reads `LEASEWQ_REDIS_{HOST,PORT,DB,USERNAME,PASSWORD,CONNECT_TIMEOUT_MS}`.
    pub fn from_env() -> QueueResult<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> QueueResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            host: lookup("LEASEWQ_REDIS_HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "LEASEWQ_REDIS_PORT")?.unwrap_or(defaults.port),
            db: parse_var(&lookup, "LEASEWQ_REDIS_DB")?.unwrap_or(defaults.db),
            username: lookup("LEASEWQ_REDIS_USERNAME"),
            password: lookup("LEASEWQ_REDIS_PASSWORD"),
            connect_timeout: parse_millis(&lookup, "LEASEWQ_REDIS_CONNECT_TIMEOUT_MS")?
                .unwrap_or(defaults.connect_timeout),
        })
    }
}

/// Where to find the sentinels watching the store cluster.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    /// Sentinel hosts (or one service name resolving to all of them), tried in order.
    pub hosts: Vec<String>,
    pub port: u16,
    /// Name of the monitored primary group; the logical cluster name.
    pub master_group: String,
    /// Socket timeout for sentinel queries.
    pub timeout: Duration,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["localhost".to_string()],
            port: 26379,
            master_group: "mymaster".to_string(),
            timeout: Duration::from_millis(100),
        }
    }
}

impl SentinelConfig {
    pub fn new(hosts: Vec<String>, master_group: impl Into<String>) -> Self {
        Self {
            hosts,
            master_group: master_group.into(),
            ..Default::default()
        }
    }

    /// Reads `LEASEWQ_SENTINEL_{HOSTS,PORT,MASTER_GROUP,TIMEOUT_MS}`; hosts are comma separated.
    pub fn from_env() -> QueueResult<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> QueueResult<Self> {
        let defaults = Self::default();
        let hosts = match lookup("LEASEWQ_SENTINEL_HOSTS") {
            Some(raw) => {
                let hosts: Vec<String> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|h| !h.is_empty())
                    .map(str::to_string)
                    .collect();
                if hosts.is_empty() {
                    return Err(QueueError::config("LEASEWQ_SENTINEL_HOSTS is empty"));
                }
                hosts
            }
            None => defaults.hosts,
        };

        Ok(Self {
            hosts,
            port: parse_var(&lookup, "LEASEWQ_SENTINEL_PORT")?.unwrap_or(defaults.port),
            master_group: lookup("LEASEWQ_SENTINEL_MASTER_GROUP").unwrap_or(defaults.master_group),
            timeout: parse_millis(&lookup, "LEASEWQ_SENTINEL_TIMEOUT_MS")?
                .unwrap_or(defaults.timeout),
        })
    }
}

/// Names of the lists and keys that make up one queue.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub name: String,
    pub processing_suffix: String,
    pub lease_infix: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "job".to_string(),
            processing_suffix: ":processing".to_string(),
            lease_infix: ":leased_by_session:".to_string(),
        }
    }
}

impl QueueConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Reads `LEASEWQ_QUEUE_NAME`.
    pub fn from_env() -> QueueResult<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> QueueResult<Self> {
        let config = match lookup("LEASEWQ_QUEUE_NAME") {
            Some(name) => Self::new(name),
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> QueueResult<()> {
        if self.name.is_empty() {
            return Err(QueueError::config("queue name must not be empty"));
        }
        if self.processing_suffix.is_empty() {
            return Err(QueueError::config(
                "processing suffix must not be empty (backlog and in-flight would collide)",
            ));
        }
        Ok(())
    }

    pub fn backlog_key(&self) -> String {
        self.name.clone()
    }

    pub fn processing_key(&self) -> String {
        format!("{}{}", self.name, self.processing_suffix)
    }

    pub fn lease_prefix(&self) -> String {
        format!("{}{}", self.name, self.lease_infix)
    }
}

/// Longest lease `ProcessorConfig` accepts.
pub const MAX_LEASE_DURATION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Retry and lease policy of the resilient processor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// TTL stamped on every lease taken by `get_job`.
    pub lease_duration: Duration,
    /// How long `get_job` blocks waiting for a job; `None` waits indefinitely.
    pub block_timeout: Option<Duration>,
    /// Attempts per operation before giving up (at least 1).
    pub max_attempts: u32,
    /// Release with an ownership-checked completion.
    pub verify_ownership: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            lease_duration: Duration::from_secs(60),
            block_timeout: None,
            max_attempts: 3,
            verify_ownership: false,
        }
    }
}

impl ProcessorConfig {
    pub fn with_lease_duration(mut self, lease_duration: Duration) -> Self {
        self.lease_duration = lease_duration;
        self
    }

    pub fn with_block_timeout(mut self, timeout: Duration) -> Self {
        self.block_timeout = Some(timeout);
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_verify_ownership(mut self, verify: bool) -> Self {
        self.verify_ownership = verify;
        self
    }

    /// Reads `LEASEWQ_LEASE_MS`, `LEASEWQ_BLOCK_TIMEOUT_MS`,
    /// `LEASEWQ_MAX_ATTEMPTS` and `LEASEWQ_VERIFY_OWNERSHIP`.
    pub fn from_env() -> QueueResult<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> QueueResult<Self> {
        let defaults = Self::default();
        let config = Self {
            lease_duration: parse_millis(&lookup, "LEASEWQ_LEASE_MS")?
                .unwrap_or(defaults.lease_duration),
            block_timeout: parse_millis(&lookup, "LEASEWQ_BLOCK_TIMEOUT_MS")?
                .or(defaults.block_timeout),
            max_attempts: parse_var(&lookup, "LEASEWQ_MAX_ATTEMPTS")?
                .unwrap_or(defaults.max_attempts),
            verify_ownership: parse_var(&lookup, "LEASEWQ_VERIFY_OWNERSHIP")?
                .unwrap_or(defaults.verify_ownership),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> QueueResult<()> {
        if self.max_attempts == 0 {
            return Err(QueueError::config("max_attempts must be at least 1"));
        }
        if self.lease_duration.is_zero() {
            return Err(QueueError::config("lease_duration must be positive"));
        }
        if self.lease_duration > MAX_LEASE_DURATION {
            return Err(QueueError::config(format!(
                "lease_duration {:?} exceeds the maximum of {:?}",
                self.lease_duration, MAX_LEASE_DURATION
            )));
        }
        Ok(())
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> QueueResult<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| QueueError::config(format!("{key}={raw:?}: {e}")))
        })
        .transpose()
}

fn parse_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> QueueResult<Option<Duration>> {
    Ok(parse_var::<u64>(lookup, key)?.map(Duration::from_millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn store_config_defaults() {
        let cfg = StoreConfig::from_lookup(vars(&[])).unwrap();
        assert_eq!(cfg, StoreConfig::default());
        assert_eq!(cfg.host, "localhost");
        assert_eq!(cfg.port, 6379);
        assert_eq!(cfg.db, 0);
        assert_eq!(cfg.connect_timeout, Duration::from_secs(1));
    }

    #[test]
    fn store_config_from_vars() {
        let cfg = StoreConfig::from_lookup(vars(&[
            ("LEASEWQ_REDIS_HOST", "redis-0"),
            ("LEASEWQ_REDIS_PORT", "6380"),
            ("LEASEWQ_REDIS_DB", "3"),
            ("LEASEWQ_REDIS_PASSWORD", "hunter2"),
            ("LEASEWQ_REDIS_CONNECT_TIMEOUT_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(cfg.host, "redis-0");
        assert_eq!(cfg.port, 6380);
        assert_eq!(cfg.db, 3);
        assert_eq!(cfg.password.as_deref(), Some("hunter2"));
        assert!(cfg.username.is_none());
        assert_eq!(cfg.connect_timeout, Duration::from_millis(250));
    }

    #[test]
    fn bad_port_is_a_config_error() {
        let err = StoreConfig::from_lookup(vars(&[("LEASEWQ_REDIS_PORT", "http")])).unwrap_err();
        assert!(matches!(err, QueueError::Config(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn sentinel_config_defaults_match_sentinel_conventions() {
        let cfg = SentinelConfig::default();
        assert_eq!(cfg.port, 26379);
        assert_eq!(cfg.timeout, Duration::from_millis(100));
        assert_eq!(cfg.hosts, vec!["localhost".to_string()]);
    }

    #[test]
    fn sentinel_hosts_are_comma_separated() {
        let cfg = SentinelConfig::from_lookup(vars(&[
            ("LEASEWQ_SENTINEL_HOSTS", "s1, s2,,s3"),
            ("LEASEWQ_SENTINEL_MASTER_GROUP", "jobs"),
        ]))
        .unwrap();
        assert_eq!(cfg.hosts, vec!["s1", "s2", "s3"]);
        assert_eq!(cfg.master_group, "jobs");

        assert!(SentinelConfig::from_lookup(vars(&[("LEASEWQ_SENTINEL_HOSTS", " , ")])).is_err());
    }

    #[test]
    fn queue_keys_follow_naming_scheme() {
        let cfg = QueueConfig::new("render");
        assert_eq!(cfg.backlog_key(), "render");
        assert_eq!(cfg.processing_key(), "render:processing");
        assert_eq!(cfg.lease_prefix(), "render:leased_by_session:");
    }

    #[test]
    fn empty_queue_name_is_rejected() {
        let err = QueueConfig::from_lookup(vars(&[("LEASEWQ_QUEUE_NAME", "")])).unwrap_err();
        assert!(matches!(err, QueueError::Config(_)));
    }

    #[test]
    fn deserializes_with_defaults() {
        let cfg: QueueConfig = serde_json::from_str(r#"{"name":"thumbs"}"#).unwrap();
        assert_eq!(cfg.processing_key(), "thumbs:processing");

        let store: StoreConfig = serde_json::from_str(r#"{"host":"h","db":2}"#).unwrap();
        assert_eq!(store.port, 6379);
        assert_eq!(store.db, 2);
    }

    #[test]
    fn processor_config_defaults() {
        let cfg = ProcessorConfig::from_lookup(vars(&[])).unwrap();
        assert_eq!(cfg.lease_duration, Duration::from_secs(60));
        assert_eq!(cfg.block_timeout, None);
        assert_eq!(cfg.max_attempts, 3);
        assert!(!cfg.verify_ownership);
    }

    #[test]
    fn processor_config_from_vars() {
        let cfg = ProcessorConfig::from_lookup(vars(&[
            ("LEASEWQ_LEASE_MS", "1500"),
            ("LEASEWQ_BLOCK_TIMEOUT_MS", "200"),
            ("LEASEWQ_MAX_ATTEMPTS", "5"),
            ("LEASEWQ_VERIFY_OWNERSHIP", "true"),
        ]))
        .unwrap();
        assert_eq!(cfg.lease_duration, Duration::from_millis(1500));
        assert_eq!(cfg.block_timeout, Some(Duration::from_millis(200)));
        assert_eq!(cfg.max_attempts, 5);
        assert!(cfg.verify_ownership);
    }

    #[test]
    fn oversized_lease_is_rejected() {
        let err = ProcessorConfig::default()
            .with_lease_duration(Duration::MAX)
            .validate()
            .unwrap_err();
        assert!(matches!(err, QueueError::Config(_)));

        let longest = ProcessorConfig::default().with_lease_duration(MAX_LEASE_DURATION);
        assert!(longest.validate().is_ok());
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let err = ProcessorConfig::from_lookup(vars(&[("LEASEWQ_MAX_ATTEMPTS", "0")])).unwrap_err();
        assert!(matches!(err, QueueError::Config(_)));
    }
}
