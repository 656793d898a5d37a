//! Redis-backed store (optional).
//!
//! Maps the store primitives onto plain Redis commands:
//!
//! - **Lists**: `LPUSH`, `RPOPLPUSH`, `BRPOPLPUSH`, `LLEN`, `LREM 0`
//! - **Leases**: `SET .. PX`, `GET`, `EXISTS`, `DEL`
//! - **Compare-and-delete**: a short Lua script (`GET` + `DEL` in one step)
//!
//! One connection is kept per store handle and dropped after any failure, so
//! the next call reconnects.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, instrument};

use leasewq_core::{Endpoint, QueueError, QueueResult};

use super::r#trait::{BackingStore, StoreConnector};
use crate::config::StoreConfig;

const COMPARE_AND_DELETE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// Map a redis error for `op`: transport failures are transient, anything
/// the server answered with is a rejection.
fn backend(op: &'static str) -> impl Fn(redis::RedisError) -> QueueError {
    move |e| {
        let transient = e.is_io_error()
            || e.is_connection_dropped()
            || e.is_connection_refusal()
            || e.is_timeout();
        if transient {
            QueueError::backend(format!("{op} failed: {e}"))
        } else {
            QueueError::rejected(format!("{op} failed: {e}"))
        }
    }
}

/// Store handle bound to one Redis instance.
#[derive(Clone)]
pub struct RedisStore {
    client: Arc<redis::Client>,
    endpoint: Endpoint,
    connect_timeout: Duration,
    conn: Arc<Mutex<Option<redis::Connection>>>,
    compare_and_delete: Arc<redis::Script>,
}

impl core::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisStore")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Create a handle for `endpoint` using the credentials and database in `config`.
    ///
    /// No connection is made until the first command.
    pub fn open(endpoint: &Endpoint, config: &StoreConfig) -> QueueResult<Self> {
        let info = redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(endpoint.host.clone(), endpoint.port),
            redis: redis::RedisConnectionInfo {
                db: config.db,
                username: config.username.clone(),
                password: config.password.clone(),
                ..Default::default()
            },
        };
        let client = redis::Client::open(info).map_err(backend("client setup"))?;

        Ok(Self {
            client: Arc::new(client),
            endpoint: endpoint.clone(),
            connect_timeout: config.connect_timeout,
            conn: Arc::new(Mutex::new(None)),
            compare_and_delete: Arc::new(redis::Script::new(COMPARE_AND_DELETE)),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn lock(&self) -> QueueResult<MutexGuard<'_, Option<redis::Connection>>> {
        self.conn
            .lock()
            .map_err(|_| QueueError::backend("redis connection lock poisoned"))
    }

    /// Run `f` on the cached connection, connecting first if needed.
    fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut redis::Connection) -> QueueResult<T>,
    ) -> QueueResult<T> {
        let mut slot = self.lock()?;

        if slot.is_none() {
            debug!(endpoint = %self.endpoint, "connecting to redis");
            let conn = self
                .client
                .get_connection_with_timeout(self.connect_timeout)
                .map_err(|e| QueueError::backend(format!("connect {}: {e}", self.endpoint)))?;
            *slot = Some(conn);
        }

        let Some(conn) = slot.as_mut() else {
            return Err(QueueError::backend("redis connection unavailable"));
        };
        let result = f(conn);
        if result.is_err() {
            // Connection state is unknown after a failed command.
            *slot = None;
        }
        result
    }
}

impl BackingStore for RedisStore {
    #[instrument(skip(self, value), fields(endpoint = %self.endpoint), err)]
    fn push_head(&self, list: &str, value: &[u8]) -> QueueResult<()> {
        self.with_conn(|conn| {
            let _: u64 = redis::cmd("LPUSH")
                .arg(list)
                .arg(value)
                .query(conn)
                .map_err(backend("LPUSH"))?;
            Ok(())
        })
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint), err)]
    fn move_tail_to_head(&self, src: &str, dst: &str) -> QueueResult<Option<Vec<u8>>> {
        self.with_conn(|conn| {
            redis::cmd("RPOPLPUSH")
                .arg(src)
                .arg(dst)
                .query(conn)
                .map_err(backend("RPOPLPUSH"))
        })
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint), err)]
    fn blocking_move_tail_to_head(
        &self,
        src: &str,
        dst: &str,
        timeout: Option<Duration>,
    ) -> QueueResult<Option<Vec<u8>>> {
        // BRPOPLPUSH treats 0 as "wait forever".
        let secs = match timeout {
            Some(t) if t.is_zero() => return self.move_tail_to_head(src, dst),
            Some(t) => t.as_secs_f64(),
            None => 0.0,
        };

        self.with_conn(|conn| {
            redis::cmd("BRPOPLPUSH")
                .arg(src)
                .arg(dst)
                .arg(secs)
                .query(conn)
                .map_err(backend("BRPOPLPUSH"))
        })
    }

    fn len(&self, list: &str) -> QueueResult<u64> {
        self.with_conn(|conn| {
            redis::cmd("LLEN")
                .arg(list)
                .query(conn)
                .map_err(backend("LLEN"))
        })
    }

    #[instrument(skip(self, value), fields(endpoint = %self.endpoint), err)]
    fn remove_all(&self, list: &str, value: &[u8]) -> QueueResult<u64> {
        self.with_conn(|conn| {
            redis::cmd("LREM")
                .arg(list)
                .arg(0)
                .arg(value)
                .query(conn)
                .map_err(backend("LREM"))
        })
    }

    #[instrument(skip(self, value), fields(endpoint = %self.endpoint), err)]
    fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> QueueResult<()> {
        // PX rejects 0; a sub-millisecond lease still gets one millisecond.
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        self.with_conn(|conn| {
            let _: String = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("PX")
                .arg(millis)
                .query(conn)
                .map_err(backend("SET"))?;
            Ok(())
        })
    }

    fn get(&self, key: &str) -> QueueResult<Option<String>> {
        self.with_conn(|conn| {
            redis::cmd("GET")
                .arg(key)
                .query(conn)
                .map_err(backend("GET"))
        })
    }

    fn exists(&self, key: &str) -> QueueResult<bool> {
        self.with_conn(|conn| {
            redis::cmd("EXISTS")
                .arg(key)
                .query(conn)
                .map_err(backend("EXISTS"))
        })
    }

    fn delete(&self, key: &str) -> QueueResult<bool> {
        self.with_conn(|conn| {
            let removed: u64 = redis::cmd("DEL")
                .arg(key)
                .query(conn)
                .map_err(backend("DEL"))?;
            Ok(removed > 0)
        })
    }

    fn delete_if_equals(&self, key: &str, expected: &str) -> QueueResult<bool> {
        self.with_conn(|conn| {
            let removed: u64 = self
                .compare_and_delete
                .key(key)
                .arg(expected)
                .invoke(conn)
                .map_err(backend("compare-and-delete"))?;
            Ok(removed > 0)
        })
    }
}

/// Connector producing [`RedisStore`] handles from one shared [`StoreConfig`].
///
/// Host and port of the config are ignored; the endpoint comes from discovery.
#[derive(Debug, Clone)]
pub struct RedisConnector {
    config: StoreConfig,
}

impl RedisConnector {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }
}

impl StoreConnector for RedisConnector {
    type Store = RedisStore;

    fn connect(&self, endpoint: &Endpoint) -> QueueResult<Self::Store> {
        RedisStore::open(endpoint, &self.config)
    }
}
