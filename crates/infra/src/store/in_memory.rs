use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use leasewq_core::{Endpoint, QueueError, QueueResult};

use super::r#trait::{BackingStore, StoreConnector};

#[derive(Debug, Clone)]
struct ExpiringValue {
    value: String,
    expires_at: DateTime<Utc>,
}

impl ExpiringValue {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Default)]
struct State {
    lists: HashMap<String, VecDeque<Vec<u8>>>,
    keys: HashMap<String, ExpiringValue>,
}

impl State {
    fn pop_push(&mut self, src: &str, dst: &str) -> Option<Vec<u8>> {
        let value = self.lists.get_mut(src)?.pop_back()?;
        self.lists
            .entry(dst.to_string())
            .or_default()
            .push_front(value.clone());
        Some(value)
    }

    /// Returns the live value of `key`, dropping it if expired.
    fn live(&mut self, key: &str) -> Option<&ExpiringValue> {
        let now = Utc::now();
        if self.keys.get(key).is_some_and(|v| !v.is_live(now)) {
            self.keys.remove(key);
        }
        self.keys.get(key)
    }
}

/// In-memory list + TTL key store.
///
/// Intended for tests/dev. A single mutex makes every operation atomic, and a
/// condvar wakes blocked movers when an entry is pushed. Expired keys are
/// dropped lazily on access; a lease that expires and is never read again
/// stays in memory until the store is dropped.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    pushed: Condvar,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn lock(&self) -> QueueResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| QueueError::backend("in-memory store lock poisoned"))
    }

    /// Snapshot of `list`, head first. For inspection in tests and tooling.
    pub fn list_contents(&self, list: &str) -> QueueResult<Vec<Vec<u8>>> {
        let state = self.lock()?;
        Ok(state
            .lists
            .get(list)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default())
    }
}

fn ttl_to_chrono(ttl: Duration) -> QueueResult<chrono::Duration> {
    chrono::Duration::from_std(ttl).map_err(|e| QueueError::config(format!("ttl {ttl:?}: {e}")))
}

impl BackingStore for InMemoryStore {
    fn push_head(&self, list: &str, value: &[u8]) -> QueueResult<()> {
        let mut state = self.lock()?;
        state
            .lists
            .entry(list.to_string())
            .or_default()
            .push_front(value.to_vec());
        drop(state);
        self.pushed.notify_all();
        Ok(())
    }

    fn move_tail_to_head(&self, src: &str, dst: &str) -> QueueResult<Option<Vec<u8>>> {
        let mut state = self.lock()?;
        Ok(state.pop_push(src, dst))
    }

    fn blocking_move_tail_to_head(
        &self,
        src: &str,
        dst: &str,
        timeout: Option<Duration>,
    ) -> QueueResult<Option<Vec<u8>>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.lock()?;

        loop {
            if let Some(value) = state.pop_push(src, dst) {
                return Ok(Some(value));
            }

            state = match deadline {
                None => self
                    .pushed
                    .wait(state)
                    .map_err(|_| QueueError::backend("in-memory store lock poisoned"))?,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    self.pushed
                        .wait_timeout(state, deadline - now)
                        .map_err(|_| QueueError::backend("in-memory store lock poisoned"))?
                        .0
                }
            };
        }
    }

    fn len(&self, list: &str) -> QueueResult<u64> {
        let state = self.lock()?;
        Ok(state.lists.get(list).map_or(0, |l| l.len() as u64))
    }

    fn remove_all(&self, list: &str, value: &[u8]) -> QueueResult<u64> {
        let mut state = self.lock()?;
        let Some(entries) = state.lists.get_mut(list) else {
            return Ok(0);
        };
        let before = entries.len();
        entries.retain(|e| e.as_slice() != value);
        Ok((before - entries.len()) as u64)
    }

    fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> QueueResult<()> {
        let expires_at = Utc::now() + ttl_to_chrono(ttl)?;
        let mut state = self.lock()?;
        state.keys.insert(
            key.to_string(),
            ExpiringValue {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    fn get(&self, key: &str) -> QueueResult<Option<String>> {
        let mut state = self.lock()?;
        Ok(state.live(key).map(|v| v.value.clone()))
    }

    fn exists(&self, key: &str) -> QueueResult<bool> {
        let mut state = self.lock()?;
        Ok(state.live(key).is_some())
    }

    fn delete(&self, key: &str) -> QueueResult<bool> {
        let mut state = self.lock()?;
        let existed = state.live(key).is_some();
        state.keys.remove(key);
        Ok(existed)
    }

    fn delete_if_equals(&self, key: &str, expected: &str) -> QueueResult<bool> {
        let mut state = self.lock()?;
        if state.live(key).is_some_and(|v| v.value == expected) {
            state.keys.remove(key);
            return Ok(true);
        }
        Ok(false)
    }
}

/// A set of in-memory store nodes addressed by endpoint.
///
/// Several endpoints may alias one store, which models a replica that is
/// perfectly in sync with its primary. Connecting to an unknown or downed
/// endpoint fails with `BackendUnavailable`, like a refused TCP connect.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCluster {
    nodes: Arc<RwLock<HashMap<Endpoint, Arc<InMemoryStore>>>>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `endpoint` with a fresh, empty store and return it.
    pub fn add_node(&self, endpoint: Endpoint) -> Arc<InMemoryStore> {
        let store = InMemoryStore::arc();
        self.attach(endpoint, store.clone());
        store
    }

    /// Serve `store` at `endpoint` (replica of whatever else serves it).
    pub fn attach(&self, endpoint: Endpoint, store: Arc<InMemoryStore>) {
        if let Ok(mut nodes) = self.nodes.write() {
            nodes.insert(endpoint, store);
        }
    }

    /// Stop serving `endpoint`; existing handles keep working.
    pub fn remove_node(&self, endpoint: &Endpoint) {
        if let Ok(mut nodes) = self.nodes.write() {
            nodes.remove(endpoint);
        }
    }

    pub fn node(&self, endpoint: &Endpoint) -> Option<Arc<InMemoryStore>> {
        self.nodes.read().ok()?.get(endpoint).cloned()
    }
}

impl StoreConnector for InMemoryCluster {
    type Store = Arc<InMemoryStore>;

    fn connect(&self, endpoint: &Endpoint) -> QueueResult<Self::Store> {
        self.node(endpoint)
            .ok_or_else(|| QueueError::backend(format!("connection refused: {endpoint}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn move_rotates_tail_to_head() {
        let store = InMemoryStore::new();
        store.push_head("q", b"a").unwrap();
        store.push_head("q", b"b").unwrap();
        assert_eq!(
            store.list_contents("q").unwrap(),
            vec![b"b".to_vec(), b"a".to_vec()]
        );

        assert_eq!(store.move_tail_to_head("q", "p").unwrap(), Some(b"a".to_vec()));
        assert_eq!(store.move_tail_to_head("q", "p").unwrap(), Some(b"b".to_vec()));
        assert_eq!(store.move_tail_to_head("q", "p").unwrap(), None);

        // Newest move sits at the head of the destination.
        assert_eq!(
            store.list_contents("p").unwrap(),
            vec![b"b".to_vec(), b"a".to_vec()]
        );
    }

    #[test]
    fn blocking_move_times_out_on_empty_list() {
        let store = InMemoryStore::new();
        let started = Instant::now();
        let got = store
            .blocking_move_tail_to_head("q", "p", Some(Duration::from_millis(30)))
            .unwrap();
        assert!(got.is_none());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn blocking_move_wakes_on_push() {
        let store = InMemoryStore::arc();
        let waiter = {
            let store = store.clone();
            thread::spawn(move || {
                store.blocking_move_tail_to_head("q", "p", Some(Duration::from_secs(5)))
            })
        };

        thread::sleep(Duration::from_millis(20));
        store.push_head("q", b"late").unwrap();

        let got = waiter.join().unwrap().unwrap();
        assert_eq!(got, Some(b"late".to_vec()));
        assert_eq!(store.len("p").unwrap(), 1);
    }

    #[test]
    fn remove_all_counts_matches() {
        let store = InMemoryStore::new();
        for v in [&b"x"[..], b"y", b"x"] {
            store.push_head("l", v).unwrap();
        }
        assert_eq!(store.remove_all("l", b"x").unwrap(), 2);
        assert_eq!(store.remove_all("missing", b"x").unwrap(), 0);
        assert_eq!(store.list_contents("l").unwrap(), vec![b"y".to_vec()]);
    }

    #[test]
    fn keys_expire_after_ttl() {
        let store = InMemoryStore::new();
        store
            .set_with_ttl("k", "v", Duration::from_millis(20))
            .unwrap();
        assert!(store.exists("k").unwrap());
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));

        thread::sleep(Duration::from_millis(40));
        assert!(!store.exists("k").unwrap());
        assert!(!store.delete("k").unwrap());
    }

    #[test]
    fn delete_if_equals_only_removes_matching_value() {
        let store = InMemoryStore::new();
        store.set_with_ttl("k", "mine", Duration::from_secs(10)).unwrap();

        assert!(!store.delete_if_equals("k", "theirs").unwrap());
        assert!(store.exists("k").unwrap());
        assert!(store.delete_if_equals("k", "mine").unwrap());
        assert!(!store.exists("k").unwrap());
    }

    #[test]
    fn cluster_refuses_unknown_endpoints() {
        let cluster = InMemoryCluster::new();
        let primary = Endpoint::new("primary", 6379);
        let store = cluster.add_node(primary.clone());
        cluster.attach(Endpoint::new("replica", 6379), store.clone());

        let via_replica = cluster.connect(&Endpoint::new("replica", 6379)).unwrap();
        assert!(Arc::ptr_eq(&store, &via_replica));

        cluster.remove_node(&primary);
        let err = cluster.connect(&primary).unwrap_err();
        assert!(err.is_transient());
    }
}
