//! Fault-injecting store doubles for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use leasewq_core::{Endpoint, QueueError, QueueResult};

use crate::store::{BackingStore, InMemoryCluster, InMemoryStore, StoreConnector};

/// Shared failure budgets: while positive, every store call consumes one unit
/// and fails, first with `BackendUnavailable`, then with `Rejected`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Faults {
    remaining: Arc<AtomicUsize>,
    rejections: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl Faults {
    pub(crate) fn fail_next(&self, n: usize) {
        self.remaining.store(n, Ordering::SeqCst);
    }

    pub(crate) fn fail_always(&self) {
        self.fail_next(usize::MAX);
    }

    /// Make the next `n` calls fail with a non-transient rejection.
    pub(crate) fn reject_next(&self, n: usize) {
        self.rejections.store(n, Ordering::SeqCst);
    }

    pub(crate) fn heal(&self) {
        self.fail_next(0);
        self.reject_next(0);
    }

    /// Store calls seen so far, failed or not.
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> QueueResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if consume(&self.remaining) {
            return Err(QueueError::backend("injected fault"));
        }
        if consume(&self.rejections) {
            return Err(QueueError::rejected("injected rejection"));
        }
        Ok(())
    }
}

fn consume(budget: &AtomicUsize) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// [`InMemoryStore`] that fails while its [`Faults`] budget lasts.
#[derive(Debug, Clone)]
pub(crate) struct FlakyStore {
    inner: Arc<InMemoryStore>,
    faults: Faults,
}

impl FlakyStore {
    pub(crate) fn new(inner: Arc<InMemoryStore>, faults: Faults) -> Self {
        Self { inner, faults }
    }
}

impl BackingStore for FlakyStore {
    fn push_head(&self, list: &str, value: &[u8]) -> QueueResult<()> {
        self.faults.check()?;
        self.inner.push_head(list, value)
    }

    fn move_tail_to_head(&self, src: &str, dst: &str) -> QueueResult<Option<Vec<u8>>> {
        self.faults.check()?;
        self.inner.move_tail_to_head(src, dst)
    }

    fn blocking_move_tail_to_head(
        &self,
        src: &str,
        dst: &str,
        timeout: Option<Duration>,
    ) -> QueueResult<Option<Vec<u8>>> {
        self.faults.check()?;
        self.inner.blocking_move_tail_to_head(src, dst, timeout)
    }

    fn len(&self, list: &str) -> QueueResult<u64> {
        self.faults.check()?;
        self.inner.len(list)
    }

    fn remove_all(&self, list: &str, value: &[u8]) -> QueueResult<u64> {
        self.faults.check()?;
        self.inner.remove_all(list, value)
    }

    fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> QueueResult<()> {
        self.faults.check()?;
        self.inner.set_with_ttl(key, value, ttl)
    }

    fn get(&self, key: &str) -> QueueResult<Option<String>> {
        self.faults.check()?;
        self.inner.get(key)
    }

    fn exists(&self, key: &str) -> QueueResult<bool> {
        self.faults.check()?;
        self.inner.exists(key)
    }

    fn delete(&self, key: &str) -> QueueResult<bool> {
        self.faults.check()?;
        self.inner.delete(key)
    }

    fn delete_if_equals(&self, key: &str, expected: &str) -> QueueResult<bool> {
        self.faults.check()?;
        self.inner.delete_if_equals(key, expected)
    }
}

/// Connector handing out [`FlakyStore`]s that share one failure budget.
///
/// Connecting itself never fails on injected faults, so a reconnect succeeds
/// as long as the endpoint is served by the cluster.
#[derive(Debug, Clone, Default)]
pub(crate) struct FlakyConnector {
    pub(crate) cluster: InMemoryCluster,
    pub(crate) faults: Faults,
    connects: Arc<AtomicUsize>,
}

impl FlakyConnector {
    pub(crate) fn new(cluster: InMemoryCluster) -> Self {
        Self {
            cluster,
            ..Self::default()
        }
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl StoreConnector for FlakyConnector {
    type Store = FlakyStore;

    fn connect(&self, endpoint: &Endpoint) -> QueueResult<Self::Store> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let inner = self.cluster.connect(endpoint)?;
        Ok(FlakyStore::new(inner, self.faults.clone()))
    }
}
