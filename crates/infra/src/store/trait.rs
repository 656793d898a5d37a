use std::sync::Arc;
use std::time::Duration;

use leasewq_core::{Endpoint, QueueResult};

/// Primitives the lease protocol needs from the shared store.
///
/// Lists are addressed by name. Producers push at the head and entries leave
/// from the tail, so a list drains in push order. Every operation is a
/// single round trip and must be atomic on the store side: in particular the
/// tail-to-head move is what guarantees that no two leasers receive the same
/// backlog entry.
///
/// Implementations surface transport failures as
/// `QueueError::BackendUnavailable`, refused commands as
/// `QueueError::Rejected`, and never retry locally.
pub trait BackingStore: Send + Sync {
    /// Insert `value` at the head (enqueue end) of `list`.
    fn push_head(&self, list: &str, value: &[u8]) -> QueueResult<()>;

    /// Atomically pop the tail of `src` and push it onto the head of `dst`.
    ///
    /// Returns `None` when `src` is empty.
    fn move_tail_to_head(&self, src: &str, dst: &str) -> QueueResult<Option<Vec<u8>>>;

    /// Blocking variant of [`move_tail_to_head`](Self::move_tail_to_head).
    ///
    /// Waits until an entry is available or `timeout` elapses (`None` waits
    /// indefinitely). Returns `None` on timeout.
    fn blocking_move_tail_to_head(
        &self,
        src: &str,
        dst: &str,
        timeout: Option<Duration>,
    ) -> QueueResult<Option<Vec<u8>>>;

    /// Number of entries in `list` (0 if it does not exist).
    fn len(&self, list: &str) -> QueueResult<u64>;

    /// Remove every entry of `list` equal to `value`; returns how many were removed.
    fn remove_all(&self, list: &str, value: &[u8]) -> QueueResult<u64>;

    /// Set `key` to `value`, expiring after `ttl`.
    fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> QueueResult<()>;

    fn get(&self, key: &str) -> QueueResult<Option<String>>;

    fn exists(&self, key: &str) -> QueueResult<bool>;

    /// Delete `key`; returns whether it existed.
    fn delete(&self, key: &str) -> QueueResult<bool>;

    /// Delete `key` only if its current value equals `expected`.
    fn delete_if_equals(&self, key: &str, expected: &str) -> QueueResult<bool>;
}

impl<B> BackingStore for Arc<B>
where
    B: BackingStore + ?Sized,
{
    fn push_head(&self, list: &str, value: &[u8]) -> QueueResult<()> {
        (**self).push_head(list, value)
    }

    fn move_tail_to_head(&self, src: &str, dst: &str) -> QueueResult<Option<Vec<u8>>> {
        (**self).move_tail_to_head(src, dst)
    }

    fn blocking_move_tail_to_head(
        &self,
        src: &str,
        dst: &str,
        timeout: Option<Duration>,
    ) -> QueueResult<Option<Vec<u8>>> {
        (**self).blocking_move_tail_to_head(src, dst, timeout)
    }

    fn len(&self, list: &str) -> QueueResult<u64> {
        (**self).len(list)
    }

    fn remove_all(&self, list: &str, value: &[u8]) -> QueueResult<u64> {
        (**self).remove_all(list, value)
    }

    fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> QueueResult<()> {
        (**self).set_with_ttl(key, value, ttl)
    }

    fn get(&self, key: &str) -> QueueResult<Option<String>> {
        (**self).get(key)
    }

    fn exists(&self, key: &str) -> QueueResult<bool> {
        (**self).exists(key)
    }

    fn delete(&self, key: &str) -> QueueResult<bool> {
        (**self).delete(key)
    }

    fn delete_if_equals(&self, key: &str, expected: &str) -> QueueResult<bool> {
        (**self).delete_if_equals(key, expected)
    }
}

/// Opens a store handle bound to one endpoint.
///
/// The HA client goes through a connector every time it (re)opens, so that a
/// failover picked up by discovery yields handles on the new primary.
pub trait StoreConnector: Send + Sync {
    type Store: BackingStore;

    fn connect(&self, endpoint: &Endpoint) -> QueueResult<Self::Store>;
}

impl<C> StoreConnector for Arc<C>
where
    C: StoreConnector + ?Sized,
{
    type Store = C::Store;

    fn connect(&self, endpoint: &Endpoint) -> QueueResult<Self::Store> {
        (**self).connect(endpoint)
    }
}
