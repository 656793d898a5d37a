//! Lease protocol over a [`BackingStore`].
//!
//! A queue is a pair of lists plus a family of lease keys:
//!
//! - **backlog** (`<name>`): jobs not yet claimed; producers push at the head
//! - **in-flight** (`<name>:processing`): jobs claimed but not completed
//! - **lease** (`<name>:leased_by_session:<fingerprint>`): session id with a TTL
//!
//! Leasing atomically moves the backlog tail onto the in-flight head, then
//! stamps a lease key. A worker that dies leaves its job in in-flight with a
//! lease that silently expires; sweeping such jobs back is an operational
//! concern outside this crate.

use std::time::Duration;

use tracing::debug;

use leasewq_core::{Fingerprint, Job, QueueResult, SessionId};

use crate::config::QueueConfig;
use crate::store::BackingStore;

/// Result of an ownership-checked completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub fingerprint: Fingerprint,
    /// Whether the lease key was still held by this session and got deleted.
    pub lease_released: bool,
}

/// Handle on one queue, bound to one store and one session.
#[derive(Debug)]
pub struct WorkQueue<S> {
    store: S,
    session: SessionId,
    backlog_key: String,
    processing_key: String,
    lease_prefix: String,
}

impl<S: BackingStore> WorkQueue<S> {
    /// Create a handle with a freshly generated session.
    pub fn new(store: S, config: &QueueConfig) -> Self {
        Self::with_session(store, config, SessionId::new())
    }

    pub fn with_session(store: S, config: &QueueConfig, session: SessionId) -> Self {
        Self {
            store,
            session,
            backlog_key: config.backlog_key(),
            processing_key: config.processing_key(),
            lease_prefix: config.lease_prefix(),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn lease_key(&self, fingerprint: &Fingerprint) -> String {
        format!("{}{}", self.lease_prefix, fingerprint)
    }

    /// Enqueue `job` on the backlog. Identical payloads are not deduplicated.
    pub fn push(&self, job: &Job) -> QueueResult<()> {
        self.store.push_head(&self.backlog_key, job.as_bytes())
    }

    pub fn size_backlog(&self) -> QueueResult<u64> {
        self.store.len(&self.backlog_key)
    }

    pub fn size_inflight(&self) -> QueueResult<u64> {
        self.store.len(&self.processing_key)
    }

    /// Whether backlog and in-flight were both empty when observed.
    pub fn empty(&self) -> QueueResult<bool> {
        Ok(self.size_backlog()? == 0 && self.size_inflight()? == 0)
    }

    /// Claim one job and hold it for `lease_duration`.
    ///
    /// Non-blocking mode first checks the backlog length as a cheap hint and
    /// then tries a single move. Blocking mode waits up to `timeout` (`None`
    /// waits indefinitely). `Ok(None)` means no job was available.
    pub fn lease(
        &self,
        lease_duration: Duration,
        block: bool,
        timeout: Option<Duration>,
    ) -> QueueResult<Option<Job>> {
        let moved = if block {
            self.store
                .blocking_move_tail_to_head(&self.backlog_key, &self.processing_key, timeout)?
        } else {
            // The length check is only a hint; the move below is what is atomic.
            if self.size_backlog()? == 0 {
                return Ok(None);
            }
            self.store
                .move_tail_to_head(&self.backlog_key, &self.processing_key)?
        };

        let Some(payload) = moved else {
            return Ok(None);
        };

        let job = Job::new(payload);
        let fingerprint = job.fingerprint();
        self.store.set_with_ttl(
            &self.lease_key(&fingerprint),
            &self.session.to_string(),
            lease_duration,
        )?;

        debug!(
            queue = %self.backlog_key,
            session = %self.session,
            fingerprint = %fingerprint,
            lease_ms = u64::try_from(lease_duration.as_millis()).unwrap_or(u64::MAX),
            "leased job"
        );
        Ok(Some(job))
    }

    /// Mark `job` done: drop it from in-flight and delete its lease key.
    ///
    /// The lease is deleted whoever holds it. If this session's lease already
    /// expired and another session re-leased the same payload, that session's
    /// lease is cleared too; see [`complete_if_owned`](Self::complete_if_owned).
    pub fn complete(&self, job: &Job) -> QueueResult<Fingerprint> {
        let removed = self.store.remove_all(&self.processing_key, job.as_bytes())?;
        let fingerprint = job.fingerprint();
        self.store.delete(&self.lease_key(&fingerprint))?;

        debug!(
            queue = %self.backlog_key,
            session = %self.session,
            fingerprint = %fingerprint,
            removed,
            "completed job"
        );
        Ok(fingerprint)
    }

    /// Like [`complete`](Self::complete), but only deletes the lease key if it
    /// still names this session.
    pub fn complete_if_owned(&self, job: &Job) -> QueueResult<Completion> {
        let removed = self.store.remove_all(&self.processing_key, job.as_bytes())?;
        let fingerprint = job.fingerprint();
        let lease_released = self
            .store
            .delete_if_equals(&self.lease_key(&fingerprint), &self.session.to_string())?;

        debug!(
            queue = %self.backlog_key,
            session = %self.session,
            fingerprint = %fingerprint,
            removed,
            lease_released,
            "completed job (ownership checked)"
        );
        Ok(Completion {
            fingerprint,
            lease_released,
        })
    }

    /// Whether some session currently holds a lease on `job`. Advisory only.
    pub fn lease_exists(&self, job: &Job) -> QueueResult<bool> {
        self.store.exists(&self.lease_key(&job.fingerprint()))
    }

    /// Session currently holding the lease on `job`, if any.
    ///
    /// A lease value that is not a session id (written by a foreign client)
    /// reads as `None`.
    pub fn lease_owner(&self, job: &Job) -> QueueResult<Option<SessionId>> {
        let raw = self.store.get(&self.lease_key(&job.fingerprint()))?;
        Ok(raw.and_then(|s| s.parse().ok()))
    }
}
