//! Resilient processor: the worker-facing get/release interface.
//!
//! Every call goes through the HA client with a bounded number of attempts.
//! Only `QueueError::BackendUnavailable` is retried; any other error ends the
//! loop at once. Nothing escapes `is_empty`, `get_job` or `release_job`:
//!
//! - `is_empty` exhausted → [`Emptiness::Unknown`], no reconnect
//! - `get_job` exhausted → one full reconnect, then `None`
//! - `release_job` exhausted → completion dropped, current job cleared anyway
//!
//! A worker therefore never wedges on the store, at the price of "no job"
//! being ambiguous between an empty queue and an unreachable backend.

use std::time::Duration;

use tracing::{debug, error, warn};

use leasewq_core::{Fingerprint, Job, QueueResult};

use crate::config::{ProcessorConfig, QueueConfig};
use crate::discovery::{Discovery, EndpointResolver};
use crate::ha_client::HaClient;
use crate::store::StoreConnector;

/// Outcome of an emptiness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emptiness {
    Empty,
    NotEmpty,
    /// The backend could not be asked; poll again later.
    Unknown,
}

impl Emptiness {
    pub fn is_empty(self) -> bool {
        self == Emptiness::Empty
    }
}

impl From<bool> for Emptiness {
    fn from(empty: bool) -> Self {
        if empty {
            Emptiness::Empty
        } else {
            Emptiness::NotEmpty
        }
    }
}

/// Call `op` up to `max_attempts` times while it fails with a transient error.
///
/// Returns the first success or the last error. Non-transient errors are
/// returned immediately.
fn with_retry<T>(
    op: &'static str,
    max_attempts: u32,
    mut call: impl FnMut() -> QueueResult<T>,
) -> QueueResult<T> {
    let mut attempt = 1;
    loop {
        match call() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                warn!(op, attempt, max_attempts, error = %e, "backend call failed, retrying");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

pub struct ResilientProcessor<C: StoreConnector, D> {
    client: HaClient<C, D>,
    config: ProcessorConfig,
    current: Option<Job>,
}

impl<C, D> ResilientProcessor<C, D>
where
    C: StoreConnector,
    D: Discovery,
{
    pub fn new(client: HaClient<C, D>, config: ProcessorConfig) -> QueueResult<Self> {
        config.validate()?;
        Ok(Self {
            client,
            config,
            current: None,
        })
    }

    /// Connect an HA client for `cluster` and wrap it.
    ///
    /// Unlike the per-call operations, initial connection errors are returned.
    pub fn connect(
        cluster: impl Into<String>,
        queue: QueueConfig,
        resolver: EndpointResolver<D>,
        connector: C,
        config: ProcessorConfig,
    ) -> QueueResult<Self> {
        config.validate()?;
        let client = HaClient::connect(cluster, queue, resolver, connector)?;
        Self::new(client, config)
    }

    pub fn client(&self) -> &HaClient<C, D> {
        &self.client
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// The job leased by the last `get_job` and not yet released.
    pub fn current_job(&self) -> Option<&Job> {
        self.current.as_ref()
    }

    /// Ask the secondary about emptiness of backlog and in-flight.
    pub fn is_empty(&self) -> Emptiness {
        match with_retry("empty", self.config.max_attempts, || self.client.empty()) {
            Ok(empty) => Emptiness::from(empty),
            Err(e) => {
                warn!(
                    cluster = self.client.cluster(),
                    error = %e,
                    "emptiness unknown, giving up"
                );
                Emptiness::Unknown
            }
        }
    }

    /// Lease the next job and make it current, waiting up to the configured
    /// `block_timeout`.
    ///
    /// While a job is current it is returned again without leasing; call
    /// [`release_job`](Self::release_job) first.
    pub fn get_job(&mut self) -> Option<Job> {
        self.get_job_within(self.config.block_timeout)
    }

    /// [`get_job`](Self::get_job) with an explicit wait bound for this call
    /// (`None` waits indefinitely).
    pub fn get_job_within(&mut self, timeout: Option<Duration>) -> Option<Job> {
        if let Some(job) = &self.current {
            debug!(fingerprint = %job.fingerprint(), "current job still outstanding");
            return Some(job.clone());
        }

        let lease_duration = self.config.lease_duration;
        let client = &self.client;
        let leased = with_retry("lease", self.config.max_attempts, || {
            client.lease(lease_duration, true, timeout)
        });

        match leased {
            Ok(Some(job)) => {
                self.current = Some(job.clone());
                Some(job)
            }
            Ok(None) => None,
            Err(e) if e.is_transient() => {
                warn!(
                    cluster = self.client.cluster(),
                    attempts = self.config.max_attempts,
                    error = %e,
                    "lease attempts exhausted, reconnecting"
                );
                self.reconnect();
                None
            }
            Err(e) => {
                error!(cluster = self.client.cluster(), error = %e, "lease failed");
                None
            }
        }
    }

    fn reconnect(&mut self) {
        if let Err(e) = self.client.open() {
            error!(
                cluster = self.client.cluster(),
                error = %e,
                "reconnect failed, keeping previous connections"
            );
        }
    }

    /// Complete the current job and clear it.
    ///
    /// Returns the fingerprint of the completed job, or `None` if there was
    /// no current job or every completion attempt failed. The current job is
    /// cleared either way; an abandoned completion leaves the job in flight
    /// until its lease expires and an external sweep requeues it.
    pub fn release_job(&mut self) -> Option<Fingerprint> {
        let job = self.current.take()?;
        let attempts = self.config.max_attempts;
        let client = &self.client;

        let completed = if self.config.verify_ownership {
            with_retry("complete_if_owned", attempts, || client.complete_if_owned(&job)).map(
                |completion| {
                    if !completion.lease_released {
                        warn!(
                            fingerprint = %completion.fingerprint,
                            session = %client.session_id(),
                            "lease no longer held by this session, left in place"
                        );
                    }
                    completion.fingerprint
                },
            )
        } else {
            with_retry("complete", attempts, || client.complete(&job))
        };

        match completed {
            Ok(fingerprint) => Some(fingerprint),
            Err(e) => {
                warn!(
                    fingerprint = %job.fingerprint(),
                    error = %e,
                    "completion abandoned, job stays in flight"
                );
                None
            }
        }
    }

    /// Enqueue `job` with the same bounded retry. Errors are returned.
    pub fn push(&self, job: &Job) -> QueueResult<()> {
        with_retry("push", self.config.max_attempts, || self.client.push(job))
    }
}
