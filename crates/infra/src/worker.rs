//! Worker loop driving a [`ResilientProcessor`].

use std::io;
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use leasewq_core::Job;

use crate::discovery::Discovery;
use crate::processor::{Emptiness, ResilientProcessor};
use crate::store::StoreConnector;

/// What a handler made of a job. Both outcomes release the lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Done,
    /// Logged and counted; the job is not requeued.
    Failed(String),
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Thread and log name
    pub name: String,
    /// Upper bound on one idle poll: the lease wait plus the sleep after it
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "leasewq-worker".to_string(),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl WorkerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Worker runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct WorkerStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    /// Releases whose completion was abandoned after retries.
    pub releases_abandoned: u64,
    /// Polls that found no job.
    pub idle_polls: u64,
    pub uptime_secs: u64,
}

impl WorkerStats {
    fn record(&mut self, outcome: &JobOutcome, released: bool) {
        self.jobs_processed += 1;
        match outcome {
            JobOutcome::Done => self.jobs_succeeded += 1,
            JobOutcome::Failed(_) => self.jobs_failed += 1,
        }
        if !released {
            self.releases_abandoned += 1;
        }
    }
}

/// Handle to a worker running on its own thread.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl WorkerHandle {
    /// Request shutdown and wait for the loop to finish its current job.
    ///
    /// An idle loop notices the request within about one `poll_interval`.
    pub fn shutdown(mut self) -> WorkerStats {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
        self.stats()
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Sequential consumer: lease, handle, release.
///
/// Each lease waits at most `poll_interval`, even when the processor's own
/// `block_timeout` is unbounded, so the loop keeps re-checking emptiness and
/// shutdown.
pub struct Worker<C: StoreConnector, D> {
    processor: ResilientProcessor<C, D>,
    poll_interval: Duration,
}

impl<C, D> Worker<C, D>
where
    C: StoreConnector,
    D: Discovery,
{
    pub fn new(processor: ResilientProcessor<C, D>) -> Self {
        Self {
            processor,
            poll_interval: WorkerConfig::default().poll_interval,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn processor(&self) -> &ResilientProcessor<C, D> {
        &self.processor
    }

    pub fn into_processor(self) -> ResilientProcessor<C, D> {
        self.processor
    }

    /// Lease one job, run `handler` on it and release it.
    ///
    /// Returns `false` if no job was leased.
    fn step<F>(&mut self, name: &str, handler: &mut F, stats: &mut WorkerStats) -> bool
    where
        F: FnMut(&Job) -> JobOutcome,
    {
        let wait = match self.processor.config().block_timeout {
            Some(timeout) => timeout.min(self.poll_interval),
            None => self.poll_interval,
        };
        let Some(job) = self.processor.get_job_within(Some(wait)) else {
            stats.idle_polls += 1;
            return false;
        };

        let fingerprint = job.fingerprint();
        let outcome = handler(&job);
        if let JobOutcome::Failed(reason) = &outcome {
            warn!(worker = name, fingerprint = %fingerprint, reason = %reason, "job failed");
        }

        let released = self.processor.release_job().is_some();
        debug!(worker = name, fingerprint = %fingerprint, released, "job released");
        stats.record(&outcome, released);
        true
    }

    /// Process jobs until the queue is observed empty.
    ///
    /// An `Unknown` emptiness check counts as not empty, so a backend outage
    /// keeps the loop polling instead of ending the drain early.
    pub fn run_until_empty<F>(&mut self, mut handler: F) -> WorkerStats
    where
        F: FnMut(&Job) -> JobOutcome,
    {
        let started = Instant::now();
        let mut stats = WorkerStats::default();

        loop {
            match self.processor.is_empty() {
                Emptiness::Empty => break,
                Emptiness::NotEmpty => {}
                Emptiness::Unknown => warn!("queue state unknown, polling again"),
            }
            self.step("drain", &mut handler, &mut stats);
        }

        stats.uptime_secs = started.elapsed().as_secs();
        info!(
            processed = stats.jobs_processed,
            failed = stats.jobs_failed,
            "queue drained"
        );
        stats
    }
}

impl<C, D> Worker<C, D>
where
    C: StoreConnector + Send + 'static,
    C::Store: Send + 'static,
    D: Discovery + 'static,
{
    /// Run the worker on a background thread until shut down.
    pub fn spawn<F>(mut self, config: WorkerConfig, handler: F) -> io::Result<WorkerHandle>
    where
        F: FnMut(&Job) -> JobOutcome + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let stats_clone = stats.clone();
        self.poll_interval = config.poll_interval;

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || worker_loop(self, config, handler, shutdown_rx, stats_clone))?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }
}

fn worker_loop<C, D, F>(
    mut worker: Worker<C, D>,
    config: WorkerConfig,
    mut handler: F,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<WorkerStats>>,
) where
    C: StoreConnector,
    D: Discovery,
    F: FnMut(&Job) -> JobOutcome,
{
    info!(worker = %config.name, "worker started");
    let started = Instant::now();

    loop {
        match shutdown_rx.try_recv() {
            Ok(()) | Err(mpsc::TryRecvError::Disconnected) => break,
            Err(mpsc::TryRecvError::Empty) => {}
        }

        let poll_started = Instant::now();
        let mut local = stats.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let leased = worker.step(&config.name, &mut handler, &mut local);
        local.uptime_secs = started.elapsed().as_secs();
        *stats.lock().unwrap_or_else(PoisonError::into_inner) = local;

        if !leased {
            thread::sleep(config.poll_interval.saturating_sub(poll_started.elapsed()));
        }
    }

    info!(worker = %config.name, "worker stopped");
}
