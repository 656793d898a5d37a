//! High-availability queue client.
//!
//! Holds two [`WorkQueue`] handles for one queue:
//!
//! - **primary**: push, lease, complete (everything that writes)
//! - **secondary**: size and emptiness checks, so liveness polling stays off
//!   the primary
//!
//! `open()` re-resolves endpoints and replaces both handles at once; there is
//! no partial reconnect. This type never retries; the processor layered on top
//! decides when to reconnect.

use std::time::Duration;

use tracing::info;

use leasewq_core::{EndpointPair, Fingerprint, Job, QueueResult, SessionId};

use crate::config::QueueConfig;
use crate::discovery::{Discovery, EndpointResolver};
use crate::queue::{Completion, WorkQueue};
use crate::store::StoreConnector;

pub struct HaClient<C: StoreConnector, D> {
    cluster: String,
    queue: QueueConfig,
    resolver: EndpointResolver<D>,
    connector: C,
    endpoints: EndpointPair,
    primary: WorkQueue<C::Store>,
    secondary: WorkQueue<C::Store>,
    generation: u64,
}

impl<C, D> HaClient<C, D>
where
    C: StoreConnector,
    D: Discovery,
{
    /// Resolve `cluster` and open both handles.
    pub fn connect(
        cluster: impl Into<String>,
        queue: QueueConfig,
        resolver: EndpointResolver<D>,
        connector: C,
    ) -> QueueResult<Self> {
        queue.validate()?;
        let cluster = cluster.into();
        let (endpoints, primary, secondary) =
            Self::open_handles(&cluster, &queue, &resolver, &connector)?;

        info!(
            cluster = %cluster,
            queue = %queue.name,
            primary = %endpoints.primary,
            secondary = %endpoints.secondary,
            session = %primary.session_id(),
            "queue client connected"
        );

        Ok(Self {
            cluster,
            queue,
            resolver,
            connector,
            endpoints,
            primary,
            secondary,
            generation: 1,
        })
    }

    fn open_handles(
        cluster: &str,
        queue: &QueueConfig,
        resolver: &EndpointResolver<D>,
        connector: &C,
    ) -> QueueResult<(EndpointPair, WorkQueue<C::Store>, WorkQueue<C::Store>)> {
        let endpoints = resolver.resolve(cluster)?;
        let primary = WorkQueue::new(connector.connect(&endpoints.primary)?, queue);
        let secondary = WorkQueue::new(connector.connect(&endpoints.secondary)?, queue);
        Ok((endpoints, primary, secondary))
    }

    /// Re-resolve endpoints and replace both handles with fresh sessions.
    ///
    /// On failure the previous handles stay in place. Leases held by the old
    /// primary session are not carried over; they expire on their own.
    pub fn open(&mut self) -> QueueResult<()> {
        let (endpoints, primary, secondary) =
            Self::open_handles(&self.cluster, &self.queue, &self.resolver, &self.connector)?;

        self.endpoints = endpoints;
        self.primary = primary;
        self.secondary = secondary;
        self.generation += 1;

        info!(
            cluster = %self.cluster,
            queue = %self.queue.name,
            primary = %self.endpoints.primary,
            secondary = %self.endpoints.secondary,
            session = %self.primary.session_id(),
            generation = self.generation,
            "queue client reconnected"
        );
        Ok(())
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn endpoints(&self) -> &EndpointPair {
        &self.endpoints
    }

    /// Number of successful opens, including the initial connect.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Session of the primary handle (the one stamping leases).
    pub fn session_id(&self) -> SessionId {
        self.primary.session_id()
    }

    pub fn primary(&self) -> &WorkQueue<C::Store> {
        &self.primary
    }

    pub fn secondary(&self) -> &WorkQueue<C::Store> {
        &self.secondary
    }

    pub fn push(&self, job: &Job) -> QueueResult<()> {
        self.primary.push(job)
    }

    pub fn lease(
        &self,
        lease_duration: Duration,
        block: bool,
        timeout: Option<Duration>,
    ) -> QueueResult<Option<Job>> {
        self.primary.lease(lease_duration, block, timeout)
    }

    pub fn complete(&self, job: &Job) -> QueueResult<Fingerprint> {
        self.primary.complete(job)
    }

    pub fn complete_if_owned(&self, job: &Job) -> QueueResult<Completion> {
        self.primary.complete_if_owned(job)
    }

    pub fn lease_exists(&self, job: &Job) -> QueueResult<bool> {
        self.primary.lease_exists(job)
    }

    pub fn empty(&self) -> QueueResult<bool> {
        self.secondary.empty()
    }

    pub fn size_backlog(&self) -> QueueResult<u64> {
        self.secondary.size_backlog()
    }

    pub fn size_inflight(&self) -> QueueResult<u64> {
        self.secondary.size_inflight()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use leasewq_core::{Endpoint, QueueError};

    use crate::discovery::StaticDiscovery;
    use crate::store::{BackingStore, InMemoryCluster};

    const LEASE: Duration = Duration::from_secs(60);

    struct Fixture {
        cluster: InMemoryCluster,
        discovery: Arc<StaticDiscovery>,
        primary: Endpoint,
        replica: Endpoint,
    }

    fn fixture() -> Fixture {
        let cluster = InMemoryCluster::new();
        let primary = Endpoint::new("redis-0", 6379);
        let replica = Endpoint::new("redis-1", 6379);
        let store = cluster.add_node(primary.clone());
        cluster.attach(replica.clone(), store);

        let discovery = Arc::new(StaticDiscovery::single(
            "jobs-cluster",
            primary.clone(),
            vec![replica.clone()],
        ));
        Fixture {
            cluster,
            discovery,
            primary,
            replica,
        }
    }

    fn client(f: &Fixture) -> HaClient<InMemoryCluster, Arc<StaticDiscovery>> {
        HaClient::connect(
            "jobs-cluster",
            QueueConfig::new("jobs"),
            EndpointResolver::new(f.discovery.clone()),
            f.cluster.clone(),
        )
        .unwrap()
    }

    #[test]
    fn connect_binds_primary_and_secondary() {
        let f = fixture();
        let client = client(&f);
        assert_eq!(client.endpoints().primary, f.primary);
        assert_eq!(client.endpoints().secondary, f.replica);
        assert_eq!(client.generation(), 1);
        assert_ne!(client.primary().session_id(), client.secondary().session_id());
    }

    #[test]
    fn writes_go_to_primary_and_reads_to_secondary() {
        let f = fixture();
        let client = client(&f);
        let job = Job::from("thumbnail 42");

        client.push(&job).unwrap();
        assert!(!client.empty().unwrap());
        assert_eq!(client.size_backlog().unwrap(), 1);

        let leased = client.lease(LEASE, false, None).unwrap().unwrap();
        assert!(client.lease_exists(&leased).unwrap());
        assert_eq!(client.size_inflight().unwrap(), 1);

        client.complete(&leased).unwrap();
        assert!(client.empty().unwrap());
    }

    #[test]
    fn calls_are_routed_to_the_right_node() {
        let cluster = InMemoryCluster::new();
        let primary = Endpoint::new("redis-0", 6379);
        let replica = Endpoint::new("redis-1", 6379);
        let primary_store = cluster.add_node(primary.clone());
        let replica_store = cluster.add_node(replica.clone());
        let discovery = StaticDiscovery::single("jobs-cluster", primary, vec![replica]);
        let client = HaClient::connect(
            "jobs-cluster",
            QueueConfig::new("jobs"),
            EndpointResolver::new(discovery),
            cluster,
        )
        .unwrap();

        // Only the replica has a job: reads see it, leases do not.
        replica_store.push_head("jobs", b"replica only").unwrap();
        assert!(!client.empty().unwrap());
        assert_eq!(client.size_backlog().unwrap(), 1);
        assert_eq!(client.lease(LEASE, false, None).unwrap(), None);

        let job = Job::from("primary only");
        client.push(&job).unwrap();
        assert_eq!(primary_store.len("jobs").unwrap(), 1);
        assert_eq!(replica_store.len("jobs").unwrap(), 1);

        let leased = client.lease(LEASE, false, None).unwrap().unwrap();
        assert_eq!(leased, job);
        assert_eq!(primary_store.len("jobs:processing").unwrap(), 1);
        assert_eq!(client.size_inflight().unwrap(), 0);

        client.complete(&leased).unwrap();
        assert_eq!(primary_store.len("jobs:processing").unwrap(), 0);
        assert!(!client.empty().unwrap());
    }

    #[test]
    fn open_replaces_handles_and_sessions() {
        let f = fixture();
        let mut client = client(&f);
        let before = client.session_id();

        client.open().unwrap();

        assert_ne!(client.session_id(), before);
        assert_eq!(client.generation(), 2);
    }

    #[test]
    fn open_follows_failover() {
        let f = fixture();
        let mut client = client(&f);

        f.discovery.promote("jobs-cluster", f.replica.clone());
        client.open().unwrap();

        assert_eq!(client.endpoints().primary, f.replica);
        assert_eq!(client.endpoints().secondary, f.primary);

        client.push(&Job::from("after failover")).unwrap();
        let store = f.cluster.node(&f.replica).unwrap();
        assert_eq!(store.len("jobs").unwrap(), 1);
    }

    #[test]
    fn unreachable_secondary_fails_open() {
        let f = fixture();
        let mut client = client(&f);

        f.cluster.remove_node(&f.replica);
        let err = client.open().unwrap_err();

        assert!(err.is_transient());
        assert_eq!(client.generation(), 1);
    }

    #[test]
    fn failed_open_keeps_previous_handles() {
        let f = fixture();
        let mut client = client(&f);
        let session = client.session_id();

        f.discovery.set_reachable(false);
        let err = client.open().unwrap_err();

        assert!(matches!(err, QueueError::DiscoveryUnavailable(_)));
        assert_eq!(client.session_id(), session);
        assert_eq!(client.generation(), 1);
        client.push(&Job::from("still works")).unwrap();
    }

    #[test]
    fn connect_rejects_empty_queue_name() {
        let f = fixture();
        let result = HaClient::connect(
            "jobs-cluster",
            QueueConfig::new(""),
            EndpointResolver::new(f.discovery.clone()),
            f.cluster.clone(),
        );
        assert!(matches!(result, Err(QueueError::Config(_))));
    }
}
