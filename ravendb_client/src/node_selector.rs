//! Picks the node that serves the next attempt of a command.
//!
//! The selector keeps an immutable [`NodeSelectorState`] snapshot behind a lock and replaces it
//! wholesale on every change, so readers always see a consistent topology, failure set and set
//! of speed-test results. The lock is only held long enough to clone and swap the snapshot.
use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::{ravendb_error::RavenDbError, server_node::ServerNode, topology::Topology};

/// Policy for which node services read requests. Writes always go to the preferred node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub enum ReadBalanceBehavior {
    #[default]
    None,
    RoundRobin,
    FastestNode,
}

#[derive(Clone, Debug, Default)]
pub struct NodeSelectorState {
    pub topology: Arc<Topology>,
    pub failed_nodes: HashSet<ServerNode>,
    /// Latest measured latency per node.
    pub speed_test_results: HashMap<ServerNode, Duration>,
    pub read_balance_behavior: ReadBalanceBehavior,
}

impl NodeSelectorState {
    fn is_failed(&self, node: &ServerNode) -> bool {
        self.failed_nodes.contains(node)
    }

    fn all_failed(&self) -> bool {
        !self.topology.nodes.is_empty()
            && self.topology.nodes.iter().all(|node| self.is_failed(node))
    }
}

#[derive(Debug)]
pub struct NodeSelector {
    state: RwLock<Arc<NodeSelectorState>>,
    round_robin_counter: AtomicUsize,
    fastest_node_epsilon: Duration,
    speed_test: Mutex<Option<JoinHandle<()>>>,
}

impl NodeSelector {
    pub fn new(
        topology: Topology,
        read_balance_behavior: ReadBalanceBehavior,
        fastest_node_epsilon: Duration,
    ) -> Self {
        let state = NodeSelectorState {
            topology: Arc::new(topology),
            read_balance_behavior,
            ..Default::default()
        };
        Self {
            state: RwLock::new(Arc::new(state)),
            // Spread independent clients across the cluster instead of all starting on the first
            // node.
            round_robin_counter: AtomicUsize::new(rand::random::<u16>() as usize),
            fastest_node_epsilon,
            speed_test: Mutex::new(None),
        }
    }

    /// Current snapshot. Never changes after it has been handed out.
    pub fn state(&self) -> Arc<NodeSelectorState> {
        Arc::clone(&self.state.read())
    }

    pub fn topology(&self) -> Arc<Topology> {
        Arc::clone(&self.state.read().topology)
    }

    pub fn read_balance_behavior(&self) -> ReadBalanceBehavior {
        self.state.read().read_balance_behavior
    }

    pub fn set_read_balance_behavior(&self, behavior: ReadBalanceBehavior) {
        if self.read_balance_behavior() != behavior {
            tracing::info!("Read balance behavior changed to {:?}", behavior);
            self.update(|state| state.read_balance_behavior = behavior);
        }
    }

    /// Copy-on-write update of the snapshot.
    fn update<T>(&self, mutate: impl FnOnce(&mut NodeSelectorState) -> T) -> T {
        let mut guard = self.state.write();
        let mut next = NodeSelectorState::clone(&guard);
        let result = mutate(&mut next);
        *guard = Arc::new(next);
        result
    }

    /// First node of the topology that is not marked failed.
    ///
    /// When every node is marked failed the first node is returned anyway; a stale failure set is
    /// more likely than a fully dead cluster.
    pub fn get_preferred_node(&self) -> Result<ServerNode, RavenDbError> {
        preferred_node(&self.state())
    }

    /// Deterministically maps a session to a node so one session keeps hitting the same node.
    pub fn get_node_by_session_id(&self, session_id: i32) -> Result<ServerNode, RavenDbError> {
        let state = self.state();
        let nodes = &state.topology.nodes;
        if nodes.is_empty() {
            return Err(empty_topology());
        }
        let node = &nodes[session_id.unsigned_abs() as usize % nodes.len()];
        if state.is_failed(node) {
            return preferred_node(&state);
        }
        Ok(node.clone())
    }

    /// Fastest healthy node, falling back to topology order on ties or without measurements.
    pub fn get_fastest_node(&self) -> Result<ServerNode, RavenDbError> {
        let state = self.state();
        let measured = state
            .topology
            .nodes
            .iter()
            .filter(|node| !state.is_failed(node))
            .filter_map(|node| state.speed_test_results.get(node).map(|latency| (node, *latency)))
            .collect::<Vec<_>>();

        let fastest = match measured.iter().map(|(_, latency)| *latency).min() {
            Some(fastest) => fastest,
            None => return preferred_node(&state),
        };

        measured
            .into_iter()
            .find(|(_, latency)| latency.saturating_sub(fastest) <= self.fastest_node_epsilon)
            .map(|(node, _)| node.clone())
            .map_or_else(|| preferred_node(&state), Ok)
    }

    pub fn get_requested_node(&self, cluster_tag: &str) -> Option<ServerNode> {
        self.state()
            .topology
            .nodes
            .iter()
            .find(|node| node.cluster_tag.eq_ignore_ascii_case(cluster_tag))
            .cloned()
    }

    /// Node for the first attempt of a command, according to the read balance behavior.
    pub fn choose_node(
        &self,
        is_read_request: bool,
        session_id: Option<i32>,
    ) -> Result<ServerNode, RavenDbError> {
        if !is_read_request {
            return self.get_preferred_node();
        }
        match self.read_balance_behavior() {
            ReadBalanceBehavior::None => self.get_preferred_node(),
            ReadBalanceBehavior::RoundRobin => match session_id {
                Some(session_id) => self.get_node_by_session_id(session_id),
                None => self.next_round_robin_node(),
            },
            ReadBalanceBehavior::FastestNode => self.get_fastest_node(),
        }
    }

    fn next_round_robin_node(&self) -> Result<ServerNode, RavenDbError> {
        let state = self.state();
        let nodes = &state.topology.nodes;
        if nodes.is_empty() {
            return Err(empty_topology());
        }
        let start = self.round_robin_counter.fetch_add(1, Ordering::Relaxed);
        (0..nodes.len())
            .map(|offset| &nodes[(start + offset) % nodes.len()])
            .find(|node| !state.is_failed(node))
            .cloned()
            .map_or_else(|| preferred_node(&state), Ok)
    }

    /// Picks the next node to try after a failure: the first healthy node not yet tried, then any
    /// node not yet tried.
    pub fn next_untried_node(&self, tried: &HashSet<ServerNode>) -> Option<ServerNode> {
        let state = self.state();
        let untried = state
            .topology
            .nodes
            .iter()
            .filter(|node| !tried.contains(*node))
            .collect::<Vec<_>>();
        untried
            .iter()
            .find(|node| !state.is_failed(node))
            .or_else(|| untried.first())
            .map(|node| (*node).clone())
    }

    /// Marks `node` failed. Returns `true` when that leaves no healthy node in the topology.
    pub fn on_failed_request(&self, node: &ServerNode) -> bool {
        self.update(|state| {
            if state.topology.nodes.contains(node) {
                state.failed_nodes.insert(node.clone());
            }
            state.all_failed()
        })
    }

    pub fn on_succeeded(&self, node: &ServerNode) {
        if self.is_failed(node) {
            self.update(|state| state.failed_nodes.remove(node));
        }
    }

    /// Puts a failed node back into rotation after a successful status check.
    pub fn restore_node(&self, node: &ServerNode) {
        if self.is_failed(node) {
            tracing::info!("Node {} is reachable again", node);
            self.on_succeeded(node);
        }
    }

    pub fn is_failed(&self, node: &ServerNode) -> bool {
        self.state.read().is_failed(node)
    }

    pub fn failed_nodes(&self) -> Vec<ServerNode> {
        let state = self.state();
        state
            .topology
            .nodes
            .iter()
            .filter(|node| state.is_failed(node))
            .cloned()
            .collect()
    }

    /// Replaces the topology when `topology` is newer, or unconditionally when `force_update`.
    ///
    /// The failure set starts over since the new topology may have healed nodes. Speed-test
    /// results survive for nodes that are still part of the topology.
    #[instrument(
        level = "debug",
        name = "Node Selector - Update Topology",
        skip(self, topology),
        fields(etag = topology.etag)
    )]
    pub fn on_update_topology(&self, topology: Topology, force_update: bool) -> bool {
        let mut guard = self.state.write();
        if !force_update && !topology.supersedes(&guard.topology) {
            tracing::debug!(
                "Ignoring topology with etag {}; current etag is {}",
                topology.etag,
                guard.topology.etag
            );
            return false;
        }

        let speed_test_results = guard
            .speed_test_results
            .iter()
            .filter(|(node, _)| topology.nodes.contains(node))
            .map(|(node, latency)| (node.clone(), *latency))
            .collect();

        *guard = Arc::new(NodeSelectorState {
            topology: Arc::new(topology),
            failed_nodes: HashSet::new(),
            speed_test_results,
            read_balance_behavior: guard.read_balance_behavior,
        });
        true
    }

    pub fn record_speed_test_results(&self, results: Vec<(ServerNode, Duration)>) {
        self.update(|state| {
            for (node, latency) in results {
                if state.topology.nodes.contains(&node) {
                    state.speed_test_results.insert(node, latency);
                }
            }
        });
    }

    /// Starts a background speed test unless one is already running.
    ///
    /// Does nothing unless the behavior is [`ReadBalanceBehavior::FastestNode`].
    pub fn schedule_speed_test<F, Fut>(self: &Arc<Self>, probe: F) -> bool
    where
        F: Fn(ServerNode) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), RavenDbError>> + Send + 'static,
    {
        if self.read_balance_behavior() != ReadBalanceBehavior::FastestNode {
            return false;
        }
        let mut slot = self.speed_test.lock();
        if slot.as_ref().map_or(false, |handle| !handle.is_finished()) {
            tracing::trace!("Speed test already running.");
            return false;
        }
        let selector = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            selector.run_speed_test(probe).await;
        }));
        true
    }

    /// Probes every healthy node concurrently and records how long each took.
    #[instrument(level = "debug", name = "Node Selector - Speed Test", skip_all)]
    pub async fn run_speed_test<F, Fut>(&self, probe: F)
    where
        F: Fn(ServerNode) -> Fut,
        Fut: Future<Output = Result<(), RavenDbError>>,
    {
        let state = self.state();
        let probes = state
            .topology
            .nodes
            .iter()
            .filter(|node| !state.is_failed(node))
            .map(|node| {
                let started = Instant::now();
                let probe = probe(node.clone());
                async move { (node.clone(), probe.await.map(|_| started.elapsed())) }
            });

        let mut results = Vec::new();
        for (node, outcome) in futures::future::join_all(probes).await {
            match outcome {
                Ok(latency) => {
                    tracing::trace!("Node {} answered in {:?}", node, latency);
                    results.push((node, latency));
                }
                Err(e) => tracing::debug!("Speed test against {} failed. Caused by: {}", node, e),
            }
        }
        self.record_speed_test_results(results);
    }

    pub fn cancel_speed_test(&self) {
        if let Some(handle) = self.speed_test.lock().take() {
            handle.abort();
        }
    }
}

fn preferred_node(state: &NodeSelectorState) -> Result<ServerNode, RavenDbError> {
    let nodes = &state.topology.nodes;
    nodes
        .iter()
        .find(|node| !state.is_failed(node))
        .or_else(|| nodes.first())
        .cloned()
        .ok_or_else(empty_topology)
}

fn empty_topology() -> RavenDbError {
    RavenDbError::InvalidTopology("The topology has no nodes".to_string())
}
