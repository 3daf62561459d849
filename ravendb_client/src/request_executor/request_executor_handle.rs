use std::{
    collections::HashSet,
    sync::{atomic::Ordering, Arc},
};

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    document_conventions::DocumentConventions, events::RequestEvent, http_cache::HttpCache,
    node_selector::NodeSelector, raven_command::RavenCommand, ravendb_error::RavenDbError,
    server_node::ServerNode, topology::Topology,
};

use super::{
    request_executor_actor::{run_request_executor_actor, RequestExecutorActor},
    request_executor_configuration::build_http_client,
    request_executor_error::AttemptError,
    request_executor_state::ExecutorState,
    ExecuteOptions, RequestExecutorConfiguration, RequestExecutorMessage,
};

/**
Sends [`RavenCommand`]s to the nodes of a cluster.

The executor downloads the topology of its database on first use, routes every command to a node
picked by its [`NodeSelector`], and fails over to the remaining nodes when a node cannot be
reached. Responses to cacheable reads are kept in an [`HttpCache`] and revalidated with
conditional requests.

Cloning this handle is cheap. All clones share the same topology, cache and background actor.
The actor stops when [`dispose`](RequestExecutor::dispose) is called or the last handle is
dropped.

```rust,no_run
# tokio_test::block_on(async {
use ravendb_client::{GetDocumentsCommand, RequestExecutor, RequestExecutorConfiguration};
use reqwest::Url;

let configuration = RequestExecutorConfiguration::new(
    vec![Url::parse("http://localhost:8080").unwrap()],
    Some("Northwind".to_string()),
);
let executor = RequestExecutor::create(configuration).await.unwrap();
let documents = executor
    .execute(&GetDocumentsCommand::by_id("Northwind", "employees/1-A"))
    .await
    .unwrap();
println!("{:?}", documents);
executor.dispose().await;
# })
```
*/
#[derive(Clone, Debug)]
pub struct RequestExecutor {
    state: Arc<ExecutorState>,
}

impl RequestExecutor {
    /// Starts an executor without contacting the cluster. The first topology is downloaded by
    /// the first [`execute`](RequestExecutor::execute).
    ///
    /// Must be called from within a tokio runtime.
    #[instrument(
        level = "debug",
        name = "Request Executor - New",
        skip_all,
        fields(database = ?configuration.database)
    )]
    pub fn new(configuration: RequestExecutorConfiguration) -> Result<Self, RavenDbError> {
        if configuration.initial_urls.is_empty() {
            return Err(RavenDbError::InvalidOperation(
                "A request executor needs at least one url".to_string(),
            ));
        }

        let http_client = build_http_client(&configuration.transport, &configuration.conventions)?;
        let conventions = configuration.conventions.clone();
        let (sender, receiver) = mpsc::channel(8);
        let state = Arc::new(ExecutorState::new(configuration, http_client, sender));

        let actor = RequestExecutorActor::new(Arc::downgrade(&state), receiver);
        tokio::spawn(run_request_executor_actor(actor, conventions));

        Ok(Self { state })
    }

    /// Executor bound to the first url only. Its topology is that single node and is never
    /// refreshed.
    pub fn new_for_single_node(
        mut configuration: RequestExecutorConfiguration,
    ) -> Result<Self, RavenDbError> {
        configuration.initial_urls.truncate(1);
        configuration.conventions = configuration.conventions.set_disable_topology_updates(true);
        Self::new(configuration)
    }

    /// Starts an executor and waits for the first topology.
    #[instrument(level = "debug", name = "Request Executor - Create", skip_all)]
    pub async fn create(configuration: RequestExecutorConfiguration) -> Result<Self, RavenDbError> {
        let executor = Self::new(configuration)?;
        executor.state.node_selector().await?;
        Ok(executor)
    }

    pub async fn execute<C: RavenCommand>(&self, command: &C) -> Result<C::Output, RavenDbError> {
        self.execute_with_options(command, ExecuteOptions::default())
            .await
    }

    /// Runs `command` against the cluster, failing over to every node of the topology at most
    /// once.
    #[instrument(
        level = "debug",
        name = "Request Executor - Execute",
        skip_all,
        fields(database = ?self.state.database)
    )]
    pub async fn execute_with_options<C: RavenCommand>(
        &self,
        command: &C,
        options: ExecuteOptions,
    ) -> Result<C::Output, RavenDbError> {
        self.state.ensure_not_disposed()?;
        let selector = self.state.node_selector().await?;
        self.state.ensure_not_disposed()?;

        let attempt_budget = selector.topology().nodes.len();
        let mut node = selector.choose_node(command.is_read_request(), options.session_id)?;
        let mut tried = HashSet::new();

        let last_error = loop {
            tried.insert(node.clone());
            let error = match self.state.dispatch(command, &node, &options).await {
                Ok(output) => {
                    if !self.state.is_disposed() {
                        selector.on_succeeded(&node);
                    }
                    return Ok(output);
                }
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Retryable(e)) => e,
            };

            tracing::warn!("Request to {} failed. Caused by: {}", node, error);
            if !self.state.is_disposed() && selector.on_failed_request(&node) {
                // A stale topology is the usual reason every node fails.
                tracing::warn!("Every node of the topology is marked failed");
                self.state.trigger(RequestExecutorMessage::UpdateTopology {
                    force_update: false,
                });
            }

            if tried.len() >= attempt_budget {
                break error;
            }
            node = match selector.next_untried_node(&tried) {
                Some(next) => next,
                None => break error,
            };
            tracing::debug!("Failing over to {}", node);
        };

        Err(RavenDbError::AllTopologyNodesDown {
            message: format!(
                "Tried to send the request to {} node(s) of the topology and none of them responded",
                tried.len()
            ),
            last_error: Some(Box::new(last_error)),
        })
    }

    /// Downloads the topology from `node` and swaps it in when it is newer, or unconditionally
    /// with `force_update`.
    #[instrument(level = "debug", name = "Request Executor - Update Topology", skip(self))]
    pub async fn update_topology(
        &self,
        node: &ServerNode,
        force_update: bool,
    ) -> Result<bool, RavenDbError> {
        self.state.node_selector().await?;
        self.state.update_topology(node, force_update).await
    }

    /// Current best node for writes. Downloads the first topology if needed.
    pub async fn get_preferred_node(&self) -> Result<ServerNode, RavenDbError> {
        self.state.ensure_not_disposed()?;
        self.state.node_selector().await?.get_preferred_node()
    }

    pub fn cache(&self) -> HttpCache {
        self.state.cache.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<RequestEvent> {
        self.state.events.subscribe()
    }

    /// `None` until the first topology has been downloaded.
    pub fn node_selector(&self) -> Option<Arc<NodeSelector>> {
        self.state.node_selector.get().cloned()
    }

    pub fn topology(&self) -> Option<Arc<Topology>> {
        self.node_selector().map(|selector| selector.topology())
    }

    pub fn topology_etag(&self) -> Option<i64> {
        self.topology().map(|topology| topology.etag)
    }

    /// The node the current topology was downloaded from.
    pub fn topology_taken_from_node(&self) -> Option<ServerNode> {
        self.state.topology_taken_from_node.lock().clone()
    }

    pub fn database(&self) -> Option<&str> {
        self.state.database.as_deref()
    }

    pub fn conventions(&self) -> &DocumentConventions {
        &self.state.conventions
    }

    pub fn application_id(&self) -> Uuid {
        self.state.application_id
    }

    pub fn client_configuration_etag(&self) -> i64 {
        self.state.client_configuration_etag.load(Ordering::Acquire)
    }

    pub fn is_disposed(&self) -> bool {
        self.state.is_disposed()
    }

    /// Stops background work and clears the cache. Later calls to
    /// [`execute`](RequestExecutor::execute) fail without touching the network.
    ///
    /// Requests already in flight run to completion. Calling this more than once is harmless.
    #[instrument(level = "debug", name = "Request Executor - Dispose", skip(self))]
    pub async fn dispose(&self) {
        if self.state.disposed.swap(true, Ordering::AcqRel) {
            tracing::trace!("Request executor already disposed");
            return;
        }

        if let Some(selector) = self.state.node_selector.get() {
            selector.cancel_speed_test();
        }
        self.state.cache.clear();

        let (tx, rx) = oneshot::channel();
        if self
            .state
            .send_to_actor(RequestExecutorMessage::Dispose { respond_to: tx })
            .await
        {
            let _ = rx.await;
        }
        tracing::debug!("Request executor disposed");
    }
}
