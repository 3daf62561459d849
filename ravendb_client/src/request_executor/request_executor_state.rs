//! State shared by a [`RequestExecutor`](super::RequestExecutor) handle and its background actor.
//!
//! Holds the first-topology bootstrap, topology and client-configuration refreshes, and the
//! single-attempt request pipeline. Failover across nodes lives in the handle; everything here
//! talks to one node at a time.
use std::sync::{
    atomic::{AtomicBool, AtomicI64, Ordering},
    Arc,
};

use anyhow::Context;
use parking_lot::Mutex;
use reqwest::{
    header::{HeaderMap, CONTENT_ENCODING, CONTENT_TYPE, IF_NONE_MATCH},
    Method, StatusCode, Url,
};
use tokio::sync::{mpsc, OnceCell};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    constants::{
        CLIENT_CONFIGURATION_ETAG_HEADER, CLIENT_VERSION, CLIENT_VERSION_HEADER,
        DATABASE_MISSING_HEADER, REFRESH_CLIENT_CONFIGURATION_HEADER, REFRESH_TOPOLOGY_HEADER,
        TOPOLOGY_ETAG_HEADER,
    },
    document_conventions::DocumentConventions,
    events::{RequestEvent, RequestEventPublisher},
    exception_dispatcher,
    header_utils::{get_boolean_header, get_etag_header, get_i64_header, quote_change_vector},
    http_cache::{CachedResponse, HttpCache},
    node_selector::{NodeSelector, ReadBalanceBehavior},
    raven_command::{
        CommandRequest, GetClientConfigurationCommand, GetClusterTopologyCommand,
        GetDatabaseTopologyCommand, RavenCommand,
    },
    ravendb_error::RavenDbError,
    server_node::ServerNode,
    topology::Topology,
};

use super::{
    request_executor_error::AttemptError, ExecuteOptions, RequestExecutorConfiguration,
    RequestExecutorMessage,
};

#[derive(Debug)]
pub(crate) struct ExecutorState {
    pub(crate) database: Option<String>,
    pub(crate) initial_urls: Vec<Url>,
    pub(crate) conventions: DocumentConventions,
    /// Allows the server to warn if executors are being recreated too many times instead of
    /// once per application. Never changes after construction.
    pub(crate) application_id: Uuid,
    /// Maintains an internal connection pool; reused for the life of the executor.
    pub(crate) http_client: reqwest::Client,
    pub(crate) cache: HttpCache,
    pub(crate) events: RequestEventPublisher,
    /// Set by the first successful bootstrap. A failed bootstrap leaves it empty so the next
    /// caller retries.
    pub(crate) node_selector: OnceCell<Arc<NodeSelector>>,
    pub(crate) disposed: AtomicBool,
    pub(crate) client_configuration_etag: AtomicI64,
    /// The node the current topology was downloaded from.
    pub(crate) topology_taken_from_node: Mutex<Option<ServerNode>>,
    sender: mpsc::Sender<RequestExecutorMessage>,
}

impl ExecutorState {
    pub(crate) fn new(
        configuration: RequestExecutorConfiguration,
        http_client: reqwest::Client,
        sender: mpsc::Sender<RequestExecutorMessage>,
    ) -> Self {
        Self {
            database: configuration.database,
            initial_urls: configuration.initial_urls,
            conventions: configuration.conventions,
            application_id: Uuid::new_v4(),
            http_client,
            cache: configuration.cache,
            events: RequestEventPublisher::new(),
            node_selector: OnceCell::new(),
            disposed: AtomicBool::new(false),
            client_configuration_etag: AtomicI64::new(0),
            topology_taken_from_node: Mutex::new(None),
            sender,
        }
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_not_disposed(&self) -> Result<(), RavenDbError> {
        if self.is_disposed() {
            return Err(RavenDbError::InvalidOperation(
                "The request executor has been disposed".to_string(),
            ));
        }
        Ok(())
    }

    /// Queues background work without waiting. A full mailbox already has work pending.
    pub(crate) fn trigger(&self, message: RequestExecutorMessage) {
        if self.is_disposed() {
            return;
        }
        if let Err(e) = self.sender.try_send(message) {
            tracing::trace!("Background work not queued: {}", e);
        }
    }

    pub(crate) async fn send_to_actor(&self, message: RequestExecutorMessage) -> bool {
        self.sender.send(message).await.is_ok()
    }

    /// The node selector, bootstrapping the first topology if no caller has done so yet.
    pub(crate) async fn node_selector(&self) -> Result<Arc<NodeSelector>, RavenDbError> {
        if let Some(selector) = self.node_selector.get() {
            return Ok(Arc::clone(selector));
        }
        let selector = self
            .node_selector
            .get_or_try_init(|| self.first_topology_update())
            .await
            .map(Arc::clone)?;
        // Fastest-node reads need latencies before the first speed-test tick.
        self.request_speed_test(&selector);
        Ok(selector)
    }

    fn request_speed_test(&self, selector: &NodeSelector) {
        if selector.read_balance_behavior() == ReadBalanceBehavior::FastestNode {
            self.trigger(RequestExecutorMessage::SpeedTest);
        }
    }

    fn new_selector(&self, topology: Topology) -> NodeSelector {
        NodeSelector::new(
            topology,
            self.conventions.read_balance_behavior(),
            self.conventions.fastest_node_epsilon(),
        )
    }

    #[instrument(
        level = "debug",
        name = "Request Executor - First Topology Update",
        skip(self),
        fields(database = ?self.database)
    )]
    async fn first_topology_update(&self) -> Result<Arc<NodeSelector>, RavenDbError> {
        if self.conventions.disable_topology_updates() {
            let nodes = self
                .initial_urls
                .iter()
                .take(1)
                .map(|url| ServerNode::from_seed_url(url.clone(), self.database.clone()))
                .collect::<Vec<_>>();
            tracing::debug!("Topology updates are disabled. Using the seed node as the topology.");
            return Ok(Arc::new(self.new_selector(Topology::new(-1, nodes))));
        }

        let mut errors = Vec::new();
        for url in &self.initial_urls {
            let node = ServerNode::from_seed_url(url.clone(), self.database.clone());
            match self.fetch_topology(&node).await {
                Ok(topology) => {
                    // Yay, the topology is updated, return early
                    tracing::info!("Initial topology update complete. Etag: {}", topology.etag);
                    self.events.publish(RequestEvent::TopologyUpdated {
                        database: self.database.clone(),
                        etag: topology.etag,
                    });
                    *self.topology_taken_from_node.lock() = Some(node);
                    return Ok(Arc::new(self.new_selector(topology)));
                }
                Err(e) => {
                    tracing::warn!("Failed to fetch the topology from `{}`. Caused by: {}", url, e);
                    errors.push((url.clone(), e));
                }
            }
        }

        // Another seed is not going to know about a database the cluster reports missing.
        if let Some(position) = errors
            .iter()
            .position(|(_, e)| matches!(e, RavenDbError::DatabaseDoesNotExist(_)))
        {
            return Err(errors.swap_remove(position).1);
        }

        let details = errors
            .iter()
            .map(|(url, e)| format!("`{}`: {}", url, e))
            .collect::<Vec<_>>()
            .join(", ");
        Err(RavenDbError::AllTopologyNodesDown {
            message: format!(
                "Failed to retrieve the topology from all known nodes [{}]",
                details
            ),
            last_error: errors.pop().map(|(_, e)| Box::new(e)),
        })
    }

    /// Downloads and validates the topology `node` reports.
    #[instrument(
        level = "debug",
        name = "Request Executor - Fetch Topology",
        skip(self, node),
        fields(node = %node)
    )]
    pub(crate) async fn fetch_topology(&self, node: &ServerNode) -> Result<Topology, RavenDbError> {
        let options = ExecuteOptions::default();
        let topology = match &self.database {
            Some(database) => {
                let mut command = GetDatabaseTopologyCommand::new(database);
                if self.conventions.send_application_identifier() {
                    command = command.with_application_identifier(self.application_id);
                }
                self.dispatch(&command, node, &options)
                    .await
                    .map_err(AttemptError::into_inner)?
            }
            None => self
                .dispatch(&GetClusterTopologyCommand, node, &options)
                .await
                .map_err(AttemptError::into_inner)?
                .to_server_topology(),
        };

        if topology.nodes.is_empty() {
            return Err(RavenDbError::InvalidTopology(format!(
                "`{}` returned a topology without nodes",
                node.url
            )));
        }
        if let Some(foreign) = topology.find_foreign_node(self.database.as_deref()) {
            return Err(RavenDbError::InvalidTopology(format!(
                "`{}` returned node {} which serves database `{}`",
                node.url,
                foreign,
                foreign.database.as_deref().unwrap_or_default()
            )));
        }
        Ok(topology)
    }

    /// Downloads the topology from `node` and offers it to the node selector.
    ///
    /// Returns whether the selector took the new topology.
    pub(crate) async fn update_topology(
        &self,
        node: &ServerNode,
        force_update: bool,
    ) -> Result<bool, RavenDbError> {
        self.ensure_not_disposed()?;
        let topology = self.fetch_topology(node).await?;

        let selector = match self.node_selector.get() {
            Some(selector) => selector,
            None => return Ok(false),
        };
        // Disposed while the download was in flight.
        if self.is_disposed() {
            return Ok(false);
        }

        let etag = topology.etag;
        let updated = selector.on_update_topology(topology, force_update);
        if updated {
            tracing::info!("Topology updated to etag {} from {}", etag, node);
            *self.topology_taken_from_node.lock() = Some(node.clone());
            self.events.publish(RequestEvent::TopologyUpdated {
                database: self.database.clone(),
                etag,
            });
        }
        Ok(updated)
    }

    /// Refreshes the topology from the first node that answers: healthy nodes first, then
    /// failed ones, then seed urls the current topology no longer lists.
    #[instrument(level = "debug", name = "Request Executor - Refresh Topology", skip(self))]
    pub(crate) async fn refresh_topology(&self, force_update: bool) -> Result<bool, RavenDbError> {
        let selector = match self.node_selector.get() {
            Some(selector) => Arc::clone(selector),
            None => return Ok(false),
        };
        let state = selector.state();
        let (healthy, failed): (Vec<_>, Vec<_>) = state
            .topology
            .nodes
            .iter()
            .cloned()
            .partition(|node| !state.failed_nodes.contains(node));
        let seeds = self
            .initial_urls
            .iter()
            .map(|url| ServerNode::from_seed_url(url.clone(), self.database.clone()))
            .filter(|seed| !state.topology.nodes.contains(seed))
            .collect::<Vec<_>>();

        let mut last_error = None;
        for node in healthy.into_iter().chain(failed).chain(seeds) {
            if self.is_disposed() {
                return Ok(false);
            }
            match self.update_topology(&node, force_update).await {
                Ok(updated) => return Ok(updated),
                Err(e) => {
                    tracing::debug!("Topology refresh from {} failed. Caused by: {}", node, e);
                    last_error = Some(e);
                }
            }
        }

        Err(RavenDbError::AllTopologyNodesDown {
            message: "Failed to refresh the topology from any known node".to_string(),
            last_error: last_error.map(Box::new),
        })
    }

    /// Fetches the client configuration the server holds for this database. A server-side read
    /// balance behavior wins over the local one until the server disables it.
    #[instrument(
        level = "debug",
        name = "Request Executor - Update Client Configuration",
        skip(self)
    )]
    pub(crate) async fn update_client_configuration(&self) -> Result<(), RavenDbError> {
        let database = match &self.database {
            Some(database) => database,
            None => return Ok(()),
        };
        let selector = match self.node_selector.get() {
            Some(selector) => Arc::clone(selector),
            None => return Ok(()),
        };

        let node = selector.get_preferred_node()?;
        let result = self
            .dispatch(
                &GetClientConfigurationCommand::new(database),
                &node,
                &ExecuteOptions::default(),
            )
            .await
            .map_err(AttemptError::into_inner)?;
        if self.is_disposed() {
            return Ok(());
        }

        self.client_configuration_etag
            .store(result.etag, Ordering::Release);
        let behavior = result
            .configuration
            .filter(|configuration| !configuration.disabled)
            .and_then(|configuration| configuration.read_balance_behavior)
            .unwrap_or_else(|| self.conventions.read_balance_behavior());
        selector.set_read_balance_behavior(behavior);
        self.request_speed_test(&selector);
        Ok(())
    }

    /// Lightweight request used to time a node or to see whether a failed node is back.
    pub(crate) async fn probe_node(&self, node: &ServerNode) -> Result<(), RavenDbError> {
        self.fetch_topology(node).await.map(|_| ())
    }

    /// Sends one attempt of `command` to `node`.
    #[instrument(
        level = "debug",
        name = "Request Executor - Dispatch",
        skip_all,
        fields(node = %node)
    )]
    pub(crate) async fn dispatch<C: RavenCommand>(
        &self,
        command: &C,
        node: &ServerNode,
        options: &ExecuteOptions,
    ) -> Result<C::Output, AttemptError> {
        let request = command.create_request(node)?;
        let url = request.url.to_string();

        let result = self.send(command, request, &url, options).await;
        if let Err(e) = &result {
            self.events.publish(RequestEvent::FailedRequest {
                database: self.database.clone(),
                url,
                error: e.inner().to_string(),
            });
        }
        result
    }

    async fn send<C: RavenCommand>(
        &self,
        command: &C,
        request: CommandRequest,
        url: &str,
        options: &ExecuteOptions,
    ) -> Result<C::Output, AttemptError> {
        let cacheable =
            command.is_read_request() && command.can_cache() && request.method == Method::GET;
        let cached = if cacheable { self.cache.get(url) } else { None };

        if let (Some(cached), Some(max_age)) = (&cached, options.aggressive_cache) {
            if command.can_cache_aggressively() && cached.age < max_age {
                tracing::trace!("Serving `{}` from the aggressive cache", url);
                return Ok(command.parse_response(Some(&cached.payload[..]), true)?);
            }
        }

        let timeout = options
            .timeout
            .or_else(|| command.timeout())
            .unwrap_or_else(|| self.conventions.request_timeout());
        let deadline = tokio::time::Instant::now() + timeout;
        let http_request = self.build_http_request(request, cached.as_ref())?;

        self.events.publish(RequestEvent::BeforeRequest {
            database: self.database.clone(),
            url: url.to_string(),
        });
        tracing::debug!("Sending {} `{}`", http_request.method(), url);

        let response =
            match tokio::time::timeout_at(deadline, self.http_client.execute(http_request)).await {
                Ok(Ok(response)) => response,
                Ok(Err(source)) => return Err(transport_failure(url, source)),
                Err(_) => return Err(timed_out(url, timeout)),
            };

        let status = response.status();
        let headers = response.headers().clone();
        tracing::trace!("`{}` answered {}", url, status);
        self.inspect_response_headers(&headers);

        if status == StatusCode::NOT_MODIFIED {
            let cached = cached.ok_or_else(|| {
                RavenDbError::InvalidResponse(format!(
                    "`{}` answered 304 to a request that was not conditional",
                    url
                ))
            })?;
            if !self.is_disposed() {
                self.cache.set_not_modified(url);
            }
            self.publish_success(url, status);
            return Ok(command.parse_response(Some(&cached.payload[..]), true)?);
        }

        let body = match tokio::time::timeout_at(deadline, response.bytes()).await {
            Ok(Ok(body)) => body,
            Ok(Err(source)) => return Err(transport_failure(url, source)),
            Err(_) => return Err(timed_out(url, timeout)),
        };

        if status.is_success() {
            if cacheable && !self.is_disposed() {
                if let Some(change_vector) = get_etag_header(&headers) {
                    self.cache.set(url, &change_vector, body.clone());
                }
            }
            self.publish_success(url, status);
            return Ok(command.parse_response(Some(&body[..]), false)?);
        }

        match status {
            StatusCode::NOT_FOUND if command.accepts_not_found() => {
                self.publish_success(url, status);
                Ok(command.parse_response(None, false)?)
            }
            StatusCode::SERVICE_UNAVAILABLE if headers.contains_key(DATABASE_MISSING_HEADER) => {
                let database = headers
                    .get(DATABASE_MISSING_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .filter(|value| !value.is_empty())
                    .map(str::to_string)
                    .or_else(|| self.database.clone())
                    .unwrap_or_default();
                Err(AttemptError::Fatal(RavenDbError::DatabaseDoesNotExist(
                    database,
                )))
            }
            StatusCode::REQUEST_TIMEOUT | StatusCode::SERVICE_UNAVAILABLE => {
                Err(AttemptError::Retryable(RavenDbError::NodeUnavailable {
                    url: url.to_string(),
                    status: status.as_u16(),
                }))
            }
            _ => Err(AttemptError::Fatal(exception_dispatcher::throw(
                status.as_u16(),
                &body,
            ))),
        }
    }

    fn build_http_request(
        &self,
        request: CommandRequest,
        cached: Option<&CachedResponse>,
    ) -> Result<reqwest::Request, RavenDbError> {
        let mut builder = self
            .http_client
            .request(request.method, request.url)
            .headers(request.headers)
            .header(CLIENT_VERSION_HEADER, CLIENT_VERSION)
            .header(
                CLIENT_CONFIGURATION_ETAG_HEADER,
                format!(
                    "\"{}\"",
                    self.client_configuration_etag.load(Ordering::Acquire)
                ),
            );

        if let Some(selector) = self.node_selector.get() {
            builder = builder.header(
                TOPOLOGY_ETAG_HEADER,
                format!("\"{}\"", selector.topology().etag),
            );
        }

        if let Some(cached) = cached {
            builder = builder.header(IF_NONE_MATCH, quote_change_vector(&cached.change_vector));
        }

        if let Some(body) = request.body {
            builder = builder.header(CONTENT_TYPE, "application/json");
            builder = match self.conventions.request_compression() {
                Some(algorithm) => {
                    let compressed = algorithm
                        .compress(&body)
                        .context("Failed to compress the request body")?;
                    builder
                        .header(CONTENT_ENCODING, algorithm.content_encoding())
                        .body(compressed)
                }
                None => builder.body(body),
            };
        }

        Ok(builder.build().context("Failed to build the http request")?)
    }

    /// Reacts to the refresh hints the server piggybacks on every response.
    fn inspect_response_headers(&self, headers: &HeaderMap) {
        let selector = match self.node_selector.get() {
            Some(selector) => selector,
            None => return,
        };

        if !self.conventions.disable_topology_updates() {
            let refresh_requested =
                get_boolean_header(headers, REFRESH_TOPOLOGY_HEADER).unwrap_or(false);
            let newer_topology = get_i64_header(headers, TOPOLOGY_ETAG_HEADER)
                .map_or(false, |etag| etag > selector.topology().etag);
            if refresh_requested || newer_topology {
                tracing::debug!("Server reported a newer topology");
                self.trigger(RequestExecutorMessage::UpdateTopology {
                    force_update: false,
                });
            }
        }

        if get_boolean_header(headers, REFRESH_CLIENT_CONFIGURATION_HEADER).unwrap_or(false) {
            tracing::debug!("Server reported a newer client configuration");
            self.trigger(RequestExecutorMessage::UpdateClientConfiguration);
        }
    }

    fn publish_success(&self, url: &str, status: StatusCode) {
        self.events.publish(RequestEvent::SucceedRequest {
            database: self.database.clone(),
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
}

fn transport_failure(url: &str, source: reqwest::Error) -> AttemptError {
    AttemptError::Retryable(RavenDbError::Transport {
        url: url.to_string(),
        source,
    })
}

fn timed_out(url: &str, timeout: std::time::Duration) -> AttemptError {
    AttemptError::Retryable(RavenDbError::RequestTimeout {
        url: url.to_string(),
        timeout,
    })
}
