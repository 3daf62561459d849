//! The raven commands are the only way to directly interact with the server.
//!
//! A command knows how to build its HTTP request for a given node and how to turn the response
//! body into its output. Everything else (node choice, caching, retries, error translation) is
//! the [`RequestExecutor`](crate::RequestExecutor)'s job, so commands hold no executor state and
//! can be executed once or many times.
//!
//! Common things all commands need:
//! * path to REST endpoint, relative to the node
//! * HTTP Method
//! * Body/payload
//! * headers
//! * whether it reads, and whether its responses may be cached
use std::time::Duration;

use anyhow::anyhow;
use reqwest::{header::HeaderMap, Method, Url};

use crate::{ravendb_error::RavenDbError, server_node::ServerNode};

mod delete_document;
mod get_client_configuration;
mod get_cluster_topology;
mod get_database_topology;
mod get_documents;
mod put_document;

pub use delete_document::*;
pub use get_client_configuration::*;
pub use get_cluster_topology::*;
pub use get_database_topology::*;
pub use get_documents::*;
pub use put_document::*;

pub trait RavenCommand: Send + Sync {
    type Output: Send;

    /// Builds the request for `node`.
    fn create_request(&self, node: &ServerNode) -> Result<CommandRequest, RavenDbError>;

    /// Reads may be balanced across nodes; writes always go to the preferred node.
    fn is_read_request(&self) -> bool;

    /// Whether successful responses may be stored in, and revalidated from, the http cache.
    fn can_cache(&self) -> bool {
        false
    }

    /// Whether a fresh cached response may be returned without asking the server at all.
    fn can_cache_aggressively(&self) -> bool {
        true
    }

    /// Whether `404` is an expected answer, reported to
    /// [`parse_response`](RavenCommand::parse_response)
    /// as a missing body instead of an error.
    fn accepts_not_found(&self) -> bool {
        false
    }

    /// Overrides the executor's request timeout.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Turns the response body into the command output. `body` is `None` for an accepted `404`.
    /// `from_cache` is set when the body comes from the http cache rather than the network.
    fn parse_response(
        &self,
        body: Option<&[u8]>,
        from_cache: bool,
    ) -> Result<Self::Output, RavenDbError>;
}

/// Everything needed to send a command to one node.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl CommandRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn with_json_body(mut self, body: &serde_json::Value) -> Result<Self, RavenDbError> {
        self.body = Some(
            serde_json::to_vec(body)
                .map_err(|e| anyhow!("Unable to serialize request body. Caused by: {}", e))?,
        );
        Ok(self)
    }
}

/// Appends `segments` to the node url, percent-encoding each one.
pub fn node_url(node: &ServerNode, segments: &[&str]) -> Result<Url, RavenDbError> {
    let mut url = node.url.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow!("Node url `{}` cannot be a base url", node.url))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Url of `segments` under `/databases/{database}` on `node`.
pub fn database_url(
    node: &ServerNode,
    database: &str,
    segments: &[&str],
) -> Result<Url, RavenDbError> {
    let mut all = vec!["databases", database];
    all.extend_from_slice(segments);
    node_url(node, &all)
}

/// Deserializes a JSON response body. A missing body is an invalid response.
pub fn parse_json<T: serde::de::DeserializeOwned>(
    body: Option<&[u8]>,
) -> Result<T, RavenDbError> {
    let body =
        body.ok_or_else(|| RavenDbError::InvalidResponse("Response had no body".to_string()))?;
    serde_json::from_slice(body).map_err(|e| RavenDbError::InvalidResponse(e.to_string()))
}
