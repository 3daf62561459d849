use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
};

use anyhow::Context;
use reqwest::{Identity, Url};
use tracing::instrument;

use crate::{
    document_conventions::DocumentConventions, http_cache::HttpCache, ravendb_error::RavenDbError,
};

pub type DnsOverrides = HashMap<String, IpAddr>;

/// How the http client reaches the cluster.
#[derive(Clone, Debug, Default)]
pub struct TransportConfiguration {
    pub client_identity: Option<Identity>,
    pub dns_overrides: Option<DnsOverrides>,
    pub proxy_address: Option<String>,
}

/// Everything a [`RequestExecutor`](super::RequestExecutor) needs to start.
#[derive(Clone, Debug)]
pub struct RequestExecutorConfiguration {
    /// Seed urls used to fetch the first topology.
    pub initial_urls: Vec<Url>,
    /// `None` for a server-wide executor.
    pub database: Option<String>,
    pub conventions: DocumentConventions,
    pub cache: HttpCache,
    pub transport: TransportConfiguration,
}

impl RequestExecutorConfiguration {
    pub fn new(initial_urls: Vec<Url>, database: Option<String>) -> Self {
        Self {
            initial_urls,
            database,
            conventions: DocumentConventions::default(),
            cache: HttpCache::new(),
            transport: TransportConfiguration::default(),
        }
    }

    pub fn with_conventions(mut self, conventions: DocumentConventions) -> Self {
        self.conventions = conventions;
        self
    }

    pub fn with_cache(mut self, cache: HttpCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_transport(mut self, transport: TransportConfiguration) -> Self {
        self.transport = transport;
        self
    }
}

/// Builds the one http client an executor uses for its whole life. The client keeps a
/// connection pool, so it must not be rebuilt per request.
#[instrument(level = "debug", skip_all)]
pub(crate) fn build_http_client(
    transport: &TransportConfiguration,
    conventions: &DocumentConventions,
) -> Result<reqwest::Client, RavenDbError> {
    let mut client = reqwest::Client::builder();

    if let Some(identity) = transport.client_identity.clone() {
        client = client.identity(identity).use_rustls_tls();
    }

    // Convert Option<HashMap<String, IpAddr>> into HashMap<String,SocketAddr>
    let overrides = transport
        .dns_overrides
        .clone()
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, SocketAddr::new(v, 0)))
        .collect::<HashMap<String, SocketAddr>>();

    for (domain, address) in overrides {
        tracing::trace!("Adding `{}->{}` to dns overrides.", domain, address);
        client = client.resolve(domain.as_str(), address);
    }

    if let Some(proxy) = &transport.proxy_address {
        tracing::trace!("Proxy set to `{}`", proxy);
        client = client.proxy(reqwest::Proxy::http(proxy).context("Invalid proxy address")?);
    } else {
        tracing::trace!("No proxy defined. Using system settings.");
    }

    if !conventions.use_compression() {
        client = client.no_gzip();
    }

    Ok(client.build().context("Unable to build the http client")?)
}
