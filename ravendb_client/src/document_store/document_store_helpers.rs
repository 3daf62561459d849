use reqwest::Url;
use tokio::sync::oneshot;

use crate::{
    document_conventions::DocumentConventions, request_executor::DnsOverrides, DocumentStoreError,
    RequestExecutor,
};

#[derive(Debug)]
pub enum DocumentStoreMessage {
    /// Hands out the executor for a database, creating it on first request.
    GetRequestExecutor {
        database_name: Option<String>,
        respond_to: oneshot::Sender<Result<RequestExecutor, DocumentStoreError>>,
    },
    /// Hands out the executor that talks to the cluster rather than to a database.
    GetServerExecutor {
        respond_to: oneshot::Sender<Result<RequestExecutor, DocumentStoreError>>,
    },
    GetDatabase {
        respond_to: oneshot::Sender<Option<String>>,
    },
    /// Disposes every executor the store created.
    Close { respond_to: oneshot::Sender<()> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentStoreState {
    /// [`DocumentStore`](crate::DocumentStore) was initialized but has since been closed.
    Closed,

    /// [`DocumentStore`](crate::DocumentStore) is initialized.
    Initialized,
}

/// Everything the builder validated, handed to the actor.
#[derive(Debug)]
pub struct DocumentStoreInitialConfiguration {
    pub(crate) client_identity: Option<reqwest::Identity>,
    pub(crate) conventions: DocumentConventions,
    pub(crate) database_name: Option<String>,
    pub(crate) dns_overrides: Option<DnsOverrides>,
    pub(crate) initial_urls: Vec<Url>,
    pub(crate) proxy_address: Option<String>,
}
