use std::collections::HashMap;

use reqwest::Url;
use tokio::sync::mpsc;
use tracing::{instrument, Span};
use uuid::Uuid;

use crate::{
    document_conventions::DocumentConventions,
    http_cache::HttpCache,
    request_executor::{
        DnsOverrides, RequestExecutor, RequestExecutorConfiguration, TransportConfiguration,
    },
    DocumentStoreError, DocumentStoreInitialConfiguration, DocumentStoreMessage,
    DocumentStoreState,
};

pub struct DocumentStoreActor {
    client_identity: Option<reqwest::Identity>,
    conventions: DocumentConventions,
    database_name: Option<String>,
    dns_overrides: Option<DnsOverrides>,
    initial_urls: Vec<Url>,
    proxy_address: Option<String>,
    receiver: mpsc::Receiver<DocumentStoreMessage>,
    /// One executor per database, each with its own cache.
    request_executors: HashMap<String, RequestExecutor>,
    server_executor: Option<RequestExecutor>,
    state: DocumentStoreState,
}

impl DocumentStoreActor {
    pub fn new(
        receiver: mpsc::Receiver<DocumentStoreMessage>,
        initial_config: DocumentStoreInitialConfiguration,
    ) -> Self {
        Self {
            client_identity: initial_config.client_identity,
            conventions: initial_config.conventions,
            database_name: initial_config.database_name,
            dns_overrides: initial_config.dns_overrides,
            initial_urls: initial_config.initial_urls,
            proxy_address: initial_config.proxy_address,
            receiver,
            request_executors: HashMap::default(),
            server_executor: None,
            state: DocumentStoreState::Initialized,
        }
    }

    /// Message handler for the DocumentStoreActor
    #[instrument(
        level = "debug",
        name = "DocumentStore Actor - Handle Message",
        skip(self),
        fields(correlation_id)
    )]
    async fn handle_message(&mut self, msg: DocumentStoreMessage) {
        // Apply a correlation id to all child spans of this message handler
        Span::current().record("correlation_id", Uuid::new_v4().to_string());
        match msg {
            DocumentStoreMessage::GetRequestExecutor {
                database_name,
                respond_to,
            } => {
                let result = self.get_request_executor(database_name);
                let _ = respond_to.send(result);
            }
            DocumentStoreMessage::GetServerExecutor { respond_to } => {
                let result = self.get_server_executor();
                let _ = respond_to.send(result);
            }
            DocumentStoreMessage::GetDatabase { respond_to } => {
                let _ = respond_to.send(self.database_name.clone());
            }
            DocumentStoreMessage::Close { respond_to } => {
                self.close().await;
                let _ = respond_to.send(());
            }
        }
    }

    fn executor_configuration(&self, database: Option<String>) -> RequestExecutorConfiguration {
        RequestExecutorConfiguration::new(self.initial_urls.clone(), database)
            .with_conventions(self.conventions.clone())
            .with_cache(HttpCache::new())
            .with_transport(TransportConfiguration {
                client_identity: self.client_identity.clone(),
                dns_overrides: self.dns_overrides.clone(),
                proxy_address: self.proxy_address.clone(),
            })
    }

    fn create_request_executor(
        &self,
        database: Option<String>,
    ) -> Result<RequestExecutor, DocumentStoreError> {
        let configuration = self.executor_configuration(database);
        let executor = if self.conventions.disable_topology_updates() {
            // Creates a request executor for a single, specific server, ignoring topology
            RequestExecutor::new_for_single_node(configuration)?
        } else {
            RequestExecutor::new(configuration)?
        };
        Ok(executor)
    }

    /// See doc comments for [`DocumentStore`](crate::DocumentStore::get_request_executor)
    #[instrument(level = "debug", skip(self))]
    fn get_request_executor(
        &mut self,
        database: Option<String>,
    ) -> Result<RequestExecutor, DocumentStoreError> {
        if self.state == DocumentStoreState::Closed {
            return Err(DocumentStoreError::Closed);
        }

        // Get the database name that was passed in, or from the document store
        let database = database
            .or_else(|| self.database_name.clone())
            .ok_or(DocumentStoreError::MissingDatabase)?;

        // See if there is a stored executor for the database
        if let Some(executor) = self.request_executors.get(&database) {
            return Ok(executor.clone());
        }

        tracing::debug!("Creating request executor for database `{}`", database);
        let executor = self.create_request_executor(Some(database.clone()))?;

        // Clone the executor handle store it in the document store
        self.request_executors.insert(database, executor.clone());

        // Send the executor handle back to the requestor
        Ok(executor)
    }

    #[instrument(level = "debug", skip(self))]
    fn get_server_executor(&mut self) -> Result<RequestExecutor, DocumentStoreError> {
        if self.state == DocumentStoreState::Closed {
            return Err(DocumentStoreError::Closed);
        }
        if let Some(executor) = &self.server_executor {
            return Ok(executor.clone());
        }

        tracing::debug!("Creating server-wide request executor");
        let executor = self.create_request_executor(None)?;
        self.server_executor = Some(executor.clone());
        Ok(executor)
    }

    #[instrument(level = "debug", name = "DocumentStore Actor - Close", skip(self))]
    async fn close(&mut self) {
        if self.state == DocumentStoreState::Closed {
            return;
        }
        self.state = DocumentStoreState::Closed;

        for (database, executor) in self.request_executors.drain() {
            tracing::debug!("Disposing request executor for database `{}`", database);
            executor.dispose().await;
        }
        if let Some(executor) = self.server_executor.take() {
            executor.dispose().await;
        }
        tracing::info!("Document store closed");
    }
}

#[instrument(level = "debug", name = "Running Document Store Actor", skip(actor))]
pub async fn run_document_store_actor(mut actor: DocumentStoreActor) {
    while let Some(msg) = actor.receiver.recv().await {
        actor.handle_message(msg).await;
    }
    // Every handle is gone; nobody can use the executors anymore.
    actor.close().await;
}
