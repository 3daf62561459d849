use anyhow::Context;
use tokio::sync::{mpsc, oneshot};
use tracing::instrument;

use crate::{
    raven_command::RavenCommand, request_executor::RequestExecutor, run_document_store_actor,
    DocumentStoreActor, DocumentStoreBuilder, DocumentStoreError,
    DocumentStoreInitialConfiguration, DocumentStoreMessage,
};

/**
This a handle to the actor.

Only one DocumentStoreActor should exist per database cluster when possible to reduce resource
usage. Cloning this handle is very cheap and will not instantiate a new actor in the background.
It is recommended to clone this handle to each component that needs to talk to the
DocumentStoreActor.
When the last handle goes out of scope and is dropped, the backing actor disposes its request
executors and stops.

```rust,no_run
# tokio_test::block_on(async {
use ravendb_client::{DocumentStore, GetDocumentsCommand};

let document_store: DocumentStore = DocumentStore::builder()
    .set_urls(&["http://localhost:8080"])
    .set_database_name("Northwind")
    .build()
    .unwrap();

let employee = document_store
    .execute(&GetDocumentsCommand::by_id("Northwind", "employees/1-A"))
    .await
    .unwrap();
println!("DEBUG: {:?}", employee);

document_store.close().await.unwrap();
# })
```
*/
#[derive(Clone, Debug)]
pub struct DocumentStore {
    sender: mpsc::Sender<DocumentStoreMessage>,
}

impl DocumentStore {
    pub fn builder() -> DocumentStoreBuilder {
        DocumentStoreBuilder::default()
    }

    // This is pub(crate) so only the builder can crank it out
    pub(crate) fn new(initial_config: DocumentStoreInitialConfiguration) -> Self {
        let (sender, receiver) = mpsc::channel(8);
        let actor = DocumentStoreActor::new(receiver, initial_config);
        tokio::spawn(run_document_store_actor(actor));

        Self { sender }
    }

    /// Returns the [`RequestExecutor`] for `database_name`, or for the store's default database
    /// when `None`. The executor is created on first request and shared afterwards.
    #[instrument(
        level = "debug",
        name = "Actor Handle - Get Request Executor",
        skip(self)
    )]
    pub async fn get_request_executor(
        &self,
        database_name: Option<&str>,
    ) -> Result<RequestExecutor, DocumentStoreError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DocumentStoreMessage::GetRequestExecutor {
                database_name: database_name.map(str::to_string),
                respond_to: tx,
            })
            .await
            .context("DocumentStoreActor task has been killed")?;
        rx.await.context("DocumentStoreActor task has been killed")?
    }

    /// Returns the executor for cluster-level commands that are not bound to a database.
    #[instrument(
        level = "debug",
        name = "Actor Handle - Get Server Executor",
        skip(self)
    )]
    pub async fn get_server_executor(&self) -> Result<RequestExecutor, DocumentStoreError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DocumentStoreMessage::GetServerExecutor { respond_to: tx })
            .await
            .context("DocumentStoreActor task has been killed")?;
        rx.await.context("DocumentStoreActor task has been killed")?
    }

    pub async fn database(&self) -> Result<Option<String>, DocumentStoreError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DocumentStoreMessage::GetDatabase { respond_to: tx })
            .await
            .context("DocumentStoreActor task has been killed")?;
        Ok(rx.await.context("DocumentStoreActor task has been killed")?)
    }

    /// Executes `command` with the default database's executor.
    #[instrument(
        level = "debug",
        name = "Actor Handle - Execute Raven Command",
        skip_all
    )]
    pub async fn execute<C: RavenCommand>(
        &self,
        command: &C,
    ) -> Result<C::Output, DocumentStoreError> {
        let executor = self.get_request_executor(None).await?;
        Ok(executor.execute(command).await?)
    }

    /// Disposes every executor this store created. Executors handed out earlier stop working.
    #[instrument(level = "debug", name = "Actor Handle - Close", skip(self))]
    pub async fn close(&self) -> Result<(), DocumentStoreError> {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(DocumentStoreMessage::Close { respond_to: tx })
            .await
            .is_err()
        {
            // The actor is gone, so there is nothing left to close.
            return Ok(());
        }
        rx.await.context("DocumentStoreActor task has been killed")?;
        Ok(())
    }
}
