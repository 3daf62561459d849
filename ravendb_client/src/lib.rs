/*!
ravendb_client is a client library for the RavenDB document database.
It aims to compete with the existing libraries officially offered, but
using more rusty ways of doing things.

This library requires tokio and async, and uses the actor pattern to maintain
a single instance of the [`DocumentStore`] per cluster, as recommended by the
official libraries. This is designed to keep resource usage in your app to a minimum.

The [`DocumentStore`] hands out one [`RequestExecutor`] per database. The executor is where
requests actually happen: it learns the cluster topology, picks a node for every
[`RavenCommand`], fails over to the other nodes when one is down, and revalidates cached reads
with conditional requests.

# Example
```rust,no_run
# tokio_test::block_on(async {
use ravendb_client::{DocumentStore, PutDocumentCommand};
use serde_json::json;

let document_store = DocumentStore::builder()
    .set_urls(&["http://localhost:8080"])
    .set_database_name("Northwind")
    .build()
    .unwrap();

let executor = document_store.get_request_executor(None).await.unwrap();
let stored = executor
    .execute(&PutDocumentCommand::new("Northwind", "users/1", json!({ "Name": "John" })))
    .await
    .unwrap();
println!("{}", stored.change_vector);

document_store.close().await.unwrap();
# })
```
*/

mod document_store;
mod request_executor;

pub mod cluster_topology;
pub mod constants;
pub mod document_conventions;
pub mod events;
pub mod exception_dispatcher;
pub mod header_utils;
pub mod http_cache;
pub mod http_compression;
pub mod node_selector;
pub mod raven_command;
pub mod ravendb_error;
pub mod server_node;
pub mod topology;

pub use document_conventions::DocumentConventions;
pub use document_store::*;
pub use events::RequestEvent;
pub use http_cache::HttpCache;
pub use node_selector::{NodeSelector, ReadBalanceBehavior};
pub use raven_command::*;
pub use ravendb_error::{RavenDbError, ServerErrorKind};
pub use request_executor::*;
pub use server_node::{ServerNode, ServerRole};
pub use topology::Topology;

/// Formats an error followed by every error in its `source()` chain.
pub fn error_chain_fmt(
    e: &impl std::error::Error,
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    writeln!(f, "{}\n", e)?;
    let mut current = e.source();
    while let Some(cause) = current {
        writeln!(f, "Caused by:\n\t{}", cause)?;
        current = cause.source();
    }
    Ok(())
}
