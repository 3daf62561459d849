use ravendb_client::{
    DocumentStoreBuilder, GetClusterTopologyCommand, GetDocumentsCommand, PutDocumentCommand,
    RequestEvent,
};
use serde_json::json;
use tracing::subscriber::set_global_default;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_tracing();
    let scheme: String = std::env::var("RAVEN_SCHEME").unwrap_or_else(|_| "http".to_string());
    let database = std::env::var("RAVEN_DATABASE").unwrap_or_else(|_| "Demo".to_string());

    let mut document_store = DocumentStoreBuilder::new().set_database_name(&database);
    if scheme == "https" {
        document_store = document_store
            .set_client_certificate("ravendb-client_dev_cert.pem")
            .set_urls(&["https://a.free.damccull.ravendb.cloud"]);
    } else {
        document_store = document_store.set_urls(&["http://localhost:8080"]);
    }

    let document_store = document_store.build()?;

    let server = document_store.get_server_executor().await?;
    let cluster = server.execute(&GetClusterTopologyCommand).await?;
    println!("{:#?}", cluster);

    let executor = document_store.get_request_executor(None).await?;
    let mut events = executor.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let RequestEvent::FailedRequest { url, error, .. } = event {
                tracing::warn!("Request to {} failed: {}", url, error);
            }
        }
    });

    let stored = executor
        .execute(&PutDocumentCommand::new(
            &database,
            "users/1",
            json!({ "Name": "John", "@metadata": { "@collection": "Users" } }),
        ))
        .await?;
    println!("Stored users/1 with change vector {}", stored.change_vector);

    // The second load is answered with 304 and served from the cache.
    for _ in 0..2 {
        let loaded = executor
            .execute(&GetDocumentsCommand::by_id(&database, "users/1"))
            .await?;
        println!("{:?}", loaded);
    }
    println!(
        "Cache holds {} item(s), {} byte(s)",
        executor.cache().number_of_items(),
        executor.cache().total_size_in_bytes()
    );

    document_store.close().await?;
    Ok(())
}

fn setup_tracing() {
    // Redirect all `log`'s events to the subscriber
    LogTracer::init().expect("Failed to set logger");
    // Set up tracing
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let formatting_layer =
        BunyanFormattingLayer::new("ravendb-client-demo".into(), std::io::stdout);
    let subscriber = Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(formatting_layer);
    set_global_default(subscriber).expect("Failed to set subscriber");
}
