use ravendb_client::{GetDocumentsCommand, PutDocumentCommand, RavenDbError, ServerErrorKind};
use serde_json::json;
use tokio_test::assert_err;
use wiremock::{
    matchers::{method, path},
    Mock, ResponseTemplate,
};

use crate::helpers::{TestCluster, DATABASE, DOCS_PATH};

/// Mounts `response` on the first node and makes sure the second node is never asked.
async fn respond_once(cluster: &TestCluster, http_method: &str, response: ResponseTemplate) {
    Mock::given(method(http_method))
        .and(path(DOCS_PATH))
        .respond_with(response)
        .expect(1)
        .mount(&cluster.nodes[0])
        .await;
    Mock::given(method(http_method))
        .and(path(DOCS_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&cluster.nodes[1])
        .await;
}

fn put() -> PutDocumentCommand {
    PutDocumentCommand::new(DATABASE, "users/1", json!({ "Name": "John" }))
        .with_change_vector("A:1-abc")
}

#[tokio::test]
async fn conflict_with_document_conflict_envelope_is_a_document_conflict() {
    // Arrange
    let cluster = TestCluster::start(&["A", "B"]).await;
    respond_once(
        &cluster,
        "PUT",
        ResponseTemplate::new(409).set_body_json(json!({
            "Type": "Raven.Client.Exceptions.Documents.DocumentConflictException",
            "Message": "Conflict detected on users/1",
        })),
    )
    .await;

    // Act
    let result = cluster.executor().execute(&put()).await;

    // Assert
    match assert_err!(result) {
        RavenDbError::DocumentConflict { message, envelope } => {
            assert_eq!(message, "Conflict detected on users/1");
            assert!(envelope.r#type.ends_with("DocumentConflictException"));
        }
        other => panic!("Unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn other_conflicts_are_concurrency_errors() {
    // Arrange
    let cluster = TestCluster::start(&["A", "B"]).await;
    respond_once(
        &cluster,
        "PUT",
        ResponseTemplate::new(409).set_body_json(json!({
            "Type": "Raven.Client.Exceptions.ConcurrencyException",
            "Message": "Optimistic concurrency violation",
        })),
    )
    .await;

    // Act
    let result = cluster.executor().execute(&put()).await;

    // Assert
    assert!(matches!(
        assert_err!(result),
        RavenDbError::Concurrency { message } if message == "Optimistic concurrency violation"
    ));
}

#[tokio::test]
async fn conflict_without_envelope_is_a_concurrency_error() {
    let cluster = TestCluster::start(&["A", "B"]).await;
    respond_once(&cluster, "PUT", ResponseTemplate::new(409)).await;

    let result = cluster.executor().execute(&put()).await;

    assert!(matches!(assert_err!(result), RavenDbError::Concurrency { .. }));
}

#[tokio::test]
async fn unknown_server_exception_keeps_its_name() {
    // Arrange
    let cluster = TestCluster::start(&["A", "B"]).await;
    respond_once(
        &cluster,
        "GET",
        ResponseTemplate::new(500).set_body_json(json!({
            "Type": "Raven.Server.Documents.Sharding.ShardedThingException",
            "Message": "Something new",
            "Error": "details",
        })),
    )
    .await;

    // Act
    let result = cluster
        .executor()
        .execute(&GetDocumentsCommand::by_id(DATABASE, "users/1"))
        .await;

    // Assert
    let error = assert_err!(result);
    assert_eq!(error.kind_name(), "ShardedThingException");
    assert!(matches!(
        error,
        RavenDbError::Server { kind: ServerErrorKind::Other(_), status: 500, .. }
    ));
}

#[tokio::test]
async fn platform_timeout_is_a_timeout() {
    let cluster = TestCluster::start(&["A", "B"]).await;
    respond_once(
        &cluster,
        "GET",
        ResponseTemplate::new(500).set_body_json(json!({
            "Type": "System.TimeoutException",
            "Message": "Query took too long",
        })),
    )
    .await;

    let result = cluster
        .executor()
        .execute(&GetDocumentsCommand::by_id(DATABASE, "users/1"))
        .await;

    assert!(matches!(assert_err!(result), RavenDbError::Timeout { .. }));
}

#[tokio::test]
async fn malformed_error_body_keeps_the_raw_body() {
    // Arrange
    let cluster = TestCluster::start(&["A", "B"]).await;
    respond_once(
        &cluster,
        "GET",
        ResponseTemplate::new(500).set_body_string("<html>Internal Server Error</html>"),
    )
    .await;

    // Act
    let result = cluster
        .executor()
        .execute(&GetDocumentsCommand::by_id(DATABASE, "users/1"))
        .await;

    // Assert
    match assert_err!(result) {
        RavenDbError::MalformedErrorResponse { status, body, .. } => {
            assert_eq!(status, 500);
            assert_eq!(body, "<html>Internal Server Error</html>");
        }
        other => panic!("Unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn missing_database_on_a_node_is_not_failed_over() {
    // Arrange
    let cluster = TestCluster::start(&["A", "B"]).await;
    respond_once(
        &cluster,
        "GET",
        ResponseTemplate::new(503).insert_header("Database-Missing", DATABASE),
    )
    .await;

    // Act
    let result = cluster
        .executor()
        .execute(&GetDocumentsCommand::by_id(DATABASE, "users/1"))
        .await;

    // Assert
    assert!(matches!(
        assert_err!(result),
        RavenDbError::DatabaseDoesNotExist(name) if name == DATABASE
    ));
}
