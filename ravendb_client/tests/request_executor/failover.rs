use std::time::Duration;

use ravendb_client::{ExecuteOptions, GetDocumentsCommand, RavenDbError, ServerErrorKind};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::helpers::{
    documents_json, executor, mount_topology, topology_json, TestCluster, DATABASE, DEAD_URL,
    DOCS_PATH,
};

fn load() -> GetDocumentsCommand {
    GetDocumentsCommand::by_id(DATABASE, "users/1")
}

#[tokio::test]
async fn every_node_unavailable_tries_each_node_once() {
    // Arrange
    let cluster = TestCluster::start(&["A", "B", "C"]).await;
    for node in &cluster.nodes {
        Mock::given(method("GET"))
            .and(path(DOCS_PATH))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(node)
            .await;
    }
    let executor = cluster.executor();

    // Act
    let result = executor.execute(&load()).await;

    // Assert
    match assert_err!(result) {
        RavenDbError::AllTopologyNodesDown { last_error, .. } => assert!(matches!(
            last_error.as_deref(),
            Some(RavenDbError::NodeUnavailable { status: 503, .. })
        )),
        other => panic!("Unexpected error: {:?}", other),
    }
    let selector = executor.node_selector().unwrap();
    assert_eq!(selector.failed_nodes().len(), 3);
}

#[tokio::test]
async fn unavailable_node_fails_over_to_the_next_one() {
    // Arrange
    let cluster = TestCluster::start(&["A", "B"]).await;
    Mock::given(method("GET"))
        .and(path(DOCS_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&cluster.nodes[0])
        .await;
    Mock::given(method("GET"))
        .and(path(DOCS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(documents_json("users/1")))
        .expect(1)
        .mount(&cluster.nodes[1])
        .await;
    let executor = cluster.executor();

    // Act
    let result = executor.execute(&load()).await;

    // Assert
    assert_ok!(result);
    let selector = executor.node_selector().unwrap();
    assert!(selector.is_failed(&cluster.server_node(0)));
    assert!(!selector.is_failed(&cluster.server_node(1)));
}

#[tokio::test]
async fn request_timeout_status_is_retryable() {
    // Arrange
    let cluster = TestCluster::start(&["A", "B"]).await;
    Mock::given(method("GET"))
        .and(path(DOCS_PATH))
        .respond_with(ResponseTemplate::new(408))
        .expect(1)
        .mount(&cluster.nodes[0])
        .await;
    Mock::given(method("GET"))
        .and(path(DOCS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(documents_json("users/1")))
        .expect(1)
        .mount(&cluster.nodes[1])
        .await;

    // Act
    let result = cluster.executor().execute(&load()).await;

    // Assert
    assert_ok!(result);
}

#[tokio::test]
async fn unreachable_node_fails_over_to_the_next_one() {
    // Arrange
    let alive = MockServer::start().await;
    mount_topology(
        &alive,
        topology_json(1, &[("A", DEAD_URL), ("B", alive.uri().as_str())]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path(DOCS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(documents_json("users/1")))
        .expect(1)
        .mount(&alive)
        .await;
    let executor = executor(&[alive.uri().as_str()]);

    // Act
    let result = executor.execute(&load()).await;

    // Assert
    assert_ok!(result);
    let failed = executor.node_selector().unwrap().failed_nodes();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].cluster_tag, "A");
}

#[tokio::test]
async fn slow_node_times_out_and_fails_over() {
    // Arrange
    let cluster = TestCluster::start(&["A", "B"]).await;
    Mock::given(method("GET"))
        .and(path(DOCS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(documents_json("users/1"))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&cluster.nodes[0])
        .await;
    Mock::given(method("GET"))
        .and(path(DOCS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(documents_json("users/2")))
        .expect(1)
        .mount(&cluster.nodes[1])
        .await;
    let executor = cluster.executor();
    // Bootstrap with the default timeout first.
    executor.get_preferred_node().await.unwrap();

    // Act
    let result = executor
        .execute_with_options(
            &load(),
            ExecuteOptions::default().with_timeout(Duration::from_millis(300)),
        )
        .await;

    // Assert
    let documents = assert_ok!(result).unwrap();
    assert_eq!(documents.results[0]["@metadata"]["@id"], "users/2");
    assert!(executor
        .node_selector()
        .unwrap()
        .is_failed(&cluster.server_node(0)));
}

#[tokio::test]
async fn server_errors_are_not_retried_on_other_nodes() {
    // Arrange
    let cluster = TestCluster::start(&["A", "B"]).await;
    Mock::given(method("GET"))
        .and(path(DOCS_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "Type": "Raven.Client.Exceptions.BadRequestException",
            "Message": "Bad paging",
            "Error": "stack",
        })))
        .expect(1)
        .mount(&cluster.nodes[0])
        .await;
    Mock::given(method("GET"))
        .and(path(DOCS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(documents_json("users/1")))
        .expect(0)
        .mount(&cluster.nodes[1])
        .await;
    let executor = cluster.executor();

    // Act
    let result = executor.execute(&load()).await;

    // Assert
    match assert_err!(result) {
        RavenDbError::Server {
            kind,
            status,
            message,
            ..
        } => {
            assert_eq!(kind, ServerErrorKind::BadRequestException);
            assert_eq!(status, 400);
            assert_eq!(message, "Bad paging");
        }
        other => panic!("Unexpected error: {:?}", other),
    }
    assert!(executor.node_selector().unwrap().failed_nodes().is_empty());
}
