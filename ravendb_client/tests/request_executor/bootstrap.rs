use ravendb_client::{
    DocumentConventions, GetClusterTopologyCommand, GetDocumentsCommand, RavenDbError,
    RequestExecutor, RequestExecutorConfiguration,
};
use reqwest::Url;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::helpers::{
    documents_json, executor, mount_topology, topology_json, DATABASE, DEAD_URL, DOCS_PATH,
};

#[tokio::test]
async fn first_execute_downloads_topology_from_first_reachable_seed() {
    // Arrange
    let node = MockServer::start().await;
    mount_topology(&node, topology_json(7, &[("A", node.uri().as_str())])).await;
    Mock::given(method("GET"))
        .and(path(DOCS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(documents_json("users/1")))
        .expect(1)
        .mount(&node)
        .await;
    let executor = executor(&[DEAD_URL, node.uri().as_str()]);

    // Act
    let result = executor
        .execute(&GetDocumentsCommand::by_id(DATABASE, "users/1"))
        .await;

    // Assert
    let documents = assert_ok!(result).unwrap();
    assert_eq!(documents.results[0]["Name"], "John");
    assert_eq!(executor.topology_etag(), Some(7));
    let topology = executor.topology().unwrap();
    assert_eq!(topology.nodes.len(), 1);
    assert_eq!(topology.nodes[0].cluster_tag, "A");
    assert_eq!(
        executor.topology_taken_from_node().unwrap().url,
        Url::parse(&node.uri()).unwrap()
    );
}

#[tokio::test]
async fn bootstrap_fails_with_all_topology_nodes_down_when_every_seed_fails() {
    // Arrange
    let first = MockServer::start().await;
    let second = MockServer::start().await;
    for seed in [&first, &second] {
        Mock::given(method("GET"))
            .and(path("/topology"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(seed)
            .await;
    }
    let executor = executor(&[first.uri().as_str(), second.uri().as_str()]);

    // Act
    let result = executor
        .execute(&GetDocumentsCommand::by_id(DATABASE, "users/1"))
        .await;

    // Assert
    match assert_err!(result) {
        RavenDbError::AllTopologyNodesDown { last_error, .. } => assert!(matches!(
            last_error.as_deref(),
            Some(RavenDbError::NodeUnavailable { status: 503, .. })
        )),
        other => panic!("Unexpected error: {:?}", other),
    }
    assert!(executor.node_selector().is_none());
}

#[tokio::test]
async fn bootstrap_prefers_database_does_not_exist_over_all_nodes_down() {
    // Arrange
    let first = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/topology"))
        .respond_with(ResponseTemplate::new(503).insert_header("Database-Missing", DATABASE))
        .mount(&first)
        .await;
    let executor = executor(&[first.uri().as_str(), DEAD_URL]);

    // Act
    let result = executor.get_preferred_node().await;

    // Assert
    assert!(matches!(result, Err(RavenDbError::DatabaseDoesNotExist(name)) if name == DATABASE));
}

#[tokio::test]
async fn failed_bootstrap_is_retried_by_the_next_call() {
    // Arrange
    let node = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/topology"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&node)
        .await;
    mount_topology(&node, topology_json(1, &[("A", node.uri().as_str())])).await;
    let executor = executor(&[node.uri().as_str()]);

    // Act
    let first = executor.get_preferred_node().await;
    let second = executor.get_preferred_node().await;

    // Assert
    assert!(matches!(first, Err(RavenDbError::AllTopologyNodesDown { .. })));
    assert_eq!(assert_ok!(second).cluster_tag, "A");
}

#[tokio::test]
async fn topology_with_a_foreign_database_is_rejected() {
    // Arrange
    let node = MockServer::start().await;
    mount_topology(
        &node,
        json!({
            "Etag": 1,
            "Nodes": [{ "Url": node.uri(), "Database": "someone-else", "ClusterTag": "A" }],
        }),
    )
    .await;
    let executor = executor(&[node.uri().as_str()]);

    // Act
    let result = executor.get_preferred_node().await;

    // Assert
    match assert_err!(result) {
        RavenDbError::AllTopologyNodesDown { last_error, .. } => assert!(matches!(
            last_error.as_deref(),
            Some(RavenDbError::InvalidTopology(_))
        )),
        other => panic!("Unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn server_wide_executor_routes_to_cluster_members() {
    // Arrange
    let leader = MockServer::start().await;
    let follower = MockServer::start().await;
    let cluster = json!({
        "Topology": {
            "TopologyId": "t-1",
            "Members": { "A": follower.uri(), "B": leader.uri() },
        },
        "Leader": "B",
        "NodeTag": "B",
        "Etag": 3,
    });
    Mock::given(method("GET"))
        .and(path("/cluster/topology"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cluster))
        .mount(&leader)
        .await;
    let executor = RequestExecutor::new(
        RequestExecutorConfiguration::new(vec![Url::parse(&leader.uri()).unwrap()], None)
            .with_conventions(DocumentConventions::default()),
    )
    .unwrap();

    // Act
    let info = executor.execute(&GetClusterTopologyCommand).await;

    // Assert
    assert_eq!(assert_ok!(info).leader.as_deref(), Some("B"));
    let topology = executor.topology().unwrap();
    assert_eq!(topology.nodes.len(), 2);
    // The leader comes first so writes go to it.
    assert_eq!(topology.nodes[0].cluster_tag, "B");
    assert_eq!(topology.nodes[0].database, None);
}
