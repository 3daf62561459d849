use std::time::Duration;

use ravendb_client::{GetDocumentsCommand, RequestEvent, ServerNode};
use reqwest::Url;
use tokio_test::assert_ok;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::helpers::{
    documents_json, eventually, executor, executor_with, mount_topology, quiet_conventions,
    requests_to, topology_json, TestCluster, DATABASE, DOCS_PATH,
};

fn load() -> GetDocumentsCommand {
    GetDocumentsCommand::by_id(DATABASE, "users/1")
}

fn node(server: &MockServer) -> ServerNode {
    ServerNode::new(Url::parse(&server.uri()).unwrap(), Some(DATABASE.to_string()))
}

/// Serves `first` for the bootstrap download and `then` for every download after it.
async fn mount_changing_topology(
    server: &MockServer,
    first: serde_json::Value,
    then: serde_json::Value,
) {
    Mock::given(method("GET"))
        .and(path("/topology"))
        .respond_with(ResponseTemplate::new(200).set_body_json(first))
        .up_to_n_times(1)
        .mount(server)
        .await;
    mount_topology(server, then).await;
}

async fn mount_documents(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(DOCS_PATH))
        .respond_with(response.set_body_json(documents_json("users/1")))
        .mount(server)
        .await;
}

#[tokio::test]
async fn refresh_topology_header_downloads_the_new_topology() {
    // Arrange
    let a = MockServer::start().await;
    let b = MockServer::start().await;
    mount_changing_topology(
        &a,
        topology_json(1, &[("A", &a.uri())]),
        topology_json(2, &[("A", &a.uri()), ("B", &b.uri())]),
    )
    .await;
    mount_documents(
        &a,
        ResponseTemplate::new(200).insert_header("Refresh-Topology", "true"),
    )
    .await;
    let executor = executor(&[a.uri().as_str()]);
    let mut events = executor.subscribe_events();

    // Act
    assert_ok!(executor.execute(&load()).await);

    // Assert
    assert!(eventually(|| executor.topology_etag() == Some(2)).await);
    assert_eq!(executor.topology().unwrap().nodes.len(), 2);
    assert_eq!(executor.topology_taken_from_node(), Some(node(&a)));

    let updated_to_two = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(RequestEvent::TopologyUpdated { etag: 2, database }) => return database,
                Ok(_) => continue,
                Err(e) => panic!("Event stream closed: {:?}", e),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(updated_to_two.as_deref(), Some(DATABASE));
}

#[tokio::test]
async fn newer_topology_etag_header_downloads_the_new_topology() {
    // Arrange
    let a = MockServer::start().await;
    mount_changing_topology(
        &a,
        topology_json(1, &[("A", &a.uri())]),
        topology_json(5, &[("A", &a.uri())]),
    )
    .await;
    mount_documents(
        &a,
        ResponseTemplate::new(200).insert_header("Topology-Etag", "\"5\""),
    )
    .await;
    let executor = executor(&[a.uri().as_str()]);

    // Act
    assert_ok!(executor.execute(&load()).await);

    // Assert
    assert!(eventually(|| executor.topology_etag() == Some(5)).await);
}

#[tokio::test]
async fn same_topology_etag_header_is_ignored() {
    // Arrange
    let a = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/topology"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(topology_json(3, &[("A", &a.uri())])),
        )
        .expect(1)
        .mount(&a)
        .await;
    mount_documents(
        &a,
        ResponseTemplate::new(200).insert_header("Topology-Etag", "3"),
    )
    .await;
    let executor = executor(&[a.uri().as_str()]);

    // Act
    assert_ok!(executor.execute(&load()).await);
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Assert
    assert_eq!(executor.topology_etag(), Some(3));
}

#[tokio::test]
async fn update_topology_ignores_older_topology_unless_forced() {
    // Arrange
    let a = MockServer::start().await;
    let b = MockServer::start().await;
    mount_changing_topology(
        &a,
        topology_json(4, &[("A", &a.uri())]),
        topology_json(2, &[("A", &a.uri()), ("B", &b.uri())]),
    )
    .await;
    let executor = executor(&[a.uri().as_str()]);
    assert_ok!(executor.get_preferred_node().await);

    // Act
    let ignored = executor.update_topology(&node(&a), false).await;
    let etag_after_ignored = executor.topology_etag();
    let forced = executor.update_topology(&node(&a), true).await;

    // Assert
    assert!(!assert_ok!(ignored));
    assert_eq!(etag_after_ignored, Some(4));
    assert!(assert_ok!(forced));
    assert_eq!(executor.topology_etag(), Some(2));
    assert_eq!(executor.topology().unwrap().nodes.len(), 2);
}

#[tokio::test]
async fn disabled_topology_updates_ignore_refresh_headers() {
    // Arrange
    let a = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/topology"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(topology_json(9, &[("A", &a.uri())])),
        )
        .expect(0)
        .mount(&a)
        .await;
    mount_documents(
        &a,
        ResponseTemplate::new(200).insert_header("Refresh-Topology", "true"),
    )
    .await;
    let executor = executor_with(
        &[a.uri().as_str()],
        quiet_conventions().set_disable_topology_updates(true),
    );

    // Act
    assert_ok!(executor.execute(&load()).await);
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Assert
    assert_eq!(executor.topology_etag(), Some(-1));
}

#[tokio::test]
async fn failed_node_is_restored_once_it_answers_again() {
    // Arrange
    let cluster = TestCluster::start(&["A", "B"]).await;
    Mock::given(method("GET"))
        .and(path(DOCS_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&cluster.nodes[0])
        .await;
    for node in &cluster.nodes {
        mount_documents(node, ResponseTemplate::new(200)).await;
    }
    let executor = cluster.executor_with(
        quiet_conventions().set_failed_node_check_interval(Duration::from_millis(100)),
    );

    // Act
    assert_ok!(executor.execute(&load()).await);

    // Assert
    let selector = executor.node_selector().unwrap();
    let a = cluster.server_node(0);
    assert!(eventually(|| !selector.is_failed(&a)).await);
    assert_eq!(
        assert_ok!(executor.get_preferred_node().await),
        cluster.server_node(0)
    );
}

#[tokio::test]
async fn every_node_failing_triggers_a_topology_refresh() {
    // Arrange
    let a = MockServer::start().await;
    let b = MockServer::start().await;
    let nodes = [("A", a.uri()), ("B", b.uri())];
    let listed = nodes
        .iter()
        .map(|(tag, uri)| (*tag, uri.as_str()))
        .collect::<Vec<_>>();
    mount_changing_topology(&a, topology_json(1, &listed), topology_json(2, &listed)).await;
    for server in [&a, &b] {
        Mock::given(method("GET"))
            .and(path(DOCS_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(server)
            .await;
    }
    let executor = executor(&[a.uri().as_str()]);

    // Act
    let result = executor.execute(&load()).await;

    // Assert
    assert!(result.is_err());
    assert!(eventually(|| executor.topology_etag() == Some(2)).await);
    // The new topology starts with a clean failure set.
    assert!(executor.node_selector().unwrap().failed_nodes().is_empty());
}

#[tokio::test]
async fn topology_is_refreshed_on_the_refresh_interval() {
    // Arrange
    let a = MockServer::start().await;
    mount_changing_topology(
        &a,
        topology_json(1, &[("A", &a.uri())]),
        topology_json(2, &[("A", &a.uri())]),
    )
    .await;
    let executor = executor_with(
        &[a.uri().as_str()],
        quiet_conventions().set_topology_refresh_interval(Duration::from_millis(100)),
    );

    // Act
    assert_ok!(executor.get_preferred_node().await);

    // Assert
    assert!(eventually(|| executor.topology_etag() == Some(2)).await);
    assert_eq!(requests_to(&a, DOCS_PATH).await, 0);
    assert!(requests_to(&a, "/topology").await >= 2);
}
