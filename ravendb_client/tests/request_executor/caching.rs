use std::time::Duration;

use ravendb_client::{ExecuteOptions, GetDocumentsCommand, PutDocumentCommand};
use serde_json::json;
use tokio_test::assert_ok;
use wiremock::{
    matchers::{header, method, path},
    Mock, ResponseTemplate,
};

use crate::helpers::{RecordingReadCommand, TestCluster, DATABASE, DOCS_PATH};

const CHANGE_VECTOR: &str = "A:1-abc";

/// Mounts a conditional 304 (first, so it wins when `If-None-Match` matches) and a full 200
/// response carrying `CHANGE_VECTOR`.
async fn mount_cacheable_document(cluster: &TestCluster, not_modified: u64, full: u64) {
    Mock::given(method("GET"))
        .and(path(DOCS_PATH))
        .and(header("If-None-Match", "\"A:1-abc\""))
        .respond_with(ResponseTemplate::new(304))
        .expect(not_modified)
        .mount(&cluster.nodes[0])
        .await;
    Mock::given(method("GET"))
        .and(path(DOCS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"A:1-abc\"")
                .set_body_string(r#"{"Results":[{"Name":"John"}]}"#),
        )
        .expect(full)
        .mount(&cluster.nodes[0])
        .await;
}

#[tokio::test]
async fn second_read_is_revalidated_and_served_from_cache() {
    // Arrange
    let cluster = TestCluster::start(&["A"]).await;
    mount_cacheable_document(&cluster, 1, 1).await;
    let executor = cluster.executor();
    let command = RecordingReadCommand::new("users/1");

    // Act
    let first = executor.execute(&command).await.unwrap();
    let second = executor.execute(&command).await.unwrap();

    // Assert
    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(first.body, second.body);
    assert_eq!(executor.cache().number_of_items(), 1);
}

#[tokio::test]
async fn cached_entry_stores_unquoted_change_vector() {
    // Arrange
    let cluster = TestCluster::start(&["A"]).await;
    mount_cacheable_document(&cluster, 0, 1).await;
    let executor = cluster.executor();

    // Act
    assert_ok!(executor.execute(&RecordingReadCommand::new("users/1")).await);

    // Assert
    let url = format!("{}{}?id=users%2F1", cluster.uri(0), DOCS_PATH);
    let cached = executor.cache().get(&url).unwrap();
    assert_eq!(cached.change_vector, CHANGE_VECTOR);
}

#[tokio::test]
async fn aggressive_cache_skips_the_network() {
    // Arrange
    let cluster = TestCluster::start(&["A"]).await;
    mount_cacheable_document(&cluster, 0, 1).await;
    let executor = cluster.executor();
    let command = RecordingReadCommand::new("users/1");
    executor.execute(&command).await.unwrap();

    // Act
    let cached = executor
        .execute_with_options(
            &command,
            ExecuteOptions::default().with_aggressive_cache(Duration::from_secs(60)),
        )
        .await
        .unwrap();

    // Assert
    assert!(cached.from_cache);
}

#[tokio::test]
async fn clearing_the_cache_forces_a_full_request() {
    // Arrange
    let cluster = TestCluster::start(&["A"]).await;
    mount_cacheable_document(&cluster, 0, 2).await;
    let executor = cluster.executor();
    let command = RecordingReadCommand::new("users/1");
    executor.execute(&command).await.unwrap();

    // Act
    executor.cache().clear();
    let second = executor.execute(&command).await.unwrap();

    // Assert
    assert!(!second.from_cache);
}

#[tokio::test]
async fn writes_are_never_cached() {
    // Arrange
    let cluster = TestCluster::start(&["A"]).await;
    Mock::given(method("PUT"))
        .and(path(DOCS_PATH))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("ETag", "\"A:2-abc\"")
                .set_body_json(json!({ "Id": "users/1", "ChangeVector": "A:2-abc" })),
        )
        .expect(1)
        .mount(&cluster.nodes[0])
        .await;
    let executor = cluster.executor();

    // Act
    let result = executor
        .execute(&PutDocumentCommand::new(
            DATABASE,
            "users/1",
            json!({ "Name": "John" }),
        ))
        .await;

    // Assert
    assert_eq!(assert_ok!(result).change_vector, "A:2-abc");
    assert_eq!(executor.cache().number_of_items(), 0);
}

#[tokio::test]
async fn compressed_write_carries_content_encoding() {
    // Arrange
    let cluster = TestCluster::start(&["A"]).await;
    Mock::given(method("PUT"))
        .and(path(DOCS_PATH))
        .and(header("Content-Encoding", "gzip"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({ "Id": "users/1", "ChangeVector": "A:2-abc" })),
        )
        .expect(1)
        .mount(&cluster.nodes[0])
        .await;
    let executor = cluster.executor();

    // Act
    let result = executor
        .execute(&PutDocumentCommand::new(DATABASE, "users/1", json!({ "Name": "John" })))
        .await;

    // Assert
    assert_ok!(result);
}

#[tokio::test]
async fn missing_document_is_none() {
    // Arrange
    let cluster = TestCluster::start(&["A"]).await;
    Mock::given(method("GET"))
        .and(path(DOCS_PATH))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&cluster.nodes[0])
        .await;
    let executor = cluster.executor();

    // Act
    let result = executor
        .execute(&GetDocumentsCommand::by_id(DATABASE, "users/404"))
        .await;

    // Assert
    assert!(assert_ok!(result).is_none());
    assert!(executor.node_selector().unwrap().failed_nodes().is_empty());
}
