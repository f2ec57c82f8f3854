//! Integration tests for unlist, relist and hard delete.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use common::{FaultyStore, NupkgBuilder, TestServer, TestStores, identity, nupkg};
use keg_core::config::{DeletionBehavior, DeletionConfig};
use keg_metadata::PackageDatabase;
use keg_server::{IndexingPipeline, IndexingResult};
use keg_server::deletion::DeletionService;
use keg_storage::{ObjectStore, PackageFile, PackageStorage};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn delete_request(id: &str, version: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(format!("/api/v2/package/{id}/{version}"))
        .body(Body::empty())
        .unwrap()
}

fn relist_request(id: &str, version: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/api/v2/package/{id}/{version}"))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_unlist_then_relist_keeps_downloads() {
    let server = TestServer::new().await;
    assert_eq!(server.push(nupkg("Foo", "1.0.0"), None).await, StatusCode::CREATED);
    let (id, version) = identity("Foo", "1.0.0");
    assert!(
        server
            .state
            .metadata
            .increment_downloads(&id, &version)
            .await
            .unwrap()
    );

    let (status, _) = server.send(delete_request("Foo", "1.0.0")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let package = server
        .state
        .metadata
        .find_package(&id, &version, true)
        .await
        .unwrap()
        .unwrap();
    assert!(!package.listed);
    assert!(
        server
            .state
            .metadata
            .find_package(&id, &version, false)
            .await
            .unwrap()
            .is_none()
    );

    // Unlisted content stays downloadable.
    let (status, _) = server.get("/v3/package/foo/1.0.0/foo.1.0.0.nupkg").await;
    assert_eq!(status, StatusCode::OK);

    let (_, json) = server.get_json("/v3/search?q=foo").await;
    assert_eq!(json["totalHits"], 0);

    let (status, _) = server.send(relist_request("foo", "1.0.0")).await;
    assert_eq!(status, StatusCode::OK);

    let package = server
        .state
        .metadata
        .find_package(&id, &version, false)
        .await
        .unwrap()
        .unwrap();
    assert!(package.listed);
    assert_eq!(package.downloads, 2);

    let (_, json) = server.get_json("/v3/search?q=foo").await;
    assert_eq!(json["totalHits"], 1);
}

#[tokio::test]
async fn test_delete_missing_package_is_not_found() {
    let server = TestServer::new().await;

    let (status, _) = server.send(delete_request("Missing", "1.0.0")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server.send(relist_request("Missing", "1.0.0")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (id, version) = identity("Missing", "1.0.0");
    assert!(!server.state.deletion.try_delete(&id, &version).await.unwrap());
}

#[tokio::test]
async fn test_hard_delete_removes_metadata_and_content() {
    let server = TestServer::with_config(|config| {
        config.deletion.behavior = DeletionBehavior::HardDelete;
    })
    .await;
    let package = NupkgBuilder::new("Foo", "1.0.0").readme("# Foo").build();
    assert_eq!(server.push(package, None).await, StatusCode::CREATED);
    assert_eq!(server.push(nupkg("Foo", "2.0.0"), None).await, StatusCode::CREATED);

    let (status, _) = server.send(delete_request("Foo", "1.0.0")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (id, version) = identity("Foo", "1.0.0");
    assert!(!server.state.metadata.exists(&id, Some(&version)).await.unwrap());
    assert!(
        server
            .state
            .storage
            .get_bytes(&id, &version, PackageFile::Package)
            .await
            .unwrap()
            .is_none()
    );
    let keys = server.state.store.list("packages/foo").await.unwrap();
    assert!(
        keys.iter().all(|k| !k.starts_with("packages/foo/1.0.0/")),
        "leftover blobs: {keys:?}"
    );

    let (status, json) = server.get_json("/v3/package/foo/index.json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["versions"], serde_json::json!(["2.0.0"]));

    // The identity can be pushed again.
    assert_eq!(server.push(nupkg("Foo", "1.0.0"), None).await, StatusCode::CREATED);
}

#[tokio::test]
async fn test_allow_pattern_falls_back_to_unlist() {
    let server = TestServer::with_config(|config| {
        config.deletion.behavior = DeletionBehavior::HardDelete;
        config.deletion.hard_delete_allow_pattern = Some(r"-preview\b".to_string());
    })
    .await;
    assert_eq!(server.push(nupkg("Foo", "1.0.0"), None).await, StatusCode::CREATED);
    assert_eq!(
        server.push(nupkg("Foo", "1.1.0-preview"), None).await,
        StatusCode::CREATED
    );

    let (stable_id, stable) = identity("Foo", "1.0.0");
    let (preview_id, preview) = identity("Foo", "1.1.0-preview");
    assert_eq!(
        server.state.deletion.policy_for(&stable_id, &stable),
        DeletionBehavior::Unlist
    );
    assert_eq!(
        server.state.deletion.policy_for(&preview_id, &preview),
        DeletionBehavior::HardDelete
    );

    let (status, _) = server.send(delete_request("Foo", "1.0.0")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = server.send(delete_request("Foo", "1.1.0-preview")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let stable_row = server
        .state
        .metadata
        .find_package(&stable_id, &stable, true)
        .await
        .unwrap()
        .unwrap();
    assert!(!stable_row.listed);
    assert!(
        !server
            .state
            .metadata
            .exists(&preview_id, Some(&preview))
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_delete_requires_api_key() {
    let key_hash = keg_core::api_key_hash("secret");
    let server = TestServer::with_config(move |config| {
        config.server.api_key_hash = Some(key_hash);
    })
    .await;
    assert_eq!(
        server.push(nupkg("Foo", "1.0.0"), Some("secret")).await,
        StatusCode::CREATED
    );

    let (status, _) = server.send(delete_request("Foo", "1.0.0")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let authorized = Request::builder()
        .method("DELETE")
        .uri("/api/v2/package/Foo/1.0.0")
        .header("X-NuGet-ApiKey", "secret")
        .body(Body::empty())
        .unwrap();
    let (status, _) = server.send(authorized).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_hard_delete_cleans_orphaned_content() {
    let server = TestServer::with_config(|config| {
        config.deletion.behavior = DeletionBehavior::HardDelete;
    })
    .await;
    let (id, version) = identity("Orphan", "1.0.0");
    server
        .state
        .storage
        .save_package_content(
            &id,
            &version,
            nupkg("Orphan", "1.0.0"),
            Bytes::from_static(b"<package />"),
            Some(Bytes::from_static(b"# Orphan")),
            None,
        )
        .await
        .unwrap();
    assert!(!server.state.store.list("packages/orphan").await.unwrap().is_empty());

    let found = server.state.deletion.try_delete(&id, &version).await.unwrap();
    assert!(!found);

    let keys = server.state.store.list("packages/orphan").await.unwrap();
    assert!(keys.is_empty(), "leftover blobs: {keys:?}");
}

#[tokio::test]
async fn test_hard_delete_removes_row_before_content() {
    let stores = TestStores::new().await;
    let storage = PackageStorage::new(stores.store.clone());
    let pipeline = IndexingPipeline::new(
        storage.clone(),
        stores.metadata.clone(),
        stores.metadata.clone(),
        false,
    );
    assert_eq!(
        pipeline
            .index(nupkg("Foo", "1.0.0"), &CancellationToken::new())
            .await,
        IndexingResult::Success
    );

    let failing: Arc<dyn ObjectStore> =
        Arc::new(FaultyStore::failing_deletes(stores.store.clone()));
    let config = DeletionConfig {
        behavior: DeletionBehavior::HardDelete,
        hard_delete_allow_pattern: None,
    };
    let failing_storage = PackageStorage::new(failing);
    let deletion = DeletionService::new(&config, stores.metadata.clone(), failing_storage).unwrap();

    let (id, version) = identity("Foo", "1.0.0");
    assert!(deletion.try_delete(&id, &version).await.is_err());

    // The row went first; the blobs stayed because the store refused.
    assert!(!stores.metadata.exists(&id, Some(&version)).await.unwrap());
    assert!(
        storage
            .get_bytes(&id, &version, PackageFile::Package)
            .await
            .unwrap()
            .is_some()
    );
}
