//! Server test utilities.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use keg_core::config::{AppConfig, MetadataConfig, StorageConfig};
use keg_metadata::{MetadataStore, SqliteStore};
use keg_server::{AppState, create_router};
use keg_storage::{FilesystemBackend, ObjectStore};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

/// Stores rooted in a temporary directory.
#[allow(dead_code)]
pub struct TestStores {
    pub store: Arc<dyn ObjectStore>,
    pub metadata: Arc<dyn MetadataStore>,
    pub config: AppConfig,
    pub temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestStores {
    pub async fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let storage_path = temp_dir.path().join("storage");
        let store: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );

        let db_path = temp_dir.path().join("keg.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path)
                .await
                .expect("Failed to create metadata store"),
        );

        let config = AppConfig {
            storage: StorageConfig::Filesystem { path: storage_path },
            metadata: MetadataConfig::Sqlite { path: db_path },
            ..AppConfig::for_testing()
        };

        Self {
            store,
            metadata,
            config,
            temp_dir,
        }
    }
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut stores = TestStores::new().await;
        modifier(&mut stores.config);

        let state = AppState::new(stores.config, stores.store, stores.metadata)
            .expect("Failed to build state");
        Self::from_state(state, stores.temp_dir)
    }

    fn from_state(state: AppState, temp_dir: TempDir) -> Self {
        let router = create_router(state.clone());
        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Send a request and collect the response body.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Bytes) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Bytes) {
        self.send(
            Request::builder()
                .uri(uri)
                .header("host", "feed.test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        let (status, body) = self.get(uri).await;
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    /// Push a package as a raw request body.
    pub async fn push(&self, package: Bytes, api_key: Option<&str>) -> StatusCode {
        let mut builder = Request::builder()
            .method("PUT")
            .uri("/api/v2/package")
            .header("content-type", "application/octet-stream");
        if let Some(key) = api_key {
            builder = builder.header("X-NuGet-ApiKey", key);
        }
        self.send(builder.body(Body::from(package)).unwrap()).await.0
    }
}
