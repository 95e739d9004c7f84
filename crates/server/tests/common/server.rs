//! Server test utilities.

use archivo_core::config::{AppConfig, BlobConfig, MetadataConfig, StorageConfig};
use archivo_metadata::{MetadataStore, SqliteStore};
use archivo_server::{AppState, create_router};
use archivo_storage::{BlobStore, ChunkedBlobStore, FilesystemBackend, ObjectStore};
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// Chunk size used by test servers so small payloads span several chunks.
pub const TEST_CHUNK_SIZE: u64 = 4096;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    /// Object store underneath the blob store, for inspecting leftovers.
    pub objects: Arc<dyn ObjectStore>,
    pub metadata: Arc<dyn MetadataStore>,
    _temp_dir: TempDir,
}

/// A collected HTTP response.
#[allow(dead_code)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[allow(dead_code)]
impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::build(|_| {}, |metadata| metadata).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        Self::build(modifier, |metadata| metadata).await
    }

    /// Create a test server whose metadata store is wrapped, e.g. to inject failures.
    pub async fn with_metadata<W>(wrap: W) -> Self
    where
        W: FnOnce(Arc<dyn MetadataStore>) -> Arc<dyn MetadataStore>,
    {
        Self::build(|_| {}, wrap).await
    }

    async fn build<F, W>(modifier: F, wrap: W) -> Self
    where
        F: FnOnce(&mut AppConfig),
        W: FnOnce(Arc<dyn MetadataStore>) -> Arc<dyn MetadataStore>,
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let storage_path = temp_dir.path().join("storage");
        let objects: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );

        let db_path = temp_dir.path().join("metadata.db");
        let sqlite: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path, None)
                .await
                .expect("Failed to create metadata store"),
        );
        let metadata = wrap(sqlite);

        let mut config = AppConfig {
            storage: StorageConfig::Filesystem {
                path: storage_path.clone(),
            },
            blobs: BlobConfig {
                chunk_size_bytes: TEST_CHUNK_SIZE,
            },
            metadata: MetadataConfig::Sqlite {
                path: db_path,
                query_timeout_secs: None,
            },
            ..AppConfig::for_testing()
        };
        modifier(&mut config);

        let blobs: Arc<dyn BlobStore> = Arc::new(ChunkedBlobStore::new(
            objects.clone(),
            config.blobs.chunk_size_bytes,
        ));
        let state = AppState::new(config, blobs, metadata.clone());
        let router = create_router(state.clone());

        Self {
            router,
            state,
            objects,
            metadata,
            _temp_dir: temp_dir,
        }
    }

    /// Send a request through the router and collect the response.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// GET with an optional bearer credential.
    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(request("GET", uri, token, Body::empty())).await
    }

    /// DELETE with an optional bearer credential.
    pub async fn delete(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(request("DELETE", uri, token, Body::empty()))
            .await
    }

    /// Upload `data` as a multipart form for case `case`.
    pub async fn upload(
        &self,
        token: &str,
        case: Option<&str>,
        filename: &str,
        data: &[u8],
    ) -> TestResponse {
        let (content_type, body) = crate::common::fixtures::multipart_form(case, filename, data);
        let req = Request::builder()
            .method("POST")
            .uri("/documentos")
            .header("Authorization", format!("Bearer {token}"))
            .header("Content-Type", content_type)
            .body(Body::from(body))
            .unwrap();
        self.send(req).await
    }

    /// Upload and return the new document id, asserting success.
    pub async fn upload_ok(&self, token: &str, case: i64, data: &[u8]) -> String {
        let response = self
            .upload(token, Some(&case.to_string()), "doc.pdf", data)
            .await;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.json());
        response.json()["doc_id"]
            .as_str()
            .expect("doc_id in upload response")
            .to_string()
    }

    /// Number of objects left under the blob prefix.
    pub async fn stored_objects(&self) -> usize {
        self.objects.list("blobs/").await.unwrap().len()
    }
}

/// Build a request with an optional bearer credential.
#[allow(dead_code)]
pub fn request(method: &str, uri: &str, token: Option<&str>, body: Body) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    builder.body(body).unwrap()
}
