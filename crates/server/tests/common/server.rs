//! Server test utilities.

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use depot_core::config::{AppConfig, MetadataConfig, StorageConfig};
use depot_metadata::{MetadataStore, SqliteStore};
use depot_server::{AppState, create_router};
use depot_signer::MessageSigner;
use depot_storage::{FilesystemBackend, ObjectStore};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// Address presented for requests from the co-located registrar.
pub const LOOPBACK_PEER: ([u8; 4], u16) = ([127, 0, 0, 1], 40000);

/// Address presented for requests from anywhere else.
pub const REMOTE_PEER: ([u8; 4], u16) = ([203, 0, 113, 7], 40000);

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

/// A registered user holding a live session token.
#[allow(dead_code)]
pub struct TestUser {
    pub name: String,
    pub signer: MessageSigner,
    pub token: String,
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
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let storage_path = temp_dir.path().join("storage");
        let storage: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );

        let db_path = temp_dir.path().join("metadata.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path, None)
                .await
                .expect("Failed to create metadata store"),
        );

        let mut config = AppConfig {
            storage: StorageConfig::Filesystem { path: storage_path },
            metadata: MetadataConfig::Sqlite {
                path: db_path,
                query_timeout_secs: None,
            },
            ..AppConfig::for_testing()
        };
        modifier(&mut config);

        let state = AppState::new(config, storage, metadata);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Get access to the underlying storage.
    pub fn storage(&self) -> Arc<dyn ObjectStore> {
        self.state.storage.clone()
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

    /// GET `uri` and return the body as text.
    pub async fn get_text(&self, uri: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, body) = self.send(request).await;
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    /// GET `uri` and parse the body as JSON. Non-JSON bodies become `Null`.
    pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, body) = self.send(request).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    /// POST a urlencoded form as if sent from `peer`.
    pub async fn post_form(
        &self,
        uri: &str,
        fields: &[(&str, &str)],
        peer: ([u8; 4], u16),
    ) -> (StatusCode, String) {
        let body = form_urlencode(fields);
        let mut request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(peer)));
        let (status, body) = self.send(request).await;
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    /// Register `name` from loopback with an optional quota, without logging in.
    pub async fn register(&self, name: &str, quota: Option<i64>) -> MessageSigner {
        let signer = MessageSigner::generate(name);
        let key = signer.public_key();
        let quota = quota.map(|q| q.to_string());

        let mut fields = vec![("name", name), ("key", key.as_str())];
        if let Some(quota) = &quota {
            fields.push(("quota", quota.as_str()));
        }
        let (status, body) = self
            .post_form("/rest/auth/register", &fields, LOOPBACK_PEER)
            .await;
        assert_eq!(status, StatusCode::OK, "registration failed: {body}");
        assert_eq!(body, name);
        signer
    }

    /// Run the challenge-response exchange and return the session token.
    pub async fn login(&self, name: &str, signer: &MessageSigner) -> String {
        let (status, challenge) = self.get_text(&format!("/rest/auth/token?user={name}")).await;
        assert_eq!(status, StatusCode::OK, "challenge failed: {challenge}");

        let message = signer.sign(&challenge);
        let (status, token) = self
            .post_form(
                "/rest/auth/token",
                &[("user", name), ("message", &message)],
                REMOTE_PEER,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "token exchange failed: {token}");
        token
    }

    /// Register and log in a user.
    pub async fn user(&self, name: &str, quota: Option<i64>) -> TestUser {
        let signer = self.register(name, quota).await;
        let token = self.login(name, &signer).await;
        TestUser {
            name: name.to_string(),
            signer,
            token,
        }
    }

    /// Upload `data` as `filename` into `repo` with extra form fields.
    pub async fn upload(
        &self,
        repo: &str,
        token: Option<&str>,
        filename: &str,
        data: &[u8],
        fields: &[(&str, &str)],
    ) -> (StatusCode, Value) {
        let (content_type, body) = multipart_body(Some((filename, data)), fields);
        let mut builder = Request::builder()
            .method("POST")
            .uri(format!("/rest/{repo}"))
            .header("content-type", content_type);
        if let Some(token) = token {
            builder = builder.header("token", token);
        }
        let (status, body) = self.send(builder.body(Body::from(body)).unwrap()).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    /// Bytes of quota `name` has used so far.
    pub async fn quota_used(&self, name: &str) -> i64 {
        self.metadata()
            .get_user(name)
            .await
            .unwrap()
            .expect("user exists")
            .quota_used
    }
}

const BOUNDARY: &str = "depot-test-boundary";

/// Build a multipart/form-data body. The file part, if any, comes last.
#[allow(dead_code)]
pub fn multipart_body(file: Option<(&str, &[u8])>, fields: &[(&str, &str)]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((filename, data)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

/// Minimal `application/x-www-form-urlencoded` encoding.
fn form_urlencode(fields: &[(&str, &str)]) -> String {
    fn encode(value: &str) -> String {
        let mut out = String::with_capacity(value.len());
        for byte in value.bytes() {
            match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                    out.push(byte as char)
                }
                _ => out.push_str(&format!("%{byte:02X}")),
            }
        }
        out
    }
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}
