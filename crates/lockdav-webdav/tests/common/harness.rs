//! Test server harness for WebDAV integration tests.
//!
//! Provides a `TestServer` serving a temporary directory through
//! `LocalFs`, along with HTTP convenience methods.

use bytes::Bytes;
use lockdav_vfs::LocalFs;
use lockdav_webdav::{DavDispatcher, LockConfig, LockManager, ServerConfig, WebDavServer};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// URL-encode a path for use in Destination and If headers.
fn url_encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// `lockinfo` body for a write lock of `scope` ("exclusive" or "shared").
pub fn lockinfo(scope: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<D:lockinfo xmlns:D="DAV:">
  <D:lockscope><D:{scope}/></D:lockscope>
  <D:locktype><D:write/></D:locktype>
  <D:owner><D:href>mailto:tester@example.org</D:href></D:owner>
</D:lockinfo>"#
    )
}

/// Test server with HTTP client and automatic cleanup.
pub struct TestServer {
    /// The running WebDAV server.
    server: WebDavServer,
    /// HTTP client for making requests.
    client: Client,
    /// Base URL for the server.
    pub base_url: String,
    /// Served directory (cleaned up on drop).
    temp_dir: TempDir,
}

impl TestServer {
    /// Start a server over a fresh temporary directory.
    pub async fn new() -> Self {
        Self::with_options(LockConfig::default(), "").await
    }

    /// Start a server with lock settings and a mount prefix.
    pub async fn with_options(locks: LockConfig, prefix: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let fs = LocalFs::new(temp_dir.path());
        let dispatcher = DavDispatcher::new(Arc::new(fs), Arc::new(LockManager::new(locks)));

        let config = ServerConfig {
            prefix: prefix.to_string(),
            ..ServerConfig::default()
        };
        let server = WebDavServer::start(dispatcher, config)
            .await
            .expect("Failed to start WebDAV server");

        let base_url = server.url();

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        let test_server = Self {
            server,
            client,
            base_url,
            temp_dir,
        };

        test_server.wait_ready().await;

        test_server
    }

    /// Wait for the server to be ready to accept connections.
    async fn wait_ready(&self) {
        for _ in 0..50 {
            if let Ok(resp) = self
                .client
                .request(Method::from_bytes(b"PROPFIND").unwrap(), self.url("/"))
                .header("Depth", "0")
                .send()
                .await
                && resp.status() == StatusCode::MULTI_STATUS
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("Server did not become ready in time");
    }

    /// Build a full URL from a path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Build a URL-encoded URL for use in Destination and If headers.
    pub fn url_encoded(&self, path: &str) -> String {
        format!("{}{}", self.base_url, url_encode_path(path))
    }

    /// The directory being served.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        self.server.lock_manager()
    }

    /// Start a request with an arbitrary method.
    pub fn request(&self, method: &str, path: &str) -> RequestBuilder {
        self.client
            .request(Method::from_bytes(method.as_bytes()).unwrap(), self.url(path))
    }

    // ========== HTTP Convenience Methods ==========

    /// GET a file's contents.
    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET request failed")
    }

    /// GET a file's contents as bytes.
    pub async fn get_bytes(&self, path: &str) -> Result<Bytes, (StatusCode, String)> {
        let resp = self.get(path).await;
        let status = resp.status();
        if status.is_success() {
            Ok(resp.bytes().await.expect("Failed to read response bytes"))
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err((status, body))
        }
    }

    /// PUT file contents.
    pub async fn put(&self, path: &str, body: impl Into<reqwest::Body>) -> Response {
        self.client
            .put(self.url(path))
            .body(body)
            .send()
            .await
            .expect("PUT request failed")
    }

    /// PUT file contents and assert success.
    pub async fn put_ok(&self, path: &str, body: impl Into<reqwest::Body>) {
        let resp = self.put(path, body).await;
        let status = resp.status();
        assert!(
            status == StatusCode::CREATED || status == StatusCode::NO_CONTENT,
            "PUT {path} failed with status {status}"
        );
    }

    /// DELETE a file or directory.
    pub async fn delete(&self, path: &str) -> Response {
        self.client
            .delete(self.url(path))
            .send()
            .await
            .expect("DELETE request failed")
    }

    /// DELETE and assert success.
    pub async fn delete_ok(&self, path: &str) {
        let status = self.delete(path).await.status();
        assert_eq!(status, StatusCode::NO_CONTENT, "DELETE {path} failed");
    }

    /// MKCOL (create directory).
    pub async fn mkcol(&self, path: &str) -> Response {
        self.request("MKCOL", path)
            .send()
            .await
            .expect("MKCOL request failed")
    }

    /// MKCOL and assert success.
    pub async fn mkcol_ok(&self, path: &str) {
        let status = self.mkcol(path).await.status();
        assert_eq!(status, StatusCode::CREATED, "MKCOL {path} failed");
    }

    /// PROPFIND (list directory or get properties).
    pub async fn propfind(&self, path: &str, depth: &str) -> Response {
        self.request("PROPFIND", path)
            .header("Depth", depth)
            .send()
            .await
            .expect("PROPFIND request failed")
    }

    /// PROPFIND and return body as string.
    pub async fn propfind_body(&self, path: &str, depth: &str) -> (StatusCode, String) {
        let resp = self.propfind(path, depth).await;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        (status, body)
    }

    /// COPY a file or directory.
    pub async fn copy(&self, from: &str, to: &str, overwrite: bool) -> Response {
        self.request("COPY", from)
            .header("Destination", self.url_encoded(to))
            .header("Overwrite", if overwrite { "T" } else { "F" })
            .send()
            .await
            .expect("COPY request failed")
    }

    /// COPY and assert success.
    pub async fn copy_ok(&self, from: &str, to: &str) {
        let status = self.copy(from, to, true).await.status();
        assert!(
            status == StatusCode::CREATED || status == StatusCode::NO_CONTENT,
            "COPY {from} -> {to} failed with status {status}"
        );
    }

    /// MOVE a file or directory.
    pub async fn move_(&self, from: &str, to: &str, overwrite: bool) -> Response {
        self.request("MOVE", from)
            .header("Destination", self.url_encoded(to))
            .header("Overwrite", if overwrite { "T" } else { "F" })
            .send()
            .await
            .expect("MOVE request failed")
    }

    /// MOVE and assert success.
    pub async fn move_ok(&self, from: &str, to: &str) {
        let status = self.move_(from, to, true).await.status();
        assert!(
            status == StatusCode::CREATED || status == StatusCode::NO_CONTENT,
            "MOVE {from} -> {to} failed with status {status}"
        );
    }

    /// LOCK with a `lockinfo` body.
    pub async fn lock(&self, path: &str, scope: &str, depth: &str) -> Response {
        self.request("LOCK", path)
            .header("Depth", depth)
            .header("Content-Type", "text/xml")
            .body(lockinfo(scope))
            .send()
            .await
            .expect("LOCK request failed")
    }

    /// LOCK and return the `Lock-Token` header value (with angle brackets).
    pub async fn lock_ok(&self, path: &str, scope: &str, depth: &str) -> String {
        let resp = self.lock(path, scope, depth).await;
        assert_eq!(resp.status(), StatusCode::MULTI_STATUS, "LOCK {path} failed");
        resp.headers()
            .get("Lock-Token")
            .unwrap_or_else(|| panic!("LOCK {path} returned no Lock-Token"))
            .to_str()
            .unwrap()
            .to_string()
    }

    /// UNLOCK with a `Lock-Token` header value.
    pub async fn unlock(&self, path: &str, token: &str) -> Response {
        self.request("UNLOCK", path)
            .header("Lock-Token", token)
            .send()
            .await
            .expect("UNLOCK request failed")
    }

    /// Stop the server explicitly (otherwise happens on drop).
    pub async fn stop(self) {
        self.server.stop().await;
    }
}

/// `If` header value presenting `token` for the request URI.
pub fn if_token(token: &str) -> String {
    format!("({token})")
}
