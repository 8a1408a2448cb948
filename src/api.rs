//! Concrete endpoint handlers and the single axum entry point that feeds
//! every request into the rule-based router.

use crate::{
    app::AppState,
    auth::{Authentication, api_key_credentials, api_key_for},
    error::{RegistryError, bad_request, not_found, unauthorized},
    route::Handler,
    storage::Storage,
};
use async_trait::async_trait;
use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};

pub async fn dispatch(State(state): State<AppState>, req: Request) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let span = tracing::Span::current();
    span.record("method", tracing::field::display(&method));
    span.record("path", tracing::field::display(&path));
    debug!(%method, path, "dispatching request");
    state.router.dispatch(req).await
}

/// Accepts a pushed gem, stores the blob under `gems/` and a metadata
/// document under `info/`. Package-format parsing is deliberately out of
/// scope; the gem name comes from the `name` query parameter when given,
/// otherwise from the content digest.
pub struct PushGem {
    storage: Arc<dyn Storage>,
    max_body_size: usize,
}

impl PushGem {
    pub fn new(storage: Arc<dyn Storage>, max_body_size: usize) -> Self {
        Self {
            storage,
            max_body_size,
        }
    }
}

#[async_trait]
impl Handler for PushGem {
    async fn handle(&self, req: Request<Body>) -> Result<Response, RegistryError> {
        let name_param = query_param(req.uri().query(), "name");
        let bytes = to_bytes(req.into_body(), self.max_body_size)
            .await
            .map_err(|_| {
                RegistryError::http(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    "gem exceeds the maximum allowed size",
                )
            })?;
        if bytes.is_empty() {
            return Err(bad_request("empty gem upload"));
        }

        let digest = hex_digest(&bytes);
        let name = match name_param {
            Some(name) => {
                if name.is_empty() || name.contains('/') || name.contains("..") {
                    return Err(bad_request("invalid gem name"));
                }
                name
            }
            None => digest.clone(),
        };

        self.storage.put(&format!("gems/{name}.gem"), &bytes).await?;
        let doc = json!({
            "name": name,
            "size": bytes.len(),
            "sha256": digest,
            "uploaded_at": chrono::Utc::now().to_rfc3339(),
        });
        self.storage
            .put(&format!("info/{name}.json"), &serde_json::to_vec(&doc)?)
            .await?;

        info!(name, size = bytes.len(), "gem stored");
        Ok(json_response(StatusCode::CREATED, doc))
    }
}

/// Issues the API key for HTTP Basic credentials: the base64 form the
/// client sends back on later requests.
pub struct ApiKeyIssue {
    auth: Arc<dyn Authentication>,
}

impl ApiKeyIssue {
    pub fn new(auth: Arc<dyn Authentication>) -> Self {
        Self { auth }
    }
}

#[async_trait]
impl Handler for ApiKeyIssue {
    async fn handle(&self, req: Request<Body>) -> Result<Response, RegistryError> {
        let Some((login, secret)) = api_key_credentials(req.headers()) else {
            return Err(unauthorized("no credentials provided"));
        };
        let Some(identity) = self.auth.authenticate(&login, &secret).await? else {
            return Err(unauthorized("invalid credentials"));
        };
        debug!(identity = identity.as_str(), "api key issued");
        Ok(text_response(
            StatusCode::OK,
            "text/plain",
            api_key_for(&login, &secret),
        ))
    }
}

/// Serves the stored metadata document for `GET /api/v1/gems/{name}.json`.
pub struct GemInfo {
    storage: Arc<dyn Storage>,
}

impl GemInfo {
    /// Pattern this handler's binding matches on.
    pub const PATH_PATTERN: &'static str = "/api/v1/gems/{spec}";

    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl Handler for GemInfo {
    async fn handle(&self, req: Request<Body>) -> Result<Response, RegistryError> {
        let path = req.uri().path();
        let spec = path.rsplit('/').next().unwrap_or_default();
        let Some(name) = spec.strip_suffix(".json") else {
            return Err(not_found("unsupported metadata format"));
        };
        let Some(doc) = self.storage.get(&format!("info/{name}.json")).await? else {
            return Err(not_found("gem not found"));
        };
        Ok(bytes_response(StatusCode::OK, "application/json", doc))
    }
}

/// Serves the storage object whose key equals the request path.
pub struct Download {
    storage: Arc<dyn Storage>,
}

impl Download {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl Handler for Download {
    async fn handle(&self, req: Request<Body>) -> Result<Response, RegistryError> {
        let key = req.uri().path().trim_start_matches('/').to_string();
        if key.is_empty() || !crate::storage::is_valid_key(&key) {
            return Err(not_found("not found"));
        }
        let Some(bytes) = self.storage.get(&key).await? else {
            return Err(not_found("not found"));
        };
        debug!(key, size = bytes.len(), "serving download");
        Ok(bytes_response(
            StatusCode::OK,
            "application/octet-stream",
            bytes,
        ))
    }
}

/// Responds with a fixed status and an empty body. Backs the 404 fallback.
pub struct StaticStatus(pub StatusCode);

#[async_trait]
impl Handler for StaticStatus {
    async fn handle(&self, _req: Request<Body>) -> Result<Response, RegistryError> {
        Ok(Response::builder()
            .status(self.0)
            .body(Body::empty())
            .map_err(|_| RegistryError::Internal)?)
    }
}

fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn json_response(status: StatusCode, body: Value) -> Response {
    bytes_response(
        status,
        "application/json",
        serde_json::to_vec(&body).unwrap_or_else(|_| b"{}".to_vec()),
    )
}

fn text_response(status: StatusCode, content_type: &str, body: String) -> Response {
    bytes_response(status, content_type, body.into_bytes())
}

fn bytes_response(status: StatusCode, content_type: &str, body: Vec<u8>) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::KeyringAuth, storage::MemStorage};
    use axum::http::Method;
    use std::collections::HashMap;

    fn storage() -> Arc<MemStorage> {
        Arc::new(MemStorage::new())
    }

    fn request(method: Method, uri: &str, body: &[u8]) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body.to_vec()))
            .expect("request")
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body")
            .to_vec()
    }

    #[tokio::test]
    async fn push_stores_gem_and_metadata() {
        let storage = storage();
        let push = PushGem::new(storage.clone(), 1024);

        let response = push
            .handle(request(Method::POST, "/api/v1/gems?name=rails", b"gem bytes"))
            .await
            .expect("push");
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(storage.exists("gems/rails.gem").await.unwrap());

        let doc: Value =
            serde_json::from_slice(&storage.get("info/rails.json").await.unwrap().unwrap())
                .unwrap();
        assert_eq!(doc["name"], "rails");
        assert_eq!(doc["size"], 9);
    }

    #[tokio::test]
    async fn push_rejects_empty_and_oversized_bodies() {
        let push = PushGem::new(storage(), 4);

        let err = push
            .handle(request(Method::POST, "/api/v1/gems", b""))
            .await
            .expect_err("empty");
        assert!(matches!(
            err,
            RegistryError::Http { status, .. } if status == StatusCode::BAD_REQUEST
        ));

        let err = push
            .handle(request(Method::POST, "/api/v1/gems", b"way too big"))
            .await
            .expect_err("oversized");
        assert!(matches!(
            err,
            RegistryError::Http { status, .. } if status == StatusCode::PAYLOAD_TOO_LARGE
        ));
    }

    #[tokio::test]
    async fn push_rejects_traversal_names() {
        let push = PushGem::new(storage(), 1024);
        let err = push
            .handle(request(Method::POST, "/api/v1/gems?name=../evil", b"x"))
            .await
            .expect_err("bad name");
        assert!(matches!(
            err,
            RegistryError::Http { status, .. } if status == StatusCode::BAD_REQUEST
        ));
    }

    #[tokio::test]
    async fn gem_info_serves_stored_doc_and_404s_otherwise() {
        let storage = storage();
        storage
            .put("info/rails.json", br#"{"name":"rails"}"#)
            .await
            .unwrap();
        let info = GemInfo::new(storage);

        let response = info
            .handle(request(Method::GET, "/api/v1/gems/rails.json", b""))
            .await
            .expect("info");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, br#"{"name":"rails"}"#.to_vec());

        let err = info
            .handle(request(Method::GET, "/api/v1/gems/other.json", b""))
            .await
            .expect_err("missing gem");
        assert!(matches!(
            err,
            RegistryError::Http { status, .. } if status == StatusCode::NOT_FOUND
        ));

        let err = info
            .handle(request(Method::GET, "/api/v1/gems/rails.yaml", b""))
            .await
            .expect_err("unsupported format");
        assert!(matches!(
            err,
            RegistryError::Http { status, .. } if status == StatusCode::NOT_FOUND
        ));
    }

    #[tokio::test]
    async fn download_serves_objects_by_path() {
        let storage = storage();
        storage.put("gems/rails.gem", b"gem bytes").await.unwrap();
        let download = Download::new(storage);

        let response = download
            .handle(request(Method::GET, "/gems/rails.gem", b""))
            .await
            .expect("download");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"gem bytes".to_vec());

        let err = download
            .handle(request(Method::GET, "/gems/missing.gem", b""))
            .await
            .expect_err("missing");
        assert!(matches!(
            err,
            RegistryError::Http { status, .. } if status == StatusCode::NOT_FOUND
        ));
    }

    #[tokio::test]
    async fn download_treats_traversal_paths_as_not_found() {
        let download = Download::new(storage());

        for path in ["/../etc/passwd", "/gems/../../etc/passwd"] {
            let err = download
                .handle(request(Method::GET, path, b""))
                .await
                .expect_err("traversal");
            assert!(matches!(
                err,
                RegistryError::Http { status, .. } if status == StatusCode::NOT_FOUND
            ));
        }
    }

    #[tokio::test]
    async fn api_key_issue_requires_valid_credentials() {
        let mut users = HashMap::new();
        users.insert("alice".to_string(), "s3cret".to_string());
        let issue = ApiKeyIssue::new(Arc::new(KeyringAuth::new(users)));

        let mut req = request(Method::GET, "/api/v1/api_key", b"");
        req.headers_mut().insert(
            header::AUTHORIZATION,
            format!("Basic {}", api_key_for("alice", "s3cret"))
                .parse()
                .unwrap(),
        );
        let response = issue.handle(req).await.expect("key");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_bytes(response).await,
            api_key_for("alice", "s3cret").into_bytes()
        );

        let err = issue
            .handle(request(Method::GET, "/api/v1/api_key", b""))
            .await
            .expect_err("no credentials");
        assert!(matches!(
            err,
            RegistryError::Http { status, .. } if status == StatusCode::UNAUTHORIZED
        ));
    }
}
