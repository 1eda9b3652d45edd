//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use media_gallery::config::{GalleryConfig, StorageBackend};
use media_gallery::http::{AppState, HttpServer};
use media_gallery::security::audit::LoginAudit;
use media_gallery::security::clock::{Clock, ManualClock};
use media_gallery::security::rate_limit::{RateLimiter, SharedStore, StoreUnavailable};
use media_gallery::storage::{MemoryObjectStore, ObjectStore};

pub const USERNAME: &str = "owner";
pub const PASSWORD: &str = "correct horse";
pub const TOKEN_SECRET: &str = "integration-secret-0123456789abcdef";
pub const START_MILLIS: u64 = 1_700_000_000_000;
pub const CLIENT: &str = "198.51.100.10";

pub fn test_config() -> GalleryConfig {
    let mut config = GalleryConfig::default();
    config.auth.username = USERNAME.into();
    config.auth.password = PASSWORD.into();
    config.auth.token_secret = TOKEN_SECRET.into();
    config.storage.backend = StorageBackend::Memory;
    config
}

/// Key-value store kept in a map. TTLs are recorded but not enforced.
#[derive(Default)]
pub struct MapStore {
    pub entries: Mutex<HashMap<String, (String, u64)>>,
}

impl MapStore {
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let entries = self.entries.lock().unwrap();
        let mut keys: Vec<_> = entries.keys().filter(|k| k.starts_with(prefix)).cloned().collect();
        keys.sort();
        keys
    }

    pub fn get_raw(&self, key: &str) -> Option<(String, u64)> {
        self.entries.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl SharedStore for MapStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreUnavailable> {
        Ok(self.entries.lock().unwrap().get(key).map(|(v, _)| v.clone()))
    }

    async fn put(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), StoreUnavailable> {
        self.entries.lock().unwrap().insert(key.to_string(), (value, ttl_secs));
        Ok(())
    }
}

/// A store whose every call fails, like an unreachable Redis.
pub struct DownStore;

#[async_trait]
impl SharedStore for DownStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreUnavailable> {
        Err(StoreUnavailable("connection refused".into()))
    }

    async fn put(&self, _key: &str, _value: String, _ttl_secs: u64) -> Result<(), StoreUnavailable> {
        Err(StoreUnavailable("connection refused".into()))
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub clock: ManualClock,
    pub objects: Arc<MemoryObjectStore>,
}

pub fn build_app(config: GalleryConfig, shared: Option<Arc<dyn SharedStore>>) -> TestApp {
    let clock = ManualClock::new(START_MILLIS);
    let dyn_clock: Arc<dyn Clock> = Arc::new(clock.clone());
    let timeout = Duration::from_millis(200);

    let limiter = Arc::new(RateLimiter::new(shared.clone(), dyn_clock.clone(), timeout));
    let audit = Arc::new(LoginAudit::new(shared, dyn_clock.clone(), timeout));
    let objects = Arc::new(MemoryObjectStore::new(dyn_clock.clone()));
    let store: Arc<dyn ObjectStore> = objects.clone();

    let state = AppState::new(config, limiter, store, audit, dyn_clock);
    let router = HttpServer::new(state.clone()).router();
    TestApp {
        router,
        state,
        clock,
        objects,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec();
    TestResponse { status, headers, body }
}

pub fn request(method: &str, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("CF-Connecting-IP", CLIENT)
}

pub fn login_request(username: &str, password: &str) -> Request<Body> {
    let body = serde_json::json!({ "username": username, "password": password });
    request("POST", "/api/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Log in with the configured credentials and return the bearer token.
pub async fn login_token(app: &TestApp) -> String {
    let response = send(&app.router, login_request(USERNAME, PASSWORD)).await;
    assert_eq!(response.status, StatusCode::OK);
    response.json()["token"].as_str().unwrap().to_string()
}

pub const BOUNDARY: &str = "gallery-test-boundary";

/// Encode a multipart upload form with a `file` field and optional `path`.
pub fn multipart_body(file_name: &str, content_type: &str, data: &[u8], path: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(b"\r\n");
    if let Some(path) = path {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"path\"\r\n\r\n{path}\r\n").as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn upload_request(token: Option<&str>, body: Vec<u8>) -> Request<Body> {
    let mut builder = request("POST", "/api/upload").header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={BOUNDARY}"),
    );
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body)).unwrap()
}

pub fn delete_request(token: &str, body: Value) -> Request<Body> {
    request("DELETE", "/api/upload")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}
