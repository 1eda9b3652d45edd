//! Rate limiting and authentication through the full router.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, StatusCode};
use media_gallery::security::auth::AuthStrategy;
use media_gallery::security::rate_limit::{SharedStore, WindowLimit};
use media_gallery::storage::ObjectStore;

mod common;
use common::*;

#[tokio::test]
async fn test_login_scenario_success_failures_then_throttled() {
    let mut config = test_config();
    config.rate_limit.login = WindowLimit::new(5, 60_000);
    let app = build_app(config, None);

    let ok = send(&app.router, login_request(USERNAME, PASSWORD)).await;
    assert_eq!(ok.status, StatusCode::OK);
    let body = ok.json();
    assert_eq!(body["success"], true);
    assert!(body["token"].as_str().is_some_and(|t| t.split('.').count() == 3));
    assert!(body["expiresAt"].as_u64().is_some());

    for _ in 0..4 {
        let denied = send(&app.router, login_request(USERNAME, "wrong")).await;
        assert_eq!(denied.status, StatusCode::UNAUTHORIZED);
    }

    let throttled = send(&app.router, login_request(USERNAME, PASSWORD)).await;
    assert_eq!(throttled.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(throttled.headers[header::RETRY_AFTER], "60");
    assert_eq!(throttled.json()["code"], "rate_limited");

    app.clock.advance_millis(60_000);
    let after_window = send(&app.router, login_request(USERNAME, PASSWORD)).await;
    assert_eq!(after_window.status, StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_login_body_is_bad_request() {
    let app = build_app(test_config(), None);
    let response = send(
        &app.router,
        request("POST", "/api/login").body(Body::from("{not json")).unwrap(),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_failed_login_is_recorded_in_shared_store() {
    let shared = Arc::new(MapStore::default());
    let app = build_app(test_config(), Some(shared.clone() as Arc<dyn SharedStore>));

    let denied = send(&app.router, login_request("intruder", "guess")).await;
    assert_eq!(denied.status, StatusCode::UNAUTHORIZED);

    let key = format!("login_fail:{CLIENT}:{START_MILLIS}");
    let (value, ttl) = shared.get_raw(&key).expect("failure record written");
    assert_eq!(ttl, 3600);
    let record: serde_json::Value = serde_json::from_str(&value).unwrap();
    assert_eq!(record["username"], "intruder");
    assert_eq!(record["timestamp"], START_MILLIS);
}

#[tokio::test]
async fn test_shared_store_holds_window_records() {
    let shared = Arc::new(MapStore::default());
    let app = build_app(test_config(), Some(shared.clone() as Arc<dyn SharedStore>));

    send(&app.router, request("GET", "/api/list").body(Body::empty()).unwrap()).await;

    let (value, ttl) = shared
        .get_raw(&format!("rate_limit:list:{CLIENT}"))
        .expect("window record written");
    let record: serde_json::Value = serde_json::from_str(&value).unwrap();
    assert_eq!(record["count"], 1);
    assert_eq!(record["resetAt"], START_MILLIS + 60_000);
    assert_eq!(ttl, 60);
}

async fn list_statuses(app: &TestApp, n: usize) -> Vec<StatusCode> {
    let mut statuses = Vec::with_capacity(n);
    for _ in 0..n {
        let response = send(&app.router, request("GET", "/api/list").body(Body::empty()).unwrap()).await;
        statuses.push(response.status);
    }
    statuses
}

#[tokio::test]
async fn test_unreachable_shared_store_gives_identical_decisions() {
    let mut config = test_config();
    config.rate_limit.list = WindowLimit::new(3, 60_000);

    let healthy = build_app(config.clone(), Some(Arc::new(MapStore::default())));
    let degraded = build_app(config, Some(Arc::new(DownStore)));

    let expected = vec![
        StatusCode::OK,
        StatusCode::OK,
        StatusCode::OK,
        StatusCode::TOO_MANY_REQUESTS,
        StatusCode::TOO_MANY_REQUESTS,
    ];
    assert_eq!(list_statuses(&healthy, 5).await, expected);
    assert_eq!(list_statuses(&degraded, 5).await, expected);
}

#[tokio::test]
async fn test_clients_and_classes_are_limited_independently() {
    let mut config = test_config();
    config.rate_limit.list = WindowLimit::new(1, 60_000);
    config.rate_limit.login = WindowLimit::new(1, 60_000);
    let app = build_app(config, None);

    let list = |ip: &'static str| {
        request("GET", "/api/list")
            .header("CF-Connecting-IP", ip)
            .body(Body::empty())
            .unwrap()
    };

    assert_eq!(send(&app.router, list("203.0.113.1")).await.status, StatusCode::OK);
    assert_eq!(
        send(&app.router, list("203.0.113.1")).await.status,
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(send(&app.router, list("203.0.113.2")).await.status, StatusCode::OK);

    // list exhaustion does not consume the login budget
    let login = send(&app.router, login_request(USERNAME, PASSWORD)).await;
    assert_eq!(login.status, StatusCode::OK);
}

#[tokio::test]
async fn test_missing_client_header_shares_unknown_bucket() {
    let mut config = test_config();
    config.rate_limit.list = WindowLimit::new(1, 60_000);
    let app = build_app(config, None);

    let anonymous = || axum::http::Request::builder().uri("/api/list").body(Body::empty()).unwrap();
    assert_eq!(send(&app.router, anonymous()).await.status, StatusCode::OK);
    assert_eq!(send(&app.router, anonymous()).await.status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_disabled_rate_limiting_never_throttles() {
    let mut config = test_config();
    config.rate_limit.enabled = false;
    config.rate_limit.list = WindowLimit::new(1, 60_000);
    let app = build_app(config, None);

    assert!(list_statuses(&app, 5).await.iter().all(|s| *s == StatusCode::OK));
}

#[tokio::test]
async fn test_guest_list_and_invalid_credentials() {
    let app = build_app(test_config(), None);

    let guest = send(&app.router, request("GET", "/api/list").body(Body::empty()).unwrap()).await;
    assert_eq!(guest.status, StatusCode::OK);
    assert_eq!(guest.json(), serde_json::json!([]));

    let bad_token = send(
        &app.router,
        request("GET", "/api/list")
            .header(header::AUTHORIZATION, "Bearer not.a.token")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(bad_token.status, StatusCode::UNAUTHORIZED);

    // raw credentials are not accepted under the token strategy
    let legacy = send(
        &app.router,
        request("GET", "/api/list")
            .header("x-username", USERNAME)
            .header("x-password", PASSWORD)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(legacy.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_guest_read_disabled_requires_credentials() {
    let mut config = test_config();
    config.auth.guest_read = false;
    let app = build_app(config, None);

    let guest = send(&app.router, request("GET", "/api/list").body(Body::empty()).unwrap()).await;
    assert_eq!(guest.status, StatusCode::UNAUTHORIZED);

    let token = login_token(&app).await;
    let owner = send(
        &app.router,
        request("GET", "/api/list")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(owner.status, StatusCode::OK);
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let mut config = test_config();
    config.auth.token_ttl_secs = Some(60);
    let app = build_app(config, None);
    let token = login_token(&app).await;

    app.clock.advance_secs(61);
    let response = send(&app.router, upload_request(Some(&token), multipart_body("a.png", "image/png", b"x", None))).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert!(app.objects.list("").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_legacy_strategy_accepts_headers_and_query() {
    let mut config = test_config();
    config.auth.strategy = AuthStrategy::Legacy;
    config.auth.guest_read = false;
    let app = build_app(config, None);

    let login = send(&app.router, login_request(USERNAME, PASSWORD)).await;
    assert_eq!(login.status, StatusCode::OK);
    assert!(login.json().get("token").is_none());

    let headers = send(
        &app.router,
        request("GET", "/api/list")
            .header("x-username", USERNAME)
            .header("x-password", PASSWORD)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(headers.status, StatusCode::OK);

    let query = send(
        &app.router,
        request("GET", "/api/list?username=owner&password=correct%20horse")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(query.status, StatusCode::OK);

    let wrong = send(
        &app.router,
        request("GET", "/api/list?username=owner&password=nope")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_rotating_secret_on_reload_revokes_tokens() {
    let app = build_app(test_config(), None);
    let old_token = login_token(&app).await;

    let mut rotated = test_config();
    rotated.auth.token_secret = "rotated-secret-fedcba9876543210fedcba".into();
    app.state.reload(rotated);

    let response = send(
        &app.router,
        request("GET", "/api/list")
            .header(header::AUTHORIZATION, format!("Bearer {old_token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let new_token = login_token(&app).await;
    assert_ne!(new_token, old_token);
}
