use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use gemgate::{app::build_router, auth::api_key_for, config::Config, runtime};
use http_body_util::BodyExt;
use std::{collections::HashMap, path::PathBuf};
use tempfile::TempDir;
use tower::ServiceExt;

fn closed_config(data_dir: PathBuf) -> Config {
    let mut cfg = Config::defaults();
    cfg.data_dir = data_dir;
    cfg.users = HashMap::from([("alice".to_string(), "s3cret".to_string())]);
    cfg
}

fn test_app(config: &Config) -> axum::Router {
    build_router(runtime::build_state(config).expect("state"))
}

async fn get_api_key(app: axum::Router, authorization: Option<&str>) -> (StatusCode, String) {
    let mut builder = Request::builder().method(Method::GET).uri("/api/v1/api_key");
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    let response = app
        .oneshot(builder.body(Body::empty()).expect("request"))
        .await
        .expect("response");
    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    (status, String::from_utf8_lossy(&body).into_owned())
}

#[tokio::test]
async fn api_key_round_trip_issues_a_usable_key() {
    let dir = TempDir::new().expect("tempdir");
    let cfg = closed_config(dir.path().to_path_buf());

    let basic = format!("Basic {}", api_key_for("alice", "s3cret"));
    let (status, key) = get_api_key(test_app(&cfg), Some(&basic)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(key, api_key_for("alice", "s3cret"));

    // default grants allow any authenticated user to push
    let response = test_app(&cfg)
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/v1/gems?name=rake")
                .header(header::AUTHORIZATION, key)
                .body(Body::from(&b"gem bytes"[..]))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn api_key_requires_valid_credentials() {
    let dir = TempDir::new().expect("tempdir");
    let cfg = closed_config(dir.path().to_path_buf());

    let (status, _) = get_api_key(test_app(&cfg), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let wrong = format!("Basic {}", api_key_for("alice", "wrong"));
    let (status, _) = get_api_key(test_app(&cfg), Some(&wrong)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn open_access_mode_serves_anonymous_callers() {
    let dir = TempDir::new().expect("tempdir");
    let mut cfg = closed_config(dir.path().to_path_buf());
    cfg.open_access = true;
    cfg.users.clear();

    // push without any credentials
    let response = test_app(&cfg)
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/v1/gems?name=rails")
                .body(Body::from(&b"gem bytes"[..]))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);

    // and download it back, still anonymous
    let response = test_app(&cfg)
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri("/gems/rails.gem")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    assert_eq!(body.as_ref(), b"gem bytes");
}

#[tokio::test]
async fn closed_mode_with_no_users_rejects_everyone() {
    let dir = TempDir::new().expect("tempdir");
    let mut cfg = closed_config(dir.path().to_path_buf());
    cfg.users.clear();

    let key = api_key_for("anyone", "anything");
    let response = test_app(&cfg)
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri("/gems/rails.gem")
                .header(header::AUTHORIZATION, key)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
