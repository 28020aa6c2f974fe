//! HTTP gateway tests driven in-process through the router.
//!
//! Each test builds a fresh app over a temp index seeded by the real ingest
//! path, then exercises endpoints with `tower::ServiceExt::oneshot`. The
//! hash embedding provider and extractive generator keep everything offline
//! and deterministic.

use std::fs;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const TEST_SECRET: &str = "api-test-secret";

async fn test_app() -> (TempDir, Router) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();

    let docs = root.join("docs");
    fs::create_dir_all(docs.join("finance")).unwrap();
    fs::create_dir_all(docs.join("marketing")).unwrap();
    fs::write(
        docs.join("finance/budget.md"),
        "The Q1 budget was approved at 4 million dollars.",
    )
    .unwrap();
    fs::write(
        docs.join("marketing/campaign.md"),
        "The spring campaign launches in April.",
    )
    .unwrap();

    let config_path = root.join("rolegate.toml");
    fs::write(
        &config_path,
        format!(
            r#"[index]
path = "{}/index.sqlite"

[auth]
secret = "{}"

[embedding]
provider = "hash"
dims = 128
"#,
            root.display(),
            TEST_SECRET
        ),
    )
    .unwrap();

    let config = rolegate::config::load_config(&config_path).unwrap();
    rolegate::ingest::run_ingest(&config, &docs, false)
        .await
        .unwrap();

    let state = rolegate::server::build_state(config).await.unwrap();
    (tmp, rolegate::server::build_router(state))
}

async fn send(
    app: &Router,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn post_json(app: &Router, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
    send(app, "POST", path, token, Some(body)).await
}

async fn get_json(app: &Router, path: &str, token: Option<&str>) -> (StatusCode, Value) {
    send(app, "GET", path, token, None).await
}

async fn signup_and_login(app: &Router, username: &str, role: &str, password: &str) -> String {
    let (status, body) = post_json(
        app,
        "/auth/signup",
        None,
        json!({"username": username, "role": role, "password": password}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "signup failed: {}", body);

    let (status, body) = post_json(
        app,
        "/auth/login",
        None,
        json!({"username": username, "password": password}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    body["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_version() {
    let (_tmp, app) = test_app().await;

    let (status, body) = get_json(&app, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(!body["version"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn signup_login_collections_query_flow() {
    let (_tmp, app) = test_app().await;

    let (status, body) = post_json(
        &app,
        "/auth/signup",
        None,
        json!({"username": "alice", "role": "Finance", "password": "pw123"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["msg"], "user alice created with role Finance");

    let (status, body) = post_json(
        &app,
        "/auth/login",
        None,
        json!({"username": "alice", "password": "pw123"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "bearer");
    assert_eq!(body["role"], "Finance");
    let token = body["access_token"].as_str().unwrap().to_string();
    assert!(!token.is_empty());

    let (status, body) = get_json(&app, "/me/collections", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
    assert_eq!(body["role"], "Finance");
    assert_eq!(
        body["allowed_collections"],
        json!(["finance_docs", "general_docs"])
    );

    let (status, body) = post_json(
        &app,
        "/rag/query",
        Some(&token),
        json!({"question": "What is the Q1 budget?"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "query failed: {}", body);
    assert_eq!(body["role"], "Finance");
    assert_eq!(body["question"], "What is the Q1 budget?");
    assert!(body["answer"].as_str().unwrap().contains("4 million"));
    let sources = body["sources"].as_array().unwrap();
    assert!(!sources.is_empty());
    for source in sources {
        assert_eq!(source["role"], "Finance");
        assert!(!source["content_snippet"].as_str().unwrap().is_empty());
    }
}

#[tokio::test]
async fn duplicate_signup_rejected() {
    let (_tmp, app) = test_app().await;

    let req = json!({"username": "bob", "role": "Finance", "password": "pw"});
    let (status, _) = post_json(&app, "/auth/signup", None, req.clone()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post_json(&app, "/auth/signup", None, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(body["error"]["message"], "User already exists");
}

#[tokio::test]
async fn signup_rejects_blank_fields() {
    let (_tmp, app) = test_app().await;

    let (status, body) = post_json(
        &app,
        "/auth/signup",
        None,
        json!({"username": "  ", "role": "Finance", "password": "pw"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn login_rejects_wrong_password() {
    let (_tmp, app) = test_app().await;
    signup_and_login(&app, "carol", "Finance", "right-pw").await;

    let (status, body) = post_json(
        &app,
        "/auth/login",
        None,
        json!({"username": "carol", "password": "wrong-pw"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");
    assert_eq!(body["error"]["message"], "Invalid username or password");
}

#[tokio::test]
async fn login_rejects_unknown_user() {
    let (_tmp, app) = test_app().await;

    let (status, body) = post_json(
        &app,
        "/auth/login",
        None,
        json!({"username": "nobody", "password": "pw"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "Invalid username or password");
}

#[tokio::test]
async fn query_requires_token() {
    let (_tmp, app) = test_app().await;

    let (status, body) = post_json(&app, "/rag/query", None, json!({"question": "hi?"})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn query_rejects_garbage_token() {
    let (_tmp, app) = test_app().await;

    let (status, body) = post_json(
        &app,
        "/rag/query",
        Some("abc.def.ghi"),
        json!({"question": "hi?"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "Invalid or expired token");
}

#[tokio::test]
async fn query_rejects_expired_token() {
    let (_tmp, app) = test_app().await;
    signup_and_login(&app, "dave", "Finance", "pw").await;

    // Same secret as the app, but a TTL that puts exp in the past.
    let stale = rolegate::token::TokenService::new(TEST_SECRET, -5);
    let token = stale.issue("dave", "Finance").unwrap();

    let (status, body) = post_json(
        &app,
        "/rag/query",
        Some(&token),
        json!({"question": "hi?"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "Invalid or expired token");
}

#[tokio::test]
async fn malformed_authorization_header_rejected() {
    let (_tmp, app) = test_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/rag/query")
        .header(header::AUTHORIZATION, "Token abc")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"question": "hi?"}).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["message"], "Malformed Authorization header");
}

#[tokio::test]
async fn query_with_unmapped_role_forbidden() {
    let (_tmp, app) = test_app().await;
    let token = signup_and_login(&app, "erin", "Intern", "pw").await;

    let (status, body) = post_json(
        &app,
        "/rag/query",
        Some(&token),
        json!({"question": "What is the Q1 budget?"}),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "forbidden");
    assert_eq!(body["error"]["message"], "User role missing");
}

#[tokio::test]
async fn query_rejects_empty_question() {
    let (_tmp, app) = test_app().await;
    let token = signup_and_login(&app, "frank", "Finance", "pw").await;

    let (status, body) = post_json(&app, "/rag/query", Some(&token), json!({"question": "  "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn query_isolates_collections_between_roles() {
    let (_tmp, app) = test_app().await;
    let token = signup_and_login(&app, "mallory", "Marketing", "pw").await;

    // Same question a Finance user would ask; the finance figure must not
    // leak into a Marketing-scoped answer or its citations.
    let (status, body) = post_json(
        &app,
        "/rag/query",
        Some(&token),
        json!({"question": "What is the Q1 budget?"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "query failed: {}", body);
    assert!(!body["answer"].as_str().unwrap().contains("4 million"));
    for source in body["sources"].as_array().unwrap() {
        assert_eq!(source["role"], "Marketing");
    }
}

#[tokio::test]
async fn collections_endpoint_reports_unmapped_role_as_empty() {
    let (_tmp, app) = test_app().await;
    let token = signup_and_login(&app, "gina", "Intern", "pw").await;

    let (status, body) = get_json(&app, "/me/collections", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed_collections"], json!([]));
}
