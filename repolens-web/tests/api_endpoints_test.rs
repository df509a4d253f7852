//! HTTP surface tests against an in-memory engine

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use helpers::{default_context, test_context};
use repolens_core::RepolensConfig;
use repolens_web::create_app;
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_services() {
    let ctx = default_context().await;
    let app = create_app(ctx.state.clone());

    let response = app.oneshot(get("/api/v1/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["services"]["database"], true);
    assert_eq!(body["services"]["queue"], true);
}

#[tokio::test]
async fn ping_pongs() {
    let ctx = default_context().await;
    let app = create_app(ctx.state.clone());

    let response = app.oneshot(get("/api/v1/ping")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["message"], "pong");
}

#[tokio::test]
async fn valid_intake_returns_created_and_is_pollable() {
    let ctx = default_context().await;
    let app = create_app(ctx.state.clone());

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/analyze",
            serde_json::json!({"repository_url": "https://github.com/acme/widgets"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["status"], "queued");
    let analysis_id = body["analysis_id"].as_str().unwrap().to_string();
    assert!(!analysis_id.is_empty());
    assert!(body["estimated_time"].as_u64().unwrap() > 0);

    let response = app
        .oneshot(get(&format!("/api/v1/analysis/{}/status", analysis_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["analysis_id"], analysis_id.as_str());
    let status = body["status"].as_str().unwrap();
    assert!(["queued", "processing", "completed"].contains(&status));
}

#[tokio::test]
async fn invalid_url_yields_validation_error_envelope() {
    let ctx = default_context().await;
    let app = create_app(ctx.state.clone());

    let response = app
        .oneshot(post_json(
            "/api/v1/analyze",
            serde_json::json!({"repository_url": "https://example.com/x"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"], "ValidationError");
    assert_eq!(body["status_code"], 400);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn out_of_range_options_are_rejected() {
    let ctx = default_context().await;
    let app = create_app(ctx.state.clone());

    let response = app
        .oneshot(post_json(
            "/api/v1/analyze",
            serde_json::json!({
                "repository_url": "https://github.com/acme/widgets",
                "options": {"maxFileSizeKB": 0}
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "ValidationError");
}

#[tokio::test]
async fn unknown_analysis_id_is_404() {
    let ctx = default_context().await;
    let app = create_app(ctx.state.clone());

    let response = app
        .clone()
        .oneshot(get("/api/v1/analysis/does-not-exist/status"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "NotFoundError");

    let response = app
        .oneshot(get("/api/v1/analysis/does-not-exist/tree"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn tree_is_404_until_completed_then_available() {
    let ctx = default_context().await;
    let app = create_app(ctx.state.clone());

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/analyze",
            serde_json::json!({"repository_url": "https://github.com/acme/widgets"}),
        ))
        .await
        .unwrap();
    let analysis_id = body_json(response).await["analysis_id"]
        .as_str()
        .unwrap()
        .to_string();

    // Not completed yet (or racing): the tree may 404 but never 500
    let response = app
        .clone()
        .oneshot(get(&format!("/api/v1/analysis/{}/tree", analysis_id)))
        .await
        .unwrap();
    assert!(
        response.status() == StatusCode::NOT_FOUND || response.status() == StatusCode::OK,
        "unexpected status {}",
        response.status()
    );

    // Wait for the background pipeline to finish; polled through the
    // service to keep the HTTP rate budget untouched
    let mut completed = false;
    for _ in 0..500 {
        let (record, _) = ctx.state.service.status(&analysis_id).await.unwrap();
        if record.status == repolens_core::AnalysisStatus::Completed {
            completed = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(completed, "analysis never completed");

    let response = app
        .oneshot(get(&format!("/api/v1/analysis/{}/tree", analysis_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["statistics"]["totalFiles"], 2);
    assert_eq!(body["statistics"]["languageBreakdown"]["typescript"], 1);
    assert_eq!(body["statistics"]["languageBreakdown"]["python"], 1);
    assert!(body["statistics"]["sizeBreakdown"]["averageFileSize"].as_i64().unwrap() > 0);
    assert_eq!(body["root"]["type"], "directory");
}

#[tokio::test]
async fn list_pagination_is_validated() {
    let ctx = default_context().await;
    let app = create_app(ctx.state.clone());

    let response = app.clone().oneshot(get("/api/v1/analyses")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total"], 0);
    assert_eq!(body["page"], 1);
    assert!(body["analyses"].as_array().unwrap().is_empty());

    for uri in [
        "/api/v1/analyses?limit=0",
        "/api/v1/analyses?limit=101",
        "/api/v1/analyses?limit=abc",
        "/api/v1/analyses?offset=-2",
        "/api/v1/analyses?status=bogus",
    ] {
        let response = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "uri: {}", uri);
        let body = body_json(response).await;
        assert_eq!(body["error"], "ValidationError");
    }
}

#[tokio::test]
async fn delete_is_404_for_unknown_and_idempotent_at_boundary() {
    let ctx = default_context().await;
    let app = create_app(ctx.state.clone());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/v1/analysis/missing")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn strict_limiter_caps_analysis_intake() {
    let ctx = default_context().await;
    let app = create_app(ctx.state.clone());

    let mut created = 0;
    let mut limited = 0;
    for _ in 0..11 {
        let response = app
            .clone()
            .oneshot(post_json(
                "/api/v1/analyze",
                serde_json::json!({"repository_url": "https://github.com/acme/widgets"}),
            ))
            .await
            .unwrap();
        match response.status() {
            StatusCode::CREATED => created += 1,
            StatusCode::TOO_MANY_REQUESTS => {
                let body = body_json(response).await;
                assert_eq!(body["error"], "RateLimitError");
                limited += 1;
            }
            other => panic!("unexpected status {}", other),
        }
    }

    assert_eq!(created, 10);
    assert!(limited >= 1);

    // Read endpoints stay unaffected by the strict limiter
    let response = app.oneshot(get("/api/v1/analyses")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn api_key_gate_when_configured() {
    let config = RepolensConfig {
        api_key: Some("sekrit".to_string()),
        ..Default::default()
    };
    let ctx = test_context(config).await;
    let app = create_app(ctx.state.clone());

    let response = app.clone().oneshot(get("/api/v1/ping")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/ping")
                .header("x-api-key", "wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/ping")
                .header("x-api-key", "sekrit")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
