//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

mod proposals;

use crate::config::Settings;
use crate::state::SharedState;
use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::Level;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, settings: &Settings) -> Router {
    // Build CORS layer
    let cors = build_cors_layer(settings);

    // Build tracing/logging layer
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Build middleware stack
    let middleware = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    Router::new()
        // Health check
        .route("/health", get(health_check))

        // Proposals
        .route(
            "/api/proposals",
            post(proposals::create_proposal).get(proposals::list_proposals),
        )
        .route("/api/proposals/expire", post(proposals::expire_proposals))
        .route(
            "/api/proposals/{name}",
            get(proposals::get_proposal).delete(proposals::delete_proposal),
        )
        .route("/api/proposals/{name}/approve", post(proposals::approve_proposal))
        .route("/api/proposals/{name}/reject", post(proposals::reject_proposal))
        .route("/api/proposals/{name}/merge", post(proposals::merge_proposal))
        .route("/api/proposals/{name}/validation", post(proposals::record_validation))

        // Velocity
        .route("/api/velocity", get(proposals::get_velocity))
        .route("/api/velocity/decay", post(proposals::decay_velocity))
        .route("/api/velocity/reset", post(proposals::reset_velocity))

        // Apply middleware and state
        .layer(middleware)
        .with_state(state)
}

/// Build CORS layer from settings
fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<_> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
            .max_age(Duration::from_secs(3600))
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
            .max_age(Duration::from_secs(3600))
    }
}

/// Health check endpoint
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "success": true,
        "message": "Governance engine is running.",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> (Router, tokio::sync::mpsc::UnboundedReceiver<crate::governance::PheromoneRecord>) {
        let settings = Settings::default();
        let (state, rx) = AppState::new(settings.clone());
        (create_router(Arc::new(state), &settings), rx)
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(match body {
                Some(json) => Body::from(json.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn submission(name: &str, change_type: &str) -> Value {
        json!({
            "metadata": { "name": name, "namespace": "agents" },
            "spec": {
                "changeType": change_type,
                "target": { "kind": "Agent", "name": "planner" },
                "proposer": "agent-k",
                "reviewRequirements": { "requiredApprovers": 1 }
            }
        })
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _rx) = app();
        let (status, body) = call(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_create_review_and_merge() {
        let (app, mut rx) = app();

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/proposals",
            Some(submission("upgrade-planner", "AGENT_UPGRADE")),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["proposal"]["phase"], "REVIEWING");
        tokio_test::assert_ok!(rx.try_recv());

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/proposals/upgrade-planner/merge",
            Some(json!({ "executor": "ops" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["accepted"], false);
        assert_eq!(body["phase"], "REVIEWING");

        let (_, body) = call(
            &app,
            Method::POST,
            "/api/proposals/upgrade-planner/approve",
            Some(json!({ "approver": "alice", "rationale": "tested" })),
        )
        .await;
        assert_eq!(body["accepted"], true);
        assert_eq!(body["phase"], "APPROVED");

        let (_, body) = call(
            &app,
            Method::POST,
            "/api/proposals/upgrade-planner/merge",
            Some(json!({ "executor": "ops" })),
        )
        .await;
        assert_eq!(body["accepted"], true);
        assert_eq!(body["phase"], "MERGED");
    }

    #[tokio::test]
    async fn test_malformed_spec_is_bad_request() {
        let (app, _rx) = app();
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/proposals",
            Some(json!({ "metadata": { "name": "x" }, "spec": { "proposer": "k" } })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "MALFORMED_SPEC");
    }

    #[tokio::test]
    async fn test_duplicate_is_conflict_and_unknown_is_not_found() {
        let (app, _rx) = app();
        call(&app, Method::POST, "/api/proposals", Some(submission("dup", "CODE_PATCH"))).await;
        let (status, _) =
            call(&app, Method::POST, "/api/proposals", Some(submission("dup", "CODE_PATCH"))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/proposals/ghost/reject",
            Some(json!({ "approver": "alice" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, Method::DELETE, "/api/proposals/dup", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&app, Method::GET, "/api/proposals/dup", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_and_velocity_endpoints() {
        let (app, _rx) = app();
        call(&app, Method::POST, "/api/proposals", Some(submission("one", "CODE_PATCH"))).await;
        call(&app, Method::POST, "/api/proposals", Some(submission("two", "CODE_DELETE"))).await;

        let (_, body) = call(&app, Method::GET, "/api/proposals?namespace=agents", None).await;
        assert_eq!(body["total"], 2);
        let (_, body) = call(&app, Method::GET, "/api/proposals?namespace=other", None).await;
        assert_eq!(body["total"], 0);

        let (_, body) = call(&app, Method::GET, "/api/velocity", None).await;
        let before = body["velocityPenalty"].as_f64().unwrap();
        assert!(before > 0.0);

        let (_, body) = call(
            &app,
            Method::POST,
            "/api/velocity/decay",
            Some(json!({ "hours": 1.0 })),
        )
        .await;
        assert!(body["velocityPenalty"].as_f64().unwrap() < before);

        let (_, body) = call(&app, Method::POST, "/api/velocity/reset", None).await;
        assert_eq!(body["velocityPenalty"].as_f64().unwrap(), 0.0);

        let (_, body) = call(&app, Method::POST, "/api/proposals/expire", None).await;
        assert_eq!(body["expired"], json!([]));
    }
}
