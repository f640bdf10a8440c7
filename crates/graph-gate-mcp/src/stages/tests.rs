// crates/graph-gate-mcp/src/stages/tests.rs
// ============================================================================
// Module: Gateway Stage Unit Tests
// Description: Ordered pipeline behavior over in-memory requests.
// Purpose: Validate rejections, probe exceptions, and identity attachment.
// Dependencies: graph-gate-mcp, axum
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only pipeline assertions."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::body::Body;
use axum::body::to_bytes;
use axum::http::Request;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::header::WWW_AUTHENTICATE;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use graph_gate_config::AuthConfig;
use graph_gate_config::CorsConfig;

use super::*;
use crate::audit::NoopAuditSink;
use crate::pipeline::AuthChallenge;
use crate::pipeline::GatewayPipeline;
use crate::pipeline::GatewayPipelineBuilder;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn pipeline(auth: &AuthConfig) -> GatewayPipeline {
    let audit: Arc<dyn AuthAuditSink> = Arc::new(NoopAuditSink);
    GatewayPipelineBuilder::new(AuthChallenge::basic("graph-gate"))
        .token(TokenStage::new(None, Arc::clone(&audit)))
        .classify(ClassifyStage::new(
            UnauthenticatedProbeGuard::from_config(auth),
            auth.mode,
            1024 * 1024,
            Arc::clone(&audit),
        ))
        .path(PathStage::new(PathGuard::new("/mcp")))
        .credential(CredentialStage::new(CredentialExtractor::from_config(auth).unwrap(), Arc::clone(&audit)))
        .cors(CorsStage::new(CorsGuard::from_config(&CorsConfig::default(), "Authorization")))
        .build()
}

fn rpc(method: &str) -> String {
    format!(r#"{{"jsonrpc":"2.0","id":1,"method":"{method}"}}"#)
}

fn post(body: String) -> Request<Body> {
    Request::builder().method(Method::POST).uri("/mcp").body(Body::from(body)).unwrap()
}

fn basic(user: &str, pass: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{pass}")))
}

async fn run(pipeline: &GatewayPipeline, request: Request<Body>) -> (Option<axum::response::Response>, Exchange) {
    let mut exchange = Exchange::new(request);
    let response = pipeline.run(&mut exchange).await;
    (response, exchange)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn builder_enforces_canonical_order() {
    let pipeline = pipeline(&AuthConfig::default());
    assert_eq!(pipeline.stage_names(), vec!["path", "cors", "credential", "classify", "token"]);
}

#[tokio::test]
async fn unknown_path_is_rejected_before_auth() {
    let pipeline = pipeline(&AuthConfig::default());
    let request = Request::builder()
        .method(Method::POST)
        .uri("/admin")
        .header(AUTHORIZATION, "Bearer ")
        .body(Body::empty())
        .unwrap();
    let (response, _) = run(&pipeline, request).await;
    assert_eq!(response.unwrap().status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn anonymous_protected_call_gets_challenge() {
    let pipeline = pipeline(&AuthConfig::default());
    let (response, _) = run(&pipeline, post(rpc("tools/call"))).await;
    let response = response.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let challenge = response.headers().get(WWW_AUTHENTICATE).unwrap().to_str().unwrap();
    assert!(challenge.starts_with("Basic realm=\"graph-gate\""));
    assert!(challenge.contains("error=\"invalid_request\""));
}

#[tokio::test]
async fn anonymous_handshake_passes() {
    let pipeline = pipeline(&AuthConfig::default());
    let (response, exchange) = run(&pipeline, post(rpc("initialize"))).await;
    assert!(response.is_none());
    assert_eq!(exchange.identity, RequestIdentity::Anonymous);
    assert_eq!(exchange.rpc_method.as_deref(), Some("initialize"));
}

#[tokio::test]
async fn ping_without_opt_in_is_unauthenticated() {
    let pipeline = pipeline(&AuthConfig::default());
    let (response, _) = run(&pipeline, post(rpc("ping"))).await;
    assert_eq!(response.unwrap().status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn opted_in_ping_passes_and_oversized_ping_is_413() {
    let auth = AuthConfig {
        allow_unauthenticated_ping: true,
        unauthenticated_max_body_bytes: 128,
        ..AuthConfig::default()
    };
    let pipeline = pipeline(&auth);

    let (response, exchange) = run(&pipeline, post(rpc("ping"))).await;
    assert!(response.is_none());
    assert!(exchange.probe);

    let padded = format!(r#"{{"jsonrpc":"2.0","id":1,"method":"ping","params":{{"pad":"{}"}}}}"#, "x".repeat(512));
    let (response, _) = run(&pipeline, post(padded)).await;
    assert_eq!(response.unwrap().status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn anonymous_cap_only_binds_opted_in_ping() {
    let auth = AuthConfig {
        allow_unauthenticated_ping: true,
        unauthenticated_max_body_bytes: 128,
        ..AuthConfig::default()
    };
    let pipeline = pipeline(&auth);
    let pad = "x".repeat(512);

    let call = format!(r#"{{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{{"pad":"{pad}"}}}}"#);
    let (response, _) = run(&pipeline, post(call)).await;
    assert_eq!(response.unwrap().status(), StatusCode::UNAUTHORIZED);

    let handshake = format!(r#"{{"jsonrpc":"2.0","id":1,"method":"initialize","params":{{"pad":"{pad}"}}}}"#);
    let (response, exchange) = run(&pipeline, post(handshake)).await;
    assert!(response.is_none());
    assert!(!exchange.probe);
}

#[tokio::test]
async fn opted_in_ping_does_not_open_tools_list() {
    let auth = AuthConfig {
        allow_unauthenticated_ping: true,
        ..AuthConfig::default()
    };
    let (response, _) = run(&pipeline(&auth), post(rpc("tools/list"))).await;
    assert_eq!(response.unwrap().status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn empty_bearer_is_never_anonymous() {
    let pipeline = pipeline(&AuthConfig::default());
    let mut request = post(rpc("initialize"));
    request.headers_mut().insert(AUTHORIZATION, "Bearer   ".parse().unwrap());
    let (response, _) = run(&pipeline, request).await;
    assert_eq!(response.unwrap().status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bearer_without_oauth_is_invalid_token() {
    let pipeline = pipeline(&AuthConfig::default());
    let mut request = post(rpc("tools/list"));
    request.headers_mut().insert(AUTHORIZATION, "Bearer abc.def.ghi".parse().unwrap());
    let (response, _) = run(&pipeline, request).await;
    let response = response.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let challenge = response.headers().get(WWW_AUTHENTICATE).unwrap().to_str().unwrap();
    assert!(challenge.contains("error=\"invalid_token\""));
}

#[tokio::test]
async fn basic_credentials_attach_identity_and_keep_body() {
    let pipeline = pipeline(&AuthConfig::default());
    let mut request = post(rpc("tools/call"));
    request.headers_mut().insert(AUTHORIZATION, basic("neo4j", "secret").parse().unwrap());
    let (response, exchange) = run(&pipeline, request).await;
    assert!(response.is_none());
    assert_eq!(exchange.identity.subject(), Some("neo4j"));
    let body = to_bytes(exchange.request.into_body(), 4096).await.unwrap();
    assert_eq!(body, rpc("tools/call").as_bytes());
}

#[tokio::test]
async fn custom_header_is_read() {
    let auth = AuthConfig {
        credential_header: "X-Graph-Auth".to_string(),
        ..AuthConfig::default()
    };
    let pipeline = pipeline(&auth);
    let mut request = post(rpc("tools/call"));
    request.headers_mut().insert("x-graph-auth", basic("alice", "pw").parse().unwrap());
    let (response, exchange) = run(&pipeline, request).await;
    assert!(response.is_none());
    assert_eq!(exchange.identity.subject(), Some("alice"));
}

#[tokio::test]
async fn get_on_endpoint_is_405() {
    let pipeline = pipeline(&AuthConfig::default());
    let request = Request::builder().method(Method::GET).uri("/mcp/").body(Body::empty()).unwrap();
    let (response, _) = run(&pipeline, request).await;
    let response = response.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers().get("allow").unwrap(), "POST, OPTIONS");
}

#[tokio::test]
async fn options_is_answered_without_credentials() {
    let pipeline = pipeline(&AuthConfig::default());
    let request = Request::builder().method(Method::OPTIONS).uri("/mcp").body(Body::empty()).unwrap();
    let (response, _) = run(&pipeline, request).await;
    assert_eq!(response.unwrap().status(), StatusCode::NO_CONTENT);
}
