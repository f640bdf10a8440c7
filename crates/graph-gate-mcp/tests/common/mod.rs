// crates/graph-gate-mcp/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Fake backend, token minting, and router helpers.
// Purpose: Drive the assembled gateway in-process without a database.
// Dependencies: graph-gate-mcp, jsonwebtoken, tower
// ============================================================================

//! ## Overview
//! The fake backend answers the verification queries with switchable
//! availability and extensions and records every tool query together with
//! the username it ran under. Tokens are signed with the fixture RSA key and
//! validated against a static key set, so no network is involved.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::unwrap_in_result,
    reason = "Test fixtures favor direct unwraps for setup clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::body::to_bytes;
use axum::http::HeaderMap;
use axum::http::Method;
use axum::http::Request;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::header::CONTENT_TYPE;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use graph_gate_config::GraphGateConfig;
use graph_gate_config::OAuthConfig;
use graph_gate_config::ServiceCredentialsConfig;
use graph_gate_mcp::AccessMode;
use graph_gate_mcp::AuthAuditEvent;
use graph_gate_mcp::AuthAuditSink;
use graph_gate_mcp::BackendCredentials;
use graph_gate_mcp::BackendError;
use graph_gate_mcp::GatewayComponents;
use graph_gate_mcp::GatewayServer;
use graph_gate_mcp::GraphBackend;
use graph_gate_mcp::NoopMetrics;
use graph_gate_mcp::NoopTelemetrySink;
use graph_gate_mcp::Row;
use graph_gate_mcp::StaticKeySetSource;
use graph_gate_mcp::TokenValidator;
use graph_gate_mcp::lifecycle::APOC_SCHEMA_PROCEDURE;
use graph_gate_mcp::lifecycle::COMPONENTS_QUERY;
use graph_gate_mcp::lifecycle::FUNCTION_EXISTS_QUERY;
use graph_gate_mcp::lifecycle::GDS_VERSION_FUNCTION;
use graph_gate_mcp::lifecycle::PROBE_QUERY;
use graph_gate_mcp::lifecycle::PROCEDURE_EXISTS_QUERY;
use graph_gate_mcp::tools::SCHEMA_QUERY;
use jsonwebtoken::Algorithm;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use jsonwebtoken::encode;
use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::jwk::JwkSet;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use tower::ServiceExt;

// ============================================================================
// SECTION: Constants
// ============================================================================

pub const PRIVATE_KEY: &str = include_str!("../fixtures/rsa_private.pem");
pub const OTHER_PRIVATE_KEY: &str = include_str!("../fixtures/other_private.pem");
pub const PUBLIC_JWK: &str = include_str!("../fixtures/rsa_public.jwk.json");
pub const KID: &str = "test-key-1";
pub const DOMAIN: &str = "tenant.auth.example.com";
pub const RESOURCE: &str = "https://graph.example.com/mcp";
pub const SERVICE_USER: &str = "svc-gateway";
pub const SERVICE_PASSWORD: &str = "svc-secret";
/// Password the fake backend always rejects.
pub const REJECTED_PASSWORD: &str = "wrong";

// ============================================================================
// SECTION: Fake Backend
// ============================================================================

/// One query observed by the fake backend.
#[derive(Debug, Clone)]
pub struct RecordedQuery {
    pub username: String,
    pub cypher: String,
    pub mode: AccessMode,
}

/// In-memory backend with switchable availability and extensions.
pub struct FakeBackend {
    pub up: AtomicBool,
    pub apoc: bool,
    pub gds: bool,
    pub connects: AtomicUsize,
    pub delay: Duration,
    pub queries: Mutex<Vec<RecordedQuery>>,
}

impl FakeBackend {
    pub fn new(apoc: bool, gds: bool) -> Self {
        Self {
            up: AtomicBool::new(true),
            apoc,
            gds,
            connects: AtomicUsize::new(0),
            delay: Duration::ZERO,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn down() -> Self {
        let backend = Self::new(true, true);
        backend.up.store(false, Ordering::SeqCst);
        backend
    }

    pub fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Tool queries, excluding verification traffic.
    pub fn tool_queries(&self) -> Vec<RecordedQuery> {
        self.queries.lock().unwrap().clone()
    }

    fn check(&self, credentials: &BackendCredentials) -> Result<(), BackendError> {
        if !self.up.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("connection refused".to_string()));
        }
        if credentials.password() == REJECTED_PASSWORD {
            return Err(BackendError::Unauthorized("authentication failure".to_string()));
        }
        Ok(())
    }
}

fn row(key: &str, value: Value) -> Row {
    let mut row = Map::new();
    row.insert(key.to_string(), value);
    row
}

#[async_trait]
impl GraphBackend for FakeBackend {
    async fn verify_connectivity(&self, credentials: &BackendCredentials) -> Result<(), BackendError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.check(credentials)
    }

    async fn run_query(
        &self,
        credentials: &BackendCredentials,
        cypher: &str,
        params: Map<String, Value>,
        mode: AccessMode,
    ) -> Result<Vec<Row>, BackendError> {
        self.check(credentials)?;
        let name = params.get("name").and_then(Value::as_str);
        let found = |present: bool| vec![row("found", json!(i64::from(present)))];
        match (cypher, name) {
            (PROBE_QUERY, _) => return Ok(vec![row("first", json!(1))]),
            (PROCEDURE_EXISTS_QUERY, Some(APOC_SCHEMA_PROCEDURE)) => return Ok(found(self.apoc)),
            (FUNCTION_EXISTS_QUERY, Some(GDS_VERSION_FUNCTION)) => return Ok(found(self.gds)),
            (COMPONENTS_QUERY, _) => return Ok(vec![row("agent", json!("Neo4j Kernel/5.20.0"))]),
            _ => {}
        }
        self.queries.lock().unwrap().push(RecordedQuery {
            username: credentials.username.clone(),
            cypher: cypher.to_string(),
            mode,
        });
        if cypher == SCHEMA_QUERY {
            return Ok(vec![row("value", json!({}))]);
        }
        Ok(vec![row("n", json!(1))])
    }
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink that keeps every event in memory.
#[derive(Default)]
pub struct RecordingAuditSink {
    pub events: Mutex<Vec<AuthAuditEvent>>,
}

impl RecordingAuditSink {
    pub fn events(&self) -> Vec<AuthAuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl AuthAuditSink for RecordingAuditSink {
    fn record(&self, event: &AuthAuditEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ============================================================================
// SECTION: Tokens
// ============================================================================

pub fn key_set() -> JwkSet {
    let jwk: Jwk = serde_json::from_str(PUBLIC_JWK).unwrap();
    JwkSet {
        keys: vec![jwk],
    }
}

pub fn now() -> i64 {
    i64::try_from(SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()).unwrap()
}

/// Claims accepted by the gateway, with the given audience and scopes.
pub fn claims(aud: Value, scope: &str) -> Value {
    json!({
        "sub": "user-1",
        "iss": format!("https://{DOMAIN}/"),
        "aud": aud,
        "exp": now() + 300,
        "scope": scope,
    })
}

pub fn mint_with(claims: &Value, pem: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(KID.to_string());
    encode(&header, claims, &EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap()).unwrap()
}

pub fn mint(scope: &str) -> String {
    mint_with(&claims(json!(RESOURCE), scope), PRIVATE_KEY)
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

pub fn basic(user: &str, pass: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{pass}")))
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

pub fn service_credentials() -> ServiceCredentialsConfig {
    ServiceCredentialsConfig {
        username: SERVICE_USER.to_string(),
        password: SERVICE_PASSWORD.to_string(),
    }
}

/// Auth required, Basic only.
pub fn basic_config() -> GraphGateConfig {
    let mut config = GraphGateConfig::default();
    config.backend.service_credentials = Some(service_credentials());
    config.telemetry.enabled = false;
    config
}

/// Auth required, bearer tokens for `RESOURCE`.
pub fn oauth_config() -> GraphGateConfig {
    let mut config = basic_config();
    config.server.public_base_url = Some("https://graph.example.com".to_string());
    config.auth.oauth = Some(OAuthConfig::new(DOMAIN, RESOURCE));
    config
}

// ============================================================================
// SECTION: Gateway
// ============================================================================

/// Assembled gateway plus handles to its fakes.
pub struct Harness {
    pub server: GatewayServer,
    pub router: Router,
    pub backend: Arc<FakeBackend>,
    pub audit: Arc<RecordingAuditSink>,
}

pub fn harness(config: GraphGateConfig, backend: FakeBackend) -> Harness {
    config.validate().unwrap();
    let backend = Arc::new(backend);
    let audit = Arc::new(RecordingAuditSink::default());
    let validator = config.auth.oauth.as_ref().map(|oauth| {
        Arc::new(TokenValidator::new(oauth, Arc::new(StaticKeySetSource::new(key_set()))))
    });
    let components = GatewayComponents {
        backend: Arc::clone(&backend) as Arc<dyn GraphBackend>,
        validator,
        audit: Arc::clone(&audit) as Arc<dyn AuthAuditSink>,
        metrics: Arc::new(NoopMetrics),
        telemetry: Arc::new(NoopTelemetrySink),
        dispatcher: None,
    };
    let server = GatewayServer::with_components(config, components).unwrap();
    let router = server.router();
    Harness {
        server,
        router,
        backend,
        audit,
    }
}

/// Captured response.
pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl Reply {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Text of the first content block of a `tools/call` result.
    pub fn tool_text(&self) -> &str {
        self.body["result"]["content"][0]["text"].as_str().unwrap_or_default()
    }

    pub fn is_tool_error(&self) -> bool {
        self.body["result"]["isError"] == json!(true)
    }
}

pub fn rpc_body(method: &str, params: Value) -> String {
    json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params }).to_string()
}

pub fn rpc_request(method: &str, params: Value, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/mcp")
        .header(CONTENT_TYPE, "application/json");
    if let Some(auth) = auth {
        builder = builder.header(AUTHORIZATION, auth);
    }
    builder.body(Body::from(rpc_body(method, params))).unwrap()
}

pub async fn send(router: &Router, request: Request<Body>) -> Reply {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    Reply {
        status,
        headers,
        body,
    }
}

pub async fn call(router: &Router, method: &str, params: Value, auth: Option<&str>) -> Reply {
    send(router, rpc_request(method, params, auth)).await
}

pub async fn call_tool(router: &Router, tool: &str, arguments: Value, auth: Option<&str>) -> Reply {
    call(router, "tools/call", json!({ "name": tool, "arguments": arguments }), auth).await
}
