// crates/graph-gate-mcp/src/server.rs
// ============================================================================
// Module: Gateway Server
// Description: axum router, JSON-RPC dispatch, and the HTTP listener.
// Purpose: Expose the graph tools over a single authenticated MCP endpoint.
// Dependencies: axum, axum-server, graph-gate-config, rustls, tokio
// ============================================================================

//! ## Overview
//! Every request to the MCP endpoint first runs through the
//! [`GatewayPipeline`]. Requests that survive it are dispatched as JSON-RPC:
//! `initialize`, `ping`, `tools/list`, `tools/call`, and notifications.
//! Protected tool calls check the permission table, resolve backend
//! credentials for the caller, wait for the [`LazyInitializer`], and only then
//! reach the [`ToolDispatcher`].
//!
//! Discovery and the optional OAuth proxy live on their own routes and bypass
//! the pipeline. Security posture: request bodies and headers are untrusted;
//! credentials are never logged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::Request;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::http::header::ORIGIN;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use graph_gate_config::AuthMode;
use graph_gate_config::GraphGateConfig;
use graph_gate_config::RESOURCE_METADATA_PATH;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::audit::AuthAuditEvent;
use crate::audit::AuthAuditSink;
use crate::audit::sink_from_config;
use crate::auth::AuthError;
use crate::auth::CredentialExtractor;
use crate::auth::RequestIdentity;
use crate::backend::BackendError;
use crate::backend::CredentialResolver;
use crate::backend::GraphBackend;
use crate::classify::PING_METHOD;
use crate::classify::TOOLS_LIST_METHOD;
use crate::classify::UnauthenticatedProbeGuard;
use crate::guards::CorsGuard;
use crate::guards::PathGuard;
use crate::lifecycle::InitError;
use crate::lifecycle::InitTelemetry;
use crate::lifecycle::LazyInitializer;
use crate::lifecycle::ReadyState;
use crate::metadata::ResourceMetadataPublisher;
use crate::neo4j::Neo4jBackend;
use crate::oauth_proxy::OAuthProxy;
use crate::oauth_proxy::authorize_handler;
use crate::oauth_proxy::token_handler;
use crate::permissions::PermissionGuard;
use crate::pipeline::Admitted;
use crate::pipeline::AuthChallenge;
use crate::pipeline::Exchange;
use crate::pipeline::GatewayPipeline;
use crate::pipeline::GatewayPipelineBuilder;
use crate::pipeline::Rejection;
use crate::pipeline::UNAUTHENTICATED_CODE;
use crate::stages::ClassifyStage;
use crate::stages::CorsStage;
use crate::stages::CredentialStage;
use crate::stages::PathStage;
use crate::stages::TokenStage;
use crate::telemetry::McpMethod;
use crate::telemetry::McpMetricEvent;
use crate::telemetry::McpMetrics;
use crate::telemetry::McpOutcome;
use crate::telemetry::NoopMetrics;
use crate::telemetry::TelemetrySink;
use crate::telemetry::TracingTelemetrySink;
use crate::token::TokenValidator;
use crate::tools::CypherToolDispatcher;
use crate::tools::ToolCallResult;
use crate::tools::ToolDefinition;
use crate::tools::ToolDispatcher;
use crate::tools::ToolError;
use crate::tools::ToolName;
use crate::tools::ToolRegistry;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Server name reported by `initialize`.
pub const SERVER_NAME: &str = "graph-gate";
/// Protocol version offered when the client asks for an unknown one.
pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";
/// Protocol versions this server speaks.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// Malformed or unsupported JSON-RPC envelope.
pub const INVALID_REQUEST_CODE: i64 = -32600;
/// Unknown JSON-RPC method.
pub const METHOD_NOT_FOUND_CODE: i64 = -32601;
/// Parameters did not match the method.
pub const INVALID_PARAMS_CODE: i64 = -32602;
/// Backend could not serve the request.
pub const BACKEND_UNAVAILABLE_CODE: i64 = -32050;
/// Response could not be serialized.
pub const SERIALIZATION_CODE: i64 = -32060;

// ============================================================================
// SECTION: Components
// ============================================================================

/// Collaborators injected into the server.
pub struct GatewayComponents {
    /// Graph backend.
    pub backend: Arc<dyn GraphBackend>,
    /// Bearer validator; bearer tokens are refused when absent.
    pub validator: Option<Arc<TokenValidator>>,
    /// Authentication decision sink.
    pub audit: Arc<dyn AuthAuditSink>,
    /// Request metrics sink.
    pub metrics: Arc<dyn McpMetrics>,
    /// Initialization telemetry sink.
    pub telemetry: Arc<dyn TelemetrySink>,
    /// Tool dispatcher; defaults to Cypher dispatch over `backend`.
    pub dispatcher: Option<Arc<dyn ToolDispatcher>>,
}

impl GatewayComponents {
    /// Builds the production collaborators from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError::Init`] when the audit sink or key set source
    /// cannot be built.
    pub fn from_config(config: &GraphGateConfig) -> Result<Self, McpServerError> {
        let validator = config
            .auth
            .oauth
            .as_ref()
            .map(TokenValidator::from_config)
            .transpose()
            .map_err(|err| McpServerError::Init(err.to_string()))?
            .map(Arc::new);
        let audit = sink_from_config(&config.audit)
            .map_err(|err| McpServerError::Init(format!("audit sink: {err}")))?;
        Ok(Self {
            backend: Arc::new(Neo4jBackend::from_config(&config.backend)),
            validator,
            audit,
            metrics: Arc::new(NoopMetrics),
            telemetry: Arc::new(TracingTelemetrySink),
            dispatcher: None,
        })
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// HTTP gateway instance.
pub struct GatewayServer {
    /// Validated configuration.
    config: GraphGateConfig,
    /// Shared handler state.
    state: Arc<ServerState>,
    /// OAuth proxy when enabled.
    proxy: Option<Arc<OAuthProxy>>,
}

impl GatewayServer {
    /// Builds the server with production collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when configuration is invalid or a
    /// collaborator fails to build.
    pub fn from_config(config: GraphGateConfig) -> Result<Self, McpServerError> {
        config.validate().map_err(|err| McpServerError::Config(err.to_string()))?;
        let components = GatewayComponents::from_config(&config)?;
        Self::with_components(config, components)
    }

    /// Builds the server around injected collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when the credential header or the OAuth
    /// proxy cannot be configured.
    pub fn with_components(
        config: GraphGateConfig,
        components: GatewayComponents,
    ) -> Result<Self, McpServerError> {
        let challenge = config.auth.oauth.as_ref().map_or_else(
            || AuthChallenge::basic(config.auth.realm.as_str()),
            |_| AuthChallenge::bearer(config.auth.realm.as_str(), config.resource_metadata_url()),
        );
        if config.auth.oauth.is_some() && components.validator.is_none() {
            tracing::warn!("oauth configured without a token validator; bearer tokens will be refused");
        }

        let extractor = CredentialExtractor::from_config(&config.auth)
            .map_err(|err| McpServerError::Config(err.to_string()))?;
        let cors = CorsGuard::from_config(&config.server.cors, &config.auth.credential_header);
        let audit = components.audit;
        let pipeline = GatewayPipelineBuilder::new(challenge)
            .path(PathStage::new(PathGuard::new(config.server.canonical_endpoint())))
            .cors(CorsStage::new(cors.clone()))
            .credential(CredentialStage::new(extractor, Arc::clone(&audit)))
            .classify(ClassifyStage::new(
                UnauthenticatedProbeGuard::from_config(&config.auth),
                config.auth.mode,
                config.server.max_body_bytes,
                Arc::clone(&audit),
            ))
            .token(TokenStage::new(components.validator, Arc::clone(&audit)))
            .build();

        let mut initializer = LazyInitializer::new(
            Arc::clone(&components.backend),
            Duration::from_millis(config.backend.init_timeout_ms),
            config.backend.read_only,
        );
        if config.telemetry.enabled {
            initializer = initializer.with_telemetry(InitTelemetry {
                sink: components.telemetry,
                timeout: Duration::from_millis(config.telemetry.timeout_ms),
                auth_mode: config.auth.mode.as_str(),
                oauth_enabled: config.auth.oauth.is_some(),
            });
        }
        let dispatcher: Arc<dyn ToolDispatcher> = match components.dispatcher {
            Some(dispatcher) => dispatcher,
            None => Arc::new(CypherToolDispatcher::new(components.backend, config.backend.max_rows)),
        };
        let permissions = PermissionGuard::default();
        let metadata = ResourceMetadataPublisher::from_config(&config, permissions.table());
        let proxy = match &config.auth.oauth {
            Some(oauth) if oauth.proxy.enabled => Some(Arc::new(
                OAuthProxy::from_config(oauth).map_err(|err| McpServerError::Init(err.to_string()))?,
            )),
            _ => None,
        };

        let state = Arc::new(ServerState {
            pipeline,
            initializer,
            resolver: CredentialResolver::new(
                config.auth.mode,
                config.backend.service_credentials.as_ref(),
            ),
            permissions,
            dispatcher,
            audit,
            metrics: components.metrics,
            metadata,
            cors,
            read_only: config.backend.read_only,
        });
        emit_auth_disabled_warning(&config);
        Ok(Self {
            config,
            state,
            proxy,
        })
    }

    /// Returns the shared initializer.
    #[must_use]
    pub fn initializer(&self) -> &LazyInitializer {
        &self.state.initializer
    }

    /// Builds the axum router.
    #[must_use]
    pub fn router(&self) -> Router {
        let endpoint_metadata =
            format!("{RESOURCE_METADATA_PATH}{}", self.config.server.canonical_endpoint());
        let router = Router::new()
            .route(RESOURCE_METADATA_PATH, get(metadata_handler))
            .route(&endpoint_metadata, get(metadata_handler))
            .fallback(gateway_handler)
            .with_state(Arc::clone(&self.state));
        match &self.proxy {
            Some(proxy) => router.merge(
                Router::new()
                    .route("/oauth/authorize", get(authorize_handler))
                    .route("/oauth/token", post(token_handler))
                    .with_state(Arc::clone(proxy)),
            ),
            None => router,
        }
    }

    /// Serves until `shutdown` resolves, then drains in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when the listener cannot be bound or the
    /// TLS material cannot be loaded.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), McpServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr =
            self.config.server.bind_addr().map_err(|err| McpServerError::Config(err.to_string()))?;
        let drain_ms = self.config.server.shutdown_drain_ms;
        let drain = Duration::from_millis(drain_ms);
        let app = self.router().into_make_service();
        let handle = Handle::new();
        let signal = handle.clone();
        tokio::spawn(async move {
            shutdown.await;
            tracing::info!(drain_ms, "shutdown requested; draining connections");
            signal.graceful_shutdown(Some(drain));
        });

        let endpoint = self.config.server.canonical_endpoint();
        let result = match &self.config.server.tls {
            Some(tls) => {
                install_crypto_provider();
                let rustls = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
                    .await
                    .map_err(|err| McpServerError::Init(format!("tls material: {err}")))?;
                tracing::info!(%addr, endpoint, tls = true, "graph gate listening");
                axum_server::bind_rustls(addr, rustls).handle(handle).serve(app).await
            }
            None => {
                tracing::info!(%addr, endpoint, tls = false, "graph gate listening");
                axum_server::bind(addr).handle(handle).serve(app).await
            }
        };
        result.map_err(|err| McpServerError::Transport(err.to_string()))?;
        tracing::info!("graph gate stopped");
        Ok(())
    }
}

/// Installs the process-wide rustls provider once.
fn install_crypto_provider() {
    if rustls::crypto::aws_lc_rs::default_provider().install_default().is_err() {
        tracing::debug!("rustls crypto provider already installed");
    }
}

fn emit_auth_disabled_warning(config: &GraphGateConfig) {
    if config.auth.mode == AuthMode::Disabled {
        tracing::warn!(
            bind = %config.server.bind,
            "authentication disabled; anonymous callers use the service account and the listener \
             must stay on loopback"
        );
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Shared state for the axum handlers.
struct ServerState {
    /// Ordered authentication pipeline.
    pipeline: GatewayPipeline,
    /// Backend verification state machine.
    initializer: LazyInitializer,
    /// Identity to backend credential mapping.
    resolver: CredentialResolver,
    /// Tool scope enforcement.
    permissions: PermissionGuard,
    /// Tool execution.
    dispatcher: Arc<dyn ToolDispatcher>,
    /// Authentication decision sink.
    audit: Arc<dyn AuthAuditSink>,
    /// Request metrics sink.
    metrics: Arc<dyn McpMetrics>,
    /// Discovery document.
    metadata: ResourceMetadataPublisher,
    /// Origin policy applied to discovery responses.
    cors: CorsGuard,
    /// Omit write tools from the catalog.
    read_only: bool,
}

/// Serves the protected resource metadata document.
async fn metadata_handler(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    let mut response = state.metadata.respond();
    response.headers_mut().extend(state.cors.headers_for(headers.get(ORIGIN)));
    response
}

/// Runs the pipeline, then dispatches JSON-RPC.
async fn gateway_handler(State(state): State<Arc<ServerState>>, request: Request<Body>) -> Response {
    let started = Instant::now();
    let mut exchange = Exchange::new(request);
    if let Some(response) = state.pipeline.run(&mut exchange).await {
        return response;
    }
    let admitted = exchange.admit();
    let response = state.dispatch(&admitted, started).await;
    admitted.finish(response)
}

// ============================================================================
// SECTION: JSON-RPC Types
// ============================================================================

/// Incoming JSON-RPC request payload.
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    /// JSON-RPC protocol version.
    jsonrpc: String,
    /// Request identifier; absent for notifications.
    #[serde(default)]
    id: Option<Value>,
    /// Method name.
    method: String,
    /// Optional parameters payload.
    #[serde(default)]
    params: Option<Value>,
}

/// JSON-RPC response envelope.
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    /// JSON-RPC protocol version.
    jsonrpc: &'static str,
    /// Request identifier.
    id: Value,
    /// Successful result payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    /// Error payload when the request fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

/// JSON-RPC error payload.
#[derive(Debug, Serialize)]
struct JsonRpcError {
    /// Error code.
    code: i64,
    /// Human-readable error message.
    message: String,
    /// Structured details.
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

/// Tool call parameters.
#[derive(Debug, Deserialize)]
struct ToolCallParams {
    /// Tool name.
    name: String,
    /// Raw JSON arguments.
    #[serde(default)]
    arguments: Value,
}

/// Tool list response payload.
#[derive(Debug, Serialize)]
struct ToolListResult {
    /// Tool definitions.
    tools: Vec<ToolDefinition>,
}

/// Dispatch outcome before rendering.
#[derive(Debug)]
enum RpcReply {
    /// JSON-RPC envelope with an HTTP status.
    Json {
        /// HTTP status.
        status: StatusCode,
        /// Envelope.
        body: JsonRpcResponse,
    },
    /// Notification accepted without a body.
    Accepted,
    /// Authentication failure discovered after the pipeline.
    Rejected(Rejection),
}

impl RpcReply {
    fn result(id: Value, result: Value) -> Self {
        Self::Json {
            status: StatusCode::OK,
            body: JsonRpcResponse {
                jsonrpc: "2.0",
                id,
                result: Some(result),
                error: None,
            },
        }
    }

    fn error(status: StatusCode, id: Value, code: i64, message: impl Into<String>) -> Self {
        Self::error_with_data(status, id, code, message, None)
    }

    fn error_with_data(
        status: StatusCode,
        id: Value,
        code: i64,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        Self::Json {
            status,
            body: JsonRpcResponse {
                jsonrpc: "2.0",
                id,
                result: None,
                error: Some(JsonRpcError {
                    code,
                    message: message.into(),
                    data,
                }),
            },
        }
    }

    fn tool_result(id: Value, result: &ToolCallResult) -> Self {
        match serde_json::to_value(result) {
            Ok(value) => Self::result(id, value),
            Err(_) => Self::error(StatusCode::OK, id, SERIALIZATION_CODE, "serialization failed"),
        }
    }

    /// Classifies the reply for metrics.
    fn outcome(&self) -> (McpOutcome, Option<i64>) {
        match self {
            Self::Json {
                body, ..
            } => match (&body.error, &body.result) {
                (Some(error), _) => (McpOutcome::Error, Some(error.code)),
                (None, Some(result)) if result.get("isError") == Some(&Value::Bool(true)) => {
                    (McpOutcome::Error, None)
                }
                _ => (McpOutcome::Ok, None),
            },
            Self::Accepted => (McpOutcome::Ok, None),
            Self::Rejected(_) => (McpOutcome::Error, Some(UNAUTHENTICATED_CODE)),
        }
    }

    /// Renders the HTTP response and reports the body size.
    fn render(self, challenge: &AuthChallenge) -> (Response, usize) {
        match self {
            Self::Json {
                status,
                body,
            } => {
                let payload = serde_json::to_vec(&body).unwrap_or_else(|_| {
                    br#"{"jsonrpc":"2.0","id":null,"error":{"code":-32060,"message":"serialization failed"}}"#
                        .to_vec()
                });
                let size = payload.len();
                let mut response = (status, payload).into_response();
                response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                (response, size)
            }
            Self::Accepted => (StatusCode::ACCEPTED.into_response(), 0),
            Self::Rejected(rejection) => (rejection.into_response(challenge), 0),
        }
    }
}

// ============================================================================
// SECTION: JSON-RPC Handling
// ============================================================================

impl ServerState {
    /// Dispatches an authenticated exchange and records metrics.
    async fn dispatch(&self, exchange: &Admitted, started: Instant) -> Response {
        let (method, tool, reply) = match parse_request(&exchange.body) {
            Ok(request) => {
                let method = McpMethod::from_name(&request.method);
                let (reply, tool) = self.handle_request(exchange, request).await;
                (method, tool, reply)
            }
            Err(reply) => (McpMethod::Invalid, None, reply),
        };
        let (outcome, error_code) = reply.outcome();
        let (response, response_bytes) = reply.render(self.pipeline.challenge());
        let event = McpMetricEvent {
            method,
            tool,
            outcome,
            error_code,
            auth_method: exchange.identity.method_label(),
            request_bytes: exchange.body.len(),
            response_bytes,
        };
        self.metrics.record_request(event.clone());
        self.metrics.record_latency(event, started.elapsed());
        response
    }

    async fn handle_request(
        &self,
        exchange: &Admitted,
        request: JsonRpcRequest,
    ) -> (RpcReply, Option<String>) {
        if request.jsonrpc != "2.0" {
            let id = request.id.unwrap_or(Value::Null);
            let reply = RpcReply::error(
                StatusCode::BAD_REQUEST,
                id,
                INVALID_REQUEST_CODE,
                "invalid json-rpc version",
            );
            return (reply, None);
        }
        let Some(id) = request.id else {
            tracing::debug!(method = %request.method, "notification accepted");
            return (RpcReply::Accepted, None);
        };
        match request.method.as_str() {
            "initialize" => (RpcReply::result(id, initialize_result(request.params.as_ref())), None),
            PING_METHOD => (RpcReply::result(id, json!({})), None),
            TOOLS_LIST_METHOD => (self.list_tools(exchange, id).await, None),
            "tools/call" => {
                let params = request.params.unwrap_or(Value::Null);
                match serde_json::from_value::<ToolCallParams>(params) {
                    Ok(call) => {
                        let name = call.name.clone();
                        (self.call_tool(exchange, id, call).await, Some(name))
                    }
                    Err(_) => (
                        RpcReply::error(
                            StatusCode::BAD_REQUEST,
                            id,
                            INVALID_PARAMS_CODE,
                            "invalid tool params",
                        ),
                        None,
                    ),
                }
            }
            _ => (
                RpcReply::error(StatusCode::BAD_REQUEST, id, METHOD_NOT_FOUND_CODE, "method not found"),
                None,
            ),
        }
    }

    async fn list_tools(&self, exchange: &Admitted, id: Value) -> RpcReply {
        let registry = match self.initializer.ready() {
            Some(ready) => ready.registry.clone(),
            None if exchange.probe => ToolRegistry::core_catalog(self.read_only),
            None => match self.ready_for(&exchange.identity).await {
                Ok(ready) => ready.registry.clone(),
                Err(failure) => return failure.into_reply(id),
            },
        };
        match serde_json::to_value(ToolListResult {
            tools: registry.definitions(),
        }) {
            Ok(value) => RpcReply::result(id, value),
            Err(_) => RpcReply::error(StatusCode::OK, id, SERIALIZATION_CODE, "serialization failed"),
        }
    }

    async fn call_tool(&self, exchange: &Admitted, id: Value, call: ToolCallParams) -> RpcReply {
        let identity = &exchange.identity;
        if let Err(err) = self.permissions.check(identity, &call.name) {
            self.audit.record(
                &AuthAuditEvent::denied("permission", identity, err.to_string())
                    .with_rpc_method(Some("tools/call"))
                    .with_tool(&call.name),
            );
            return RpcReply::tool_result(id, &ToolCallResult::error(err.to_string()));
        }
        self.audit.record(
            &AuthAuditEvent::allowed("permission", identity)
                .with_rpc_method(Some("tools/call"))
                .with_tool(&call.name),
        );
        let Some(tool) = ToolName::parse(&call.name) else {
            return RpcReply::tool_result(
                id,
                &ToolCallResult::error(format!("tool {} is not available", call.name)),
            );
        };

        let credentials = match self.resolver.resolve(identity) {
            Ok(credentials) => credentials,
            Err(err) => return CallFailure::Backend(err, is_basic(identity)).into_reply(id),
        };
        let ready = match self.initializer.ensure_ready(&credentials).await {
            Ok(ready) => ready,
            Err(err) => return CallFailure::Init(err, is_basic(identity)).into_reply(id),
        };
        if !ready.registry.contains(tool) {
            return RpcReply::tool_result(
                id,
                &ToolCallResult::error(format!("tool {tool} is not available on this server")),
            );
        }

        match self.dispatcher.dispatch(tool, &credentials, call.arguments).await {
            Ok(result) => RpcReply::tool_result(id, &result),
            Err(ToolError::InvalidParams(message)) => {
                RpcReply::error(StatusCode::BAD_REQUEST, id, INVALID_PARAMS_CODE, message)
            }
            Err(ToolError::Serialization) => {
                RpcReply::error(StatusCode::OK, id, SERIALIZATION_CODE, "serialization failed")
            }
            Err(ToolError::Backend(err))
                if err.is_retryable() || matches!(err, BackendError::Unauthorized(_)) =>
            {
                CallFailure::Backend(err, is_basic(identity)).into_reply(id)
            }
            Err(err) => RpcReply::tool_result(id, &ToolCallResult::error(err.to_string())),
        }
    }

    /// Resolves credentials and waits for the ready state.
    async fn ready_for(&self, identity: &RequestIdentity) -> Result<Arc<ReadyState>, CallFailure> {
        let credentials =
            self.resolver.resolve(identity).map_err(|err| CallFailure::Backend(err, is_basic(identity)))?;
        self.initializer
            .ensure_ready(&credentials)
            .await
            .map_err(|err| CallFailure::Init(err, is_basic(identity)))
    }
}

/// Backend-side failure of a protected request.
#[derive(Debug)]
enum CallFailure {
    /// Credential resolution or tool execution failed; flag marks Basic callers.
    Backend(BackendError, bool),
    /// Verification failed; flag marks Basic callers.
    Init(Arc<InitError>, bool),
}

impl CallFailure {
    fn into_reply(self, id: Value) -> RpcReply {
        match self {
            Self::Backend(BackendError::Unauthorized(_), true) => rejected_basic(),
            Self::Init(err, true) if matches!(*err, InitError::Backend(BackendError::Unauthorized(_))) => {
                rejected_basic()
            }
            Self::Backend(err, _) => backend_unavailable(id, &err.to_string(), err.is_retryable()),
            Self::Init(err, _) => backend_unavailable(id, &err.to_string(), true),
        }
    }
}

fn rejected_basic() -> RpcReply {
    RpcReply::Rejected(Rejection::Unauthenticated(AuthError::InvalidToken(
        "graph backend rejected the supplied credentials".to_string(),
    )))
}

fn backend_unavailable(id: Value, message: &str, retryable: bool) -> RpcReply {
    tracing::warn!(error = message, retryable, "backend unavailable for request");
    let status = if retryable { StatusCode::SERVICE_UNAVAILABLE } else { StatusCode::INTERNAL_SERVER_ERROR };
    RpcReply::error_with_data(
        status,
        id,
        BACKEND_UNAVAILABLE_CODE,
        message,
        Some(json!({ "retryable": retryable })),
    )
}

const fn is_basic(identity: &RequestIdentity) -> bool {
    matches!(identity, RequestIdentity::Basic(_))
}

/// Parses a single JSON-RPC request; batches are rejected.
fn parse_request(body: &[u8]) -> Result<JsonRpcRequest, RpcReply> {
    let invalid = |message: &str| {
        RpcReply::error(StatusCode::BAD_REQUEST, Value::Null, INVALID_REQUEST_CODE, message)
    };
    let value: Value = serde_json::from_slice(body).map_err(|_| invalid("invalid json-rpc request"))?;
    if value.is_array() {
        return Err(invalid("batch requests are not supported"));
    }
    serde_json::from_value(value).map_err(|_| invalid("invalid json-rpc request"))
}

/// Builds the `initialize` result, echoing a supported protocol version.
fn initialize_result(params: Option<&Value>) -> Value {
    let requested = params.and_then(|params| params.get("protocolVersion")).and_then(Value::as_str);
    let version = requested
        .filter(|version| SUPPORTED_PROTOCOL_VERSIONS.contains(version))
        .unwrap_or(LATEST_PROTOCOL_VERSION);
    json!({
        "protocolVersion": version,
        "capabilities": { "tools": { "listChanged": false } },
        "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
    })
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Gateway server errors.
#[derive(Debug, thiserror::Error)]
pub enum McpServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================
