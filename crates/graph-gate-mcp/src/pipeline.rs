// crates/graph-gate-mcp/src/pipeline.rs
// ============================================================================
// Module: Gateway Pipeline
// Description: Ordered request stages in front of JSON-RPC dispatch.
// Purpose: Compose path, CORS, credential, probe, and token checks explicitly.
// Dependencies: async-trait, axum, serde_json
// ============================================================================

//! ## Overview
//! Each inbound request becomes an [`Exchange`] that flows through an ordered
//! list of [`GatewayStage`]s. A stage either lets the exchange continue or
//! answers it directly. The order is fixed by [`GatewayPipelineBuilder`]:
//! path, CORS, credential extraction, method classification with the
//! unauthenticated probe guard, then token validation. Cheap rejections
//! happen before any authentication work.
//!
//! Headers collected by stages (CORS) are applied to every response,
//! including rejections.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::body::Bytes;
use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::Request;
use axum::http::StatusCode;
use axum::http::header::ALLOW;
use axum::http::header::CONTENT_TYPE;
use axum::http::header::WWW_AUTHENTICATE;
use axum::response::IntoResponse;
use axum::response::Response;
use serde_json::json;

use crate::auth::AuthError;
use crate::auth::Credential;
use crate::auth::RequestIdentity;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Methods advertised on the gateway endpoint.
pub const ALLOWED_METHODS: &str = "POST, OPTIONS";
/// JSON-RPC error code for authentication failures.
pub const UNAUTHENTICATED_CODE: i64 = -32001;
/// JSON-RPC error code for oversized request bodies.
pub const PAYLOAD_TOO_LARGE_CODE: i64 = -32070;

// ============================================================================
// SECTION: Exchange
// ============================================================================

/// Request state carried through the pipeline.
#[derive(Debug)]
pub struct Exchange {
    /// Inbound request; its body is restored after classification.
    pub request: Request<Body>,
    /// Parsed credential (set by the credential stage).
    pub credential: Credential,
    /// Accepted identity (set by the token stage).
    pub identity: RequestIdentity,
    /// JSON-RPC method peeked from the body.
    pub rpc_method: Option<String>,
    /// Body bytes observed during classification.
    pub body: Bytes,
    /// True when admitted through the unauthenticated probe exception.
    pub probe: bool,
    /// Headers appended to whatever response this exchange produces.
    pub response_headers: HeaderMap,
}

impl Exchange {
    /// Wraps an inbound request.
    #[must_use]
    pub fn new(request: Request<Body>) -> Self {
        Self {
            request,
            credential: Credential::Absent,
            identity: RequestIdentity::Anonymous,
            rpc_method: None,
            body: Bytes::new(),
            probe: false,
            response_headers: HeaderMap::new(),
        }
    }

    /// Applies collected headers to a response.
    #[must_use]
    pub fn finish(&self, response: Response) -> Response {
        apply_headers(&self.response_headers, response)
    }

    /// Drops the request and keeps what dispatch needs.
    #[must_use]
    pub fn admit(self) -> Admitted {
        Admitted {
            identity: self.identity,
            body: self.body,
            probe: self.probe,
            response_headers: self.response_headers,
        }
    }
}

/// Owned view of an exchange that passed every stage.
///
/// Unlike [`Exchange`] this holds no request body stream, so it is `Sync` and
/// may be borrowed across awaits in handlers.
#[derive(Debug, Clone)]
pub struct Admitted {
    /// Accepted identity.
    pub identity: RequestIdentity,
    /// Request body bytes.
    pub body: Bytes,
    /// True when admitted through the unauthenticated probe exception.
    pub probe: bool,
    /// Headers appended to the response.
    pub response_headers: HeaderMap,
}

impl Admitted {
    /// Applies collected headers to a response.
    #[must_use]
    pub fn finish(&self, response: Response) -> Response {
        apply_headers(&self.response_headers, response)
    }
}

/// Copies `headers` onto `response`, replacing existing values.
fn apply_headers(headers: &HeaderMap, mut response: Response) -> Response {
    for (name, value) in headers {
        response.headers_mut().insert(name.clone(), value.clone());
    }
    response
}

// ============================================================================
// SECTION: Stage Trait
// ============================================================================

/// Result of one pipeline stage.
#[derive(Debug)]
pub enum StageOutcome {
    /// Continue with the next stage.
    Continue,
    /// Stop and answer with this response.
    Respond(Response),
    /// Stop and answer with a rendered rejection.
    Reject(Rejection),
}

/// One ordered step of the gateway pipeline.
#[async_trait]
pub trait GatewayStage: Send + Sync {
    /// Stable stage name for logs.
    fn name(&self) -> &'static str;

    /// Processes the exchange.
    async fn process(&self, exchange: &mut Exchange) -> StageOutcome;
}

// ============================================================================
// SECTION: Pipeline
// ============================================================================

/// Ordered list of stages.
#[derive(Clone)]
pub struct GatewayPipeline {
    /// Stages in execution order.
    stages: Vec<Arc<dyn GatewayStage>>,
    /// Challenge attached to `401` rejections.
    challenge: AuthChallenge,
}

impl GatewayPipeline {
    /// Runs the stages in order until one answers.
    ///
    /// Returns `None` when every stage let the exchange continue.
    pub async fn run(&self, exchange: &mut Exchange) -> Option<Response> {
        for stage in &self.stages {
            let response = match stage.process(exchange).await {
                StageOutcome::Continue => continue,
                StageOutcome::Respond(response) => response,
                StageOutcome::Reject(rejection) => rejection.into_response(&self.challenge),
            };
            tracing::debug!(stage = stage.name(), status = %response.status(), "stage answered");
            return Some(exchange.finish(response));
        }
        None
    }

    /// Returns the challenge used for `401` rejections.
    #[must_use]
    pub const fn challenge(&self) -> &AuthChallenge {
        &self.challenge
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }
}

/// Builder enforcing the canonical stage order.
pub struct GatewayPipelineBuilder {
    /// Challenge attached to `401` rejections.
    challenge: AuthChallenge,
    /// Path restriction stage.
    path: Option<Arc<dyn GatewayStage>>,
    /// Cross-origin stage.
    cors: Option<Arc<dyn GatewayStage>>,
    /// Credential extraction stage.
    credential: Option<Arc<dyn GatewayStage>>,
    /// Method classification and probe stage.
    classify: Option<Arc<dyn GatewayStage>>,
    /// Token validation stage.
    token: Option<Arc<dyn GatewayStage>>,
}

impl GatewayPipelineBuilder {
    /// Starts an empty builder with the given challenge.
    #[must_use]
    pub fn new(challenge: AuthChallenge) -> Self {
        Self {
            challenge,
            path: None,
            cors: None,
            credential: None,
            classify: None,
            token: None,
        }
    }

    /// Sets the path stage.
    #[must_use]
    pub fn path(mut self, stage: impl GatewayStage + 'static) -> Self {
        self.path = Some(Arc::new(stage));
        self
    }

    /// Sets the CORS stage.
    #[must_use]
    pub fn cors(mut self, stage: impl GatewayStage + 'static) -> Self {
        self.cors = Some(Arc::new(stage));
        self
    }

    /// Sets the credential stage.
    #[must_use]
    pub fn credential(mut self, stage: impl GatewayStage + 'static) -> Self {
        self.credential = Some(Arc::new(stage));
        self
    }

    /// Sets the classification stage.
    #[must_use]
    pub fn classify(mut self, stage: impl GatewayStage + 'static) -> Self {
        self.classify = Some(Arc::new(stage));
        self
    }

    /// Sets the token stage.
    #[must_use]
    pub fn token(mut self, stage: impl GatewayStage + 'static) -> Self {
        self.token = Some(Arc::new(stage));
        self
    }

    /// Builds the pipeline in canonical order, skipping unset stages.
    #[must_use]
    pub fn build(self) -> GatewayPipeline {
        let stages =
            [self.path, self.cors, self.credential, self.classify, self.token].into_iter().flatten();
        GatewayPipeline {
            stages: stages.collect(),
            challenge: self.challenge,
        }
    }
}

// ============================================================================
// SECTION: Rejections
// ============================================================================

/// `WWW-Authenticate` challenge parameters.
#[derive(Debug, Clone)]
pub struct AuthChallenge {
    /// Challenge scheme (`Bearer` when OAuth is configured, else `Basic`).
    scheme: &'static str,
    /// Realm parameter.
    realm: String,
    /// Protected resource metadata URL.
    resource_metadata: Option<String>,
}

impl AuthChallenge {
    /// Builds a bearer challenge that points at the discovery document.
    #[must_use]
    pub fn bearer(realm: impl Into<String>, resource_metadata: impl Into<String>) -> Self {
        Self {
            scheme: "Bearer",
            realm: realm.into(),
            resource_metadata: Some(resource_metadata.into()),
        }
    }

    /// Builds a basic challenge (no discovery document available).
    #[must_use]
    pub fn basic(realm: impl Into<String>) -> Self {
        Self {
            scheme: "Basic",
            realm: realm.into(),
            resource_metadata: None,
        }
    }

    /// Renders the header value for an authentication error.
    #[must_use]
    pub fn render(&self, error: &AuthError) -> String {
        let mut value = format!("{} realm=\"{}\"", self.scheme, quote_safe(&self.realm));
        if let Some(url) = &self.resource_metadata {
            value.push_str(&format!(", resource_metadata=\"{}\"", quote_safe(url)));
        }
        value.push_str(&format!(
            ", error=\"{}\", error_description=\"{}\"",
            error.code(),
            quote_safe(error.description())
        ));
        value
    }
}

/// Pipeline rejection.
#[derive(Debug)]
pub enum Rejection {
    /// Path is not the gateway endpoint.
    NotFound,
    /// HTTP method is not POST or OPTIONS.
    MethodNotAllowed,
    /// Credentials missing, malformed, or rejected.
    Unauthenticated(AuthError),
    /// Body exceeded the applicable cap.
    PayloadTooLarge {
        /// Cap that was exceeded.
        limit: usize,
    },
    /// Body could not be read.
    BadRequest(String),
}

impl Rejection {
    /// Converts the rejection into an HTTP response.
    #[must_use]
    pub fn into_response(self, challenge: &AuthChallenge) -> Response {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND.into_response(),
            Self::MethodNotAllowed => {
                let mut response = StatusCode::METHOD_NOT_ALLOWED.into_response();
                response.headers_mut().insert(ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
                response
            }
            Self::Unauthenticated(error) => {
                let body = jsonrpc_error_body(UNAUTHENTICATED_CODE, "unauthenticated", Some(json!({
                    "error": error.code(),
                    "error_description": error.description(),
                })));
                let mut response = json_response(StatusCode::UNAUTHORIZED, &body);
                if let Ok(value) = HeaderValue::from_str(&challenge.render(&error)) {
                    response.headers_mut().insert(WWW_AUTHENTICATE, value);
                }
                response
            }
            Self::PayloadTooLarge {
                limit,
            } => {
                let body = jsonrpc_error_body(
                    PAYLOAD_TOO_LARGE_CODE,
                    &format!("request body exceeds {limit} bytes"),
                    None,
                );
                json_response(StatusCode::PAYLOAD_TOO_LARGE, &body)
            }
            Self::BadRequest(message) => {
                let body = jsonrpc_error_body(-32600, &message, None);
                json_response(StatusCode::BAD_REQUEST, &body)
            }
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a JSON-RPC error envelope with a null id.
fn jsonrpc_error_body(code: i64, message: &str, data: Option<serde_json::Value>) -> serde_json::Value {
    let mut error = json!({ "code": code, "message": message });
    if let Some(data) = data {
        error["data"] = data;
    }
    json!({ "jsonrpc": "2.0", "id": null, "error": error })
}

/// Serializes a JSON body with the given status.
pub(crate) fn json_response(status: StatusCode, body: &serde_json::Value) -> Response {
    let mut response = (status, body.to_string()).into_response();
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Replaces characters that would break a quoted header parameter.
fn quote_safe(value: &str) -> String {
    value.chars().map(|ch| if ch == '"' || ch == '\\' || ch.is_control() { '\'' } else { ch }).collect()
}
