// crates/graph-gate-mcp/src/classify.rs
// ============================================================================
// Module: Method Classifier
// Description: JSON-RPC method peeking and the unauthenticated probe guard.
// Purpose: Decide which methods may proceed without credentials.
// Dependencies: axum, http-body-util, serde_json
// ============================================================================

//! ## Overview
//! The classifier reads the request body under a cap, inspects the JSON-RPC
//! `method`, and puts the same bytes back on the request so later consumers
//! see an unconsumed body. A closed allow-list of handshake methods never
//! needs credentials. Operators may additionally opt in to credential-free
//! `ping` and `tools/list`; those probes are only ever served for `POST`
//! requests whose body fits the probe cap.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::body::Body;
use axum::body::Bytes;
use axum::http::Method;
use axum::http::Request;
use axum::http::header::CONTENT_LENGTH;
use graph_gate_config::AuthConfig;
use http_body_util::BodyExt;
use http_body_util::LengthLimitError;
use http_body_util::Limited;
use serde_json::Value;

use crate::pipeline::Rejection;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Methods that never require credentials.
pub const PUBLIC_METHODS: &[&str] = &["initialize", "notifications/initialized"];
/// Liveness probe method.
pub const PING_METHOD: &str = "ping";
/// Capability listing probe method.
pub const TOOLS_LIST_METHOD: &str = "tools/list";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Credential requirement of a JSON-RPC method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodClass {
    /// Protocol handshake; always public.
    Public,
    /// Probe method eligible for the opt-in exception.
    Probe,
    /// Everything else, including unparseable bodies.
    Protected,
}

/// Classifies JSON-RPC methods.
#[derive(Debug, Clone, Copy, Default)]
pub struct MethodClassifier;

impl MethodClassifier {
    /// Classifies a method name.
    #[must_use]
    pub fn classify(self, method: Option<&str>) -> MethodClass {
        match method {
            Some(name) if PUBLIC_METHODS.contains(&name) => MethodClass::Public,
            Some(PING_METHOD | TOOLS_LIST_METHOD) => MethodClass::Probe,
            _ => MethodClass::Protected,
        }
    }

    /// Extracts the `method` field from a single JSON-RPC request body.
    ///
    /// Batches and non-object payloads yield `None`.
    #[must_use]
    pub fn peek_method(self, body: &[u8]) -> Option<String> {
        let value: Value = serde_json::from_slice(body).ok()?;
        value.get("method").and_then(Value::as_str).map(str::to_string)
    }
}

/// Opt-in exception for credential-free probes.
#[derive(Debug, Clone, Copy)]
pub struct UnauthenticatedProbeGuard {
    /// `ping` is allowed without credentials.
    allow_ping: bool,
    /// `tools/list` is allowed without credentials.
    allow_tools_list: bool,
    /// Body cap on the probe path.
    max_body_bytes: usize,
}

impl UnauthenticatedProbeGuard {
    /// Builds the guard from auth configuration.
    #[must_use]
    pub const fn from_config(config: &AuthConfig) -> Self {
        Self {
            allow_ping: config.allow_unauthenticated_ping,
            allow_tools_list: config.allow_unauthenticated_tools_list,
            max_body_bytes: config.unauthenticated_max_body_bytes,
        }
    }

    /// Returns true when any probe is opted in.
    #[must_use]
    pub const fn any_enabled(&self) -> bool {
        self.allow_ping || self.allow_tools_list
    }

    /// Returns the probe body cap.
    #[must_use]
    pub const fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Returns true when `method` is an opted-in probe.
    #[must_use]
    pub fn permits(&self, method: &str) -> bool {
        match method {
            PING_METHOD => self.allow_ping,
            TOOLS_LIST_METHOD => self.allow_tools_list,
            _ => false,
        }
    }

    /// Checks the request line for the probe path.
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::MethodNotAllowed`] for anything but `POST`.
    pub fn check_method(&self, method: &Method) -> Result<(), Rejection> {
        if *method == Method::POST { Ok(()) } else { Err(Rejection::MethodNotAllowed) }
    }
}

// ============================================================================
// SECTION: Body Handling
// ============================================================================

/// Reads the body under `limit` and restores it onto the request.
///
/// A declared `Content-Length` above the limit is rejected before reading.
///
/// # Errors
///
/// Returns [`Rejection::PayloadTooLarge`] when the cap is exceeded and
/// [`Rejection::BadRequest`] when the body cannot be read.
pub async fn read_and_restore(request: &mut Request<Body>, limit: usize) -> Result<Bytes, Rejection> {
    let declared = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    if declared.is_some_and(|length| length > limit) {
        return Err(Rejection::PayloadTooLarge {
            limit,
        });
    }
    let body = std::mem::take(request.body_mut());
    let collected = Limited::new(body, limit).collect().await.map_err(|err| {
        if err.is::<LengthLimitError>() {
            Rejection::PayloadTooLarge {
                limit,
            }
        } else {
            Rejection::BadRequest("request body could not be read".to_string())
        }
    })?;
    let bytes = collected.to_bytes();
    *request.body_mut() = Body::from(bytes.clone());
    Ok(bytes)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
