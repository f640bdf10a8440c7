// crates/graph-gate-mcp/src/oauth_proxy.rs
// ============================================================================
// Module: OAuth Proxy
// Description: Authorize and token endpoints forwarded to the upstream server.
// Purpose: Bind issued tokens to this resource by injecting `audience`.
// Dependencies: axum, reqwest, url
// ============================================================================

//! ## Overview
//! Clients that do not send an `audience` (or send the wrong one) would get
//! tokens this server rejects. The proxy rewrites both legs of the flow so the
//! upstream always sees `audience=<resource identifier>`:
//!
//! - `GET /oauth/authorize` answers `302` to the upstream authorize URL with
//!   the client's query plus the audience.
//! - `POST /oauth/token` forwards the form body upstream with the audience and
//!   relays the upstream status, content type and body.
//!
//! Any client-supplied `audience` is dropped before the injected one is added.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::RawQuery;
use axum::extract::State;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::header::CACHE_CONTROL;
use axum::http::header::CONTENT_TYPE;
use axum::http::header::LOCATION;
use axum::response::IntoResponse;
use axum::response::Response;
use graph_gate_config::OAuthConfig;
use serde_json::json;
use thiserror::Error;
use url::Url;
use url::form_urlencoded;

use crate::pipeline::json_response;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Parameter carrying the resource binding.
pub const AUDIENCE_PARAM: &str = "audience";
/// Maximum relayed upstream token response size.
const MAX_UPSTREAM_BODY_BYTES: usize = 64 * 1024;
/// Maximum accepted token request body size.
const MAX_TOKEN_REQUEST_BYTES: usize = 16 * 1024;
/// Form content type used for the upstream token request.
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Proxy failures.
#[derive(Debug, Error)]
pub enum OAuthProxyError {
    /// The upstream URL could not be parsed.
    #[error("invalid upstream url: {0}")]
    InvalidUpstream(String),
    /// The HTTP client could not be built.
    #[error("http client error: {0}")]
    Client(String),
    /// The upstream request failed.
    #[error("upstream request failed: {0}")]
    Upstream(String),
    /// The client request was rejected before forwarding.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl OAuthProxyError {
    /// Renders the error as an OAuth-style JSON answer.
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Self::InvalidUpstream(_) | Self::Client(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "server_error")
            }
            Self::Upstream(_) => (StatusCode::BAD_GATEWAY, "temporarily_unavailable"),
            Self::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
        };
        tracing::warn!(error = %self, "oauth proxy request failed");
        json_response(status, &json!({ "error": code, "error_description": self.to_string() }))
    }
}

// ============================================================================
// SECTION: Proxy
// ============================================================================

/// Forwards OAuth requests upstream with the audience injected.
#[derive(Debug, Clone)]
pub struct OAuthProxy {
    /// Client used for token exchanges.
    client: reqwest::Client,
    /// Upstream authorize endpoint.
    authorize_url: Url,
    /// Upstream token endpoint.
    token_url: Url,
    /// Audience injected into every request.
    audience: String,
}

impl OAuthProxy {
    /// Builds the proxy from the OAuth policy.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthProxyError`] when an upstream URL is invalid or the
    /// client cannot be built.
    pub fn from_config(config: &OAuthConfig) -> Result<Self, OAuthProxyError> {
        let parse = |raw: String| {
            Url::parse(&raw).map_err(|err| OAuthProxyError::InvalidUpstream(format!("{raw}: {err}")))
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.proxy.timeout_ms))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| OAuthProxyError::Client(err.to_string()))?;
        Ok(Self {
            client,
            authorize_url: parse(config.upstream_authorize_url())?,
            token_url: parse(config.upstream_token_url())?,
            audience: config.resource_identifier.clone(),
        })
    }

    /// Returns the upstream authorize URL for a client query string.
    #[must_use]
    pub fn authorize_location(&self, raw_query: Option<&str>) -> Url {
        let mut location = self.authorize_url.clone();
        let forwarded = with_audience(raw_query.unwrap_or_default().as_bytes(), &self.audience);
        let merged = match location.query() {
            Some(existing) if !existing.is_empty() => format!("{existing}&{forwarded}"),
            _ => forwarded,
        };
        location.set_query(Some(&merged));
        location
    }

    /// Answers the authorize leg with a redirect upstream.
    #[must_use]
    pub fn authorize_redirect(&self, raw_query: Option<&str>) -> Response {
        let location = self.authorize_location(raw_query);
        match HeaderValue::from_str(location.as_str()) {
            Ok(value) => {
                let mut response = StatusCode::FOUND.into_response();
                response.headers_mut().insert(LOCATION, value);
                response
            }
            Err(err) => OAuthProxyError::InvalidUpstream(err.to_string()).into_response(),
        }
    }

    /// Forwards a token request upstream and relays the answer.
    pub async fn exchange_token(&self, body: &[u8]) -> Response {
        match self.forward_token(body).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        }
    }

    async fn forward_token(&self, body: &[u8]) -> Result<Response, OAuthProxyError> {
        if body.len() > MAX_TOKEN_REQUEST_BYTES {
            return Err(OAuthProxyError::InvalidRequest("token request too large".to_string()));
        }
        let form = with_audience(body, &self.audience);
        let upstream = self
            .client
            .post(self.token_url.clone())
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(form)
            .send()
            .await
            .map_err(|err| OAuthProxyError::Upstream(err.without_url().to_string()))?;
        let status = upstream.status();
        let content_type = upstream.headers().get(CONTENT_TYPE).cloned();
        let payload =
            upstream.bytes().await.map_err(|err| OAuthProxyError::Upstream(err.to_string()))?;
        if payload.len() > MAX_UPSTREAM_BODY_BYTES {
            return Err(OAuthProxyError::Upstream("upstream response too large".to_string()));
        }
        tracing::debug!(status = %status, "token request relayed");
        let mut response = (status, payload).into_response();
        if let Some(content_type) = content_type {
            response.headers_mut().insert(CONTENT_TYPE, content_type);
        }
        response.headers_mut().insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        Ok(response)
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `GET /oauth/authorize`.
pub async fn authorize_handler(
    State(proxy): State<Arc<OAuthProxy>>,
    RawQuery(query): RawQuery,
) -> Response {
    proxy.authorize_redirect(query.as_deref())
}

/// `POST /oauth/token`.
pub async fn token_handler(State(proxy): State<Arc<OAuthProxy>>, body: Bytes) -> Response {
    proxy.exchange_token(&body).await
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Re-encodes a form or query string, replacing any `audience` pair.
#[must_use]
pub fn with_audience(encoded: &[u8], audience: &str) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in form_urlencoded::parse(encoded) {
        if key != AUDIENCE_PARAM {
            serializer.append_pair(&key, &value);
        }
    }
    serializer.append_pair(AUDIENCE_PARAM, audience);
    serializer.finish()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
