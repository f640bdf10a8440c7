// crates/graph-gate-mcp/src/guards.rs
// ============================================================================
// Module: Path and CORS Guards
// Description: Single-endpoint restriction and origin allow-listing.
// Purpose: Reject unrelated traffic before any authentication work.
// Dependencies: axum, graph-gate-config
// ============================================================================

//! ## Overview
//! [`PathGuard`] accepts only the canonical endpoint path, with or without a
//! trailing slash, and only `POST`/`OPTIONS` on it. [`CorsGuard`] is inert
//! when no origins are configured; otherwise it echoes an allowed `Origin`
//! and always advertises methods, headers, and max-age.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::Method;
use axum::http::StatusCode;
use axum::http::header::ACCESS_CONTROL_ALLOW_HEADERS;
use axum::http::header::ACCESS_CONTROL_ALLOW_METHODS;
use axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN;
use axum::http::header::ACCESS_CONTROL_EXPOSE_HEADERS;
use axum::http::header::ACCESS_CONTROL_MAX_AGE;
use axum::http::header::ALLOW;
use axum::http::header::VARY;
use axum::response::IntoResponse;
use axum::response::Response;
use graph_gate_config::AllowedOrigins;
use graph_gate_config::CorsConfig;

use crate::pipeline::ALLOWED_METHODS;
use crate::pipeline::Rejection;

// ============================================================================
// SECTION: Path Guard
// ============================================================================

/// Restricts traffic to the single gateway endpoint.
#[derive(Debug, Clone)]
pub struct PathGuard {
    /// Endpoint path without a trailing slash.
    canonical: String,
}

impl PathGuard {
    /// Builds a guard for `endpoint` (trailing slash ignored).
    #[must_use]
    pub fn new(endpoint: &str) -> Self {
        Self {
            canonical: endpoint.trim().trim_end_matches('/').to_string(),
        }
    }

    /// Returns true when `path` is the endpoint.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        path == self.canonical
            || path.strip_suffix('/').is_some_and(|stripped| stripped == self.canonical)
    }

    /// Checks the request line.
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::NotFound`] for other paths and
    /// [`Rejection::MethodNotAllowed`] for methods other than POST/OPTIONS.
    pub fn check(&self, method: &Method, path: &str) -> Result<(), Rejection> {
        if !self.matches(path) {
            return Err(Rejection::NotFound);
        }
        if *method == Method::POST || *method == Method::OPTIONS {
            Ok(())
        } else {
            Err(Rejection::MethodNotAllowed)
        }
    }
}

// ============================================================================
// SECTION: CORS Guard
// ============================================================================

/// Origin allow-list enforcement.
#[derive(Debug, Clone)]
pub struct CorsGuard {
    /// Allowed origins.
    origins: AllowedOrigins,
    /// Pre-rendered `Access-Control-Allow-Headers` value.
    allow_headers: HeaderValue,
    /// Pre-rendered `Access-Control-Max-Age` value.
    max_age: HeaderValue,
}

impl CorsGuard {
    /// Builds the guard; a custom credential header is always advertised.
    #[must_use]
    pub fn from_config(config: &CorsConfig, credential_header: &str) -> Self {
        let mut headers: Vec<&str> = config.allowed_headers.iter().map(String::as_str).collect();
        let credential_header = credential_header.trim();
        if !headers.iter().any(|header| header.eq_ignore_ascii_case(credential_header)) {
            headers.push(credential_header);
        }
        let allow_headers = HeaderValue::from_str(&headers.join(", "))
            .unwrap_or_else(|_| HeaderValue::from_static("Content-Type, Authorization"));
        Self {
            origins: config.allowed_origins.clone(),
            allow_headers,
            max_age: HeaderValue::from(config.max_age_secs),
        }
    }

    /// Returns true when origins are configured.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.origins.is_enabled()
    }

    /// Computes the CORS headers for a request carrying `origin`.
    ///
    /// Returns an empty map when CORS is disabled.
    #[must_use]
    pub fn headers_for(&self, origin: Option<&HeaderValue>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if !self.is_enabled() {
            return headers;
        }
        if let Some(origin) = origin
            && origin.to_str().is_ok_and(|value| self.origins.allows(value))
        {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
        }
        headers.insert(VARY, HeaderValue::from_static("Origin"));
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOWED_METHODS));
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, self.allow_headers.clone());
        headers.insert(ACCESS_CONTROL_MAX_AGE, self.max_age.clone());
        headers.insert(
            ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static("WWW-Authenticate, Mcp-Session-Id"),
        );
        headers
    }

    /// Builds the `204` answer for an `OPTIONS` request.
    #[must_use]
    pub fn preflight_response(&self) -> Response {
        let mut response = StatusCode::NO_CONTENT.into_response();
        response.headers_mut().insert(ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
        response
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::*;

    fn cors(origins: AllowedOrigins) -> CorsGuard {
        let config = CorsConfig {
            allowed_origins: origins,
            ..CorsConfig::default()
        };
        CorsGuard::from_config(&config, "Authorization")
    }

    #[test]
    fn path_guard_accepts_trailing_slash() {
        let guard = PathGuard::new("/mcp");
        assert!(guard.matches("/mcp"));
        assert!(guard.matches("/mcp/"));
        assert!(!guard.matches("/mcp//"));
        assert!(!guard.matches("/mcpx"));
        assert!(!guard.matches("/"));
    }

    #[test]
    fn path_guard_rejects_get_with_method_not_allowed() {
        let guard = PathGuard::new("/mcp/");
        assert!(matches!(guard.check(&Method::GET, "/mcp"), Err(Rejection::MethodNotAllowed)));
        assert!(matches!(guard.check(&Method::DELETE, "/mcp"), Err(Rejection::MethodNotAllowed)));
        assert!(matches!(guard.check(&Method::POST, "/other"), Err(Rejection::NotFound)));
        assert!(guard.check(&Method::POST, "/mcp").is_ok());
        assert!(guard.check(&Method::OPTIONS, "/mcp/").is_ok());
    }

    #[test]
    fn cors_echoes_only_listed_origins() {
        let guard = cors(AllowedOrigins::List(vec!["https://a.example".to_string()]));
        let allowed = guard.headers_for(Some(&HeaderValue::from_static("https://a.example")));
        assert_eq!(allowed.get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "https://a.example");
        let denied = guard.headers_for(Some(&HeaderValue::from_static("https://b.example")));
        assert!(denied.get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
        assert!(denied.get(ACCESS_CONTROL_ALLOW_METHODS).is_some());
        assert!(denied.get(ACCESS_CONTROL_MAX_AGE).is_some());
    }

    #[test]
    fn cors_wildcard_echoes_request_origin() {
        let guard = cors(AllowedOrigins::Any);
        let headers = guard.headers_for(Some(&HeaderValue::from_static("https://z.example")));
        assert_eq!(headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "https://z.example");
    }

    #[test]
    fn cors_disabled_adds_nothing() {
        let guard = cors(AllowedOrigins::Disabled);
        assert!(guard.headers_for(Some(&HeaderValue::from_static("https://a.example"))).is_empty());
    }

    #[test]
    fn custom_credential_header_is_advertised() {
        let config = CorsConfig {
            allowed_origins: AllowedOrigins::Any,
            ..CorsConfig::default()
        };
        let guard = CorsGuard::from_config(&config, "X-Graph-Auth");
        let headers = guard.headers_for(None);
        let advertised = headers.get(ACCESS_CONTROL_ALLOW_HEADERS).unwrap().to_str().unwrap();
        assert!(advertised.contains("X-Graph-Auth"));
    }
}
