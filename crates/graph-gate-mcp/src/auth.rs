// crates/graph-gate-mcp/src/auth.rs
// ============================================================================
// Module: Request Identity
// Description: Credential extraction and per-request caller identity.
// Purpose: Turn the credential header into a typed, fail-closed identity.
// Dependencies: axum, base64, sha2, thiserror
// ============================================================================

//! ## Overview
//! [`CredentialExtractor`] parses the configured credential header into a
//! [`Credential`]. Parsing is pure: a malformed header is an
//! `invalid_request` error and is never downgraded to anonymous access.
//! [`RequestIdentity`] is the value threaded through the gateway once a
//! credential has been accepted; a [`BearerPrincipal`] only exists after token
//! validation succeeded (see [`crate::token`]).
//!
//! Security posture: credentials are untrusted input. Secrets are redacted
//! from `Debug` output and tokens are referenced by SHA-256 fingerprint only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;

use axum::http::HeaderMap;
use axum::http::HeaderName;
use axum::http::header::AUTHORIZATION;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use graph_gate_config::AuthConfig;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted credential header size.
pub const MAX_AUTH_HEADER_BYTES: usize = 8 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Authentication failures surfaced as `401` challenges.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Missing or structurally malformed credentials.
    #[error("invalid_request: {0}")]
    InvalidRequest(String),
    /// Credentials were well-formed but the token was rejected.
    #[error("invalid_token: {0}")]
    InvalidToken(String),
}

impl AuthError {
    /// Returns the OAuth error code for the challenge.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidToken(_) => "invalid_token",
        }
    }

    /// Returns the human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        match self {
            Self::InvalidRequest(message) | Self::InvalidToken(message) => message,
        }
    }
}

// ============================================================================
// SECTION: Identity
// ============================================================================

/// Raw credential parsed from the request header.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// No credential header was present.
    Absent,
    /// HTTP Basic credentials.
    Basic {
        /// Backend username.
        username: String,
        /// Backend password.
        password: String,
    },
    /// Unvalidated bearer token.
    Bearer(String),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("Absent"),
            Self::Basic {
                username, ..
            } => f.debug_struct("Basic").field("username", username).finish_non_exhaustive(),
            Self::Bearer(token) => {
                f.debug_tuple("Bearer").field(&token_fingerprint(token)).finish()
            }
        }
    }
}

/// Caller identity for the lifetime of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestIdentity {
    /// No credentials were presented.
    Anonymous,
    /// Basic credentials, verified by the backend when a session opens.
    Basic(BasicPrincipal),
    /// Bearer token that passed signature, expiry, issuer and audience checks.
    Bearer(BearerPrincipal),
}

impl RequestIdentity {
    /// Returns a stable label for audit and metrics.
    #[must_use]
    pub const fn method_label(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Basic(_) => "basic",
            Self::Bearer(_) => "bearer",
        }
    }

    /// Returns the caller subject when known.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::Basic(principal) => Some(principal.username.as_str()),
            Self::Bearer(principal) => principal.subject.as_deref(),
        }
    }

    /// Returns the bearer token fingerprint when applicable.
    #[must_use]
    pub fn token_fingerprint(&self) -> Option<&str> {
        match self {
            Self::Bearer(principal) => Some(principal.token_fingerprint.as_str()),
            Self::Anonymous | Self::Basic(_) => None,
        }
    }
}

/// Basic-auth principal.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicPrincipal {
    /// Backend username.
    pub username: String,
    /// Backend password.
    password: String,
}

impl BasicPrincipal {
    /// Builds a principal from decoded credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns the password for opening a backend session.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for BasicPrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicPrincipal")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Bearer principal built from a validated token.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerPrincipal {
    /// Raw token (kept for downstream forwarding, never logged).
    token: String,
    /// SHA-256 fingerprint of the token.
    pub token_fingerprint: String,
    /// Token subject (`sub`).
    pub subject: Option<String>,
    /// Audience list from the token.
    pub audience: Vec<String>,
    /// Granted scopes.
    pub scopes: BTreeSet<String>,
}

impl BearerPrincipal {
    /// Builds a principal; only called after audience verification passed.
    #[must_use]
    pub(crate) fn new(
        token: &str,
        subject: Option<String>,
        audience: Vec<String>,
        scopes: BTreeSet<String>,
    ) -> Self {
        Self {
            token: token.to_string(),
            token_fingerprint: token_fingerprint(token),
            subject,
            audience,
            scopes,
        }
    }

    /// Returns the raw token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for BearerPrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerPrincipal")
            .field("token_fingerprint", &self.token_fingerprint)
            .field("subject", &self.subject)
            .field("audience", &self.audience)
            .field("scopes", &self.scopes)
            .finish()
    }
}

// ============================================================================
// SECTION: Credential Extractor
// ============================================================================

/// Parses the configured credential header.
#[derive(Debug, Clone)]
pub struct CredentialExtractor {
    /// Header carrying credentials.
    header: HeaderName,
}

impl CredentialExtractor {
    /// Builds an extractor reading the standard `Authorization` header.
    #[must_use]
    pub const fn standard() -> Self {
        Self {
            header: AUTHORIZATION,
        }
    }

    /// Builds an extractor from auth configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidRequest`] when the header name is invalid.
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let header = HeaderName::from_bytes(config.credential_header.trim().as_bytes())
            .map_err(|_| AuthError::InvalidRequest("invalid credential header name".to_string()))?;
        Ok(Self {
            header,
        })
    }

    /// Returns the configured header name.
    #[must_use]
    pub const fn header(&self) -> &HeaderName {
        &self.header
    }

    /// Copies a custom credential header over `Authorization`.
    ///
    /// Downstream logic only ever reads `Authorization`.
    pub fn normalize(&self, headers: &mut HeaderMap) {
        if self.header == AUTHORIZATION {
            return;
        }
        if let Some(value) = headers.get(&self.header).cloned() {
            headers.insert(AUTHORIZATION, value);
        }
    }

    /// Parses the `Authorization` header into a credential.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidRequest`] for malformed or empty credentials.
    pub fn extract(&self, headers: &HeaderMap) -> Result<Credential, AuthError> {
        let mut values = headers.get_all(AUTHORIZATION).iter();
        let Some(value) = values.next() else {
            return Ok(Credential::Absent);
        };
        if values.next().is_some() {
            return Err(AuthError::InvalidRequest(
                "multiple authorization headers".to_string(),
            ));
        }
        if value.len() > MAX_AUTH_HEADER_BYTES {
            return Err(AuthError::InvalidRequest("authorization header too large".to_string()));
        }
        let value = value
            .to_str()
            .map_err(|_| AuthError::InvalidRequest("authorization header not ascii".to_string()))?;
        parse_credential(value)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses a raw credential header value.
///
/// # Errors
///
/// Returns [`AuthError::InvalidRequest`] for malformed or empty credentials.
pub fn parse_credential(value: &str) -> Result<Credential, AuthError> {
    let trimmed = value.trim();
    if let Some(token) = strip_scheme(trimmed, "Bearer") {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::InvalidRequest("empty bearer token".to_string()));
        }
        return Ok(Credential::Bearer(token.to_string()));
    }
    let Some(encoded) = strip_scheme(trimmed, "Basic") else {
        return Err(AuthError::InvalidRequest("unsupported authorization scheme".to_string()));
    };
    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|_| AuthError::InvalidRequest("invalid basic credentials".to_string()))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| AuthError::InvalidRequest("invalid basic credentials".to_string()))?;
    let Some((username, password)) = decoded.split_once(':') else {
        return Err(AuthError::InvalidRequest("invalid basic credentials".to_string()));
    };
    if username.is_empty() || password.is_empty() {
        return Err(AuthError::InvalidRequest("empty username or password".to_string()));
    }
    Ok(Credential::Basic {
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// Strips a case-insensitive auth scheme followed by whitespace.
///
/// A bare scheme with nothing after it yields an empty remainder.
fn strip_scheme<'a>(value: &'a str, scheme: &str) -> Option<&'a str> {
    let head = value.get(.. scheme.len())?;
    if !head.eq_ignore_ascii_case(scheme) {
        return None;
    }
    let rest = value.get(scheme.len() ..)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest)
    } else {
        None
    }
}

/// Returns the hex SHA-256 fingerprint of a token.
#[must_use]
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
