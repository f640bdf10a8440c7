// crates/graph-gate-mcp/src/token.rs
// ============================================================================
// Module: Token Validator
// Description: RS256 bearer token validation against a cached remote key set.
// Purpose: Reject tokens minted for any resource other than this server.
// Dependencies: jsonwebtoken, reqwest, tokio, tracing
// ============================================================================

//! ## Overview
//! [`TokenValidator`] checks, in order: the RS256 signature against a key
//! from the issuer's key set, expiry with a bounded clock skew, issuer
//! equality, and exact membership of the configured resource identifier in
//! the token audience. Every failure is an `invalid_token` rejection.
//!
//! Key sets are cached per issuer for a fixed window and refreshed at most
//! once per window. Refresh is single-flight: concurrent validators wait for
//! the one in-progress fetch instead of issuing their own.
//!
//! Security posture: tokens are untrusted input and are never logged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use graph_gate_config::OAuthConfig;
use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::Validation;
use jsonwebtoken::decode;
use jsonwebtoken::decode_header;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::JwkSet;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use tracing::warn;

use crate::auth::AuthError;
use crate::auth::BearerPrincipal;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted token length.
const MAX_TOKEN_BYTES: usize = 16 * 1024;
/// Maximum accepted key set document size.
const MAX_JWKS_BYTES: usize = 256 * 1024;
/// Cache windows a key set may outlive its last successful fetch.
const MAX_STALE_WINDOWS: u32 = 10;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Token validation failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Token could not be parsed as a JWT.
    #[error("malformed token")]
    Malformed,
    /// Token header names an algorithm other than RS256.
    #[error("unsupported token algorithm")]
    UnsupportedAlgorithm,
    /// No key in the issuer key set matches the token.
    #[error("signing key not found")]
    UnknownKey,
    /// Key set could not be fetched.
    #[error("key set unavailable: {0}")]
    KeySetUnavailable(String),
    /// Signature verification failed.
    #[error("invalid token signature")]
    InvalidSignature,
    /// Token is expired beyond the allowed skew.
    #[error("token expired")]
    Expired,
    /// Token is not valid yet.
    #[error("token not yet valid")]
    NotYetValid,
    /// Issuer claim does not match the trusted issuer.
    #[error("token issuer mismatch")]
    IssuerMismatch,
    /// Audience does not include this resource.
    #[error("token audience does not include this resource")]
    AudienceMismatch,
    /// Claims were structurally invalid.
    #[error("invalid token claims: {0}")]
    InvalidClaims(String),
}

impl TokenError {
    /// Returns a caller-facing description that tells the client what to do.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::AudienceMismatch => {
                "token audience does not include this resource; request a token for this \
                 resource identifier"
                    .to_string()
            }
            Self::Expired => "token expired; obtain a new token".to_string(),
            Self::KeySetUnavailable(_) => {
                "signing keys temporarily unavailable; retry later".to_string()
            }
            other => format!("{other}; obtain a new token"),
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(error: TokenError) -> Self {
        Self::InvalidToken(error.description())
    }
}

// ============================================================================
// SECTION: Claims
// ============================================================================

/// Audience claim (single string or list).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum TokenAudience {
    /// Single audience.
    Single(String),
    /// Audience list.
    Multiple(Vec<String>),
}

impl TokenAudience {
    /// Returns true when `resource` is an exact member.
    #[must_use]
    pub fn contains(&self, resource: &str) -> bool {
        match self {
            Self::Single(value) => value == resource,
            Self::Multiple(values) => values.iter().any(|value| value == resource),
        }
    }

    fn into_vec(self) -> Vec<String> {
        match self {
            Self::Single(value) => vec![value],
            Self::Multiple(values) => values,
        }
    }
}

/// Registered and scope claims read from a token.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    /// Subject.
    #[serde(default)]
    pub sub: Option<String>,
    /// Issuer.
    #[serde(default)]
    pub iss: Option<String>,
    /// Audience.
    #[serde(default)]
    pub aud: Option<TokenAudience>,
    /// Space-delimited OAuth scopes.
    #[serde(default)]
    pub scope: Option<String>,
    /// Permission list (authorization servers with RBAC emit this instead).
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
    /// Remaining claims.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl TokenClaims {
    /// Returns the union of `scope` and `permissions`.
    #[must_use]
    pub fn scopes(&self) -> BTreeSet<String> {
        let mut scopes: BTreeSet<String> = self
            .scope
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if let Some(permissions) = &self.permissions {
            scopes.extend(permissions.iter().cloned());
        }
        scopes
    }
}

// ============================================================================
// SECTION: Key Set Sources
// ============================================================================

/// Source of issuer key sets.
#[async_trait]
pub trait KeySetSource: Send + Sync {
    /// Fetches the current key set for `issuer`.
    async fn fetch(&self, issuer: &str) -> Result<JwkSet, TokenError>;
}

/// Fetches key sets over HTTPS.
pub struct HttpKeySetSource {
    /// HTTP client with a bounded timeout.
    client: reqwest::Client,
    /// Key set URL.
    jwks_uri: String,
}

impl HttpKeySetSource {
    /// Builds a source for a single key set URL.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::KeySetUnavailable`] when the client cannot be built.
    pub fn new(jwks_uri: impl Into<String>, timeout: Duration) -> Result<Self, TokenError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| TokenError::KeySetUnavailable(err.to_string()))?;
        Ok(Self {
            client,
            jwks_uri: jwks_uri.into(),
        })
    }
}

#[async_trait]
impl KeySetSource for HttpKeySetSource {
    async fn fetch(&self, issuer: &str) -> Result<JwkSet, TokenError> {
        debug!(issuer, jwks_uri = %self.jwks_uri, "fetching key set");
        let response = self
            .client
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|err| TokenError::KeySetUnavailable(err.to_string()))?;
        if !response.status().is_success() {
            return Err(TokenError::KeySetUnavailable(format!(
                "key set endpoint returned {}",
                response.status()
            )));
        }
        let body =
            response.bytes().await.map_err(|err| TokenError::KeySetUnavailable(err.to_string()))?;
        if body.len() > MAX_JWKS_BYTES {
            return Err(TokenError::KeySetUnavailable("key set too large".to_string()));
        }
        serde_json::from_slice(&body).map_err(|err| TokenError::KeySetUnavailable(err.to_string()))
    }
}

/// Fixed key set (tests and air-gapped deployments).
pub struct StaticKeySetSource {
    /// Key set served for every issuer.
    keys: JwkSet,
}

impl StaticKeySetSource {
    /// Wraps a key set.
    #[must_use]
    pub const fn new(keys: JwkSet) -> Self {
        Self {
            keys,
        }
    }
}

#[async_trait]
impl KeySetSource for StaticKeySetSource {
    async fn fetch(&self, _issuer: &str) -> Result<JwkSet, TokenError> {
        Ok(self.keys.clone())
    }
}

// ============================================================================
// SECTION: Validator
// ============================================================================

/// Cached key set for one issuer.
struct CachedKeySet {
    /// Parsed key set.
    keys: Arc<JwkSet>,
    /// Last successful fetch.
    fetched_at: Instant,
    /// Last fetch attempt, successful or not.
    checked_at: Instant,
}

impl CachedKeySet {
    /// Returns true when `keys` may be served without contacting the source.
    fn servable(&self, window: Duration) -> bool {
        let age = self.fetched_at.elapsed();
        let retried_recently = self.checked_at.elapsed() < window;
        age < window || (retried_recently && age < window.saturating_mul(MAX_STALE_WINDOWS))
    }
}

/// Bearer token validator bound to one resource identifier.
pub struct TokenValidator {
    /// Trusted issuer.
    issuer: String,
    /// Resource identifier the audience must contain.
    resource_identifier: String,
    /// Allowed clock skew in seconds.
    leeway_secs: u64,
    /// Key set cache window.
    cache_window: Duration,
    /// Key set source.
    source: Arc<dyn KeySetSource>,
    /// Per-issuer key set cache; the lock is held across a refresh.
    cache: Mutex<HashMap<String, CachedKeySet>>,
}

impl TokenValidator {
    /// Builds a validator from OAuth configuration.
    #[must_use]
    pub fn new(config: &OAuthConfig, source: Arc<dyn KeySetSource>) -> Self {
        Self {
            issuer: config.issuer(),
            resource_identifier: config.resource_identifier.clone(),
            leeway_secs: config.leeway_secs,
            cache_window: Duration::from_secs(config.jwks_cache_secs),
            source,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Builds a validator that fetches keys over HTTPS.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] when the HTTP client cannot be built.
    pub fn from_config(config: &OAuthConfig) -> Result<Self, TokenError> {
        let source = HttpKeySetSource::new(
            config.jwks_uri(),
            Duration::from_millis(config.jwks_timeout_ms),
        )?;
        Ok(Self::new(config, Arc::new(source)))
    }

    /// Returns the resource identifier tokens must be issued for.
    #[must_use]
    pub fn resource_identifier(&self) -> &str {
        &self.resource_identifier
    }

    /// Validates a bearer token and builds the caller principal.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] when any check fails.
    pub async fn validate(&self, token: &str) -> Result<BearerPrincipal, TokenError> {
        if token.len() > MAX_TOKEN_BYTES {
            return Err(TokenError::Malformed);
        }
        let header = decode_header(token).map_err(|_| TokenError::Malformed)?;
        if header.alg != Algorithm::RS256 {
            return Err(TokenError::UnsupportedAlgorithm);
        }
        let key = self.decoding_key(header.kid.as_deref()).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = self.leeway_secs;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);
        let data = decode::<TokenClaims>(token, &key, &validation).map_err(map_jwt_error)?;
        let claims = data.claims;

        if claims.iss.as_deref() != Some(self.issuer.as_str()) {
            return Err(TokenError::IssuerMismatch);
        }
        let audience = claims.aud.clone().ok_or(TokenError::AudienceMismatch)?;
        if !audience.contains(&self.resource_identifier) {
            return Err(TokenError::AudienceMismatch);
        }
        let scopes = claims.scopes();
        Ok(BearerPrincipal::new(token, claims.sub, audience.into_vec(), scopes))
    }

    /// Resolves the decoding key for `kid` from the cached key set.
    async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, TokenError> {
        let keys = self.key_set().await?;
        let jwk = match kid {
            Some(kid) => keys.find(kid).ok_or(TokenError::UnknownKey)?,
            None => match keys.keys.as_slice() {
                [only] => only,
                _ => return Err(TokenError::UnknownKey),
            },
        };
        DecodingKey::from_jwk(jwk).map_err(|_| TokenError::UnknownKey)
    }

    /// Returns the issuer key set, refreshing it when the window elapsed.
    ///
    /// A failed refresh keeps serving the previous keys, retrying at most
    /// once per window, until they are [`MAX_STALE_WINDOWS`] windows old.
    async fn key_set(&self) -> Result<Arc<JwkSet>, TokenError> {
        let mut cache = self.cache.lock().await;
        if let Some(entry) = cache.get(&self.issuer)
            && entry.servable(self.cache_window)
        {
            return Ok(Arc::clone(&entry.keys));
        }
        match self.source.fetch(&self.issuer).await {
            Ok(keys) => {
                let keys = Arc::new(keys);
                let now = Instant::now();
                cache.insert(self.issuer.clone(), CachedKeySet {
                    keys: Arc::clone(&keys),
                    fetched_at: now,
                    checked_at: now,
                });
                Ok(keys)
            }
            Err(err) => {
                let Some(stale) = cache.get_mut(&self.issuer) else {
                    return Err(err);
                };
                stale.checked_at = Instant::now();
                if stale.fetched_at.elapsed() >= self.cache_window.saturating_mul(MAX_STALE_WINDOWS) {
                    warn!(issuer = %self.issuer, error = %err, "key set refresh failed; cached keys expired");
                    return Err(err);
                }
                warn!(issuer = %self.issuer, error = %err, "key set refresh failed; serving stale keys");
                Ok(Arc::clone(&stale.keys))
            }
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps jsonwebtoken errors onto validator errors.
fn map_jwt_error(error: jsonwebtoken::errors::Error) -> TokenError {
    match error.kind() {
        ErrorKind::InvalidSignature => TokenError::InvalidSignature,
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::ImmatureSignature => TokenError::NotYetValid,
        ErrorKind::InvalidAlgorithm => TokenError::UnsupportedAlgorithm,
        ErrorKind::MissingRequiredClaim(claim) => {
            TokenError::InvalidClaims(format!("missing {claim}"))
        }
        ErrorKind::Json(_) => TokenError::InvalidClaims("claims are not valid json".to_string()),
        _ => TokenError::Malformed,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
