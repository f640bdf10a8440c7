// crates/graph-gate-mcp/src/backend.rs
// ============================================================================
// Module: Graph Backend
// Description: Backend trait, per-request credentials, and credential resolution.
// Purpose: Open backend sessions scoped to the calling identity.
// Dependencies: async-trait, graph-gate-config, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The gateway never holds a shared backend session. Each verification and
//! tool call hands [`BackendCredentials`] to the [`GraphBackend`], which opens
//! a session for exactly that caller. [`CredentialResolver`] decides which
//! credentials a [`RequestIdentity`] maps to:
//! - Basic principals use their own credentials.
//! - Bearer principals use the configured service credentials.
//! - Anonymous callers use service credentials only when auth is disabled.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use async_trait::async_trait;
use graph_gate_config::AuthMode;
use graph_gate_config::ServiceCredentialsConfig;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::auth::RequestIdentity;

// ============================================================================
// SECTION: Types
// ============================================================================

/// One row of query output keyed by column name.
pub type Row = Map<String, Value>;

/// Credentials for one backend session.
#[derive(Clone, PartialEq, Eq)]
pub struct BackendCredentials {
    /// Backend username.
    pub username: String,
    /// Backend password.
    password: String,
}

impl BackendCredentials {
    /// Builds credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns the password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for BackendCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Transaction access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Read-only; the transaction is rolled back.
    Read,
    /// Read-write; the transaction is committed.
    Write,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Backend failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The backend could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// The backend rejected the credentials.
    #[error("backend rejected credentials: {0}")]
    Unauthorized(String),
    /// The query failed.
    #[error("query failed: {0}")]
    Query(String),
    /// The operation exceeded its time bound.
    #[error("backend operation timed out")]
    Timeout,
    /// No credentials are available for this caller.
    #[error("no backend credentials available for this caller")]
    MissingCredentials,
}

impl BackendError {
    /// Returns true when retrying later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout)
    }
}

// ============================================================================
// SECTION: Backend Trait
// ============================================================================

/// Graph database reachable with per-caller credentials.
#[async_trait]
pub trait GraphBackend: Send + Sync {
    /// Opens a session and confirms the backend answers.
    async fn verify_connectivity(&self, credentials: &BackendCredentials) -> Result<(), BackendError>;

    /// Runs one query and returns its rows.
    async fn run_query(
        &self,
        credentials: &BackendCredentials,
        cypher: &str,
        params: Map<String, Value>,
        mode: AccessMode,
    ) -> Result<Vec<Row>, BackendError>;
}

// ============================================================================
// SECTION: Credential Resolution
// ============================================================================

/// Maps a request identity to backend credentials.
#[derive(Clone)]
pub struct CredentialResolver {
    /// Gateway auth mode.
    mode: AuthMode,
    /// Service account credentials.
    service: Option<BackendCredentials>,
}

impl CredentialResolver {
    /// Builds a resolver.
    #[must_use]
    pub fn new(mode: AuthMode, service: Option<&ServiceCredentialsConfig>) -> Self {
        Self {
            mode,
            service: service.map(|creds| BackendCredentials::new(&creds.username, &creds.password)),
        }
    }

    /// Resolves credentials for `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::MissingCredentials`] when the identity has no
    /// credentials of its own and no service account applies.
    pub fn resolve(&self, identity: &RequestIdentity) -> Result<BackendCredentials, BackendError> {
        match identity {
            RequestIdentity::Basic(principal) => {
                Ok(BackendCredentials::new(&principal.username, principal.password()))
            }
            RequestIdentity::Bearer(_) => self.service.clone().ok_or(BackendError::MissingCredentials),
            RequestIdentity::Anonymous => match self.mode {
                AuthMode::Disabled => self.service.clone().ok_or(BackendError::MissingCredentials),
                AuthMode::Required => Err(BackendError::MissingCredentials),
            },
        }
    }
}

impl fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("mode", &self.mode)
            .field("service", &self.service.as_ref().map(|creds| creds.username.as_str()))
            .finish()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
