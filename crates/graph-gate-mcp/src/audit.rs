// crates/graph-gate-mcp/src/audit.rs
// ============================================================================
// Module: Auth Audit Logging
// Description: Structured audit events for authentication and authorization.
// Purpose: Emit redacted JSON-line decisions without hard dependencies.
// Dependencies: graph-gate-config, serde
// ============================================================================

//! ## Overview
//! Every gate decision (credential rejected, token rejected, tool denied,
//! tool allowed) becomes one [`AuthAuditEvent`]. Events carry the token
//! fingerprint, never the token or password.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use graph_gate_config::AuditConfig;
use graph_gate_config::AuditSinkKind;
use serde::Serialize;

use crate::auth::RequestIdentity;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Authentication or authorization decision.
#[derive(Debug, Clone, Serialize)]
pub struct AuthAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Pipeline stage or gate that decided.
    pub stage: &'static str,
    /// Whether the request was allowed.
    pub allowed: bool,
    /// Credential kind label.
    pub auth_method: &'static str,
    /// Caller subject when known.
    pub subject: Option<String>,
    /// Token fingerprint for bearer callers.
    pub token_fingerprint: Option<String>,
    /// JSON-RPC method when known.
    pub rpc_method: Option<String>,
    /// Tool name for tool calls.
    pub tool: Option<String>,
    /// Decision reason.
    pub reason: Option<String>,
}

impl AuthAuditEvent {
    /// Builds an event for an identity and decision.
    #[must_use]
    pub fn new(stage: &'static str, allowed: bool, identity: &RequestIdentity) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            event: "auth_decision",
            timestamp_ms,
            stage,
            allowed,
            auth_method: identity.method_label(),
            subject: identity.subject().map(str::to_string),
            token_fingerprint: identity.token_fingerprint().map(str::to_string),
            rpc_method: None,
            tool: None,
            reason: None,
        }
    }

    /// Builds an allowed event.
    #[must_use]
    pub fn allowed(stage: &'static str, identity: &RequestIdentity) -> Self {
        Self::new(stage, true, identity)
    }

    /// Builds a denied event with a reason.
    #[must_use]
    pub fn denied(stage: &'static str, identity: &RequestIdentity, reason: impl Into<String>) -> Self {
        let mut event = Self::new(stage, false, identity);
        event.reason = Some(reason.into());
        event
    }

    /// Attaches the JSON-RPC method.
    #[must_use]
    pub fn with_rpc_method(mut self, method: Option<&str>) -> Self {
        self.rpc_method = method.map(str::to_string);
        self
    }

    /// Attaches the tool name.
    #[must_use]
    pub fn with_tool(mut self, tool: &str) -> Self {
        self.tool = Some(tool.to_string());
        self
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink for gate decisions.
pub trait AuthAuditSink: Send + Sync {
    /// Records an audit event.
    fn record(&self, event: &AuthAuditEvent);
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl AuthAuditSink for StderrAuditSink {
    fn record(&self, event: &AuthAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that appends JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuthAuditSink for FileAuditSink {
    fn record(&self, event: &AuthAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuthAuditSink for NoopAuditSink {
    fn record(&self, _event: &AuthAuditEvent) {}
}

/// Builds the sink selected by configuration.
///
/// # Errors
///
/// Returns an error when the file sink cannot be opened.
pub fn sink_from_config(config: &AuditConfig) -> io::Result<Arc<dyn AuthAuditSink>> {
    Ok(match config.sink {
        AuditSinkKind::Stderr => Arc::new(StderrAuditSink),
        AuditSinkKind::None => Arc::new(NoopAuditSink),
        AuditSinkKind::File => {
            let path = config.path.as_deref().ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "audit.path is required for file sink")
            })?;
            Arc::new(FileAuditSink::new(Path::new(path))?)
        }
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
