// crates/graph-gate-mcp/src/lifecycle.rs
// ============================================================================
// Module: Lazy Initializer
// Description: Deferred backend verification with an exactly-once state machine.
// Purpose: Verify the backend on first use without blocking startup.
// Dependencies: graph-gate-mcp::backend, tokio, tracing
// ============================================================================

//! ## Overview
//! The gateway starts listening before the backend is known to be healthy.
//! The first request that needs the backend moves the shared phase from
//! `Uninitialized` (or `Failed`) to `Verifying` and becomes the leader; the
//! leader's verification runs on a detached task with its own timeout, so a
//! cancelled request cannot strand the other waiters. Every concurrent caller
//! waits on the same watch channel and observes the same outcome.
//!
//! `Ready` is terminal. `Failed` is retryable: the next caller leads a new
//! run. A run that fails because the backend rejected the leader's
//! credentials says nothing about the backend, so it is reported to the
//! leader alone and the phase returns to `Uninitialized`; each waiter then
//! contends again and verifies with its own credentials. Verification never
//! panics the process.
//!
//! Sequence:
//! 1. connectivity with the caller's credentials
//! 2. `RETURN 1 AS first` round trip
//! 3. `apoc.meta.schema` procedure present (fatal when absent)
//! 4. `gds.version` function present (optional, recorded)

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::Map;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::backend::AccessMode;
use crate::backend::BackendCredentials;
use crate::backend::BackendError;
use crate::backend::GraphBackend;
use crate::telemetry::InitializationEvent;
use crate::telemetry::TelemetrySink;
use crate::telemetry::spawn_detached;
use crate::tools::ToolRegistry;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Round-trip probe.
pub const PROBE_QUERY: &str = "RETURN 1 AS first";
/// Checks whether a procedure is installed.
pub const PROCEDURE_EXISTS_QUERY: &str =
    "SHOW PROCEDURES YIELD name WHERE name = $name RETURN count(*) AS found";
/// Checks whether a function is installed.
pub const FUNCTION_EXISTS_QUERY: &str =
    "SHOW FUNCTIONS YIELD name WHERE name = $name RETURN count(*) AS found";
/// Reports the server product and version.
pub const COMPONENTS_QUERY: &str =
    "CALL dbms.components() YIELD name, versions RETURN name + '/' + versions[0] AS agent";
/// Required schema procedure.
pub const APOC_SCHEMA_PROCEDURE: &str = "apoc.meta.schema";
/// Optional analytics function.
pub const GDS_VERSION_FUNCTION: &str = "gds.version";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Backend features discovered during verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCapabilities {
    /// Server product and version when reported.
    pub server_agent: Option<String>,
    /// Required schema extension present.
    pub apoc_available: bool,
    /// Optional analytics extension present.
    pub gds_available: bool,
}

/// Outcome of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyState {
    /// Discovered capabilities.
    pub capabilities: ServerCapabilities,
    /// Tools registered for those capabilities.
    pub registry: ToolRegistry,
}

/// Verification failures; every variant is retryable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InitError {
    /// The backend call failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// The probe returned something other than the literal `1`.
    #[error("unexpected probe response: {0}")]
    UnexpectedResponse(String),
    /// A required extension is missing.
    #[error("required procedure {0} is not installed")]
    MissingExtension(&'static str),
    /// The verification exceeded its time bound.
    #[error("backend verification timed out")]
    Timeout,
    /// The verification task ended without reporting.
    #[error("backend verification aborted")]
    Aborted,
}

/// Shared capability phase.
#[derive(Debug, Clone)]
pub enum InitPhase {
    /// No verification attempted yet, or the last leader's credentials were rejected.
    Uninitialized,
    /// A verification is running.
    Verifying,
    /// Verified; terminal.
    Ready(Arc<ReadyState>),
    /// Last verification failed; the next caller retries.
    Failed(Arc<InitError>),
}

/// Result handed to the caller that led a run.
type RunOutcome = Result<Arc<ReadyState>, Arc<InitError>>;

impl InitPhase {
    /// Returns a stable label for the phase.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Verifying => "verifying",
            Self::Ready(_) => "ready",
            Self::Failed(_) => "failed",
        }
    }
}

/// Telemetry emitted on the first transition to `Ready`.
#[derive(Clone)]
pub struct InitTelemetry {
    /// Destination sink.
    pub sink: Arc<dyn TelemetrySink>,
    /// Bound on the detached emission.
    pub timeout: Duration,
    /// Auth mode label.
    pub auth_mode: &'static str,
    /// Whether bearer tokens are accepted.
    pub oauth_enabled: bool,
}

// ============================================================================
// SECTION: Lazy Initializer
// ============================================================================

/// Exactly-once backend verification shared by all requests.
#[derive(Clone)]
pub struct LazyInitializer {
    /// Shared phase; only the leader moves it out of `Verifying`.
    state: Arc<watch::Sender<InitPhase>>,
    /// Backend to verify.
    backend: Arc<dyn GraphBackend>,
    /// Bound on one verification run.
    timeout: Duration,
    /// Omit write tools from registration.
    read_only: bool,
    /// Optional initialization telemetry.
    telemetry: Option<InitTelemetry>,
    /// Number of verification runs started.
    runs: Arc<AtomicUsize>,
}

impl LazyInitializer {
    /// Builds an initializer in the `Uninitialized` phase.
    #[must_use]
    pub fn new(backend: Arc<dyn GraphBackend>, timeout: Duration, read_only: bool) -> Self {
        let (state, _) = watch::channel(InitPhase::Uninitialized);
        Self {
            state: Arc::new(state),
            backend,
            timeout,
            read_only,
            telemetry: None,
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Enables initialization telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: InitTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Returns a snapshot of the current phase.
    #[must_use]
    pub fn phase(&self) -> InitPhase {
        self.state.borrow().clone()
    }

    /// Returns the ready state when verification already succeeded.
    #[must_use]
    pub fn ready(&self) -> Option<Arc<ReadyState>> {
        match &*self.state.borrow() {
            InitPhase::Ready(state) => Some(Arc::clone(state)),
            _ => None,
        }
    }

    /// Returns how many verification runs have started.
    #[must_use]
    pub fn verification_runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Waits until the backend is verified, leading a run when none is active.
    ///
    /// # Errors
    ///
    /// Returns the failure of the run this call observed, or the rejection
    /// of `credentials` when this call led the run.
    pub async fn ensure_ready(&self, credentials: &BackendCredentials) -> RunOutcome {
        loop {
            if let Some(ready) = self.ready() {
                return Ok(ready);
            }
            let mut receiver = self.state.subscribe();
            let mut leader = false;
            self.state.send_if_modified(|phase| match phase {
                InitPhase::Uninitialized | InitPhase::Failed(_) => {
                    *phase = InitPhase::Verifying;
                    leader = true;
                    true
                }
                InitPhase::Verifying | InitPhase::Ready(_) => false,
            });
            if leader {
                return self
                    .spawn_verification(credentials.clone())
                    .await
                    .unwrap_or_else(|_| Err(Arc::new(InitError::Aborted)));
            }
            let observed = match receiver.wait_for(|phase| !matches!(phase, InitPhase::Verifying)).await {
                Ok(phase) => phase.clone(),
                Err(_) => return Err(Arc::new(InitError::Aborted)),
            };
            match observed {
                InitPhase::Ready(state) => return Ok(state),
                InitPhase::Failed(error) => return Err(error),
                InitPhase::Uninitialized | InitPhase::Verifying => {}
            }
        }
    }

    /// Starts a detached run; the handle yields the outcome for the leader.
    fn spawn_verification(&self, credentials: BackendCredentials) -> JoinHandle<RunOutcome> {
        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        let guard = SettleGuard {
            state: Arc::clone(&self.state),
        };
        let backend = Arc::clone(&self.backend);
        let timeout = self.timeout;
        let read_only = self.read_only;
        let telemetry = self.telemetry.clone();
        tokio::spawn(async move {
            tracing::info!(run, "verifying backend");
            let result = tokio::time::timeout(timeout, verify(backend.as_ref(), &credentials, read_only))
                .await
                .unwrap_or(Err(InitError::Timeout));
            match result {
                Ok(ready) => {
                    tracing::info!(
                        run,
                        gds = ready.capabilities.gds_available,
                        tools = ready.registry.names().len(),
                        "backend ready"
                    );
                    if let Some(telemetry) = telemetry {
                        emit_ready(&telemetry, &ready, read_only);
                    }
                    let ready = Arc::new(ready);
                    guard.settle(InitPhase::Ready(Arc::clone(&ready)));
                    Ok(ready)
                }
                Err(error @ InitError::Backend(BackendError::Unauthorized(_))) => {
                    tracing::warn!(
                        run,
                        user = %credentials.username,
                        "backend rejected verification credentials"
                    );
                    guard.settle(InitPhase::Uninitialized);
                    Err(Arc::new(error))
                }
                Err(error) => {
                    tracing::warn!(run, error = %error, "backend verification failed");
                    let error = Arc::new(error);
                    guard.settle(InitPhase::Failed(Arc::clone(&error)));
                    Err(error)
                }
            }
        })
    }
}

/// Moves the phase out of `Verifying` exactly once, even if the task unwinds.
struct SettleGuard {
    /// Shared phase.
    state: Arc<watch::Sender<InitPhase>>,
}

impl SettleGuard {
    fn settle(self, phase: InitPhase) {
        self.state.send_replace(phase);
    }
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        self.state.send_if_modified(|phase| {
            if matches!(phase, InitPhase::Verifying) {
                *phase = InitPhase::Failed(Arc::new(InitError::Aborted));
                true
            } else {
                false
            }
        });
    }
}

// ============================================================================
// SECTION: Verification
// ============================================================================

/// Runs the verification sequence.
async fn verify(
    backend: &dyn GraphBackend,
    credentials: &BackendCredentials,
    read_only: bool,
) -> Result<ReadyState, InitError> {
    backend.verify_connectivity(credentials).await?;

    let rows = backend.run_query(credentials, PROBE_QUERY, Map::new(), AccessMode::Read).await?;
    let first = rows.first().and_then(|row| row.get("first")).cloned().unwrap_or(Value::Null);
    if first.as_i64() != Some(1) {
        return Err(InitError::UnexpectedResponse(first.to_string()));
    }

    let apoc_available =
        count_matches(backend, credentials, PROCEDURE_EXISTS_QUERY, APOC_SCHEMA_PROCEDURE).await? > 0;
    if !apoc_available {
        return Err(InitError::MissingExtension(APOC_SCHEMA_PROCEDURE));
    }

    let gds_available =
        match count_matches(backend, credentials, FUNCTION_EXISTS_QUERY, GDS_VERSION_FUNCTION).await {
            Ok(found) => found > 0,
            Err(error) => {
                tracing::warn!(error = %error, "analytics extension probe failed");
                false
            }
        };
    if !gds_available {
        tracing::info!("analytics extension not installed; its tools are disabled");
    }

    let server_agent = backend
        .run_query(credentials, COMPONENTS_QUERY, Map::new(), AccessMode::Read)
        .await
        .ok()
        .and_then(|rows| rows.into_iter().next())
        .and_then(|row| row.get("agent").and_then(Value::as_str).map(str::to_string));

    let capabilities = ServerCapabilities {
        server_agent,
        apoc_available,
        gds_available,
    };
    let registry = ToolRegistry::register(&capabilities, read_only);
    Ok(ReadyState {
        capabilities,
        registry,
    })
}

/// Runs an existence query and returns its `found` count.
async fn count_matches(
    backend: &dyn GraphBackend,
    credentials: &BackendCredentials,
    query: &str,
    name: &str,
) -> Result<i64, BackendError> {
    let mut params = Map::new();
    params.insert("name".to_string(), Value::String(name.to_string()));
    let rows = backend.run_query(credentials, query, params, AccessMode::Read).await?;
    Ok(rows.first().and_then(|row| row.get("found")).and_then(Value::as_i64).unwrap_or(0))
}

/// Emits initialization telemetry on a detached task.
fn emit_ready(telemetry: &InitTelemetry, ready: &ReadyState, read_only: bool) {
    let event = InitializationEvent {
        server_agent: ready.capabilities.server_agent.clone(),
        apoc_available: ready.capabilities.apoc_available,
        gds_available: ready.capabilities.gds_available,
        tool_count: ready.registry.names().len(),
        auth_mode: telemetry.auth_mode,
        oauth_enabled: telemetry.oauth_enabled,
        read_only,
    };
    drop(spawn_detached(Arc::clone(&telemetry.sink), event, telemetry.timeout));
}

// ============================================================================
// SECTION: Tests
// ============================================================================
