// crates/graph-gate-mcp/src/telemetry.rs
// ============================================================================
// Module: Gateway Telemetry
// Description: Request metrics hooks and one-time initialization telemetry.
// Purpose: Provide metric events and a detached telemetry sink without hard deps.
// Dependencies: async-trait, serde, tokio, tracing
// ============================================================================

//! ## Overview
//! Request counters and latency histograms go through [`McpMetrics`] so a
//! deployment can plug in its own exporter. The first successful backend
//! verification emits one [`InitializationEvent`] through a
//! [`TelemetrySink`]. That emission runs in a detached task with its own
//! timeout so a slow sink never holds a client response.
//! Labels never contain credentials or query text.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinHandle;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default latency buckets in milliseconds for request histograms.
pub const MCP_LATENCY_BUCKETS_MS: &[u64] =
    &[1, 2, 5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 30_000];

// ============================================================================
// SECTION: Metric Labels
// ============================================================================

/// JSON-RPC method classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum McpMethod {
    /// JSON-RPC initialize.
    Initialize,
    /// JSON-RPC ping.
    Ping,
    /// JSON-RPC tools/list.
    ToolsList,
    /// JSON-RPC tools/call.
    ToolsCall,
    /// Any notification.
    Notification,
    /// Invalid or malformed JSON-RPC request.
    Invalid,
    /// Unsupported JSON-RPC method.
    Other,
}

impl McpMethod {
    /// Classifies a method name.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "initialize" => Self::Initialize,
            "ping" => Self::Ping,
            "tools/list" => Self::ToolsList,
            "tools/call" => Self::ToolsCall,
            other if other.starts_with("notifications/") => Self::Notification,
            _ => Self::Other,
        }
    }

    /// Returns a stable label for the method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Ping => "ping",
            Self::ToolsList => "tools/list",
            Self::ToolsCall => "tools/call",
            Self::Notification => "notification",
            Self::Invalid => "invalid",
            Self::Other => "other",
        }
    }
}

/// Request outcome classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum McpOutcome {
    /// Successful request.
    Ok,
    /// Failed request.
    Error,
}

impl McpOutcome {
    /// Returns a stable label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }
}

/// Request metric event payload.
#[derive(Debug, Clone)]
pub struct McpMetricEvent {
    /// JSON-RPC method classification.
    pub method: McpMethod,
    /// Tool name when available (tools/call).
    pub tool: Option<String>,
    /// Request outcome.
    pub outcome: McpOutcome,
    /// JSON-RPC error code when present.
    pub error_code: Option<i64>,
    /// Credential kind label.
    pub auth_method: &'static str,
    /// Request body size in bytes.
    pub request_bytes: usize,
    /// Response body size in bytes.
    pub response_bytes: usize,
}

// ============================================================================
// SECTION: Metrics Trait
// ============================================================================

/// Metrics sink for gateway requests and latencies.
pub trait McpMetrics: Send + Sync {
    /// Records a request counter event.
    fn record_request(&self, event: McpMetricEvent);
    /// Records a latency observation for the request.
    fn record_latency(&self, event: McpMetricEvent, latency: Duration);
}

/// No-op metrics sink.
pub struct NoopMetrics;

impl McpMetrics for NoopMetrics {
    fn record_request(&self, _event: McpMetricEvent) {}

    fn record_latency(&self, _event: McpMetricEvent, _latency: Duration) {}
}

// ============================================================================
// SECTION: Initialization Telemetry
// ============================================================================

/// Emitted once when the backend first reaches the ready state.
#[derive(Debug, Clone, Serialize)]
pub struct InitializationEvent {
    /// Backend server agent string when reported.
    pub server_agent: Option<String>,
    /// Whether the required schema extension was found.
    pub apoc_available: bool,
    /// Whether the optional analytics extension was found.
    pub gds_available: bool,
    /// Number of registered tools.
    pub tool_count: usize,
    /// Gateway auth mode label.
    pub auth_mode: &'static str,
    /// Whether bearer tokens are accepted.
    pub oauth_enabled: bool,
    /// Whether write tools are disabled.
    pub read_only: bool,
}

/// Destination for initialization telemetry.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Delivers one event.
    async fn emit(&self, event: InitializationEvent);
}

/// Sink that logs the event through `tracing`.
pub struct TracingTelemetrySink;

#[async_trait]
impl TelemetrySink for TracingTelemetrySink {
    async fn emit(&self, event: InitializationEvent) {
        tracing::info!(
            target: "graph_gate::telemetry",
            server_agent = event.server_agent.as_deref().unwrap_or("unknown"),
            apoc = event.apoc_available,
            gds = event.gds_available,
            tools = event.tool_count,
            auth_mode = event.auth_mode,
            oauth = event.oauth_enabled,
            read_only = event.read_only,
            "gateway initialized"
        );
    }
}

/// Sink that discards events.
pub struct NoopTelemetrySink;

#[async_trait]
impl TelemetrySink for NoopTelemetrySink {
    async fn emit(&self, _event: InitializationEvent) {}
}

/// Emits `event` on a detached task bounded by `timeout`.
///
/// The returned handle may be dropped; the task keeps running.
pub fn spawn_detached(
    sink: Arc<dyn TelemetrySink>,
    event: InitializationEvent,
    timeout: Duration,
) -> JoinHandle<bool> {
    tokio::spawn(async move {
        if tokio::time::timeout(timeout, sink.emit(event)).await.is_ok() {
            true
        } else {
            tracing::warn!(timeout_ms = timeout.as_millis(), "initialization telemetry timed out");
            false
        }
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::Ordering;

    use super::*;

    struct SlowSink {
        finished: AtomicBool,
    }

    #[async_trait]
    impl TelemetrySink for SlowSink {
        async fn emit(&self, _event: InitializationEvent) {
            tokio::time::sleep(Duration::from_secs(30)).await;
            self.finished.store(true, Ordering::SeqCst);
        }
    }

    fn event() -> InitializationEvent {
        InitializationEvent {
            server_agent: Some("Neo4j/5.20.0".to_string()),
            apoc_available: true,
            gds_available: false,
            tool_count: 3,
            auth_mode: "required",
            oauth_enabled: true,
            read_only: false,
        }
    }

    #[test]
    fn method_labels_are_stable() {
        assert_eq!(McpMethod::from_name("tools/call").as_str(), "tools/call");
        assert_eq!(McpMethod::from_name("notifications/initialized"), McpMethod::Notification);
        assert_eq!(McpMethod::from_name("resources/list"), McpMethod::Other);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_sink_is_abandoned_after_timeout() {
        let sink = Arc::new(SlowSink {
            finished: AtomicBool::new(false),
        });
        let handle = spawn_detached(sink.clone(), event(), Duration::from_secs(2));
        assert!(!handle.await.unwrap());
        assert!(!sink.finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn fast_sink_completes() {
        let handle = spawn_detached(Arc::new(NoopTelemetrySink), event(), Duration::from_secs(2));
        assert!(handle.await.unwrap());
    }
}
