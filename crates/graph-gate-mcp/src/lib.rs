// crates/graph-gate-mcp/src/lib.rs
// ============================================================================
// Module: Graph Gate MCP
// Description: Authenticated MCP gateway in front of a graph database.
// Purpose: Provide the pipeline, token validation, tools, and HTTP server.
// Dependencies: graph-gate-config, axum, jsonwebtoken, neo4rs, tokio
// ============================================================================

//! ## Overview
//! Graph Gate exposes a graph database as MCP tools over one HTTP endpoint.
//! Requests pass an ordered authentication pipeline, tool calls are checked
//! against a static scope table, and the backend is verified lazily on first
//! use. See [`server::GatewayServer`] for the assembled service.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod auth;
pub mod backend;
pub mod classify;
pub mod guards;
pub mod lifecycle;
pub mod metadata;
pub mod neo4j;
pub mod oauth_proxy;
pub mod permissions;
pub mod pipeline;
pub mod server;
pub mod stages;
pub mod telemetry;
pub mod token;
pub mod tools;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuthAuditEvent;
pub use audit::AuthAuditSink;
pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use auth::AuthError;
pub use auth::Credential;
pub use auth::CredentialExtractor;
pub use auth::RequestIdentity;
pub use backend::AccessMode;
pub use backend::BackendCredentials;
pub use backend::BackendError;
pub use backend::CredentialResolver;
pub use backend::GraphBackend;
pub use backend::Row;
pub use lifecycle::InitError;
pub use lifecycle::InitPhase;
pub use lifecycle::LazyInitializer;
pub use lifecycle::ReadyState;
pub use lifecycle::ServerCapabilities;
pub use metadata::ProtectedResourceMetadata;
pub use metadata::ResourceMetadataPublisher;
pub use neo4j::Neo4jBackend;
pub use oauth_proxy::OAuthProxy;
pub use permissions::AuthorizationError;
pub use permissions::PermissionGuard;
pub use permissions::ToolPermissionTable;
pub use pipeline::GatewayPipeline;
pub use pipeline::GatewayPipelineBuilder;
pub use server::GatewayComponents;
pub use server::GatewayServer;
pub use server::McpServerError;
pub use telemetry::InitializationEvent;
pub use telemetry::McpMethod;
pub use telemetry::McpMetricEvent;
pub use telemetry::McpMetrics;
pub use telemetry::McpOutcome;
pub use telemetry::NoopMetrics;
pub use telemetry::NoopTelemetrySink;
pub use telemetry::TelemetrySink;
pub use telemetry::TracingTelemetrySink;
pub use token::KeySetSource;
pub use token::StaticKeySetSource;
pub use token::TokenError;
pub use token::TokenValidator;
pub use tools::ToolDispatcher;
pub use tools::ToolName;
pub use tools::ToolRegistry;
