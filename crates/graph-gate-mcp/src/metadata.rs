// crates/graph-gate-mcp/src/metadata.rs
// ============================================================================
// Module: Resource Metadata
// Description: OAuth protected resource metadata document.
// Purpose: Let clients discover the authorization server and resource identifier.
// Dependencies: axum, graph-gate-config, serde
// ============================================================================

//! ## Overview
//! The document names this server's resource identifier and the
//! authorization server that issues tokens for it. Clients use the
//! identifier as the audience when requesting tokens. When OAuth is not
//! configured the endpoint answers `500`; nothing else is affected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::http::StatusCode;
use axum::response::Response;
use graph_gate_config::GraphGateConfig;
use serde::Serialize;
use serde_json::json;

use crate::permissions::ToolPermissionTable;
use crate::pipeline::json_response;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Protected resource metadata document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtectedResourceMetadata {
    /// Canonical resource identifier.
    pub resource: String,
    /// Authorization servers that issue tokens for the resource.
    pub authorization_servers: Vec<String>,
    /// Scopes understood by the resource.
    pub scopes_supported: Vec<String>,
    /// Token presentation methods.
    pub bearer_methods_supported: Vec<String>,
    /// Human-readable resource name.
    pub resource_name: String,
    /// Documentation URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_documentation: Option<String>,
}

/// Serves the metadata document.
#[derive(Debug, Clone)]
pub struct ResourceMetadataPublisher {
    /// Document, absent when OAuth is not configured.
    document: Option<ProtectedResourceMetadata>,
}

impl ResourceMetadataPublisher {
    /// Builds the publisher from configuration.
    #[must_use]
    pub fn from_config(config: &GraphGateConfig, permissions: &ToolPermissionTable) -> Self {
        let document = config.auth.oauth.as_ref().map(|oauth| {
            let scopes_supported = if oauth.scopes_supported.is_empty() {
                permissions.all_scopes().into_iter().collect()
            } else {
                oauth.scopes_supported.clone()
            };
            ProtectedResourceMetadata {
                resource: oauth.resource_identifier.clone(),
                authorization_servers: vec![oauth.authorization_server_url()],
                scopes_supported,
                bearer_methods_supported: vec!["header".to_string()],
                resource_name: config.auth.realm.clone(),
                resource_documentation: oauth.resource_documentation.clone(),
            }
        });
        Self {
            document,
        }
    }

    /// Returns the document when configured.
    #[must_use]
    pub const fn document(&self) -> Option<&ProtectedResourceMetadata> {
        self.document.as_ref()
    }

    /// Renders the HTTP answer.
    #[must_use]
    pub fn respond(&self) -> Response {
        match self.document.as_ref().map(serde_json::to_value) {
            Some(Ok(body)) => json_response(StatusCode::OK, &body),
            Some(Err(_)) => json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &json!({ "error": "server_error", "error_description": "metadata serialization failed" }),
            ),
            None => {
                tracing::warn!("resource metadata requested but oauth is not configured");
                json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &json!({
                        "error": "server_error",
                        "error_description": "authorization server is not configured"
                    }),
                )
            }
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
