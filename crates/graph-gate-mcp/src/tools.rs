// crates/graph-gate-mcp/src/tools.rs
// ============================================================================
// Module: Graph Tools
// Description: Tool catalog, capability-gated registration, and dispatch.
// Purpose: Translate authorized tool calls into backend queries.
// Dependencies: async-trait, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The catalog is fixed at compile time. Which tools are *registered* depends
//! on what verification found on the backend: tools that need the optional
//! analytics extension are left out when it is absent, and write tools are
//! left out in read-only deployments. Before the backend is verified only
//! the core catalog (tools without optional dependencies) is listed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::backend::AccessMode;
use crate::backend::BackendCredentials;
use crate::backend::BackendError;
use crate::backend::GraphBackend;
use crate::backend::Row;
use crate::lifecycle::ServerCapabilities;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Schema introspection query (requires APOC).
pub const SCHEMA_QUERY: &str = "CALL apoc.meta.schema() YIELD value RETURN value";
/// Analytics procedure listing query (requires GDS).
pub const GDS_PROCEDURES_QUERY: &str = "CALL gds.list() YIELD name, description, signature, type \
                                        WHERE type = 'procedure' AND name CONTAINS 'stream' \
                                        AND NOT name CONTAINS 'estimate' \
                                        RETURN name, description, signature ORDER BY name";

/// Keywords that make a statement a write.
const WRITE_KEYWORDS: &[&str] = &["CREATE", "MERGE", "SET", "DELETE", "REMOVE", "DROP", "LOAD"];

// ============================================================================
// SECTION: Tool Names
// ============================================================================

/// Canonical tool names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ToolName {
    /// Return the graph schema.
    GetSchema,
    /// Run a read-only Cypher statement.
    ReadCypher,
    /// Run a write Cypher statement.
    WriteCypher,
    /// List graph data science procedures.
    ListGdsProcedures,
}

impl ToolName {
    /// Returns the canonical string name for the tool.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GetSchema => "get-schema",
            Self::ReadCypher => "read-cypher",
            Self::WriteCypher => "write-cypher",
            Self::ListGdsProcedures => "list-gds-procedures",
        }
    }

    /// Returns all tool names in canonical order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::GetSchema, Self::ReadCypher, Self::WriteCypher, Self::ListGdsProcedures]
    }

    /// Parses a tool name from its string representation.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "get-schema" => Some(Self::GetSchema),
            "read-cypher" => Some(Self::ReadCypher),
            "write-cypher" => Some(Self::WriteCypher),
            "list-gds-procedures" => Some(Self::ListGdsProcedures),
            _ => None,
        }
    }

    /// Returns the dedicated scope that unlocks the tool.
    #[must_use]
    pub const fn required_scope(self) -> &'static str {
        match self {
            Self::GetSchema => "schema:read",
            Self::ReadCypher => "cypher:read",
            Self::WriteCypher => "cypher:write",
            Self::ListGdsProcedures => "gds:read",
        }
    }

    /// Returns true when the tool needs the optional analytics extension.
    #[must_use]
    pub const fn requires_gds(self) -> bool {
        matches!(self, Self::ListGdsProcedures)
    }

    /// Returns true when the tool mutates the graph.
    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(self, Self::WriteCypher)
    }

    /// Builds the tool definition advertised by `tools/list`.
    #[must_use]
    pub fn definition(self) -> ToolDefinition {
        let (description, input_schema) = match self {
            Self::GetSchema => (
                "Return node labels, relationship types, and property keys of the graph.",
                json!({ "type": "object", "properties": {}, "additionalProperties": false }),
            ),
            Self::ReadCypher => ("Execute a read-only Cypher query.", cypher_input_schema()),
            Self::WriteCypher => ("Execute a Cypher statement that modifies the graph.", cypher_input_schema()),
            Self::ListGdsProcedures => (
                "List the Graph Data Science streaming procedures installed on the server.",
                json!({ "type": "object", "properties": {}, "additionalProperties": false }),
            ),
        };
        ToolDefinition {
            name: self.as_str().to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Input schema shared by the Cypher tools.
fn cypher_input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": { "type": "string", "description": "Cypher statement" },
            "params": { "type": "object", "description": "Statement parameters" }
        },
        "required": ["query"],
        "additionalProperties": false
    })
}

/// Tool definition used by tool listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// Tool description for clients.
    pub description: String,
    /// JSON schema for tool input.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Immutable set of tools registered for the verified backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRegistry {
    /// Registered tools in canonical order.
    tools: Vec<ToolName>,
}

impl ToolRegistry {
    /// Registers the tools the verified backend supports.
    #[must_use]
    pub fn register(capabilities: &ServerCapabilities, read_only: bool) -> Self {
        let tools = ToolName::all()
            .iter()
            .copied()
            .filter(|tool| capabilities.gds_available || !tool.requires_gds())
            .filter(|tool| !read_only || !tool.is_write())
            .collect();
        Self {
            tools,
        }
    }

    /// Returns the tools that have no optional-extension dependency.
    #[must_use]
    pub fn core_catalog(read_only: bool) -> Self {
        let tools = ToolName::all()
            .iter()
            .copied()
            .filter(|tool| !tool.requires_gds())
            .filter(|tool| !read_only || !tool.is_write())
            .collect();
        Self {
            tools,
        }
    }

    /// Returns true when `tool` is registered.
    #[must_use]
    pub fn contains(&self, tool: ToolName) -> bool {
        self.tools.contains(&tool)
    }

    /// Returns the registered tool names.
    #[must_use]
    pub fn names(&self) -> &[ToolName] {
        &self.tools
    }

    /// Returns the registered tool definitions.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|tool| tool.definition()).collect()
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Tool execution failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    /// Tool arguments did not match the input schema.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    /// A write statement was sent to a read-only tool.
    #[error("write statements are not allowed in read-cypher")]
    WriteNotAllowed,
    /// The backend call failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// Result serialization failed.
    #[error("serialization failure")]
    Serialization,
}

// ============================================================================
// SECTION: Results
// ============================================================================

/// Tool output returned inside a `tools/call` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolCallResult {
    /// Text content blocks.
    pub content: Vec<ToolContent>,
    /// Whether the call failed at tool level.
    #[serde(rename = "isError")]
    pub is_error: bool,
}

/// One content block of a tool result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolContent {
    /// Plain text content.
    Text {
        /// Text payload.
        text: String,
    },
}

impl ToolCallResult {
    /// Builds a successful result.
    #[must_use]
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: text.into(),
            }],
            is_error: false,
        }
    }

    /// Builds a tool-level error result.
    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: text.into(),
            }],
            is_error: true,
        }
    }
}

// ============================================================================
// SECTION: Dispatch
// ============================================================================

/// Executes registered tools.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Runs `tool` with `arguments` under `credentials`.
    async fn dispatch(
        &self,
        tool: ToolName,
        credentials: &BackendCredentials,
        arguments: Value,
    ) -> Result<ToolCallResult, ToolError>;
}

/// Cypher tool arguments.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CypherArgs {
    /// Cypher statement.
    query: String,
    /// Statement parameters.
    #[serde(default)]
    params: Map<String, Value>,
}

/// Dispatcher that turns tools into backend queries.
pub struct CypherToolDispatcher {
    /// Backend used for every call.
    backend: Arc<dyn GraphBackend>,
    /// Maximum rows returned per call.
    max_rows: usize,
}

impl CypherToolDispatcher {
    /// Builds a dispatcher.
    #[must_use]
    pub fn new(backend: Arc<dyn GraphBackend>, max_rows: usize) -> Self {
        Self {
            backend,
            max_rows,
        }
    }

    async fn run(
        &self,
        credentials: &BackendCredentials,
        cypher: &str,
        params: Map<String, Value>,
        mode: AccessMode,
    ) -> Result<ToolCallResult, ToolError> {
        let mut rows = self.backend.run_query(credentials, cypher, params, mode).await?;
        let truncated = rows.len() > self.max_rows;
        rows.truncate(self.max_rows);
        render_rows(&rows, truncated.then_some(self.max_rows))
    }
}

#[async_trait]
impl ToolDispatcher for CypherToolDispatcher {
    async fn dispatch(
        &self,
        tool: ToolName,
        credentials: &BackendCredentials,
        arguments: Value,
    ) -> Result<ToolCallResult, ToolError> {
        match tool {
            ToolName::GetSchema => {
                self.run(credentials, SCHEMA_QUERY, Map::new(), AccessMode::Read).await
            }
            ToolName::ListGdsProcedures => {
                self.run(credentials, GDS_PROCEDURES_QUERY, Map::new(), AccessMode::Read).await
            }
            ToolName::ReadCypher => {
                let args = parse_cypher_args(arguments)?;
                if is_write_query(&args.query) {
                    return Err(ToolError::WriteNotAllowed);
                }
                self.run(credentials, &args.query, args.params, AccessMode::Read).await
            }
            ToolName::WriteCypher => {
                let args = parse_cypher_args(arguments)?;
                self.run(credentials, &args.query, args.params, AccessMode::Write).await
            }
        }
    }
}

/// Parses Cypher tool arguments; `null` is treated as missing.
fn parse_cypher_args(arguments: Value) -> Result<CypherArgs, ToolError> {
    let args: CypherArgs =
        serde_json::from_value(arguments).map_err(|err| ToolError::InvalidParams(err.to_string()))?;
    if args.query.trim().is_empty() {
        return Err(ToolError::InvalidParams("query must not be empty".to_string()));
    }
    Ok(args)
}

/// Returns true when `query` contains a write keyword as a whole word.
#[must_use]
pub fn is_write_query(query: &str) -> bool {
    query
        .split(|ch: char| !ch.is_ascii_alphanumeric() && ch != '_')
        .any(|word| WRITE_KEYWORDS.iter().any(|keyword| word.eq_ignore_ascii_case(keyword)))
}

/// Renders rows as a JSON text block.
fn render_rows(rows: &[Row], truncated_at: Option<usize>) -> Result<ToolCallResult, ToolError> {
    let text = serde_json::to_string(rows).map_err(|_| ToolError::Serialization)?;
    let mut result = ToolCallResult::success(text);
    if let Some(limit) = truncated_at {
        result.content.push(ToolContent::Text {
            text: format!("results truncated to {limit} rows"),
        });
    }
    Ok(result)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
