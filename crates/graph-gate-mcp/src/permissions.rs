// crates/graph-gate-mcp/src/permissions.rs
// ============================================================================
// Module: Tool Permissions
// Description: Static tool to scope table and the permission guard.
// Purpose: Fail closed on unknown tools and enforce bearer scopes.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every tool the gateway can serve has an entry mapping it to the scopes
//! that unlock it; `admin:all` is a member of every entry. A tool without an
//! entry is never invokable, whatever the caller holds.
//!
//! Scope checks apply to bearer principals. Basic principals are authorized
//! by the backend itself, and anonymous callers only reach tools when the
//! auth subsystem is disabled.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use thiserror::Error;

use crate::auth::RequestIdentity;
use crate::tools::ToolName;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Scope that satisfies every known tool.
pub const ADMIN_SCOPE: &str = "admin:all";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Tool authorization failures, surfaced as tool-level error results.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthorizationError {
    /// The tool has no permission entry.
    #[error("tool {0} is not available")]
    UnknownTool(String),
    /// None of the caller's scopes unlock the tool.
    #[error("tool {tool} requires one of the scopes: {}", .required.join(", "))]
    MissingScope {
        /// Tool name.
        tool: String,
        /// Scopes that would have been accepted.
        required: Vec<String>,
    },
}

// ============================================================================
// SECTION: Permission Table
// ============================================================================

/// Immutable tool to required-scope mapping.
#[derive(Debug, Clone)]
pub struct ToolPermissionTable {
    /// Accepted scopes per tool name.
    entries: BTreeMap<String, BTreeSet<String>>,
}

impl ToolPermissionTable {
    /// Builds the table for the built-in tool catalog.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(ToolName::all().iter().map(|tool| (tool.as_str(), [tool.required_scope()])))
    }

    /// Builds a table; `admin:all` is added to every entry.
    #[must_use]
    pub fn new<I, S>(entries: impl IntoIterator<Item = (&'static str, I)>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(tool, scopes)| {
                let mut scopes: BTreeSet<String> = scopes.into_iter().map(Into::into).collect();
                scopes.insert(ADMIN_SCOPE.to_string());
                (tool.to_string(), scopes)
            })
            .collect();
        Self {
            entries,
        }
    }

    /// Returns the accepted scopes for `tool`.
    #[must_use]
    pub fn required_scopes(&self, tool: &str) -> Option<&BTreeSet<String>> {
        self.entries.get(tool)
    }

    /// Returns every scope mentioned in the table.
    #[must_use]
    pub fn all_scopes(&self) -> BTreeSet<String> {
        self.entries.values().flatten().cloned().collect()
    }
}

// ============================================================================
// SECTION: Guard
// ============================================================================

/// Checks tool invocations against the permission table.
#[derive(Debug, Clone)]
pub struct PermissionGuard {
    /// Tool to scope mapping.
    table: ToolPermissionTable,
}

impl PermissionGuard {
    /// Creates a guard over `table`.
    #[must_use]
    pub const fn new(table: ToolPermissionTable) -> Self {
        Self {
            table,
        }
    }

    /// Returns the underlying table.
    #[must_use]
    pub const fn table(&self) -> &ToolPermissionTable {
        &self.table
    }

    /// Authorizes `identity` to invoke `tool`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorizationError::UnknownTool`] for tools without an entry
    /// and [`AuthorizationError::MissingScope`] when a bearer principal holds
    /// none of the accepted scopes.
    pub fn check(&self, identity: &RequestIdentity, tool: &str) -> Result<(), AuthorizationError> {
        let Some(required) = self.table.required_scopes(tool) else {
            return Err(AuthorizationError::UnknownTool(tool.to_string()));
        };
        match identity {
            RequestIdentity::Anonymous | RequestIdentity::Basic(_) => Ok(()),
            RequestIdentity::Bearer(principal) => {
                if principal.scopes.iter().any(|scope| required.contains(scope)) {
                    Ok(())
                } else {
                    Err(AuthorizationError::MissingScope {
                        tool: tool.to_string(),
                        required: required.iter().cloned().collect(),
                    })
                }
            }
        }
    }
}

impl Default for PermissionGuard {
    fn default() -> Self {
        Self::new(ToolPermissionTable::standard())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::*;
    use crate::auth::BasicPrincipal;
    use crate::auth::BearerPrincipal;

    fn bearer(scopes: &[&str]) -> RequestIdentity {
        RequestIdentity::Bearer(BearerPrincipal::new(
            "token",
            Some("user".to_string()),
            vec!["https://graph.example.com/mcp".to_string()],
            scopes.iter().map(|scope| (*scope).to_string()).collect(),
        ))
    }

    #[test]
    fn admin_scope_is_in_every_entry() {
        let table = ToolPermissionTable::standard();
        for tool in ToolName::all() {
            assert!(table.required_scopes(tool.as_str()).unwrap().contains(ADMIN_SCOPE));
        }
    }

    #[test]
    fn unknown_tool_denied_even_for_admin() {
        let guard = PermissionGuard::default();
        for identity in [
            bearer(&[ADMIN_SCOPE]),
            RequestIdentity::Anonymous,
            RequestIdentity::Basic(BasicPrincipal::new("neo4j", "pw")),
        ] {
            assert_eq!(
                guard.check(&identity, "drop-database"),
                Err(AuthorizationError::UnknownTool("drop-database".to_string()))
            );
        }
    }

    #[test]
    fn matching_scope_unlocks_tool() {
        let guard = PermissionGuard::default();
        assert!(guard.check(&bearer(&["cypher:read"]), "read-cypher").is_ok());
        assert!(guard.check(&bearer(&[ADMIN_SCOPE]), "write-cypher").is_ok());
    }

    #[test]
    fn missing_scope_is_denied() {
        let guard = PermissionGuard::default();
        let err = guard.check(&bearer(&["cypher:read"]), "write-cypher").unwrap_err();
        assert!(matches!(err, AuthorizationError::MissingScope { .. }));
        assert!(err.to_string().contains("cypher:write"));
        assert!(guard.check(&bearer(&[]), "get-schema").is_err());
    }

    #[test]
    fn anonymous_and_basic_skip_scope_check() {
        let guard = PermissionGuard::default();
        assert!(guard.check(&RequestIdentity::Anonymous, "write-cypher").is_ok());
        let basic = RequestIdentity::Basic(BasicPrincipal::new("neo4j", "pw"));
        assert!(guard.check(&basic, "read-cypher").is_ok());
    }

    #[test]
    fn custom_table_adds_admin() {
        let table = ToolPermissionTable::new([("custom", ["custom:run"])]);
        let scopes = table.required_scopes("custom").unwrap();
        assert!(scopes.contains("custom:run"));
        assert!(scopes.contains(ADMIN_SCOPE));
        assert!(table.all_scopes().contains("custom:run"));
    }
}
