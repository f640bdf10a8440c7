// crates/graph-gate-config/src/env.rs
// ============================================================================
// Module: Environment Overrides
// Description: GRAPH_GATE_* environment variable overrides.
// Purpose: Let deployments set identity and policy without editing files.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Overrides are read through an [`EnvLookup`] so callers (and tests) decide
//! where values come from. Every override is applied before validation, so a
//! bad environment value fails the load the same way a bad file value does.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::config::AllowedOrigins;
use crate::config::ConfigError;
use crate::config::GraphGateConfig;
use crate::config::OAuthConfig;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Authorization server domain override.
pub const ENV_AUTH_SERVER_DOMAIN: &str = "GRAPH_GATE_AUTH_SERVER_DOMAIN";
/// Resource identifier override.
pub const ENV_RESOURCE_IDENTIFIER: &str = "GRAPH_GATE_RESOURCE_IDENTIFIER";
/// Allowed origins override (`*` or comma-separated).
pub const ENV_ALLOWED_ORIGINS: &str = "GRAPH_GATE_ALLOWED_ORIGINS";
/// Credential header override.
pub const ENV_AUTH_HEADER: &str = "GRAPH_GATE_AUTH_HEADER";
/// Unauthenticated ping opt-in override.
pub const ENV_ALLOW_UNAUTHENTICATED_PING: &str = "GRAPH_GATE_ALLOW_UNAUTHENTICATED_PING";
/// Unauthenticated tools/list opt-in override.
pub const ENV_ALLOW_UNAUTHENTICATED_TOOLS_LIST: &str =
    "GRAPH_GATE_ALLOW_UNAUTHENTICATED_TOOLS_LIST";
/// Unauthenticated probe body cap override.
pub const ENV_UNAUTHENTICATED_MAX_BODY_BYTES: &str = "GRAPH_GATE_UNAUTHENTICATED_MAX_BODY_BYTES";
/// Backend URI override.
pub const ENV_BACKEND_URI: &str = "GRAPH_GATE_BACKEND_URI";

// ============================================================================
// SECTION: Lookup
// ============================================================================

/// Source of environment values.
pub trait EnvLookup {
    /// Returns the value for `key`, if set.
    fn get(&self, key: &str) -> Option<String>;
}

impl<F> EnvLookup for F
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        self(key)
    }
}

// ============================================================================
// SECTION: Overrides
// ============================================================================

/// Applies `GRAPH_GATE_*` overrides onto `config`.
///
/// Setting either OAuth identity variable creates the `[auth.oauth]` section
/// when the file omitted it; the other identity value must then be supplied
/// too or validation rejects the result.
///
/// # Errors
///
/// Returns [`ConfigError`] when an override value cannot be parsed.
pub fn apply_env_overrides(
    config: &mut GraphGateConfig,
    lookup: &dyn EnvLookup,
) -> Result<(), ConfigError> {
    let domain = non_empty(lookup.get(ENV_AUTH_SERVER_DOMAIN));
    let resource = non_empty(lookup.get(ENV_RESOURCE_IDENTIFIER));
    if domain.is_some() || resource.is_some() {
        let oauth = config.auth.oauth.get_or_insert_with(|| OAuthConfig::new("", ""));
        if let Some(domain) = domain {
            oauth.authorization_server_domain = domain;
        }
        if let Some(resource) = resource {
            oauth.resource_identifier = resource;
        }
    }
    if let Some(origins) = lookup.get(ENV_ALLOWED_ORIGINS) {
        config.server.cors.allowed_origins = AllowedOrigins::parse(&origins)?;
    }
    if let Some(header) = non_empty(lookup.get(ENV_AUTH_HEADER)) {
        config.auth.credential_header = header;
    }
    if let Some(raw) = lookup.get(ENV_ALLOW_UNAUTHENTICATED_PING) {
        config.auth.allow_unauthenticated_ping = parse_bool(ENV_ALLOW_UNAUTHENTICATED_PING, &raw)?;
    }
    if let Some(raw) = lookup.get(ENV_ALLOW_UNAUTHENTICATED_TOOLS_LIST) {
        config.auth.allow_unauthenticated_tools_list =
            parse_bool(ENV_ALLOW_UNAUTHENTICATED_TOOLS_LIST, &raw)?;
    }
    if let Some(raw) = lookup.get(ENV_UNAUTHENTICATED_MAX_BODY_BYTES) {
        config.auth.unauthenticated_max_body_bytes = raw.trim().parse().map_err(|_| {
            ConfigError::Invalid(format!("{ENV_UNAUTHENTICATED_MAX_BODY_BYTES} must be an integer"))
        })?;
    }
    if let Some(uri) = non_empty(lookup.get(ENV_BACKEND_URI)) {
        config.backend.uri = uri;
    }
    Ok(())
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Invalid(format!("{key} must be a boolean"))),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::*;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool("K", "TRUE").unwrap());
        assert!(parse_bool("K", " yes ").unwrap());
        assert!(!parse_bool("K", "off").unwrap());
        assert!(parse_bool("K", "maybe").is_err());
    }

    #[test]
    fn blank_values_are_ignored() {
        assert_eq!(non_empty(Some("   ".to_string())), None);
        assert_eq!(non_empty(Some(" x ".to_string())), Some("x".to_string()));
    }
}
