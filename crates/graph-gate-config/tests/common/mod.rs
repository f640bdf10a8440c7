// crates/graph-gate-config/tests/common/mod.rs
// ============================================================================
// Module: Config Test Helpers
// Description: Shared fixtures for graph-gate-config integration tests.
// Purpose: Build minimal valid configs and assertion helpers.
// ============================================================================

#![allow(dead_code, reason = "Helpers are shared across test binaries.")]

use graph_gate_config::ConfigError;
use graph_gate_config::GraphGateConfig;

/// Result type used by config tests.
pub type TestResult = Result<(), String>;

/// Minimal valid configuration with Basic-only auth.
pub const MINIMAL_TOML: &str = r#"
[backend]
uri = "bolt://127.0.0.1:7687"
"#;

/// Configuration with OAuth enabled and service credentials.
pub const OAUTH_TOML: &str = r#"
[auth.oauth]
authorization_server_domain = "tenant.auth.example.com"
resource_identifier = "https://graph.example.com/mcp"

[backend.service_credentials]
username = "svc"
password = "secret"
"#;

/// Lookup that never returns a value.
pub fn no_env(_key: &str) -> Option<String> {
    None
}

/// Parses TOML with no environment overrides.
pub fn parse(content: &str) -> Result<GraphGateConfig, ConfigError> {
    GraphGateConfig::from_toml_str(content, &no_env)
}

/// Parses TOML with the given environment pairs.
pub fn parse_with_env(
    content: &str,
    vars: &[(&str, &str)],
) -> Result<GraphGateConfig, ConfigError> {
    let owned: Vec<(String, String)> =
        vars.iter().map(|(key, value)| ((*key).to_string(), (*value).to_string())).collect();
    let lookup = move |key: &str| {
        owned.iter().find(|(name, _)| name == key).map(|(_, value)| value.clone())
    };
    GraphGateConfig::from_toml_str(content, &lookup)
}

/// Assert that a result is an error containing a specific substring.
pub fn assert_invalid<T>(result: Result<T, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error '{message}' did not contain '{needle}'"))
            }
        }
        Ok(_) => Err("expected invalid config".to_string()),
    }
}
