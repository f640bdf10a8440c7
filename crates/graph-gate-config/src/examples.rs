// crates/graph-gate-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payload.
// Purpose: Deterministic example for docs and the `config example` command.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical example `graph-gate.toml`. The example must always pass
//! validation; a test in this crate enforces it.

/// Returns a canonical example `graph-gate.toml` configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[server]
bind = "127.0.0.1:8080"
endpoint_path = "/mcp"
public_base_url = "https://graph.example.com"
max_body_bytes = 1048576
shutdown_drain_ms = 10000

[server.cors]
allowed_origins = ["https://app.example.com"]
max_age_secs = 86400

[auth]
mode = "required"
credential_header = "Authorization"
realm = "graph-gate"
allow_unauthenticated_ping = true
allow_unauthenticated_tools_list = false
unauthenticated_max_body_bytes = 4096

[auth.oauth]
authorization_server_domain = "tenant.auth.example.com"
resource_identifier = "https://graph.example.com/mcp"
jwks_cache_secs = 60
leeway_secs = 60

[auth.oauth.proxy]
enabled = true

[backend]
uri = "bolt://127.0.0.1:7687"
read_only = false
connect_timeout_ms = 5000
init_timeout_ms = 30000
query_timeout_ms = 30000
max_rows = 1000

[backend.service_credentials]
username = "graph_gate_service"
password = "change-me"

[telemetry]
enabled = true
timeout_ms = 2000

[audit]
sink = "stderr"
"#,
    )
}
