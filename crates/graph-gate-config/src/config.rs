// crates/graph-gate-config/src/config.rs
// ============================================================================
// Module: Graph Gate Configuration
// Description: Configuration loading and validation for the Graph Gate gateway.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: serde, toml, url
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits,
//! then environment overrides are applied and the result is validated as a
//! whole. Missing or invalid configuration fails closed.
//!
//! Security posture: config inputs are untrusted. OAuth identifiers are exact
//! strings compared byte-for-byte against token claims, so whitespace and
//! empty values are rejected at load time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::env::EnvLookup;
use crate::env::apply_env_overrides;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "graph-gate.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "GRAPH_GATE_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum body size accepted on the unauthenticated probe path.
pub const MAX_UNAUTHENTICATED_BODY_BYTES: usize = 64 * 1024;
/// Maximum request body size for authenticated requests.
pub const MAX_REQUEST_BODY_BYTES: usize = 16 * 1024 * 1024;
/// Maximum number of allowed CORS origins.
pub(crate) const MAX_ALLOWED_ORIGINS: usize = 64;
/// Maximum length of OAuth identifiers (domain, resource, issuer).
pub(crate) const MAX_OAUTH_IDENTIFIER_LENGTH: usize = 2048;
/// Maximum shutdown drain window.
pub(crate) const MAX_SHUTDOWN_DRAIN_MS: u64 = 5 * 60 * 1000;
/// Standard credential header.
pub const DEFAULT_CREDENTIAL_HEADER: &str = "Authorization";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Filesystem access failed.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing failed.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Configuration is structurally valid but violates a constraint.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Graph Gate configuration root.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphGateConfig {
    /// HTTP listener configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Credential and token policy.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Graph backend connection settings.
    #[serde(default)]
    pub backend: BackendConfig,
    /// Initialization telemetry settings.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Auth decision audit settings.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl GraphGateConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// Resolution order: explicit path, then `GRAPH_GATE_CONFIG`, then
    /// `graph-gate.toml` in the working directory. Process environment
    /// overrides are applied before validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(content, &|key: &str| env::var(key).ok())
    }

    /// Parses configuration from TOML text, applying overrides from `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing, overrides, or validation fail.
    pub fn from_toml_str(content: &str, lookup: &dyn EnvLookup) -> Result<Self, ConfigError> {
        if content.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let mut config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        apply_env_overrides(&mut config, lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.auth.validate()?;
        self.backend.validate()?;
        self.telemetry.validate()?;
        self.audit.validate()?;

        let addr = self.server.bind_addr()?;
        if !addr.ip().is_loopback() && self.auth.mode == AuthMode::Disabled {
            return Err(ConfigError::Invalid(
                "non-loopback bind disallowed with auth.mode = disabled".to_string(),
            ));
        }
        if self.auth.mode == AuthMode::Disabled && self.backend.service_credentials.is_none() {
            return Err(ConfigError::Invalid(
                "auth.mode = disabled requires backend.service_credentials".to_string(),
            ));
        }
        if self.auth.oauth.is_some() && self.backend.service_credentials.is_none() {
            return Err(ConfigError::Invalid(
                "auth.oauth requires backend.service_credentials for bearer sessions".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the externally visible base URL of this server.
    #[must_use]
    pub fn public_base_url(&self) -> String {
        self.server.public_base_url.as_deref().map_or_else(
            || {
                let scheme = if self.server.tls.is_some() { "https" } else { "http" };
                format!("{scheme}://{}", self.server.bind)
            },
            |url| url.trim_end_matches('/').to_string(),
        )
    }

    /// Returns the protected resource metadata URL advertised on 401 responses.
    #[must_use]
    pub fn resource_metadata_url(&self) -> String {
        format!("{}{}", self.public_base_url(), RESOURCE_METADATA_PATH)
    }
}

/// Well-known path of the protected resource metadata document.
pub const RESOURCE_METADATA_PATH: &str = "/.well-known/oauth-protected-resource";

// ============================================================================
// SECTION: Server
// ============================================================================

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address to bind.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Canonical endpoint path served by the gateway.
    #[serde(default = "default_endpoint_path")]
    pub endpoint_path: String,
    /// Externally visible base URL (used in discovery links).
    #[serde(default)]
    pub public_base_url: Option<String>,
    /// Maximum request body size for authenticated requests.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Graceful shutdown drain window in milliseconds.
    #[serde(default = "default_shutdown_drain_ms")]
    pub shutdown_drain_ms: u64,
    /// Optional TLS listener configuration.
    #[serde(default)]
    pub tls: Option<ServerTlsConfig>,
    /// Cross-origin policy.
    #[serde(default)]
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            endpoint_path: default_endpoint_path(),
            public_base_url: None,
            max_body_bytes: default_max_body_bytes(),
            shutdown_drain_ms: default_shutdown_drain_ms(),
            tls: None,
            cors: CorsConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Parses the bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the address is not a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid("invalid server.bind address".to_string()))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        let path = self.endpoint_path.trim();
        if !path.starts_with('/') || path.trim_end_matches('/').is_empty() {
            return Err(ConfigError::Invalid(
                "server.endpoint_path must be absolute and not the root path".to_string(),
            ));
        }
        if path.contains(char::is_whitespace) || path.contains('?') || path.contains('#') {
            return Err(ConfigError::Invalid(
                "server.endpoint_path must be a plain path".to_string(),
            ));
        }
        if path.starts_with("/.well-known") || path.starts_with("/oauth/") {
            return Err(ConfigError::Invalid(
                "server.endpoint_path collides with a reserved route".to_string(),
            ));
        }
        if self.max_body_bytes == 0 || self.max_body_bytes > MAX_REQUEST_BODY_BYTES {
            return Err(ConfigError::Invalid(format!(
                "server.max_body_bytes must be between 1 and {MAX_REQUEST_BODY_BYTES}"
            )));
        }
        if self.shutdown_drain_ms > MAX_SHUTDOWN_DRAIN_MS {
            return Err(ConfigError::Invalid("server.shutdown_drain_ms too large".to_string()));
        }
        if let Some(base) = &self.public_base_url {
            let parsed = Url::parse(base.trim()).map_err(|_| {
                ConfigError::Invalid("server.public_base_url must be an absolute url".to_string())
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::Invalid(
                    "server.public_base_url must use http or https".to_string(),
                ));
            }
        }
        if let Some(tls) = &self.tls {
            tls.validate()?;
        }
        self.cors.validate()
    }

    /// Returns the endpoint path without a trailing slash.
    #[must_use]
    pub fn canonical_endpoint(&self) -> &str {
        self.endpoint_path.trim().trim_end_matches('/')
    }
}

/// TLS listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerTlsConfig {
    /// PEM certificate chain path.
    pub cert_path: String,
    /// PEM private key path.
    pub key_path: String,
}

impl ServerTlsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("server.tls.cert_path", &self.cert_path)?;
        validate_path_string("server.tls.key_path", &self.key_path)
    }
}

// ============================================================================
// SECTION: CORS
// ============================================================================

/// Cross-origin policy for browser clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins (`"*"`, a comma-separated string, or a list).
    #[serde(default)]
    pub allowed_origins: AllowedOrigins,
    /// Request headers advertised in preflight responses.
    #[serde(default = "default_cors_headers")]
    pub allowed_headers: Vec<String>,
    /// Preflight cache lifetime in seconds.
    #[serde(default = "default_cors_max_age_secs")]
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: AllowedOrigins::Disabled,
            allowed_headers: default_cors_headers(),
            max_age_secs: default_cors_max_age_secs(),
        }
    }
}

impl CorsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.allowed_origins.validate()?;
        for header in &self.allowed_headers {
            if !is_http_token(header) {
                return Err(ConfigError::Invalid(format!(
                    "server.cors.allowed_headers entry is not a header name: {header}"
                )));
            }
        }
        Ok(())
    }
}

/// Ordered origin allow-list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AllowedOrigins {
    /// No origins configured; CORS handling is skipped.
    #[default]
    Disabled,
    /// Every origin is allowed.
    Any,
    /// Exact origin strings.
    List(Vec<String>),
}

impl AllowedOrigins {
    /// Parses `*` or a comma-separated origin list.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the wildcard is mixed with other entries.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        Self::from_entries(raw.split(',').map(str::to_string))
    }

    /// Builds an allow-list from individual entries.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the wildcard is mixed with other entries.
    pub fn from_entries(entries: impl IntoIterator<Item = String>) -> Result<Self, ConfigError> {
        let origins: Vec<String> = entries
            .into_iter()
            .map(|entry| entry.trim().trim_end_matches('/').to_string())
            .filter(|entry| !entry.is_empty())
            .collect();
        if origins.iter().any(|origin| origin == "*") {
            if origins.len() > 1 {
                return Err(ConfigError::Invalid(
                    "wildcard origin must not be combined with other origins".to_string(),
                ));
            }
            return Ok(Self::Any);
        }
        if origins.is_empty() {
            return Ok(Self::Disabled);
        }
        Ok(Self::List(origins))
    }

    /// Returns true when CORS handling is active.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// Returns true when the origin may be echoed back.
    #[must_use]
    pub fn allows(&self, origin: &str) -> bool {
        match self {
            Self::Disabled => false,
            Self::Any => true,
            Self::List(origins) => origins.iter().any(|allowed| allowed == origin),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let Self::List(origins) = self else {
            return Ok(());
        };
        if origins.len() > MAX_ALLOWED_ORIGINS {
            return Err(ConfigError::Invalid("too many allowed origins".to_string()));
        }
        for origin in origins {
            let parsed = Url::parse(origin)
                .map_err(|_| ConfigError::Invalid(format!("invalid origin: {origin}")))?;
            if !matches!(parsed.scheme(), "http" | "https")
                || parsed.host_str().is_none()
                || parsed.path() != "/"
                || parsed.query().is_some()
            {
                return Err(ConfigError::Invalid(format!("invalid origin: {origin}")));
            }
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for AllowedOrigins {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            List(Vec<String>),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => Self::parse(&text).map_err(serde::de::Error::custom),
            Raw::List(items) => Self::from_entries(items).map_err(serde::de::Error::custom),
        }
    }
}

// ============================================================================
// SECTION: Auth
// ============================================================================

/// Gateway authentication mode.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Protected methods require Basic or Bearer credentials.
    #[default]
    Required,
    /// Single-tenant mode: anonymous callers use the service credentials.
    Disabled,
}

impl AuthMode {
    /// Returns a stable label for the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Disabled => "disabled",
        }
    }
}

/// Credential and token policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Authentication mode.
    #[serde(default)]
    pub mode: AuthMode,
    /// Header carrying credentials (copied over `Authorization` when custom).
    #[serde(default = "default_credential_header")]
    pub credential_header: String,
    /// Realm advertised in `WWW-Authenticate` challenges.
    #[serde(default = "default_realm")]
    pub realm: String,
    /// Allow `ping` without credentials.
    #[serde(default)]
    pub allow_unauthenticated_ping: bool,
    /// Allow `tools/list` without credentials.
    #[serde(default)]
    pub allow_unauthenticated_tools_list: bool,
    /// Body cap enforced on credential-free probes.
    #[serde(default = "default_unauthenticated_max_body_bytes")]
    pub unauthenticated_max_body_bytes: usize,
    /// OAuth bearer token policy. Bearer credentials are rejected when unset.
    #[serde(default)]
    pub oauth: Option<OAuthConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::Required,
            credential_header: default_credential_header(),
            realm: default_realm(),
            allow_unauthenticated_ping: false,
            allow_unauthenticated_tools_list: false,
            unauthenticated_max_body_bytes: default_unauthenticated_max_body_bytes(),
            oauth: None,
        }
    }
}

impl AuthConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !is_http_token(self.credential_header.trim()) {
            return Err(ConfigError::Invalid(
                "auth.credential_header must be a valid header name".to_string(),
            ));
        }
        if self.realm.trim().is_empty() || self.realm.contains('"') {
            return Err(ConfigError::Invalid(
                "auth.realm must be non-empty and must not contain quotes".to_string(),
            ));
        }
        if self.unauthenticated_max_body_bytes == 0
            || self.unauthenticated_max_body_bytes > MAX_UNAUTHENTICATED_BODY_BYTES
        {
            return Err(ConfigError::Invalid(format!(
                "auth.unauthenticated_max_body_bytes must be between 1 and \
                 {MAX_UNAUTHENTICATED_BODY_BYTES}"
            )));
        }
        if let Some(oauth) = &self.oauth {
            oauth.validate()?;
        }
        Ok(())
    }

    /// Returns true when a non-standard credential header is configured.
    #[must_use]
    pub fn uses_custom_header(&self) -> bool {
        !self.credential_header.trim().eq_ignore_ascii_case(DEFAULT_CREDENTIAL_HEADER)
    }
}

/// OAuth bearer token policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OAuthConfig {
    /// Authorization server domain (host, optionally with port).
    pub authorization_server_domain: String,
    /// Resource identifier tokens must name in their audience.
    pub resource_identifier: String,
    /// Expected issuer. Defaults to `https://{domain}/`.
    #[serde(default)]
    pub issuer: Option<String>,
    /// Key set location. Defaults to `https://{domain}/.well-known/jwks.json`.
    #[serde(default)]
    pub jwks_uri: Option<String>,
    /// Key set cache window in seconds.
    #[serde(default = "default_jwks_cache_secs")]
    pub jwks_cache_secs: u64,
    /// Key set fetch timeout in milliseconds.
    #[serde(default = "default_jwks_timeout_ms")]
    pub jwks_timeout_ms: u64,
    /// Allowed clock skew for `exp`/`nbf` in seconds.
    #[serde(default = "default_leeway_secs")]
    pub leeway_secs: u64,
    /// Scopes advertised in the discovery document (defaults to the tool scopes).
    #[serde(default)]
    pub scopes_supported: Vec<String>,
    /// Optional human-readable documentation URL for the resource.
    #[serde(default)]
    pub resource_documentation: Option<String>,
    /// Authorization/token endpoint proxy settings.
    #[serde(default)]
    pub proxy: OAuthProxyConfig,
}

impl OAuthConfig {
    /// Builds an OAuth policy with default derived endpoints.
    #[must_use]
    pub fn new(domain: impl Into<String>, resource_identifier: impl Into<String>) -> Self {
        Self {
            authorization_server_domain: domain.into(),
            resource_identifier: resource_identifier.into(),
            issuer: None,
            jwks_uri: None,
            jwks_cache_secs: default_jwks_cache_secs(),
            jwks_timeout_ms: default_jwks_timeout_ms(),
            leeway_secs: default_leeway_secs(),
            scopes_supported: Vec::new(),
            resource_documentation: None,
            proxy: OAuthProxyConfig::default(),
        }
    }

    /// Returns the authorization server base URL.
    #[must_use]
    pub fn authorization_server_url(&self) -> String {
        format!("https://{}", self.domain())
    }

    /// Returns the expected token issuer.
    #[must_use]
    pub fn issuer(&self) -> String {
        self.issuer.clone().unwrap_or_else(|| format!("https://{}/", self.domain()))
    }

    /// Returns the key set URL.
    #[must_use]
    pub fn jwks_uri(&self) -> String {
        self.jwks_uri
            .clone()
            .unwrap_or_else(|| format!("https://{}/.well-known/jwks.json", self.domain()))
    }

    /// Returns the upstream authorize endpoint.
    #[must_use]
    pub fn upstream_authorize_url(&self) -> String {
        self.proxy
            .authorize_url
            .clone()
            .unwrap_or_else(|| format!("https://{}/authorize", self.domain()))
    }

    /// Returns the upstream token endpoint.
    #[must_use]
    pub fn upstream_token_url(&self) -> String {
        self.proxy
            .token_url
            .clone()
            .unwrap_or_else(|| format!("https://{}/oauth/token", self.domain()))
    }

    fn domain(&self) -> &str {
        self.authorization_server_domain.trim().trim_end_matches('/')
    }

    fn validate(&self) -> Result<(), ConfigError> {
        validate_identifier("auth.oauth.authorization_server_domain", &self.authorization_server_domain)?;
        if self.authorization_server_domain.contains("://") {
            return Err(ConfigError::Invalid(
                "auth.oauth.authorization_server_domain must be a bare domain".to_string(),
            ));
        }
        validate_identifier("auth.oauth.resource_identifier", &self.resource_identifier)?;
        if let Some(issuer) = &self.issuer {
            validate_identifier("auth.oauth.issuer", issuer)?;
        }
        for (field, value) in [
            ("auth.oauth.jwks_uri", self.jwks_uri.as_deref()),
            ("auth.oauth.resource_documentation", self.resource_documentation.as_deref()),
            ("auth.oauth.proxy.authorize_url", self.proxy.authorize_url.as_deref()),
            ("auth.oauth.proxy.token_url", self.proxy.token_url.as_deref()),
        ] {
            if let Some(value) = value {
                validate_http_url(field, value)?;
            }
        }
        if self.jwks_cache_secs == 0 {
            return Err(ConfigError::Invalid(
                "auth.oauth.jwks_cache_secs must be greater than zero".to_string(),
            ));
        }
        if self.jwks_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "auth.oauth.jwks_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.leeway_secs > 600 {
            return Err(ConfigError::Invalid("auth.oauth.leeway_secs too large".to_string()));
        }
        for scope in &self.scopes_supported {
            if scope.trim().is_empty() || scope.contains(char::is_whitespace) {
                return Err(ConfigError::Invalid(format!("invalid scope: {scope:?}")));
            }
        }
        if self.proxy.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "auth.oauth.proxy.timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// OAuth endpoint proxy settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OAuthProxyConfig {
    /// Serve `/oauth/authorize` and `/oauth/token`.
    #[serde(default)]
    pub enabled: bool,
    /// Upstream authorize endpoint override.
    #[serde(default)]
    pub authorize_url: Option<String>,
    /// Upstream token endpoint override.
    #[serde(default)]
    pub token_url: Option<String>,
    /// Upstream request timeout in milliseconds.
    #[serde(default = "default_proxy_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for OAuthProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            authorize_url: None,
            token_url: None,
            timeout_ms: default_proxy_timeout_ms(),
        }
    }
}

// ============================================================================
// SECTION: Backend
// ============================================================================

/// Graph backend connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Bolt URI of the backend.
    #[serde(default = "default_backend_uri")]
    pub uri: String,
    /// Target database name (server default when unset).
    #[serde(default)]
    pub database: Option<String>,
    /// Omit write tools from registration.
    #[serde(default)]
    pub read_only: bool,
    /// Connection timeout per session in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Bound on the one-time verification sequence in milliseconds.
    #[serde(default = "default_init_timeout_ms")]
    pub init_timeout_ms: u64,
    /// Bound on a single tool query in milliseconds.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    /// Maximum rows returned by a single tool call.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
    /// Credentials used for bearer principals and single-tenant mode.
    #[serde(default)]
    pub service_credentials: Option<ServiceCredentialsConfig>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            uri: default_backend_uri(),
            database: None,
            read_only: false,
            connect_timeout_ms: default_connect_timeout_ms(),
            init_timeout_ms: default_init_timeout_ms(),
            query_timeout_ms: default_query_timeout_ms(),
            max_rows: default_max_rows(),
            service_credentials: None,
        }
    }
}

impl BackendConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let uri = Url::parse(self.uri.trim())
            .map_err(|_| ConfigError::Invalid("backend.uri must be a url".to_string()))?;
        if !matches!(
            uri.scheme(),
            "bolt" | "bolt+s" | "bolt+ssc" | "neo4j" | "neo4j+s" | "neo4j+ssc"
        ) {
            return Err(ConfigError::Invalid(
                "backend.uri must use a bolt or neo4j scheme".to_string(),
            ));
        }
        if let Some(database) = &self.database
            && database.trim().is_empty()
        {
            return Err(ConfigError::Invalid("backend.database must be non-empty".to_string()));
        }
        for (field, value) in [
            ("backend.connect_timeout_ms", self.connect_timeout_ms),
            ("backend.init_timeout_ms", self.init_timeout_ms),
            ("backend.query_timeout_ms", self.query_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{field} must be greater than zero")));
            }
        }
        if self.max_rows == 0 {
            return Err(ConfigError::Invalid("backend.max_rows must be greater than zero".to_string()));
        }
        if let Some(creds) = &self.service_credentials {
            creds.validate()?;
        }
        Ok(())
    }
}

/// Service account credentials for the backend.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceCredentialsConfig {
    /// Backend username.
    pub username: String,
    /// Backend password.
    pub password: String,
}

impl fmt::Debug for ServiceCredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCredentialsConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl ServiceCredentialsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.username.trim().is_empty() || self.password.is_empty() {
            return Err(ConfigError::Invalid(
                "backend.service_credentials requires username and password".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Telemetry & Audit
// ============================================================================

/// Initialization telemetry settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Emit the one-time initialization event.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Bound on the detached telemetry task in milliseconds.
    #[serde(default = "default_telemetry_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: default_telemetry_timeout_ms(),
        }
    }
}

impl TelemetryConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "telemetry.timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Audit sink selection.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
    /// Discard audit events.
    None,
}

/// Auth decision audit settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Sink type.
    #[serde(default)]
    pub sink: AuditSinkKind,
    /// File path for the `file` sink.
    #[serde(default)]
    pub path: Option<String>,
}

impl AuditConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, self.path.as_deref()) {
            (AuditSinkKind::File, None) => {
                Err(ConfigError::Invalid("audit.path is required for the file sink".to_string()))
            }
            (AuditSinkKind::File, Some(path)) => validate_path_string("audit.path", path),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_endpoint_path() -> String {
    "/mcp".to_string()
}

const fn default_max_body_bytes() -> usize {
    1024 * 1024
}

const fn default_shutdown_drain_ms() -> u64 {
    10_000
}

fn default_cors_headers() -> Vec<String> {
    vec![
        "Content-Type".to_string(),
        "Authorization".to_string(),
        "Mcp-Session-Id".to_string(),
        "Mcp-Protocol-Version".to_string(),
    ]
}

const fn default_cors_max_age_secs() -> u64 {
    86_400
}

fn default_credential_header() -> String {
    DEFAULT_CREDENTIAL_HEADER.to_string()
}

fn default_realm() -> String {
    "graph-gate".to_string()
}

const fn default_unauthenticated_max_body_bytes() -> usize {
    4096
}

const fn default_jwks_cache_secs() -> u64 {
    60
}

const fn default_jwks_timeout_ms() -> u64 {
    5_000
}

const fn default_leeway_secs() -> u64 {
    60
}

const fn default_proxy_timeout_ms() -> u64 {
    10_000
}

fn default_backend_uri() -> String {
    "bolt://127.0.0.1:7687".to_string()
}

const fn default_connect_timeout_ms() -> u64 {
    5_000
}

const fn default_init_timeout_ms() -> u64 {
    30_000
}

const fn default_query_timeout_ms() -> u64 {
    30_000
}

const fn default_max_rows() -> usize {
    1_000
}

const fn default_true() -> bool {
    true
}

const fn default_telemetry_timeout_ms() -> u64 {
    2_000
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI input or environment.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} component too long")));
        }
    }
    Ok(())
}

/// Validates an exact-match identifier.
fn validate_identifier(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if value.len() > MAX_OAUTH_IDENTIFIER_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    if value.contains(char::is_whitespace) || value.contains('"') {
        return Err(ConfigError::Invalid(format!(
            "{field} must not contain whitespace or quotes"
        )));
    }
    Ok(())
}

/// Validates an absolute http(s) URL.
fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let parsed = Url::parse(value.trim())
        .map_err(|_| ConfigError::Invalid(format!("{field} must be an absolute url")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid(format!("{field} must use http or https")));
    }
    Ok(())
}

/// Returns true when `value` is a legal HTTP header field name.
pub(crate) fn is_http_token(value: &str) -> bool {
    !value.is_empty()
        && value.bytes().all(|byte| {
            byte.is_ascii_alphanumeric()
                || matches!(
                    byte,
                    b'!' | b'#'
                        | b'$'
                        | b'%'
                        | b'&'
                        | b'\''
                        | b'*'
                        | b'+'
                        | b'-'
                        | b'.'
                        | b'^'
                        | b'_'
                        | b'`'
                        | b'|'
                        | b'~'
                )
        })
}
