// crates/graph-gate-mcp/src/auth/tests.rs
// ============================================================================
// Module: Request Identity Unit Tests
// Description: Unit tests for credential parsing and header normalization.
// Purpose: Validate fail-closed credential extraction.
// Dependencies: graph-gate-mcp
// ============================================================================

//! ## Overview
//! Exercises Bearer/Basic parsing, custom header copying, and redaction.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only credential assertions."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::header::AUTHORIZATION;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use graph_gate_config::AuthConfig;
use proptest::prelude::*;

use super::*;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn headers_with(name: &'static str, value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(name, HeaderValue::from_str(value).unwrap());
    headers
}

fn basic(user: &str, pass: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{pass}")))
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

#[test]
fn missing_header_is_anonymous() {
    let extractor = CredentialExtractor::standard();
    assert_eq!(extractor.extract(&HeaderMap::new()).unwrap(), Credential::Absent);
}

#[test]
fn bearer_prefix_yields_token() {
    let extractor = CredentialExtractor::standard();
    let credential = extractor.extract(&headers_with("authorization", "Bearer abc.def")).unwrap();
    assert_eq!(credential, Credential::Bearer("abc.def".to_string()));
}

#[test]
fn bearer_scheme_is_case_insensitive() {
    let credential = parse_credential("bearer tok").unwrap();
    assert_eq!(credential, Credential::Bearer("tok".to_string()));
}

#[test]
fn empty_bearer_token_is_rejected_not_anonymous() {
    for value in ["Bearer ", "Bearer    ", "Bearer"] {
        let err = parse_credential(value).unwrap_err();
        assert_eq!(err.code(), "invalid_request", "value {value:?}");
    }
}

#[test]
fn basic_credentials_decode() {
    let credential = parse_credential(&basic("neo4j", "s3cret:with:colons")).unwrap();
    assert_eq!(credential, Credential::Basic {
        username: "neo4j".to_string(),
        password: "s3cret:with:colons".to_string(),
    });
}

#[test]
fn basic_with_empty_username_or_password_is_rejected() {
    assert!(parse_credential(&basic("", "pw")).is_err());
    assert!(parse_credential(&basic("user", "")).is_err());
}

#[test]
fn unknown_scheme_is_invalid_request() {
    let err = parse_credential("Digest username=x").unwrap_err();
    assert_eq!(err, AuthError::InvalidRequest("unsupported authorization scheme".to_string()));
}

#[test]
fn garbage_basic_payload_is_invalid_request() {
    let err = parse_credential("Basic !!!not-base64!!!").unwrap_err();
    assert_eq!(err.code(), "invalid_request");
}

#[test]
fn multiple_authorization_headers_are_rejected() {
    let mut headers = HeaderMap::new();
    headers.append(AUTHORIZATION, HeaderValue::from_static("Bearer a"));
    headers.append(AUTHORIZATION, HeaderValue::from_static("Bearer b"));
    assert!(CredentialExtractor::standard().extract(&headers).is_err());
}

#[test]
fn oversized_header_is_rejected() {
    let value = format!("Bearer {}", "a".repeat(MAX_AUTH_HEADER_BYTES));
    let headers = headers_with("authorization", &value);
    assert!(CredentialExtractor::standard().extract(&headers).is_err());
}

// ============================================================================
// SECTION: Custom Header
// ============================================================================

#[test]
fn custom_header_is_copied_over_authorization() {
    let config = AuthConfig {
        credential_header: "X-Graph-Auth".to_string(),
        ..AuthConfig::default()
    };
    let extractor = CredentialExtractor::from_config(&config).unwrap();
    let mut headers = headers_with("x-graph-auth", "Bearer custom");
    headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer ignored"));
    extractor.normalize(&mut headers);
    assert_eq!(extractor.extract(&headers).unwrap(), Credential::Bearer("custom".to_string()));
}

#[test]
fn custom_header_absent_leaves_authorization_untouched() {
    let config = AuthConfig {
        credential_header: "X-Graph-Auth".to_string(),
        ..AuthConfig::default()
    };
    let extractor = CredentialExtractor::from_config(&config).unwrap();
    let mut headers = headers_with("authorization", "Bearer standard");
    extractor.normalize(&mut headers);
    assert_eq!(extractor.extract(&headers).unwrap(), Credential::Bearer("standard".to_string()));
}

// ============================================================================
// SECTION: Redaction
// ============================================================================

#[test]
fn debug_output_redacts_secrets() {
    let credential = parse_credential(&basic("alice", "hunter2")).unwrap();
    assert!(!format!("{credential:?}").contains("hunter2"));
    let bearer = Credential::Bearer("super-secret-token".to_string());
    assert!(!format!("{bearer:?}").contains("super-secret-token"));
    let principal = BasicPrincipal::new("alice", "hunter2");
    assert!(!format!("{principal:?}").contains("hunter2"));
}

#[test]
fn fingerprint_is_stable_hex() {
    let first = token_fingerprint("token");
    assert_eq!(first.len(), 64);
    assert_eq!(first, token_fingerprint("token"));
    assert_ne!(first, token_fingerprint("token2"));
}

// ============================================================================
// SECTION: Properties
// ============================================================================

proptest! {
    #[test]
    fn basic_round_trips_for_non_empty_parts(
        user in "[A-Za-z0-9_.-]{1,24}",
        pass in "[ -~]{1,32}",
    ) {
        let credential = parse_credential(&basic(&user, &pass)).unwrap();
        prop_assert_eq!(credential, Credential::Basic { username: user, password: pass });
    }

    #[test]
    fn arbitrary_header_values_never_panic(value in "\\PC{0,64}") {
        let _ = parse_credential(&value);
    }
}
