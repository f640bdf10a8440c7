// crates/graph-gate-mcp/src/token/tests.rs
// ============================================================================
// Module: Token Validator Unit Tests
// Description: Signature, expiry, issuer, audience, and key cache behavior.
// Purpose: Validate the bearer token boundary with real RS256 tokens.
// Dependencies: graph-gate-mcp, jsonwebtoken
// ============================================================================

//! ## Overview
//! Tokens are signed with a fixture RSA key and checked against a static or
//! counting key set source. Audience tests cover exact, prefix, and substring
//! near-misses.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only token assertions."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use graph_gate_config::OAuthConfig;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use jsonwebtoken::encode;
use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::jwk::JwkSet;
use serde_json::Value;
use serde_json::json;

use super::*;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

const PRIVATE_KEY: &str = include_str!("../../tests/fixtures/rsa_private.pem");
const OTHER_PRIVATE_KEY: &str = include_str!("../../tests/fixtures/other_private.pem");
const PUBLIC_JWK: &str = include_str!("../../tests/fixtures/rsa_public.jwk.json");
const KID: &str = "test-key-1";
const DOMAIN: &str = "tenant.auth.example.com";
const RESOURCE: &str = "https://graph.example.com/mcp";

fn key_set() -> JwkSet {
    let jwk: Jwk = serde_json::from_str(PUBLIC_JWK).unwrap();
    JwkSet {
        keys: vec![jwk],
    }
}

fn oauth_config() -> OAuthConfig {
    OAuthConfig::new(DOMAIN, RESOURCE)
}

fn now() -> i64 {
    i64::try_from(SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()).unwrap()
}

fn claims(aud: Value) -> Value {
    json!({
        "sub": "user-1",
        "iss": format!("https://{DOMAIN}/"),
        "aud": aud,
        "exp": now() + 300,
        "scope": "cypher:read schema:read",
    })
}

fn mint_with(claims: &Value, kid: Option<&str>, pem: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    encode(&header, claims, &EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap()).unwrap()
}

fn mint(claims: &Value) -> String {
    mint_with(claims, Some(KID), PRIVATE_KEY)
}

fn validator() -> TokenValidator {
    TokenValidator::new(&oauth_config(), Arc::new(StaticKeySetSource::new(key_set())))
}

/// Counts fetches and optionally fails or delays.
struct CountingSource {
    fetches: AtomicUsize,
    fail_after_first: bool,
    delay: Duration,
}

impl CountingSource {
    fn new() -> Self {
        Self {
            fetches: AtomicUsize::new(0),
            fail_after_first: false,
            delay: Duration::ZERO,
        }
    }

    fn count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySetSource for CountingSource {
    async fn fetch(&self, _issuer: &str) -> Result<JwkSet, TokenError> {
        let previous = self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_after_first && previous > 0 {
            return Err(TokenError::KeySetUnavailable("down".to_string()));
        }
        Ok(key_set())
    }
}

// ============================================================================
// SECTION: Acceptance
// ============================================================================

#[tokio::test]
async fn valid_token_yields_principal_with_scopes() {
    let token = mint(&claims(json!(RESOURCE)));
    let principal = validator().validate(&token).await.unwrap();
    assert_eq!(principal.subject.as_deref(), Some("user-1"));
    assert_eq!(principal.audience, vec![RESOURCE.to_string()]);
    assert!(principal.scopes.contains("cypher:read"));
    assert!(principal.scopes.contains("schema:read"));
    assert_eq!(principal.token(), token);
}

#[tokio::test]
async fn audience_list_containing_resource_is_accepted() {
    let token = mint(&claims(json!(["https://other.example.com", RESOURCE])));
    assert!(validator().validate(&token).await.is_ok());
}

#[tokio::test]
async fn permissions_claim_contributes_scopes() {
    let mut payload = claims(json!(RESOURCE));
    payload["scope"] = json!("");
    payload["permissions"] = json!(["admin:all"]);
    let principal = validator().validate(&mint(&payload)).await.unwrap();
    assert!(principal.scopes.contains("admin:all"));
}

#[tokio::test]
async fn expiry_within_leeway_is_accepted() {
    let mut payload = claims(json!(RESOURCE));
    payload["exp"] = json!(now() - 30);
    assert!(validator().validate(&mint(&payload)).await.is_ok());
}

// ============================================================================
// SECTION: Rejection
// ============================================================================

#[tokio::test]
async fn audience_for_other_resource_is_rejected() {
    let token = mint(&claims(json!("https://other-server.example.com/mcp")));
    assert_eq!(validator().validate(&token).await.unwrap_err(), TokenError::AudienceMismatch);
}

#[tokio::test]
async fn audience_near_misses_are_rejected() {
    for aud in [
        json!("https://graph.example.com"),
        json!("https://graph.example.com/mcp/"),
        json!("https://graph.example.com/mcp-staging"),
        json!(["HTTPS://GRAPH.EXAMPLE.COM/MCP"]),
        json!([]),
    ] {
        let token = mint(&claims(aud.clone()));
        assert_eq!(
            validator().validate(&token).await.unwrap_err(),
            TokenError::AudienceMismatch,
            "audience {aud}"
        );
    }
}

#[tokio::test]
async fn missing_audience_is_rejected() {
    let mut payload = claims(json!(RESOURCE));
    payload.as_object_mut().unwrap().remove("aud");
    assert_eq!(
        validator().validate(&mint(&payload)).await.unwrap_err(),
        TokenError::AudienceMismatch
    );
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let mut payload = claims(json!(RESOURCE));
    payload["exp"] = json!(now() - 600);
    assert_eq!(validator().validate(&mint(&payload)).await.unwrap_err(), TokenError::Expired);
}

#[tokio::test]
async fn missing_exp_is_rejected() {
    let mut payload = claims(json!(RESOURCE));
    payload.as_object_mut().unwrap().remove("exp");
    assert!(matches!(
        validator().validate(&mint(&payload)).await.unwrap_err(),
        TokenError::InvalidClaims(_)
    ));
}

#[tokio::test]
async fn wrong_issuer_is_rejected() {
    let mut payload = claims(json!(RESOURCE));
    payload["iss"] = json!("https://evil.example.com/");
    assert_eq!(
        validator().validate(&mint(&payload)).await.unwrap_err(),
        TokenError::IssuerMismatch
    );
}

#[tokio::test]
async fn signature_from_other_key_is_rejected() {
    let token = mint_with(&claims(json!(RESOURCE)), Some(KID), OTHER_PRIVATE_KEY);
    assert_eq!(validator().validate(&token).await.unwrap_err(), TokenError::InvalidSignature);
}

#[tokio::test]
async fn unknown_kid_is_rejected() {
    let token = mint_with(&claims(json!(RESOURCE)), Some("rotated-away"), PRIVATE_KEY);
    assert_eq!(validator().validate(&token).await.unwrap_err(), TokenError::UnknownKey);
}

#[tokio::test]
async fn missing_kid_uses_single_key() {
    let token = mint_with(&claims(json!(RESOURCE)), None, PRIVATE_KEY);
    assert!(validator().validate(&token).await.is_ok());
}

#[tokio::test]
async fn hmac_token_is_rejected() {
    let header = Header::new(Algorithm::HS256);
    let token =
        encode(&header, &claims(json!(RESOURCE)), &EncodingKey::from_secret(b"secret")).unwrap();
    assert_eq!(
        validator().validate(&token).await.unwrap_err(),
        TokenError::UnsupportedAlgorithm
    );
}

#[tokio::test]
async fn garbage_is_malformed() {
    assert_eq!(validator().validate("not-a-jwt").await.unwrap_err(), TokenError::Malformed);
}

#[test]
fn every_failure_maps_to_invalid_token() {
    for error in [TokenError::Malformed, TokenError::AudienceMismatch, TokenError::Expired] {
        assert_eq!(AuthError::from(error).code(), "invalid_token");
    }
}

#[test]
fn audience_description_tells_client_to_change_audience() {
    assert!(TokenError::AudienceMismatch.description().contains("resource identifier"));
}

// ============================================================================
// SECTION: Key Set Cache
// ============================================================================

#[tokio::test(start_paused = true)]
async fn key_set_is_fetched_once_per_window() {
    let source = Arc::new(CountingSource::new());
    let validator = TokenValidator::new(&oauth_config(), source.clone());
    let token = mint(&claims(json!(RESOURCE)));

    validator.validate(&token).await.unwrap();
    validator.validate(&token).await.unwrap();
    assert_eq!(source.count(), 1);

    tokio::time::advance(Duration::from_secs(61)).await;
    validator.validate(&token).await.unwrap();
    assert_eq!(source.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn stale_keys_are_served_when_refresh_fails() {
    let source = Arc::new(CountingSource {
        fail_after_first: true,
        ..CountingSource::new()
    });
    let validator = TokenValidator::new(&oauth_config(), source.clone());
    let token = mint(&claims(json!(RESOURCE)));

    validator.validate(&token).await.unwrap();
    tokio::time::advance(Duration::from_secs(61)).await;
    validator.validate(&token).await.unwrap();
    validator.validate(&token).await.unwrap();
    assert_eq!(source.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn stale_keys_expire_when_refresh_keeps_failing() {
    let source = Arc::new(CountingSource {
        fail_after_first: true,
        ..CountingSource::new()
    });
    let validator = TokenValidator::new(&oauth_config(), source.clone());
    let token = mint(&claims(json!(RESOURCE)));

    validator.validate(&token).await.unwrap();
    for _ in 0 .. 9 {
        tokio::time::advance(Duration::from_secs(61)).await;
        validator.validate(&token).await.unwrap();
    }
    assert_eq!(source.count(), 10);

    tokio::time::advance(Duration::from_secs(61)).await;
    let err = validator.validate(&token).await.unwrap_err();
    assert!(matches!(err, TokenError::KeySetUnavailable(_)));
    assert_eq!(source.count(), 11);
}

#[tokio::test]
async fn concurrent_validations_share_one_fetch() {
    let source = Arc::new(CountingSource {
        delay: Duration::from_millis(50),
        ..CountingSource::new()
    });
    let validator = Arc::new(TokenValidator::new(&oauth_config(), source.clone()));
    let token = mint(&claims(json!(RESOURCE)));

    let mut tasks = Vec::new();
    for _ in 0 .. 8 {
        let validator = Arc::clone(&validator);
        let token = token.clone();
        tasks.push(tokio::spawn(async move { validator.validate(&token).await }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(source.count(), 1);
}
