// crates/graph-gate-config/src/lib.rs
// ============================================================================
// Module: Graph Gate Config Library
// Description: Canonical config model, environment overrides, and validation.
// Purpose: Single source of truth for graph-gate.toml semantics.
// Dependencies: serde, toml, url
// ============================================================================

//! ## Overview
//! `graph-gate-config` defines the configuration model for the Graph Gate
//! HTTP gateway. Configuration is built once at process start, validated
//! fail-closed, and then handed by value to the gateway components.
//!
//! Security posture: config inputs are untrusted and environment overrides are
//! validated exactly like file contents.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod env;
pub mod examples;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use env::EnvLookup;
pub use env::apply_env_overrides;
pub use examples::config_toml_example;
