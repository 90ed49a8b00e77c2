//! Rust client SDK for the ReSight recommendation dashboard backend.
//!
//! The crate is organized by surface:
//! - `config`: explicit API context (base URL, token, derived feed endpoint).
//! - `session`: operator session store.
//! - `api`: REST client for metrics, ranking, rules, explanations, what-if
//!   simulation and ask-AI.
//! - `feed`: reconnecting realtime feed client and polling fallback.
//! - `retry`: shared retry, backoff and timeout utilities.

/// Dashboard REST client and request/response types.
pub mod api;
/// API context and endpoint derivation.
pub mod config;
/// Realtime feed client, protocol types and metrics monitor.
pub mod feed;
/// Retry, backoff and timeout helpers.
pub mod retry;
/// Operator session storage.
pub mod session;
