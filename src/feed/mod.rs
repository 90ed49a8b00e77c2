//! Realtime feed modules.
//!
//! - `client`: reconnecting feed client and its background worker.
//! - `machine`: connection state and backoff bookkeeping.
//! - `transport`: connection seam and the websocket implementation.
//! - `proto`: typed decode of feed messages at the point of use.
//! - `monitor`: metrics snapshot with polling fallback.

/// Feed client, options and errors.
pub mod client;
/// Connection state machine.
pub mod machine;
/// Metrics monitor combining live updates and polling.
pub mod monitor;
/// Feed message types.
pub mod proto;
/// Transport traits and websocket transport.
pub mod transport;

pub use client::{FeedClient, FeedClientBuilder, FeedClientError, FeedOptions};
pub use machine::ConnectionState;
