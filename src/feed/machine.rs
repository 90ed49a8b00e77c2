//! Connection state and reconnect bookkeeping for the realtime feed.
//!
//! [`ReconnectMachine`] holds no I/O. The feed worker reports transport
//! events into it and gets back the one decision that matters: whether to
//! schedule another connect, and after how long.

use std::time::Duration;

use crate::retry::ReconnectPolicy;

/// Observable connection state of a feed client.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Transition core of the feed client.
#[derive(Clone, Debug)]
pub struct ReconnectMachine {
    policy: ReconnectPolicy,
    state: ConnectionState,
    attempts: u32,
}

impl ReconnectMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: ConnectionState::Disconnected,
            attempts: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive reconnects scheduled since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// A connect attempt is starting.
    pub fn on_connect(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    /// The transport opened; the backoff schedule starts over.
    pub fn on_open(&mut self) {
        self.state = ConnectionState::Connected;
        self.attempts = 0;
    }

    /// Transport error. Scheduling is left to the closure that follows.
    pub fn on_error(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    /// The connection closed (or never opened).
    ///
    /// Returns the delay before the next connect, or `None` once the attempt
    /// ceiling is reached.
    pub fn on_close(&mut self) -> Option<Duration> {
        self.state = ConnectionState::Disconnected;
        if !self.policy.allows(self.attempts) {
            return None;
        }
        let delay = self.policy.delay_for_attempt(self.attempts);
        self.attempts += 1;
        Some(delay)
    }
}

impl Default for ReconnectMachine {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}
