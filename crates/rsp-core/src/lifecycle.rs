//! Connection state machine with bounded, backed-off reconnects.
//!
//! ```text
//! Connecting ──open──▶ Open ──close──▶ Closed ──retry──▶ Connecting
//!      │                                  │
//!      └──────────close──────────────────▶│──logged out──▶ LoggedOut (terminal)
//! ```

use std::time::Duration;

use crate::{config::Config, messaging::types::CloseReason};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    LoggedOut,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive failed connections tolerated before giving up.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            max_attempts: cfg.reconnect_max_attempts,
            base_delay: cfg.reconnect_base_delay,
            max_delay: cfg.reconnect_max_delay,
        }
    }

    /// Exponential backoff: `base * 2^(attempt - 1)`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// What the supervisor should do after a disconnect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Directive {
    Reconnect { attempt: u32, delay: Duration },
    LoggedOut,
    GiveUp { attempts: u32 },
}

#[derive(Clone, Debug)]
pub struct ConnectionLifecycle {
    state: ConnectionState,
    policy: RetryPolicy,
    failures: u32,
}

impl ConnectionLifecycle {
    /// Starts in `Connecting`: the first attempt is issued right away.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            state: ConnectionState::Connecting,
            policy,
            failures: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Incoming messages are only processed while open.
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn is_terminal(&self) -> bool {
        self.state == ConnectionState::LoggedOut
    }

    /// `Connecting → Open`. Resets the failure streak. Ignored in any other state.
    pub fn opened(&mut self) {
        if self.state != ConnectionState::Connecting {
            return;
        }
        self.state = ConnectionState::Open;
        self.failures = 0;
    }

    /// Any disconnect moves to `Closed`; a logout continues straight to `LoggedOut`.
    pub fn disconnected(&mut self, reason: &CloseReason) -> Directive {
        if self.state == ConnectionState::LoggedOut {
            return Directive::LoggedOut;
        }
        self.state = ConnectionState::Closed;

        if *reason == CloseReason::LoggedOut {
            self.state = ConnectionState::LoggedOut;
            return Directive::LoggedOut;
        }

        self.failures += 1;
        if self.failures > self.policy.max_attempts {
            return Directive::GiveUp {
                attempts: self.failures - 1,
            };
        }

        Directive::Reconnect {
            attempt: self.failures,
            delay: self.policy.delay_for(self.failures),
        }
    }

    /// `Closed → Connecting`, issued when the retry delay has elapsed.
    pub fn reconnecting(&mut self) {
        if self.state == ConnectionState::Closed {
            self.state = ConnectionState::Connecting;
        }
    }
}
