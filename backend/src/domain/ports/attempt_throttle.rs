//! Port for counting receipt verification attempts per client.

use std::time::Duration;

use async_trait::async_trait;

use super::define_port_error;

define_port_error! {
    /// Errors raised by attempt counter stores.
    pub enum AttemptThrottleError {
        /// The counter store is unreachable.
        Backend { message: String } => "attempt throttle backend failure: {message}",
    }
}

/// Fixed-window attempt budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePolicy {
    pub max_attempts: u32,
    pub window: Duration,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(15 * 60),
        }
    }
}

/// Outcome of registering one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Attempt allowed; `remaining` more fit in the current window.
    Allowed { remaining: u32 },
    /// Budget exhausted until the window resets.
    Limited { retry_after: Duration },
}

/// Shared attempt counter keyed by an opaque client token.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AttemptThrottle: Send + Sync {
    /// Count one attempt for `client` and decide whether it may proceed.
    async fn register_attempt(&self, client: &str)
    -> Result<ThrottleDecision, AttemptThrottleError>;
}
