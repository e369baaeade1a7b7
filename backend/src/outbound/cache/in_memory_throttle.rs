//! Process-local fixed-window attempt counter.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;

use crate::domain::ports::{AttemptThrottle, AttemptThrottleError, ThrottleDecision, ThrottlePolicy};

/// Expired windows are swept once the map grows past this many clients.
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    attempts: u32,
    resets_at: DateTime<Utc>,
}

/// Fixed-window throttle keeping counters in a mutex-guarded map.
pub struct InMemoryAttemptThrottle {
    policy: ThrottlePolicy,
    clock: Arc<dyn Clock>,
    windows: Mutex<HashMap<String, Window>>,
}

impl InMemoryAttemptThrottle {
    pub fn new(policy: ThrottlePolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            clock,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// End of a window opened at `now`, saturating at the latest
    /// representable instant.
    fn window_end(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        TimeDelta::from_std(self.policy.window)
            .ok()
            .and_then(|length| now.checked_add_signed(length))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn decide(&self, client: &str, now: DateTime<Utc>) -> Result<ThrottleDecision, AttemptThrottleError> {
        let mut windows = self
            .windows
            .lock()
            .map_err(|_| AttemptThrottleError::backend("attempt counter lock poisoned"))?;

        if windows.len() >= SWEEP_THRESHOLD {
            windows.retain(|_, window| window.resets_at > now);
        }

        let fresh = Window {
            attempts: 0,
            resets_at: self.window_end(now),
        };
        let window = windows.entry(client.to_owned()).or_insert(fresh);
        if now >= window.resets_at {
            *window = fresh;
        }

        if window.attempts >= self.policy.max_attempts {
            let retry_after = (window.resets_at - now).to_std().unwrap_or(Duration::ZERO);
            return Ok(ThrottleDecision::Limited { retry_after });
        }
        window.attempts += 1;
        Ok(ThrottleDecision::Allowed {
            remaining: self.policy.max_attempts - window.attempts,
        })
    }
}

#[async_trait]
impl AttemptThrottle for InMemoryAttemptThrottle {
    async fn register_attempt(
        &self,
        client: &str,
    ) -> Result<ThrottleDecision, AttemptThrottleError> {
        let now = self.clock.utc();
        self.decide(client, now)
    }
}
