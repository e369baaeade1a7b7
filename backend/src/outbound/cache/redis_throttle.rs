//! Redis-backed fixed-window attempt counter shared across processes.
//!
//! Each client gets one key. `INCR` and `TTL` run in one `MULTI` block; a key
//! reporting no expiry (a fresh counter, or one whose `EXPIRE` never landed)
//! is given the full window, so the key always vanishes when the window ends
//! and the next attempt starts afresh.

use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::redis::{self, AsyncCommands, RedisError};
use bb8_redis::{RedisConnectionManager, bb8};
use tracing::debug;

use crate::domain::ports::{AttemptThrottle, AttemptThrottleError, ThrottleDecision, ThrottlePolicy};

const KEY_PREFIX: &str = "survey:verify-attempts:";

/// Errors raised while building the Redis pool.
#[derive(Debug, thiserror::Error)]
pub enum RedisThrottleError {
    #[error("invalid redis url: {0}")]
    InvalidUrl(#[source] RedisError),
    #[error("failed to build redis pool: {0}")]
    Build(#[source] RedisError),
}

/// Fixed-window throttle storing counters in Redis.
#[derive(Clone)]
pub struct RedisAttemptThrottle {
    pool: bb8::Pool<RedisConnectionManager>,
    policy: ThrottlePolicy,
}

impl RedisAttemptThrottle {
    /// Connect to `redis_url` and build a connection pool.
    ///
    /// # Errors
    ///
    /// Fails when the URL does not parse or no connection can be opened.
    pub async fn connect(redis_url: &str, policy: ThrottlePolicy) -> Result<Self, RedisThrottleError> {
        let manager = RedisConnectionManager::new(redis_url).map_err(RedisThrottleError::InvalidUrl)?;
        let pool = bb8::Pool::builder()
            .build(manager)
            .await
            .map_err(RedisThrottleError::Build)?;
        Ok(Self { pool, policy })
    }

    fn window_secs(&self) -> i64 {
        i64::try_from(self.policy.window.as_secs()).unwrap_or(i64::MAX).max(1)
    }
}

fn counter_key(client: &str) -> String {
    format!("{KEY_PREFIX}{client}")
}

fn backend_error(error: impl std::fmt::Display) -> AttemptThrottleError {
    AttemptThrottleError::backend(error.to_string())
}

/// Expiry to apply when `TTL` reports the key has none.
fn missing_expiry(ttl_secs: i64, window_secs: i64) -> Option<i64> {
    (ttl_secs < 0).then_some(window_secs)
}

/// Decide from the post-increment count and the key's remaining TTL.
fn decision_for(count: u64, ttl_secs: i64, policy: ThrottlePolicy) -> ThrottleDecision {
    let max = u64::from(policy.max_attempts);
    if count > max {
        let retry_after = u64::try_from(ttl_secs)
            .ok()
            .filter(|secs| *secs > 0)
            .map_or(policy.window, Duration::from_secs);
        return ThrottleDecision::Limited { retry_after };
    }
    let remaining = u32::try_from(max - count).unwrap_or(u32::MAX);
    ThrottleDecision::Allowed { remaining }
}

#[async_trait]
impl AttemptThrottle for RedisAttemptThrottle {
    async fn register_attempt(
        &self,
        client: &str,
    ) -> Result<ThrottleDecision, AttemptThrottleError> {
        let key = counter_key(client);
        let mut conn = self.pool.get().await.map_err(backend_error)?;

        let (count, mut ttl_secs): (u64, i64) = redis::pipe()
            .atomic()
            .incr(&key, 1_u64)
            .ttl(&key)
            .query_async(&mut *conn)
            .await
            .map_err(backend_error)?;
        if let Some(window_secs) = missing_expiry(ttl_secs, self.window_secs()) {
            let () = conn
                .expire(&key, window_secs)
                .await
                .map_err(backend_error)?;
            ttl_secs = window_secs;
        }
        debug!(count, ttl_secs, "verification attempt counted");
        Ok(decision_for(count, ttl_secs, self.policy))
    }
}
