//! Attempt counter stores for receipt verification throttling.
//!
//! [`InMemoryAttemptThrottle`] suits a single process. Deployments running
//! several processes share counters through [`RedisAttemptThrottle`].

mod in_memory_throttle;
mod redis_throttle;

pub use in_memory_throttle::InMemoryAttemptThrottle;
pub use redis_throttle::{RedisAttemptThrottle, RedisThrottleError};
