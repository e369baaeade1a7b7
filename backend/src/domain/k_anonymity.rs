//! Minimum-response suppression for every statistic shown to a reader.
//!
//! The guard sees only a payload and its contributing response count. Any
//! read path that surfaces respondent-derived data must route through
//! [`KAnonymityGuard::check`].

use serde::Serialize;

/// Environment variable holding the minimum response count.
pub const K_ANONYMITY_THRESHOLD_ENV: &str = "K_ANONYMITY_THRESHOLD";

/// Threshold used when the environment value is missing or invalid.
pub const DEFAULT_K_THRESHOLD: u64 = 5;

/// Message attached to every suppressed result.
pub const SUPPRESSION_MESSAGE: &str = "Insufficient responses to preserve anonymity.";

/// Environment abstraction for threshold lookups.
///
/// Lets tests supply values without mutating the process environment.
pub trait KAnonymityEnv: Send + Sync {
    /// Fetch a string value by name.
    fn string(&self, name: &str) -> Option<String>;
}

/// Environment access backed by the real process environment.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultKAnonymityEnv;

impl KAnonymityEnv for DefaultKAnonymityEnv {
    fn string(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Guarded view of a statistic.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KAnonResult<T> {
    /// Payload, or `None` when suppressed.
    pub data: Option<T>,
    pub suppressed: bool,
    pub response_count: u64,
    pub message: Option<&'static str>,
}

impl<T> KAnonResult<T> {
    /// Apply `f` to the payload if it was released.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> KAnonResult<U> {
        KAnonResult {
            data: self.data.map(f),
            suppressed: self.suppressed,
            response_count: self.response_count,
            message: self.message,
        }
    }
}

/// Applies the minimum-response policy.
///
/// The threshold is re-read on every check so a configuration change takes
/// effect on the next read.
///
/// # Examples
/// ```
/// use survey_backend::domain::KAnonymityGuard;
///
/// let guard = KAnonymityGuard::new();
/// let released = guard.check("payload", 50);
/// assert!(!released.suppressed);
/// assert_eq!(released.data, Some("payload"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct KAnonymityGuard<E = DefaultKAnonymityEnv> {
    env: E,
}

impl KAnonymityGuard {
    /// Guard reading the threshold from the process environment.
    pub fn new() -> Self {
        Self {
            env: DefaultKAnonymityEnv,
        }
    }
}

impl<E: KAnonymityEnv> KAnonymityGuard<E> {
    /// Build a guard reading the threshold from `env`.
    pub fn with_env(env: E) -> Self {
        Self { env }
    }

    /// Current threshold: a positive integer, otherwise the default.
    pub fn threshold(&self) -> u64 {
        self.env
            .string(K_ANONYMITY_THRESHOLD_ENV)
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_K_THRESHOLD)
    }

    /// Release `data` only when `response_count` reaches the threshold.
    pub fn check<T>(&self, data: T, response_count: u64) -> KAnonResult<T> {
        if response_count < self.threshold() {
            return KAnonResult {
                data: None,
                suppressed: true,
                response_count,
                message: Some(SUPPRESSION_MESSAGE),
            };
        }
        KAnonResult {
            data: Some(data),
            suppressed: false,
            response_count,
            message: None,
        }
    }
}
