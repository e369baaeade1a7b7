//! Runtime settings loaded via OrthoConfig.
//!
//! Values come from `SURVEY_*` environment variables (and any configuration
//! file OrthoConfig discovers). The k-anonymity threshold is not part of
//! these settings; it is read on every check through `KAnonymityEnv`.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;

use crate::domain::ports::ThrottlePolicy;
use crate::outbound::persistence::PoolConfig;

const DATABASE_URL_FALLBACK_VAR: &str = "DATABASE_URL";
const DEFAULT_POOL_MAX_SIZE: u32 = 10;
const DEFAULT_REFRESH_CONCURRENCY: usize = 4;
const DEFAULT_VERIFY_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_VERIFY_WINDOW_SECS: u64 = 15 * 60;
/// Longest verification window accepted; larger values are capped.
pub const MAX_VERIFY_WINDOW_SECS: u64 = 7 * 24 * 60 * 60;

/// Configuration shared by the survey binaries.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "SURVEY")]
pub struct SurveySettings {
    /// PostgreSQL connection string.
    pub database_url: Option<String>,
    /// Redis connection string. Without one, verification attempts are
    /// counted in-process.
    pub redis_url: Option<String>,
    #[ortho_config(default = 10)]
    pub pool_max_size: u32,
    /// Verification attempts allowed per client within one window.
    #[ortho_config(default = 5)]
    pub verify_max_attempts: u32,
    #[ortho_config(default = 900)]
    pub verify_window_secs: u64,
    /// Cache refreshes allowed to run at once.
    #[ortho_config(default = 4)]
    pub refresh_concurrency: usize,
}

impl Default for SurveySettings {
    fn default() -> Self {
        Self {
            database_url: None,
            redis_url: None,
            pool_max_size: DEFAULT_POOL_MAX_SIZE,
            verify_max_attempts: DEFAULT_VERIFY_MAX_ATTEMPTS,
            verify_window_secs: DEFAULT_VERIFY_WINDOW_SECS,
            refresh_concurrency: DEFAULT_REFRESH_CONCURRENCY,
        }
    }
}

impl SurveySettings {
    /// Configured database URL, falling back to `DATABASE_URL`.
    pub fn database_url(&self) -> Option<String> {
        self.database_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| {
                std::env::var(DATABASE_URL_FALLBACK_VAR)
                    .ok()
                    .filter(|url| !url.trim().is_empty())
            })
    }

    pub fn redis_url(&self) -> Option<&str> {
        self.redis_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
    }

    pub fn pool_max_size(&self) -> u32 {
        if self.pool_max_size == 0 {
            DEFAULT_POOL_MAX_SIZE
        } else {
            self.pool_max_size
        }
    }

    pub fn refresh_concurrency(&self) -> usize {
        if self.refresh_concurrency == 0 {
            DEFAULT_REFRESH_CONCURRENCY
        } else {
            self.refresh_concurrency
        }
    }

    /// Verification throttle policy. A zero window keeps the default and
    /// the window is capped at [`MAX_VERIFY_WINDOW_SECS`].
    pub fn throttle_policy(&self) -> ThrottlePolicy {
        let window_secs = match self.verify_window_secs {
            0 => DEFAULT_VERIFY_WINDOW_SECS,
            secs => secs.min(MAX_VERIFY_WINDOW_SECS),
        };
        ThrottlePolicy {
            max_attempts: self.verify_max_attempts,
            window: Duration::from_secs(window_secs),
        }
    }

    /// Pool configuration for `database_url`.
    pub fn pool_config(&self, database_url: impl Into<String>) -> PoolConfig {
        PoolConfig::new(database_url).with_max_size(self.pool_max_size())
    }
}

#[cfg(test)]
mod tests {
    //! Settings parsing against a locked process environment.

    use std::ffi::OsString;

    use env_lock::lock_env;
    use rstest::rstest;

    use super::*;

    const VARS: [&str; 7] = [
        "SURVEY_DATABASE_URL",
        "SURVEY_REDIS_URL",
        "SURVEY_POOL_MAX_SIZE",
        "SURVEY_VERIFY_MAX_ATTEMPTS",
        "SURVEY_VERIFY_WINDOW_SECS",
        "SURVEY_REFRESH_CONCURRENCY",
        "DATABASE_URL",
    ];

    fn load() -> SurveySettings {
        SurveySettings::load_from_iter([OsString::from("survey-admin")])
            .expect("settings should load")
    }

    fn cleared_except(set: &[(&'static str, &str)]) -> Vec<(&'static str, Option<String>)> {
        VARS.iter()
            .map(|name| {
                let value = set
                    .iter()
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| (*value).to_owned());
                (*name, value)
            })
            .collect()
    }

    #[rstest]
    fn defaults_apply_when_nothing_is_set() {
        let _guard = lock_env(cleared_except(&[]));

        let settings = load();
        assert_eq!(settings.database_url(), None);
        assert_eq!(settings.redis_url(), None);
        assert_eq!(settings.pool_max_size(), DEFAULT_POOL_MAX_SIZE);
        assert_eq!(settings.refresh_concurrency(), DEFAULT_REFRESH_CONCURRENCY);
        assert_eq!(settings.throttle_policy(), ThrottlePolicy::default());
    }

    #[rstest]
    fn environment_overrides_are_respected() {
        let _guard = lock_env(cleared_except(&[
            ("SURVEY_DATABASE_URL", "postgres://db/survey"),
            ("SURVEY_REDIS_URL", "redis://cache:6379"),
            ("SURVEY_POOL_MAX_SIZE", "3"),
            ("SURVEY_VERIFY_MAX_ATTEMPTS", "2"),
            ("SURVEY_VERIFY_WINDOW_SECS", "60"),
            ("SURVEY_REFRESH_CONCURRENCY", "8"),
        ]));

        let settings = load();
        assert_eq!(settings.database_url().as_deref(), Some("postgres://db/survey"));
        assert_eq!(settings.redis_url(), Some("redis://cache:6379"));
        assert_eq!(settings.pool_config("postgres://db/survey").max_size(), 3);
        assert_eq!(settings.refresh_concurrency(), 8);
        assert_eq!(
            settings.throttle_policy(),
            ThrottlePolicy {
                max_attempts: 2,
                window: Duration::from_secs(60),
            }
        );
    }

    #[rstest]
    fn database_url_falls_back_to_the_conventional_variable() {
        let _guard = lock_env(cleared_except(&[("DATABASE_URL", "postgres://fallback/db")]));

        assert_eq!(load().database_url().as_deref(), Some("postgres://fallback/db"));
    }

    #[rstest]
    fn only_the_fallback_url_is_needed_to_load() {
        let _guard = lock_env(cleared_except(&[("DATABASE_URL", "postgres://x/db")]));

        let settings = SurveySettings::load_from_iter([OsString::from("survey-admin")])
            .expect("settings load without any SURVEY_ variable");
        assert_eq!(settings.database_url().as_deref(), Some("postgres://x/db"));
        assert_eq!(settings.pool_max_size(), DEFAULT_POOL_MAX_SIZE);
        assert_eq!(settings.refresh_concurrency(), DEFAULT_REFRESH_CONCURRENCY);
    }

    #[rstest]
    fn loaded_defaults_match_the_struct_default() {
        let _guard = lock_env(cleared_except(&[]));

        let loaded = load();
        let fallback = SurveySettings::default();
        assert_eq!(loaded.pool_max_size, fallback.pool_max_size);
        assert_eq!(loaded.verify_max_attempts, fallback.verify_max_attempts);
        assert_eq!(loaded.verify_window_secs, fallback.verify_window_secs);
        assert_eq!(loaded.refresh_concurrency, fallback.refresh_concurrency);
    }

    #[rstest]
    fn zero_refresh_concurrency_uses_the_default() {
        let settings = SurveySettings {
            refresh_concurrency: 0,
            ..SurveySettings::default()
        };
        assert_eq!(settings.refresh_concurrency(), DEFAULT_REFRESH_CONCURRENCY);
    }

    #[rstest]
    #[case(0, DEFAULT_VERIFY_WINDOW_SECS)]
    #[case(60, 60)]
    #[case(u64::MAX, MAX_VERIFY_WINDOW_SECS)]
    fn verification_window_is_bounded(#[case] configured: u64, #[case] expected: u64) {
        let settings = SurveySettings {
            verify_window_secs: configured,
            ..SurveySettings::default()
        };
        assert_eq!(
            settings.throttle_policy().window,
            Duration::from_secs(expected)
        );
    }
}
