//! Builders assembling the survey services over the PostgreSQL adapters.
//!
//! Each builder takes a shared [`DbPool`]; the verification throttle is
//! chosen from [`SurveySettings`]: Redis when a URL is configured, otherwise
//! an in-process counter.

use std::sync::Arc;

use async_trait::async_trait;
use mockable::{Clock, DefaultClock};
use tracing::info;

use crate::domain::ports::{
    AttemptThrottle, AttemptThrottleError, NoOpCacheRefreshMetrics, ThrottleDecision,
};
use crate::domain::{
    AggregationService, DataResetService, KAnonymityGuard, ReportingService, SubmissionService,
    VerificationService,
};
use crate::outbound::cache::{InMemoryAttemptThrottle, RedisAttemptThrottle, RedisThrottleError};
use crate::outbound::persistence::{
    DbPool, DieselAggregateCacheRepository, DieselAnswerAggregationSource,
    DieselDataResetRepository, DieselSubmissionRepository, DieselSubmissionStatsQuery,
    DieselSurveyRepository,
};
use crate::outbound::queue::TokioCacheRefreshQueue;
use crate::settings::SurveySettings;

/// Aggregation service over the PostgreSQL adapters.
pub type PgAggregationService = AggregationService<
    DieselSurveyRepository,
    DieselAnswerAggregationSource,
    DieselAggregateCacheRepository,
    NoOpCacheRefreshMetrics,
>;

/// Background refresh queue driving [`PgAggregationService`].
pub type PgRefreshQueue = TokioCacheRefreshQueue<
    DieselSurveyRepository,
    DieselAnswerAggregationSource,
    DieselAggregateCacheRepository,
    NoOpCacheRefreshMetrics,
>;

pub type PgSubmissionService =
    SubmissionService<DieselSurveyRepository, DieselSubmissionRepository, PgRefreshQueue>;

pub type PgReportingService = ReportingService<DieselAggregateCacheRepository, DieselSubmissionStatsQuery>;

pub type PgVerificationService = VerificationService<
    ConfiguredThrottle,
    DieselSubmissionRepository,
    DieselSurveyRepository,
    DieselAnswerAggregationSource,
    DieselAggregateCacheRepository,
    NoOpCacheRefreshMetrics,
>;

/// Attempt throttle selected at start-up.
pub enum ConfiguredThrottle {
    /// Counters shared across processes.
    Redis(RedisAttemptThrottle),
    /// Counters local to this process.
    InMemory(InMemoryAttemptThrottle),
}

impl ConfiguredThrottle {
    /// Connect to Redis when `settings` names a URL, else count in-process.
    ///
    /// # Errors
    ///
    /// Fails when the Redis URL is invalid or the pool cannot be built.
    pub async fn from_settings(
        settings: &SurveySettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RedisThrottleError> {
        let policy = settings.throttle_policy();
        match settings.redis_url() {
            Some(url) => {
                let throttle = RedisAttemptThrottle::connect(url, policy).await?;
                info!(max_attempts = policy.max_attempts, "verification throttle: redis");
                Ok(Self::Redis(throttle))
            }
            None => {
                info!(max_attempts = policy.max_attempts, "verification throttle: in-process");
                Ok(Self::InMemory(InMemoryAttemptThrottle::new(policy, clock)))
            }
        }
    }
}

#[async_trait]
impl AttemptThrottle for ConfiguredThrottle {
    async fn register_attempt(
        &self,
        client: &str,
    ) -> Result<ThrottleDecision, AttemptThrottleError> {
        match self {
            Self::Redis(throttle) => throttle.register_attempt(client).await,
            Self::InMemory(throttle) => throttle.register_attempt(client).await,
        }
    }
}

pub fn aggregation_service(pool: &DbPool) -> PgAggregationService {
    AggregationService::new(
        Arc::new(DieselSurveyRepository::new(pool.clone())),
        Arc::new(DieselAnswerAggregationSource::new(pool.clone())),
        Arc::new(DieselAggregateCacheRepository::new(pool.clone())),
        Arc::new(NoOpCacheRefreshMetrics),
        Arc::new(DefaultClock),
    )
}

/// Submission intake whose cache refreshes run on the current Tokio
/// runtime, at most `refresh_concurrency` at a time.
pub fn submission_service(settings: &SurveySettings, pool: &DbPool) -> PgSubmissionService {
    let queue = TokioCacheRefreshQueue::new(
        Arc::new(aggregation_service(pool)),
        settings.refresh_concurrency(),
    );
    SubmissionService::new(
        Arc::new(DieselSurveyRepository::new(pool.clone())),
        Arc::new(DieselSubmissionRepository::new(pool.clone())),
        Arc::new(queue),
    )
}

pub fn reporting_service(pool: &DbPool) -> PgReportingService {
    ReportingService::new(
        Arc::new(DieselAggregateCacheRepository::new(pool.clone())),
        Arc::new(DieselSubmissionStatsQuery::new(pool.clone())),
        KAnonymityGuard::new(),
    )
}

pub fn data_reset_service(pool: &DbPool) -> DataResetService<DieselDataResetRepository> {
    DataResetService::new(Arc::new(DieselDataResetRepository::new(pool.clone())))
}

/// Receipt verification with the throttle chosen from `settings`.
///
/// # Errors
///
/// Fails when a configured Redis throttle cannot be set up.
pub async fn verification_service(
    settings: &SurveySettings,
    pool: &DbPool,
) -> Result<PgVerificationService, RedisThrottleError> {
    let throttle = ConfiguredThrottle::from_settings(settings, Arc::new(DefaultClock)).await?;
    Ok(VerificationService::new(
        Arc::new(throttle),
        Arc::new(DieselSubmissionRepository::new(pool.clone())),
        Arc::new(DieselSurveyRepository::new(pool.clone())),
        aggregation_service(pool),
        KAnonymityGuard::new(),
    ))
}
