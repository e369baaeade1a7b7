//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub use macros::PortError;
pub(crate) use macros::{define_port_error, port_failure};

mod aggregate_cache_repository;
mod answer_aggregation_source;
mod attempt_throttle;
mod cache_refresh_metrics;
mod cache_refresh_queue;
mod data_reset_repository;
mod submission_repository;
mod submission_stats_query;
mod survey_repository;

#[cfg(test)]
pub use aggregate_cache_repository::MockAggregateCacheRepository;
pub use aggregate_cache_repository::{AggregateCacheRepository, AggregateCacheRepositoryError};
#[cfg(test)]
pub use answer_aggregation_source::MockAnswerAggregationSource;
pub use answer_aggregation_source::{AnswerAggregationSource, AnswerAggregationSourceError};
#[cfg(test)]
pub use attempt_throttle::MockAttemptThrottle;
pub use attempt_throttle::{
    AttemptThrottle, AttemptThrottleError, ThrottleDecision, ThrottlePolicy,
};
#[cfg(test)]
pub use cache_refresh_metrics::MockCacheRefreshMetrics;
pub use cache_refresh_metrics::{
    CacheRefreshMetrics, CacheRefreshMetricsError, NoOpCacheRefreshMetrics, RefreshScope,
};
#[cfg(test)]
pub use cache_refresh_queue::MockCacheRefreshQueue;
pub use cache_refresh_queue::{CacheRefreshQueue, CacheRefreshQueueError};
#[cfg(test)]
pub use data_reset_repository::MockDataResetRepository;
pub use data_reset_repository::{
    DataResetAudit, DataResetRepository, DataResetRepositoryError, DeletedCounts,
};
#[cfg(test)]
pub use submission_repository::MockSubmissionRepository;
pub use submission_repository::{
    NewSubmission, SubmissionRecord, SubmissionRepository, SubmissionRepositoryError,
};
#[cfg(test)]
pub use submission_stats_query::MockSubmissionStatsQuery;
pub use submission_stats_query::{
    PeriodCount, SubmissionCountFilter, SubmissionCounts, SubmissionStatsQuery,
    SubmissionStatsQueryError,
};
#[cfg(test)]
pub use survey_repository::MockSurveyRepository;
pub use survey_repository::{SurveyRepository, SurveyRepositoryError};
