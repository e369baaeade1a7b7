//! PostgreSQL adapters for the survey ports, built on Diesel.
//!
//! Row structs (`models.rs`) and table definitions (`schema.rs`) stay private
//! to this module; adapters translate them into domain types and map Diesel
//! failures into port errors.
//!
//! ```ignore
//! use survey_backend::outbound::persistence::{DbPool, DieselSurveyRepository, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/survey")).await?;
//! let surveys = DieselSurveyRepository::new(pool.clone());
//! ```

mod diesel_aggregate_cache_repository;
mod diesel_answer_aggregation_source;
mod diesel_data_reset_repository;
mod diesel_error_mapping;
mod diesel_submission_repository;
mod diesel_submission_stats_query;
mod diesel_survey_repository;
mod models;
mod pool;
mod schema;

pub use diesel_aggregate_cache_repository::DieselAggregateCacheRepository;
pub use diesel_answer_aggregation_source::DieselAnswerAggregationSource;
pub use diesel_data_reset_repository::DieselDataResetRepository;
pub use diesel_submission_repository::DieselSubmissionRepository;
pub use diesel_submission_stats_query::DieselSubmissionStatsQuery;
pub use diesel_survey_repository::DieselSurveyRepository;
pub use pool::{DbPool, PoolConfig, PoolError};
