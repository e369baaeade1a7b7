//! Port for grouped answer reads feeding the aggregation fold.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{AggregationFilter, AnswerGroup, SizeBand};

use super::define_port_error;

define_port_error! {
    /// Errors raised while reading raw answers.
    pub enum AnswerAggregationSourceError {
        /// Source connection could not be established.
        Connection { message: String } => "answer source connection failed: {message}",
        /// Query failed during execution.
        Query { message: String } => "answer source query failed: {message}",
    }
}

/// Grouped view over raw answers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnswerAggregationSource: Send + Sync {
    /// Answers to `question_id` from submissions matching `filter`, grouped
    /// by their stored representation.
    async fn answer_groups(
        &self,
        question_id: Uuid,
        filter: &AggregationFilter,
    ) -> Result<Vec<AnswerGroup>, AnswerAggregationSourceError>;

    /// Size bands that occur among a survey's submissions, sorted.
    async fn distinct_size_bands(
        &self,
        survey_id: Uuid,
    ) -> Result<Vec<SizeBand>, AnswerAggregationSourceError>;
}
