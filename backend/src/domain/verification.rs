//! Respondent verification by receipt code.
//!
//! A respondent who kept their receipt code can look up the sector-wide
//! results for the survey they answered. Every failure after throttling
//! reads the same so the endpoint cannot be used to probe which codes exist.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use super::aggregation::map_survey_error;
use super::ports::{
    AggregateCacheRepository, AnswerAggregationSource, AttemptThrottle, AttemptThrottleError,
    CacheRefreshMetrics, SubmissionRepository, SubmissionRepositoryError, SurveyRepository,
    ThrottleDecision, port_failure,
};
use super::{
    AggregationService, DefaultKAnonymityEnv, DimensionTuple, Error, KAnonResult, KAnonymityEnv,
    KAnonymityGuard, Pillar, QuestionType, Sector, SurveyPeriod, hash_receipt_code,
    normalise_receipt_code,
};

/// Message for every unknown, malformed, or orphaned code.
pub const VERIFY_FAILED_MESSAGE: &str = "Unable to verify code. Please check and try again.";
/// Message once a client exhausts its attempt budget.
pub const TOO_MANY_ATTEMPTS_MESSAGE: &str =
    "Too many attempts. Please wait 15 minutes before trying again.";

/// Guarded result for one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResult {
    pub question_id: Uuid,
    pub question_text: String,
    pub question_type: QuestionType,
    pub section_title: String,
    pub pillar: Pillar,
    #[serde(flatten)]
    pub result: KAnonResult<BTreeMap<String, f64>>,
}

/// Sector-wide results for the survey a receipt belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub sector: Sector,
    pub period: SurveyPeriod,
    pub results: Vec<QuestionResult>,
}

fn map_throttle_error(error: AttemptThrottleError) -> Error {
    port_failure("attempt throttle", &error)
}

fn map_submission_error(error: SubmissionRepositoryError) -> Error {
    port_failure("submission repository", &error)
}

/// Resolves receipt codes to guarded survey results.
pub struct VerificationService<T, R, S, A, C, M, E = DefaultKAnonymityEnv> {
    throttle: Arc<T>,
    submissions: Arc<R>,
    surveys: Arc<S>,
    aggregation: AggregationService<S, A, C, M>,
    guard: KAnonymityGuard<E>,
}

impl<T, R, S, A, C, M, E> VerificationService<T, R, S, A, C, M, E> {
    pub fn new(
        throttle: Arc<T>,
        submissions: Arc<R>,
        surveys: Arc<S>,
        aggregation: AggregationService<S, A, C, M>,
        guard: KAnonymityGuard<E>,
    ) -> Self {
        Self {
            throttle,
            submissions,
            surveys,
            aggregation,
            guard,
        }
    }
}

impl<T, R, S, A, C, M, E> VerificationService<T, R, S, A, C, M, E>
where
    T: AttemptThrottle,
    R: SubmissionRepository,
    S: SurveyRepository,
    A: AnswerAggregationSource,
    C: AggregateCacheRepository,
    M: CacheRefreshMetrics,
    E: KAnonymityEnv,
{
    /// Verify `code` on behalf of `client` and return the survey results.
    ///
    /// `client` is an opaque token identifying the caller for throttling,
    /// such as a forwarded address. It is never logged.
    pub async fn verify(&self, client: &str, code: &str) -> Result<VerificationReport, Error> {
        match self
            .throttle
            .register_attempt(client)
            .await
            .map_err(map_throttle_error)?
        {
            ThrottleDecision::Allowed { remaining } => {
                debug!(remaining, "verification attempt allowed");
            }
            ThrottleDecision::Limited { retry_after } => {
                warn!(retry_after_secs = retry_after.as_secs(), "verification throttled");
                return Err(Error::too_many_requests(TOO_MANY_ATTEMPTS_MESSAGE)
                    .with_details(json!({ "retryAfterSecs": retry_after.as_secs() })));
            }
        }

        if normalise_receipt_code(code).is_empty() {
            return Err(Error::invalid_request("receipt code is required"));
        }

        let submission = self
            .submissions
            .find_by_receipt_hash(&hash_receipt_code(code))
            .await
            .map_err(map_submission_error)?
            .ok_or_else(|| Error::not_found(VERIFY_FAILED_MESSAGE))?;
        let definition = self
            .surveys
            .find_definition(submission.survey_id)
            .await
            .map_err(map_survey_error)?
            .ok_or_else(|| Error::not_found(VERIFY_FAILED_MESSAGE))?;

        let mut results = Vec::new();
        for section in definition.sections() {
            for question in &section.questions {
                let tuple = DimensionTuple {
                    period: submission.period,
                    sector: submission.sector,
                    question_id: question.id,
                    size_band: None,
                };
                let aggregation = self
                    .aggregation
                    .cached_or_computed(submission.survey_id, &tuple)
                    .await?;
                results.push(QuestionResult {
                    question_id: question.id,
                    question_text: question.text.clone(),
                    question_type: question.question_type,
                    section_title: section.title.clone(),
                    pillar: section.pillar,
                    result: self
                        .guard
                        .check(aggregation.result, aggregation.response_count),
                });
            }
        }

        Ok(VerificationReport {
            sector: submission.sector,
            period: submission.period,
            results,
        })
    }
}

#[cfg(test)]
#[path = "verification_tests.rs"]
mod tests;
