//! Submission ingestion.
//!
//! A completed questionnaire is checked against its survey definition,
//! stored atomically with a hashed receipt code, and then handed to the
//! background cache refresh. The refresh never blocks or fails the
//! submission.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::aggregation::map_survey_error;
use super::branching::evaluate;
use super::ports::{
    CacheRefreshQueue, NewSubmission, SubmissionRepository, SubmissionRepositoryError,
    SurveyRepository, port_failure,
};
use super::{
    AnswerSet, Error, ReceiptCode, RefreshRequest, Sector, SizeBand, SubmittedAnswer,
    SurveyDefinition, validate_answer,
};

/// Fresh codes tried before a receipt collision is reported.
const RECEIPT_ATTEMPTS: usize = 3;

/// A respondent's completed questionnaire.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionPayload {
    pub survey_id: Uuid,
    pub sector: Sector,
    pub size_band: SizeBand,
    pub answers: AnswerSet,
}

/// What the respondent gets back. The receipt code is shown once.
#[derive(Debug, Clone)]
pub struct SubmissionReceipt {
    pub submission_id: Uuid,
    pub receipt_code: ReceiptCode,
    pub submitted_at: DateTime<Utc>,
}

fn map_submission_error(error: SubmissionRepositoryError) -> Error {
    match error {
        SubmissionRepositoryError::SurveyUnavailable { survey_id } => {
            Error::not_found(format!("survey {survey_id} is not accepting submissions"))
        }
        SubmissionRepositoryError::DuplicateReceipt => {
            Error::conflict("could not allocate a unique receipt code")
        }
        other => port_failure("submission repository", &other),
    }
}

/// Accepts submissions and issues receipt codes.
#[derive(Clone)]
pub struct SubmissionService<S, R, Q> {
    surveys: Arc<S>,
    submissions: Arc<R>,
    refresh_queue: Arc<Q>,
}

impl<S, R, Q> SubmissionService<S, R, Q> {
    pub fn new(surveys: Arc<S>, submissions: Arc<R>, refresh_queue: Arc<Q>) -> Self {
        Self {
            surveys,
            submissions,
            refresh_queue,
        }
    }
}

impl<S, R, Q> SubmissionService<S, R, Q>
where
    S: SurveyRepository,
    R: SubmissionRepository,
    Q: CacheRefreshQueue,
{
    /// The survey currently open for `sector`.
    pub async fn active_survey(&self, sector: Sector) -> Result<SurveyDefinition, Error> {
        self.surveys
            .active_survey_for_sector(sector)
            .await
            .map_err(map_survey_error)?
            .ok_or_else(|| Error::not_found(format!("no active survey for {}", sector.label())))
    }

    /// Validate, store, and acknowledge one submission.
    pub async fn submit(&self, payload: SubmissionPayload) -> Result<SubmissionReceipt, Error> {
        let definition = self
            .surveys
            .find_definition(payload.survey_id)
            .await
            .map_err(map_survey_error)?
            .filter(|definition| definition.survey().is_active)
            .ok_or_else(|| {
                Error::not_found(format!("survey {} is not accepting submissions", payload.survey_id))
            })?;
        let survey = definition.survey();
        if survey.sector != payload.sector {
            return Err(Error::invalid_request("sector does not match the survey")
                .with_details(json!({ "expected": survey.sector, "actual": payload.sector })));
        }

        let answers = visible_answers(&definition, &payload.answers)?;
        let mut submission = NewSubmission {
            id: Uuid::new_v4(),
            survey_id: survey.id,
            sector: survey.sector,
            period: survey.period,
            size_band: payload.size_band.clone(),
            answers,
            receipt_hash: String::new(),
        };

        let mut attempt = 0;
        let (record, receipt_code) = loop {
            attempt += 1;
            let code = ReceiptCode::generate(survey.period);
            submission.receipt_hash = code.hash();
            match self.submissions.record(&submission).await {
                Ok(record) => break (record, code),
                Err(SubmissionRepositoryError::DuplicateReceipt) if attempt < RECEIPT_ATTEMPTS => {
                    warn!(survey_id = %survey.id, attempt, "receipt code collision, retrying");
                }
                Err(error) => return Err(map_submission_error(error)),
            }
        };
        info!(
            survey_id = %record.survey_id,
            submission_id = %record.id,
            size_band = %record.size_band,
            answers = submission.answers.len(),
            "submission recorded"
        );

        let request = RefreshRequest {
            survey_id: record.survey_id,
            sector: record.sector,
            period: record.period,
            size_band: record.size_band.clone(),
        };
        if let Err(error) = self.refresh_queue.enqueue(request).await {
            warn!(
                survey_id = %record.survey_id,
                submission_id = %record.id,
                error = %error,
                "cache refresh not queued"
            );
        }

        Ok(SubmissionReceipt {
            submission_id: record.id,
            receipt_code,
            submitted_at: record.submitted_at,
        })
    }
}

/// Answers to visible questions in survey order, after validation.
fn visible_answers(
    definition: &SurveyDefinition,
    answers: &AnswerSet,
) -> Result<Vec<SubmittedAnswer>, Error> {
    if let Some(unknown) = answers
        .keys()
        .find(|question_id| definition.question(**question_id).is_none())
    {
        return Err(Error::invalid_request("answer refers to an unknown question")
            .with_details(json!({ "questionId": unknown })));
    }

    let branching = evaluate(definition.rules(), answers);
    let mut kept = Vec::new();
    for question in definition.visible_questions(&branching) {
        match answers.get(&question.id) {
            Some(value) => {
                validate_answer(question, value).map_err(|reason| {
                    Error::invalid_request(format!("invalid answer: {reason}"))
                        .with_details(json!({ "questionId": question.id }))
                })?;
                kept.push(SubmittedAnswer {
                    question_id: question.id,
                    value: value.clone(),
                });
            }
            None if question.is_required => {
                return Err(Error::invalid_request("a required question is unanswered")
                    .with_details(json!({ "questionId": question.id })));
            }
            None => {}
        }
    }
    Ok(kept)
}

#[cfg(test)]
#[path = "submission_tests.rs"]
mod tests;
