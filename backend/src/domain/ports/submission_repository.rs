//! Port for durable submission storage.
//!
//! A submission, its answers, and its receipt hash are written as one
//! atomic unit. Nothing here ever updates a stored submission.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Sector, SizeBand, SubmittedAnswer, SurveyPeriod};

use super::define_port_error;

define_port_error! {
    /// Errors raised by submission storage adapters.
    pub enum SubmissionRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "submission repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "submission repository query failed: {message}",
        /// The survey was missing or retired when the write ran.
        SurveyUnavailable { survey_id: uuid::Uuid } =>
            "survey {survey_id} is not accepting submissions",
        /// The receipt hash is already taken.
        DuplicateReceipt => "receipt code collision",
    }
}

/// Everything written for one completed questionnaire.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubmission {
    pub id: Uuid,
    pub survey_id: Uuid,
    pub sector: Sector,
    pub period: SurveyPeriod,
    pub size_band: SizeBand,
    pub answers: Vec<SubmittedAnswer>,
    /// SHA-256 hex digest of the receipt code.
    pub receipt_hash: String,
}

/// Stored submission dimensions. Answers are never read back individually.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRecord {
    pub id: Uuid,
    pub survey_id: Uuid,
    pub sector: Sector,
    pub period: SurveyPeriod,
    pub size_band: SizeBand,
    pub submitted_at: DateTime<Utc>,
}

/// Durable storage for submissions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    /// Atomically store the submission, its answers, and its receipt hash.
    ///
    /// Implementations must recheck that the survey is active inside the
    /// same transaction.
    async fn record(
        &self,
        submission: &NewSubmission,
    ) -> Result<SubmissionRecord, SubmissionRepositoryError>;

    /// Find the submission a receipt hash belongs to.
    async fn find_by_receipt_hash(
        &self,
        receipt_hash: &str,
    ) -> Result<Option<SubmissionRecord>, SubmissionRepositoryError>;
}
