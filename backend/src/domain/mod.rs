//! Domain primitives, algorithms, and services for the quarterly survey.
//!
//! Purpose: model survey definitions and answers, decide what a respondent
//! sees, aggregate answers into distributions, and release statistics only
//! when enough respondents contributed. Storage and dispatch live behind the
//! traits in [`ports`].
//!
//! Public surface:
//! - `Error` / `ErrorCode`: transport-agnostic failure payload.
//! - Survey model: `Sector`, `SurveyPeriod`, `SizeBand`, `SurveyDefinition`.
//! - `evaluate`: branching rule evaluation.
//! - `KAnonymityGuard`: minimum-response suppression.
//! - Services: `SubmissionService`, `AggregationService`,
//!   `VerificationService`, `ReportingService`, `DataResetService`.

pub mod aggregation;
pub mod answer;
pub mod branching;
pub mod data_reset;
pub mod error;
pub mod k_anonymity;
pub mod ports;
pub mod receipt;
pub mod reporting;
pub mod submission;
pub mod survey;
pub mod verification;

#[cfg(test)]
pub(crate) mod fixtures;

pub use self::aggregation::{
    AggregateCacheEntry, AggregateCacheKey, Aggregation, AggregationFilter, AggregationService,
    AnswerGroup, CacheDimensions, DimensionTuple, KeyScheme, RebuildReport, RefreshReport,
    RefreshRequest, fold_answer_groups, slugify_question_text,
};
pub use self::answer::{
    AnswerSet, AnswerValidationError, AnswerValue, StoredAnswer, SubmittedAnswer, validate_answer,
};
pub use self::branching::{
    BranchingResult, BranchingRule, Condition, ConditionOperator, RuleAction, evaluate,
    is_question_visible, is_section_visible,
};
pub use self::data_reset::{DataResetRequest, DataResetService, RESET_CONFIRMATION_PHRASE};
pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::k_anonymity::{
    DEFAULT_K_THRESHOLD, DefaultKAnonymityEnv, K_ANONYMITY_THRESHOLD_ENV, KAnonResult,
    KAnonymityEnv, KAnonymityGuard, SUPPRESSION_MESSAGE,
};
pub use self::receipt::{
    ReceiptCode, hash_receipt_code, normalise_receipt_code, verify_receipt_code,
};
pub use self::reporting::{GuardedDistribution, MAX_RECENT_DISTRIBUTIONS, ReportingService};
pub use self::submission::{SubmissionPayload, SubmissionReceipt, SubmissionService};
pub use self::survey::{
    Pillar, Question, QuestionMetadata, QuestionOption, QuestionType, Sector, SizeBand, Survey,
    SurveyDefinition, SurveyPeriod, SurveySection, SurveyValidationError,
};
pub use self::verification::{
    QuestionResult, TOO_MANY_ATTEMPTS_MESSAGE, VERIFY_FAILED_MESSAGE, VerificationReport,
    VerificationService,
};

/// Convenient domain result alias.
///
/// # Examples
/// ```
/// use survey_backend::domain::{DomainResult, Error};
///
/// fn lookup() -> DomainResult<()> {
///     Err(Error::not_found("survey"))
/// }
/// assert!(lookup().is_err());
/// ```
pub type DomainResult<T> = Result<T, Error>;
