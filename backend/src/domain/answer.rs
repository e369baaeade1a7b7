//! Respondent answer values.
//!
//! An answer is a string, a list of strings, or a percentage mapping. The
//! persisted form keeps scalars and complex values in separate columns and
//! never populates both.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::survey::{Question, QuestionType};

/// Tolerance used when checking that a split totals one hundred.
const SPLIT_TOTAL_TOLERANCE: f64 = 1e-6;

/// Answers keyed by question id.
pub type AnswerSet = BTreeMap<Uuid, AnswerValue>;

/// Respondent-supplied value for one question.
///
/// Serialises untagged: a JSON string, array of strings, or object of
/// numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    /// Single choice, band, or free text.
    Text(String),
    /// Multi-choice selections.
    Choices(Vec<String>),
    /// Percentage split keyed by option value.
    Split(BTreeMap<String, f64>),
}

impl AnswerValue {
    /// Convert into the persisted column pair.
    pub fn to_stored(&self) -> StoredAnswer {
        match self {
            Self::Text(value) => StoredAnswer::Scalar(value.clone()),
            Self::Choices(values) => StoredAnswer::Complex(serde_json::json!(values)),
            Self::Split(split) => StoredAnswer::Complex(serde_json::json!(split)),
        }
    }
}

/// Persisted answer representation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StoredAnswer {
    /// Stored in the `answer_value` text column.
    Scalar(String),
    /// Stored in the `answer_values` JSON column.
    Complex(serde_json::Value),
}

impl StoredAnswer {
    /// Column pair `(answer_value, answer_values)`.
    pub fn into_columns(self) -> (Option<String>, Option<serde_json::Value>) {
        match self {
            Self::Scalar(value) => (Some(value), None),
            Self::Complex(values) => (None, Some(values)),
        }
    }
}

/// A single answer attached to a submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedAnswer {
    pub question_id: Uuid,
    pub value: AnswerValue,
}

/// Reasons an answer does not fit its question.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnswerValidationError {
    #[error("answer shape does not match a {expected} question")]
    ShapeMismatch { expected: &'static str },
    #[error("free text answer must not be blank")]
    BlankText,
    #[error("value {0} is not an option of this question")]
    UnknownOption(String),
    #[error("at least one option must be selected")]
    NoSelection,
    #[error("option {0} is selected more than once")]
    RepeatedSelection(String),
    #[error("at most {max} options may be selected")]
    TooManySelections { max: u32 },
    #[error("share for {key} must be between 0 and 100")]
    ShareOutOfRange { key: String },
    #[error("shares must total 100, got {total}")]
    SplitTotal { total: f64 },
}

/// Check that `answer` is well formed for `question`.
///
/// # Examples
/// ```
/// use survey_backend::domain::{AnswerValue, Question, QuestionMetadata, QuestionOption,
///     QuestionType, validate_answer};
/// use uuid::Uuid;
///
/// let question = Question {
///     id: Uuid::new_v4(),
///     section_id: Uuid::new_v4(),
///     text: "Main metal".into(),
///     question_type: QuestionType::SingleChoice,
///     options: vec![QuestionOption { value: "gold".into(), label: "Gold".into() }],
///     is_required: true,
///     sort_order: 1,
///     metadata: QuestionMetadata::default(),
/// };
/// assert!(validate_answer(&question, &AnswerValue::Text("gold".into())).is_ok());
/// ```
pub fn validate_answer(
    question: &Question,
    answer: &AnswerValue,
) -> Result<(), AnswerValidationError> {
    match (question.question_type, answer) {
        (QuestionType::SingleChoice | QuestionType::BandSelect, AnswerValue::Text(value)) => {
            ensure_option(question, value)
        }
        (QuestionType::FreeText, AnswerValue::Text(value)) => {
            if value.trim().is_empty() {
                Err(AnswerValidationError::BlankText)
            } else {
                Ok(())
            }
        }
        (QuestionType::MultiChoice, AnswerValue::Choices(values)) => {
            validate_choices(question, values)
        }
        (QuestionType::PercentageSplit, AnswerValue::Split(split)) => {
            validate_split(question, split)
        }
        (kind, _) => Err(AnswerValidationError::ShapeMismatch {
            expected: kind.as_str(),
        }),
    }
}

fn ensure_option(question: &Question, value: &str) -> Result<(), AnswerValidationError> {
    if question.has_option(value) {
        Ok(())
    } else {
        Err(AnswerValidationError::UnknownOption(value.to_owned()))
    }
}

fn validate_choices(question: &Question, values: &[String]) -> Result<(), AnswerValidationError> {
    if values.is_empty() {
        return Err(AnswerValidationError::NoSelection);
    }
    let mut seen = std::collections::HashSet::new();
    for value in values {
        ensure_option(question, value)?;
        if !seen.insert(value.as_str()) {
            return Err(AnswerValidationError::RepeatedSelection(value.clone()));
        }
    }
    match question.metadata.max_selections {
        Some(max) if values.len() > max as usize => {
            Err(AnswerValidationError::TooManySelections { max })
        }
        _ => Ok(()),
    }
}

fn validate_split(
    question: &Question,
    split: &BTreeMap<String, f64>,
) -> Result<(), AnswerValidationError> {
    for (key, share) in split {
        ensure_option(question, key)?;
        if !share.is_finite() || !(0.0..=100.0).contains(share) {
            return Err(AnswerValidationError::ShareOutOfRange { key: key.clone() });
        }
    }
    if question.metadata.total_must_equal_100 {
        let total: f64 = split.values().sum();
        if (total - 100.0).abs() > SPLIT_TOTAL_TOLERANCE {
            return Err(AnswerValidationError::SplitTotal { total });
        }
    }
    Ok(())
}
