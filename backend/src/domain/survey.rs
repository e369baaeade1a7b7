//! Survey definition model.
//!
//! A survey belongs to exactly one sector and reporting period. Its sections
//! and questions are static definition data: the aggregation pipeline only
//! ever reads them.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::branching::{BranchingResult, BranchingRule, is_question_visible, is_section_visible};

/// Maximum accepted length for a size band label.
const SIZE_BAND_MAX_LEN: usize = 64;

/// Validation errors raised while assembling survey definitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SurveyValidationError {
    /// Sector string is not one of the known sectors.
    #[error("unknown sector: {0}")]
    UnknownSector(String),
    /// Quarter must be 1 to 4.
    #[error("quarter must be between 1 and 4, got {0}")]
    QuarterOutOfRange(u8),
    /// Size band was blank.
    #[error("size band must not be empty")]
    EmptySizeBand,
    /// Size band exceeds the accepted length.
    #[error("size band must be at most {SIZE_BAND_MAX_LEN} characters")]
    SizeBandTooLong,
    /// A question lists the same option value twice.
    #[error("question {question_id} repeats option value {value}")]
    DuplicateOption { question_id: Uuid, value: String },
    /// A section references a different survey.
    #[error("section {section_id} does not belong to survey {survey_id}")]
    ForeignSection { section_id: Uuid, survey_id: Uuid },
    /// A question references a different section.
    #[error("question {question_id} does not belong to section {section_id}")]
    ForeignQuestion { question_id: Uuid, section_id: Uuid },
}

/// Industry sector a survey and its submissions belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sector {
    Manufacturers,
    Retailers,
    WholesalersImporters,
    DiamondDealers,
    Refiners,
}

impl Sector {
    /// Every sector in presentation order.
    pub const ALL: [Self; 5] = [
        Self::Manufacturers,
        Self::Retailers,
        Self::WholesalersImporters,
        Self::DiamondDealers,
        Self::Refiners,
    ];

    /// Stable storage identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manufacturers => "manufacturers",
            Self::Retailers => "retailers",
            Self::WholesalersImporters => "wholesalers_importers",
            Self::DiamondDealers => "diamond_dealers",
            Self::Refiners => "refiners",
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Manufacturers => "Manufacturers",
            Self::Retailers => "Retailers",
            Self::WholesalersImporters => "Wholesalers / Importers",
            Self::DiamondDealers => "Diamond Dealers",
            Self::Refiners => "Refiners",
        }
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sector {
    type Err = SurveyValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|sector| sector.as_str() == s)
            .ok_or_else(|| SurveyValidationError::UnknownSector(s.to_owned()))
    }
}

/// Thematic grouping for survey sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pillar {
    Context,
    Performance,
    MixVolumes,
    PricingMarket,
    ConstraintsOutlook,
}

impl Pillar {
    /// Stable storage identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Context => "context",
            Self::Performance => "performance",
            Self::MixVolumes => "mix_volumes",
            Self::PricingMarket => "pricing_market",
            Self::ConstraintsOutlook => "constraints_outlook",
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Context => "Context",
            Self::Performance => "Performance",
            Self::MixVolumes => "Mix & Volumes",
            Self::PricingMarket => "Pricing & Market Signals",
            Self::ConstraintsOutlook => "Constraints & Outlook",
        }
    }

    /// Parse a storage identifier.
    pub fn parse(value: &str) -> Option<Self> {
        [
            Self::Context,
            Self::Performance,
            Self::MixVolumes,
            Self::PricingMarket,
            Self::ConstraintsOutlook,
        ]
        .into_iter()
        .find(|pillar| pillar.as_str() == value)
    }
}

/// Answer shape a question expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    MultiChoice,
    PercentageSplit,
    BandSelect,
    FreeText,
}

impl QuestionType {
    /// Stable storage identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SingleChoice => "single_choice",
            Self::MultiChoice => "multi_choice",
            Self::PercentageSplit => "percentage_split",
            Self::BandSelect => "band_select",
            Self::FreeText => "free_text",
        }
    }

    /// Parse a storage identifier.
    pub fn parse(value: &str) -> Option<Self> {
        [
            Self::SingleChoice,
            Self::MultiChoice,
            Self::PercentageSplit,
            Self::BandSelect,
            Self::FreeText,
        ]
        .into_iter()
        .find(|kind| kind.as_str() == value)
    }
}

/// Reporting period of a survey occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SurveyPeriod {
    year: i32,
    quarter: u8,
}

impl SurveyPeriod {
    /// Build a period, rejecting quarters outside 1 to 4.
    pub fn new(year: i32, quarter: u8) -> Result<Self, SurveyValidationError> {
        if !(1..=4).contains(&quarter) {
            return Err(SurveyValidationError::QuarterOutOfRange(quarter));
        }
        Ok(Self { year, quarter })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn quarter(&self) -> u8 {
        self.quarter
    }
}

impl fmt::Display for SurveyPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Q{}", self.year, self.quarter)
    }
}

/// Banded employee-count label recorded instead of a raw headcount.
///
/// ## Invariants
/// - Trimmed, non-empty, and at most 64 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SizeBand(String);

impl SizeBand {
    /// Validate and wrap a size band label.
    pub fn new(value: impl AsRef<str>) -> Result<Self, SurveyValidationError> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(SurveyValidationError::EmptySizeBand);
        }
        if trimmed.chars().count() > SIZE_BAND_MAX_LEN {
            return Err(SurveyValidationError::SizeBandTooLong);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SizeBand {
    type Error = SurveyValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SizeBand> for String {
    fn from(value: SizeBand) -> Self {
        value.0
    }
}

impl fmt::Display for SizeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Selectable option offered by a choice or split question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub value: String,
    pub label: String,
}

/// Per-question validation hints. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestionMetadata {
    pub max_selections: Option<u32>,
    pub total_must_equal_100: bool,
}

/// A single survey question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub section_id: Uuid,
    pub text: String,
    pub question_type: QuestionType,
    pub options: Vec<QuestionOption>,
    pub is_required: bool,
    pub sort_order: i32,
    pub metadata: QuestionMetadata,
}

impl Question {
    /// Whether `value` is one of the declared option values.
    pub fn has_option(&self, value: &str) -> bool {
        self.options.iter().any(|option| option.value == value)
    }

    /// Display label for an option value, if declared.
    pub fn option_label(&self, value: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|option| option.value == value)
            .map(|option| option.label.as_str())
    }

    fn ensure_unique_options(&self) -> Result<(), SurveyValidationError> {
        let mut seen = HashSet::new();
        for option in &self.options {
            if !seen.insert(option.value.as_str()) {
                return Err(SurveyValidationError::DuplicateOption {
                    question_id: self.id,
                    value: option.value.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Ordered group of questions sharing a pillar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveySection {
    pub id: Uuid,
    pub survey_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub sort_order: i32,
    pub pillar: Pillar,
    pub questions: Vec<Question>,
}

/// Survey occurrence header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Survey {
    pub id: Uuid,
    pub title: String,
    pub sector: Sector,
    pub period: SurveyPeriod,
    pub is_active: bool,
}

/// Fully assembled survey: header, ordered sections with ordered questions,
/// and branching rules in evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurveyDefinition {
    survey: Survey,
    sections: Vec<SurveySection>,
    rules: Vec<BranchingRule>,
}

impl SurveyDefinition {
    /// Assemble a definition, ordering sections, questions, and rules.
    ///
    /// Sort is stable so ties keep their supplied order.
    pub fn new(
        survey: Survey,
        mut sections: Vec<SurveySection>,
        mut rules: Vec<BranchingRule>,
    ) -> Result<Self, SurveyValidationError> {
        for section in &mut sections {
            if section.survey_id != survey.id {
                return Err(SurveyValidationError::ForeignSection {
                    section_id: section.id,
                    survey_id: survey.id,
                });
            }
            for question in &section.questions {
                if question.section_id != section.id {
                    return Err(SurveyValidationError::ForeignQuestion {
                        question_id: question.id,
                        section_id: section.id,
                    });
                }
                question.ensure_unique_options()?;
            }
            section.questions.sort_by_key(|question| question.sort_order);
        }
        sections.sort_by_key(|section| section.sort_order);
        rules.sort_by_key(|rule| rule.sequence);

        Ok(Self {
            survey,
            sections,
            rules,
        })
    }

    pub fn survey(&self) -> &Survey {
        &self.survey
    }

    pub fn sections(&self) -> &[SurveySection] {
        &self.sections
    }

    /// Branching rules in evaluation order.
    pub fn rules(&self) -> &[BranchingRule] {
        &self.rules
    }

    /// All questions in (section order, question order).
    pub fn questions(&self) -> impl Iterator<Item = &Question> {
        self.sections
            .iter()
            .flat_map(|section| section.questions.iter())
    }

    pub fn question(&self, question_id: Uuid) -> Option<&Question> {
        self.questions().find(|question| question.id == question_id)
    }

    pub fn question_text(&self, question_id: Uuid) -> Option<&str> {
        self.question(question_id)
            .map(|question| question.text.as_str())
    }

    /// Section that owns `question_id`.
    pub fn section_of(&self, question_id: Uuid) -> Option<&SurveySection> {
        self.sections.iter().find(|section| {
            section
                .questions
                .iter()
                .any(|question| question.id == question_id)
        })
    }

    /// Questions a respondent sees given a branching outcome.
    pub fn visible_questions<'a>(
        &'a self,
        result: &'a BranchingResult,
    ) -> impl Iterator<Item = &'a Question> + 'a {
        self.sections
            .iter()
            .filter(move |section| is_section_visible(section.id, result))
            .flat_map(|section| section.questions.iter())
            .filter(move |question| is_question_visible(question.id, result))
    }
}
