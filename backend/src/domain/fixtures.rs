//! Shared survey fixtures for domain service tests.

use uuid::Uuid;

use super::branching::{BranchingRule, Condition, ConditionOperator, RuleAction};
use super::survey::{
    Pillar, Question, QuestionMetadata, QuestionOption, QuestionType, Sector, Survey,
    SurveyDefinition, SurveyPeriod, SurveySection,
};

pub(crate) struct SurveyFixture {
    pub definition: SurveyDefinition,
    pub metal: Uuid,
    pub mix: Uuid,
    pub products: Uuid,
    pub notes: Uuid,
    pub products_section: Uuid,
}

impl SurveyFixture {
    pub fn survey_id(&self) -> Uuid {
        self.definition.survey().id
    }
}

fn options(values: &[&str]) -> Vec<QuestionOption> {
    values
        .iter()
        .map(|value| QuestionOption {
            value: (*value).to_owned(),
            label: value.to_uppercase(),
        })
        .collect()
}

fn question(
    section_id: Uuid,
    sort_order: i32,
    text: &str,
    question_type: QuestionType,
    values: &[&str],
    is_required: bool,
) -> Question {
    Question {
        id: Uuid::new_v4(),
        section_id,
        text: text.to_owned(),
        question_type,
        options: options(values),
        is_required,
        sort_order,
        metadata: QuestionMetadata::default(),
    }
}

/// Retail survey with two sections. Answering `none` to the metal
/// question skips the products section.
pub(crate) fn retail_survey() -> SurveyFixture {
    let survey = Survey {
        id: Uuid::new_v4(),
        title: "Retail pulse 2025 Q3".to_owned(),
        sector: Sector::Retailers,
        period: SurveyPeriod::new(2025, 3).unwrap_or_else(|err| panic!("{err}")),
        is_active: true,
    };
    let context_id = Uuid::new_v4();
    let products_id = Uuid::new_v4();

    let metal = question(
        context_id,
        1,
        "Which gold fineness sells most?",
        QuestionType::SingleChoice,
        &["14ct", "18ct", "none"],
        true,
    );
    let mut mix = question(
        context_id,
        2,
        "Split of sales by metal (%)",
        QuestionType::PercentageSplit,
        &["gold", "silver"],
        true,
    );
    mix.metadata.total_must_equal_100 = true;
    let mut products = question(
        products_id,
        1,
        "Which products do you stock?",
        QuestionType::MultiChoice,
        &["gold", "diamonds", "silver"],
        true,
    );
    products.metadata.max_selections = Some(2);
    let notes = question(
        products_id,
        2,
        "Anything else?",
        QuestionType::FreeText,
        &[],
        false,
    );

    let fixture_ids = (metal.id, mix.id, products.id, notes.id);
    let rule = BranchingRule {
        id: Uuid::new_v4(),
        sequence: 1,
        source_question_id: metal.id,
        condition: Condition {
            operator: ConditionOperator::Equals,
            value: "none".to_owned(),
        },
        action: RuleAction::SkipSection(products_id),
        explanation: Some("Only asked of gold sellers".to_owned()),
    };

    let sections = vec![
        SurveySection {
            id: context_id,
            survey_id: survey.id,
            title: "Context".to_owned(),
            description: None,
            sort_order: 1,
            pillar: Pillar::Context,
            questions: vec![metal, mix],
        },
        SurveySection {
            id: products_id,
            survey_id: survey.id,
            title: "Products".to_owned(),
            description: Some("Your stock mix".to_owned()),
            sort_order: 2,
            pillar: Pillar::MixVolumes,
            questions: vec![products, notes],
        },
    ];

    let definition = SurveyDefinition::new(survey, sections, vec![rule])
        .unwrap_or_else(|err| panic!("fixture survey is valid: {err}"));
    SurveyFixture {
        definition,
        metal: fixture_ids.0,
        mix: fixture_ids.1,
        products: fixture_ids.2,
        notes: fixture_ids.3,
        products_section: products_id,
    }
}

/// Threshold source returning a fixed value.
pub(crate) struct FixedThreshold(pub u64);

impl super::KAnonymityEnv for FixedThreshold {
    fn string(&self, _name: &str) -> Option<String> {
        Some(self.0.to_string())
    }
}
