//! Conditional branching over survey answers.
//!
//! Rules run strictly in their authored sequence. A later `show_section`
//! rule undoes any earlier hide or skip of the same section, so reordering
//! rules changes outcomes. Rules that name unknown questions or sections
//! are harmless: an unanswered source never fires and an unknown target is
//! simply never rendered.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::answer::{AnswerSet, AnswerValue};

/// Comparison applied between an answer and a rule literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Includes,
    NotIncludes,
}

/// Rule condition: an operator and the literal it compares against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub operator: ConditionOperator,
    pub value: String,
}

impl Condition {
    /// Evaluate against an answer. Missing answers never match.
    pub fn matches(&self, answer: Option<&AnswerValue>) -> bool {
        let Some(answer) = answer else {
            return false;
        };
        match answer {
            AnswerValue::Text(text) => {
                let equal = *text == self.value;
                match self.operator {
                    ConditionOperator::Equals | ConditionOperator::Includes => equal,
                    ConditionOperator::NotEquals | ConditionOperator::NotIncludes => !equal,
                }
            }
            AnswerValue::Choices(choices) => {
                let sole = matches!(choices.as_slice(), [only] if *only == self.value);
                let member = choices.iter().any(|choice| *choice == self.value);
                match self.operator {
                    ConditionOperator::Equals => sole,
                    ConditionOperator::NotEquals => !sole,
                    ConditionOperator::Includes => member,
                    ConditionOperator::NotIncludes => !member,
                }
            }
            AnswerValue::Split(split) => {
                // A literal that is not a number never equals any share.
                let literal = self.value.trim().parse::<f64>().ok();
                let any_equal = literal
                    .is_some_and(|target| split.values().any(|share| *share == target));
                match self.operator {
                    ConditionOperator::Equals => any_equal,
                    ConditionOperator::NotEquals => !any_equal,
                    ConditionOperator::Includes | ConditionOperator::NotIncludes => false,
                }
            }
        }
    }
}

/// What a rule does when its condition holds, with its single target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "target", rename_all = "snake_case")]
pub enum RuleAction {
    SkipSection(Uuid),
    HideSection(Uuid),
    ShowSection(Uuid),
    SkipQuestion(Uuid),
}

impl RuleAction {
    /// Storage identifier of the action kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SkipSection(_) => "skip_section",
            Self::HideSection(_) => "hide_section",
            Self::ShowSection(_) => "show_section",
            Self::SkipQuestion(_) => "skip_question",
        }
    }

    /// Rebuild an action from its stored kind and target columns.
    ///
    /// Returns `None` when the kind is unknown or the matching target
    /// column is empty.
    pub fn from_parts(
        kind: &str,
        target_section_id: Option<Uuid>,
        target_question_id: Option<Uuid>,
    ) -> Option<Self> {
        match kind {
            "skip_section" => target_section_id.map(Self::SkipSection),
            "hide_section" => target_section_id.map(Self::HideSection),
            "show_section" => target_section_id.map(Self::ShowSection),
            "skip_question" => target_question_id.map(Self::SkipQuestion),
            _ => None,
        }
    }
}

/// A static branching rule from the survey definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchingRule {
    pub id: Uuid,
    /// Evaluation position; lower runs first.
    pub sequence: i32,
    pub source_question_id: Uuid,
    pub condition: Condition,
    #[serde(flatten)]
    pub action: RuleAction,
    pub explanation: Option<String>,
}

/// Visibility outcome of a rule evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BranchingResult {
    pub hidden_sections: HashSet<Uuid>,
    pub skipped_sections: HashSet<Uuid>,
    pub skipped_questions: HashSet<Uuid>,
    /// Respondent-facing reason per hidden or skipped target.
    pub explanations: BTreeMap<Uuid, String>,
}

/// Run `rules` in order against `answers`.
///
/// # Examples
/// ```
/// use survey_backend::domain::{AnswerSet, AnswerValue, BranchingRule, Condition,
///     ConditionOperator, RuleAction, evaluate, is_question_visible};
/// use uuid::Uuid;
///
/// let (q1, q2) = (Uuid::new_v4(), Uuid::new_v4());
/// let rule = BranchingRule {
///     id: Uuid::new_v4(),
///     sequence: 1,
///     source_question_id: q1,
///     condition: Condition { operator: ConditionOperator::Equals, value: "not_applicable".into() },
///     action: RuleAction::SkipQuestion(q2),
///     explanation: None,
/// };
/// let mut answers = AnswerSet::new();
/// answers.insert(q1, AnswerValue::Text("not_applicable".into()));
///
/// let result = evaluate(&[rule], &answers);
/// assert!(!is_question_visible(q2, &result));
/// ```
pub fn evaluate(rules: &[BranchingRule], answers: &AnswerSet) -> BranchingResult {
    let mut result = BranchingResult::default();

    for rule in rules {
        if !rule.condition.matches(answers.get(&rule.source_question_id)) {
            continue;
        }
        match rule.action {
            RuleAction::SkipSection(target) => {
                result.skipped_sections.insert(target);
                result.note(target, rule.explanation.as_deref());
            }
            RuleAction::HideSection(target) => {
                result.hidden_sections.insert(target);
                result.note(target, rule.explanation.as_deref());
            }
            RuleAction::SkipQuestion(target) => {
                result.skipped_questions.insert(target);
                result.note(target, rule.explanation.as_deref());
            }
            RuleAction::ShowSection(target) => {
                result.hidden_sections.remove(&target);
                result.skipped_sections.remove(&target);
                result.explanations.remove(&target);
            }
        }
    }

    result
}

impl BranchingResult {
    fn note(&mut self, target: Uuid, explanation: Option<&str>) {
        if let Some(text) = explanation {
            self.explanations.insert(target, text.to_owned());
        }
    }
}

/// A section is visible unless hidden or skipped.
pub fn is_section_visible(section_id: Uuid, result: &BranchingResult) -> bool {
    !result.hidden_sections.contains(&section_id) && !result.skipped_sections.contains(&section_id)
}

/// A question is visible unless skipped.
pub fn is_question_visible(question_id: Uuid, result: &BranchingResult) -> bool {
    !result.skipped_questions.contains(&question_id)
}

#[cfg(test)]
mod tests;
