//! Branching rule evaluation.

use std::collections::BTreeMap;

use rstest::{fixture, rstest};
use uuid::Uuid;

use super::*;

struct Ids {
    q1: Uuid,
    q2: Uuid,
    q3: Uuid,
    section: Uuid,
}

#[fixture]
fn ids() -> Ids {
    Ids {
        q1: Uuid::new_v4(),
        q2: Uuid::new_v4(),
        q3: Uuid::new_v4(),
        section: Uuid::new_v4(),
    }
}

fn rule(
    sequence: i32,
    source: Uuid,
    operator: ConditionOperator,
    value: &str,
    action: RuleAction,
) -> BranchingRule {
    BranchingRule {
        id: Uuid::new_v4(),
        sequence,
        source_question_id: source,
        condition: Condition {
            operator,
            value: value.to_owned(),
        },
        action,
        explanation: None,
    }
}

fn text(value: &str) -> AnswerValue {
    AnswerValue::Text(value.to_owned())
}

fn choices(values: &[&str]) -> AnswerValue {
    AnswerValue::Choices(values.iter().map(|value| (*value).to_owned()).collect())
}

fn answers(pairs: Vec<(Uuid, AnswerValue)>) -> AnswerSet {
    pairs.into_iter().collect()
}

#[rstest]
#[case("not_applicable", false)]
#[case("14ct", true)]
fn skip_question_fires_only_on_matching_answer(
    ids: Ids,
    #[case] answer: &str,
    #[case] visible: bool,
) {
    let rules = [rule(
        1,
        ids.q1,
        ConditionOperator::Equals,
        "not_applicable",
        RuleAction::SkipQuestion(ids.q2),
    )];
    let result = evaluate(&rules, &answers(vec![(ids.q1, text(answer))]));
    assert_eq!(is_question_visible(ids.q2, &result), visible);
}

#[rstest]
#[case(&["gold", "diamonds"], false)]
#[case(&["gold"], true)]
fn includes_tests_list_membership(ids: Ids, #[case] selected: &[&str], #[case] visible: bool) {
    let rules = [rule(
        1,
        ids.q1,
        ConditionOperator::Includes,
        "diamonds",
        RuleAction::SkipQuestion(ids.q3),
    )];
    let result = evaluate(&rules, &answers(vec![(ids.q1, choices(selected))]));
    assert_eq!(is_question_visible(ids.q3, &result), visible);
}

#[rstest]
#[case(ConditionOperator::Equals, &["gold"], true)]
#[case(ConditionOperator::Equals, &["gold", "silver"], false)]
#[case(ConditionOperator::NotEquals, &["gold", "silver"], true)]
#[case(ConditionOperator::NotIncludes, &["silver"], true)]
#[case(ConditionOperator::NotIncludes, &["gold", "silver"], false)]
fn list_operators(
    #[case] operator: ConditionOperator,
    #[case] selected: &[&str],
    #[case] expected: bool,
) {
    let condition = Condition {
        operator,
        value: "gold".to_owned(),
    };
    assert_eq!(condition.matches(Some(&choices(selected))), expected);
}

#[rstest]
#[case(ConditionOperator::Equals, "14ct", true)]
#[case(ConditionOperator::Includes, "14ct", true)]
#[case(ConditionOperator::NotEquals, "14ct", false)]
#[case(ConditionOperator::NotIncludes, "18ct", true)]
fn string_operators_use_exact_equality(
    #[case] operator: ConditionOperator,
    #[case] literal: &str,
    #[case] expected: bool,
) {
    let condition = Condition {
        operator,
        value: literal.to_owned(),
    };
    assert_eq!(condition.matches(Some(&text("14ct"))), expected);
}

#[rstest]
#[case(ConditionOperator::Equals, "100", true)]
#[case(ConditionOperator::Equals, "50", false)]
#[case(ConditionOperator::NotEquals, "50", true)]
#[case(ConditionOperator::Equals, "lots", false)]
#[case(ConditionOperator::Includes, "100", false)]
#[case(ConditionOperator::NotIncludes, "100", false)]
fn split_operators_compare_numerically(
    #[case] operator: ConditionOperator,
    #[case] literal: &str,
    #[case] expected: bool,
) {
    let split = AnswerValue::Split(BTreeMap::from([
        ("gold".to_owned(), 100.0),
        ("silver".to_owned(), 0.0),
    ]));
    let condition = Condition {
        operator,
        value: literal.to_owned(),
    };
    assert_eq!(condition.matches(Some(&split)), expected);
}

#[rstest]
#[case(ConditionOperator::Equals)]
#[case(ConditionOperator::NotEquals)]
#[case(ConditionOperator::Includes)]
#[case(ConditionOperator::NotIncludes)]
fn unanswered_source_never_fires(ids: Ids, #[case] operator: ConditionOperator) {
    let rules = [rule(
        1,
        ids.q1,
        operator,
        "anything",
        RuleAction::HideSection(ids.section),
    )];
    let result = evaluate(&rules, &AnswerSet::new());
    assert_eq!(result, BranchingResult::default());
}

#[rstest]
fn later_show_section_overrides_earlier_hide_and_skip(ids: Ids) {
    let rules = [
        rule(
            1,
            ids.q1,
            ConditionOperator::Equals,
            "no",
            RuleAction::HideSection(ids.section),
        ),
        rule(
            2,
            ids.q1,
            ConditionOperator::Equals,
            "no",
            RuleAction::SkipSection(ids.section),
        ),
        rule(
            3,
            ids.q2,
            ConditionOperator::Equals,
            "yes",
            RuleAction::ShowSection(ids.section),
        ),
    ];
    let result = evaluate(
        &rules,
        &answers(vec![(ids.q1, text("no")), (ids.q2, text("yes"))]),
    );
    assert!(is_section_visible(ids.section, &result));
}

#[rstest]
fn earlier_show_section_does_not_override_later_hide(ids: Ids) {
    let rules = [
        rule(
            1,
            ids.q2,
            ConditionOperator::Equals,
            "yes",
            RuleAction::ShowSection(ids.section),
        ),
        rule(
            2,
            ids.q1,
            ConditionOperator::Equals,
            "no",
            RuleAction::HideSection(ids.section),
        ),
    ];
    let result = evaluate(
        &rules,
        &answers(vec![(ids.q1, text("no")), (ids.q2, text("yes"))]),
    );
    assert!(!is_section_visible(ids.section, &result));
    assert!(result.hidden_sections.contains(&ids.section));
}

#[rstest]
fn skip_and_hide_are_tracked_separately(ids: Ids) {
    let other = Uuid::new_v4();
    let rules = [
        rule(
            1,
            ids.q1,
            ConditionOperator::Equals,
            "no",
            RuleAction::SkipSection(ids.section),
        ),
        rule(
            2,
            ids.q1,
            ConditionOperator::Equals,
            "no",
            RuleAction::HideSection(other),
        ),
    ];
    let result = evaluate(&rules, &answers(vec![(ids.q1, text("no"))]));

    assert!(result.skipped_sections.contains(&ids.section));
    assert!(!result.hidden_sections.contains(&ids.section));
    assert!(result.hidden_sections.contains(&other));
    assert!(!is_section_visible(ids.section, &result));
    assert!(!is_section_visible(other, &result));
}

#[rstest]
fn explanations_follow_targets(ids: Ids) {
    let mut skip = rule(
        1,
        ids.q1,
        ConditionOperator::Equals,
        "no",
        RuleAction::SkipSection(ids.section),
    );
    skip.explanation = Some("Not relevant to your business".to_owned());
    let mut skip_question = rule(
        2,
        ids.q1,
        ConditionOperator::Equals,
        "no",
        RuleAction::SkipQuestion(ids.q3),
    );
    skip_question.explanation = Some("Only asked of importers".to_owned());

    let result = evaluate(&[skip, skip_question], &answers(vec![(ids.q1, text("no"))]));

    assert_eq!(
        result.explanations.get(&ids.section).map(String::as_str),
        Some("Not relevant to your business")
    );
    assert_eq!(
        result.explanations.get(&ids.q3).map(String::as_str),
        Some("Only asked of importers")
    );
}

#[rstest]
fn show_section_clears_stale_explanation(ids: Ids) {
    let mut hide = rule(
        1,
        ids.q1,
        ConditionOperator::Equals,
        "no",
        RuleAction::HideSection(ids.section),
    );
    hide.explanation = Some("Hidden".to_owned());
    let show = rule(
        2,
        ids.q1,
        ConditionOperator::Equals,
        "no",
        RuleAction::ShowSection(ids.section),
    );

    let result = evaluate(&[hide, show], &answers(vec![(ids.q1, text("no"))]));
    assert!(result.explanations.is_empty());
}

#[rstest]
fn unknown_targets_are_harmless(ids: Ids) {
    let rules = [rule(
        1,
        ids.q1,
        ConditionOperator::Equals,
        "no",
        RuleAction::SkipQuestion(Uuid::new_v4()),
    )];
    let result = evaluate(&rules, &answers(vec![(ids.q1, text("no"))]));
    assert!(is_question_visible(ids.q2, &result));
    assert_eq!(result.skipped_questions.len(), 1);
}

#[rstest]
#[case("skip_section", Some(true), None, true)]
#[case("skip_question", None, Some(true), true)]
#[case("skip_question", Some(true), None, false)]
#[case("rename_section", Some(true), None, false)]
fn actions_rebuild_from_stored_parts(
    #[case] kind: &str,
    #[case] section: Option<bool>,
    #[case] question: Option<bool>,
    #[case] expected_some: bool,
) {
    let section_id = section.map(|_| Uuid::new_v4());
    let question_id = question.map(|_| Uuid::new_v4());
    let action = RuleAction::from_parts(kind, section_id, question_id);
    assert_eq!(action.is_some(), expected_some);
    if let Some(action) = action {
        assert_eq!(action.kind(), kind);
    }
}

#[rstest]
fn rules_deserialise_with_flattened_action(ids: Ids) {
    let json = serde_json::json!({
        "id": Uuid::nil(),
        "sequence": 4,
        "source_question_id": ids.q1,
        "condition": { "operator": "not_includes", "value": "gold" },
        "action": "hide_section",
        "target": ids.section,
        "explanation": null
    });
    let parsed: BranchingRule = serde_json::from_value(json).expect("rule parses");
    assert_eq!(parsed.action, RuleAction::HideSection(ids.section));
    assert_eq!(parsed.condition.operator, ConditionOperator::NotIncludes);
}
