//! PostgreSQL-backed `SurveyRepository` implementation.
//!
//! Survey headers, sections, questions, and rules are read in one
//! transaction so a definition is never assembled from two snapshots.

use std::collections::HashMap;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::domain::ports::{SurveyRepository, SurveyRepositoryError};
use crate::domain::{
    BranchingRule, Condition, Pillar, Question, QuestionMetadata, QuestionOption, QuestionType,
    RuleAction, Sector, Survey, SurveyDefinition, SurveyPeriod, SurveySection,
};

use super::diesel_error_mapping::{map_basic_diesel_error, pool_error_message};
use super::models::{BranchingRuleRow, QuestionRow, SectionRow, SurveyRow};
use super::pool::{DbPool, PoolError};
use super::schema::{branching_rules, questions, survey_sections, surveys};

/// Diesel-backed implementation of the `SurveyRepository` port.
#[derive(Clone)]
pub struct DieselSurveyRepository {
    pool: DbPool,
}

impl DieselSurveyRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> SurveyRepositoryError {
    SurveyRepositoryError::connection(pool_error_message(error))
}

fn map_diesel_error(error: diesel::result::Error) -> SurveyRepositoryError {
    map_basic_diesel_error(
        &error,
        SurveyRepositoryError::query,
        SurveyRepositoryError::connection,
    )
}

/// Raw rows for a batch of surveys.
struct DefinitionRows {
    surveys: Vec<SurveyRow>,
    sections: Vec<SectionRow>,
    questions: Vec<QuestionRow>,
    rules: Vec<BranchingRuleRow>,
}

async fn load_rows(
    conn: &mut AsyncPgConnection,
    survey_rows: Vec<SurveyRow>,
) -> Result<DefinitionRows, diesel::result::Error> {
    let survey_ids: Vec<Uuid> = survey_rows.iter().map(|row| row.id).collect();
    let sections: Vec<SectionRow> = survey_sections::table
        .filter(survey_sections::survey_id.eq_any(&survey_ids))
        .select(SectionRow::as_select())
        .load(conn)
        .await?;
    let section_ids: Vec<Uuid> = sections.iter().map(|row| row.id).collect();
    let question_rows: Vec<QuestionRow> = questions::table
        .filter(questions::section_id.eq_any(&section_ids))
        .select(QuestionRow::as_select())
        .load(conn)
        .await?;
    let rules: Vec<BranchingRuleRow> = branching_rules::table
        .filter(branching_rules::survey_id.eq_any(&survey_ids))
        .select(BranchingRuleRow::as_select())
        .load(conn)
        .await?;

    Ok(DefinitionRows {
        surveys: survey_rows,
        sections,
        questions: question_rows,
        rules,
    })
}

fn corrupt(survey_id: Uuid, what: impl std::fmt::Display) -> SurveyRepositoryError {
    SurveyRepositoryError::query(format!("survey {survey_id} has invalid {what}"))
}

fn decode_json<T: DeserializeOwned>(
    survey_id: Uuid,
    column: &str,
    value: serde_json::Value,
) -> Result<T, SurveyRepositoryError> {
    serde_json::from_value(value).map_err(|err| corrupt(survey_id, format!("{column}: {err}")))
}

fn to_question(survey_id: Uuid, row: QuestionRow) -> Result<Question, SurveyRepositoryError> {
    let question_type = QuestionType::parse(&row.question_type)
        .ok_or_else(|| corrupt(survey_id, format!("question type {}", row.question_type)))?;
    let options: Vec<QuestionOption> = decode_json(survey_id, "options", row.options)?;
    let metadata: QuestionMetadata = decode_json(survey_id, "metadata", row.metadata)?;
    Ok(Question {
        id: row.id,
        section_id: row.section_id,
        text: row.question_text,
        question_type,
        options,
        is_required: row.is_required,
        sort_order: row.sort_order,
        metadata,
    })
}

fn to_rule(row: BranchingRuleRow) -> Result<BranchingRule, SurveyRepositoryError> {
    let survey_id = row.survey_id;
    let condition: Condition = decode_json(survey_id, "rule condition", row.condition)?;
    let action = RuleAction::from_parts(&row.action, row.target_section_id, row.target_question_id)
        .ok_or_else(|| corrupt(survey_id, format!("rule action {}", row.action)))?;
    Ok(BranchingRule {
        id: row.id,
        sequence: row.sequence,
        source_question_id: row.source_question_id,
        condition,
        action,
        explanation: row.explanation,
    })
}

fn to_survey(row: &SurveyRow) -> Result<Survey, SurveyRepositoryError> {
    let sector: Sector = row
        .sector
        .parse()
        .map_err(|err| corrupt(row.id, err))?;
    let quarter = u8::try_from(row.quarter).map_err(|err| corrupt(row.id, err))?;
    let period = SurveyPeriod::new(row.year, quarter).map_err(|err| corrupt(row.id, err))?;
    Ok(Survey {
        id: row.id,
        title: row.title.clone(),
        sector,
        period,
        is_active: row.is_active,
    })
}

fn assemble(rows: DefinitionRows) -> Result<Vec<SurveyDefinition>, SurveyRepositoryError> {
    let section_owner: HashMap<Uuid, Uuid> = rows
        .sections
        .iter()
        .map(|section| (section.id, section.survey_id))
        .collect();

    let mut questions_by_section: HashMap<Uuid, Vec<Question>> = HashMap::new();
    for row in rows.questions {
        let survey_id = section_owner
            .get(&row.section_id)
            .copied()
            .unwrap_or_default();
        let section_id = row.section_id;
        let question = to_question(survey_id, row)?;
        questions_by_section
            .entry(section_id)
            .or_default()
            .push(question);
    }

    let mut sections_by_survey: HashMap<Uuid, Vec<SurveySection>> = HashMap::new();
    for row in rows.sections {
        let pillar = Pillar::parse(&row.pillar)
            .ok_or_else(|| corrupt(row.survey_id, format!("pillar {}", row.pillar)))?;
        sections_by_survey
            .entry(row.survey_id)
            .or_default()
            .push(SurveySection {
                id: row.id,
                survey_id: row.survey_id,
                title: row.title,
                description: row.description,
                sort_order: row.sort_order,
                pillar,
                questions: questions_by_section.remove(&row.id).unwrap_or_default(),
            });
    }

    let mut rules_by_survey: HashMap<Uuid, Vec<BranchingRule>> = HashMap::new();
    for row in rows.rules {
        let survey_id = row.survey_id;
        rules_by_survey
            .entry(survey_id)
            .or_default()
            .push(to_rule(row)?);
    }

    rows.surveys
        .iter()
        .map(|row| {
            let survey = to_survey(row)?;
            let sections = sections_by_survey.remove(&row.id).unwrap_or_default();
            let rules = rules_by_survey.remove(&row.id).unwrap_or_default();
            SurveyDefinition::new(survey, sections, rules).map_err(|err| corrupt(row.id, err))
        })
        .collect()
}

/// Which survey headers a load starts from.
#[derive(Debug, Clone, Copy)]
enum SurveySelection {
    ById(Uuid),
    ActiveForSector(Sector),
    AllActive,
}

async fn select_surveys(
    conn: &mut AsyncPgConnection,
    selection: SurveySelection,
) -> Result<Vec<SurveyRow>, diesel::result::Error> {
    match selection {
        SurveySelection::ById(survey_id) => {
            surveys::table
                .filter(surveys::id.eq(survey_id))
                .select(SurveyRow::as_select())
                .load(conn)
                .await
        }
        SurveySelection::ActiveForSector(sector) => {
            surveys::table
                .filter(surveys::sector.eq(sector.as_str()))
                .filter(surveys::is_active.eq(true))
                .order((
                    surveys::year.desc(),
                    surveys::quarter.desc(),
                    surveys::created_at.desc(),
                ))
                .limit(1)
                .select(SurveyRow::as_select())
                .load(conn)
                .await
        }
        SurveySelection::AllActive => {
            surveys::table
                .filter(surveys::is_active.eq(true))
                .order((surveys::year.asc(), surveys::quarter.asc(), surveys::sector.asc()))
                .select(SurveyRow::as_select())
                .load(conn)
                .await
        }
    }
}

impl DieselSurveyRepository {
    async fn load(
        &self,
        selection: SurveySelection,
    ) -> Result<Vec<SurveyDefinition>, SurveyRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = conn
            .transaction(|conn| {
                async move {
                    let survey_rows = select_surveys(conn, selection).await?;
                    load_rows(conn, survey_rows).await
                }
                .scope_boxed()
            })
            .await
            .map_err(map_diesel_error)?;
        assemble(rows)
    }
}

#[async_trait]
impl SurveyRepository for DieselSurveyRepository {
    async fn find_definition(
        &self,
        survey_id: Uuid,
    ) -> Result<Option<SurveyDefinition>, SurveyRepositoryError> {
        let definitions = self.load(SurveySelection::ById(survey_id)).await?;
        Ok(definitions.into_iter().next())
    }

    async fn active_survey_for_sector(
        &self,
        sector: Sector,
    ) -> Result<Option<SurveyDefinition>, SurveyRepositoryError> {
        let definitions = self.load(SurveySelection::ActiveForSector(sector)).await?;
        Ok(definitions.into_iter().next())
    }

    async fn list_active_definitions(
        &self,
    ) -> Result<Vec<SurveyDefinition>, SurveyRepositoryError> {
        self.load(SurveySelection::AllActive).await
    }
}
