//! Internal Diesel row structs for database operations.
//!
//! These types are implementation details of the persistence layer and must
//! never be exposed to the domain.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use super::schema::{
    admin_audit_log, aggregates_cache, answers, branching_rules, questions, receipt_codes,
    submissions, survey_sections, surveys,
};

// ---------------------------------------------------------------------------
// Survey definition models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = surveys)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct SurveyRow {
    pub id: Uuid,
    pub title: String,
    pub sector: String,
    pub year: i32,
    pub quarter: i16,
    pub is_active: bool,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = survey_sections)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct SectionRow {
    pub id: Uuid,
    pub survey_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub sort_order: i32,
    pub pillar: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = questions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct QuestionRow {
    pub id: Uuid,
    pub section_id: Uuid,
    pub question_text: String,
    pub question_type: String,
    pub options: Value,
    pub is_required: bool,
    pub sort_order: i32,
    pub metadata: Value,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = branching_rules)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct BranchingRuleRow {
    pub id: Uuid,
    pub survey_id: Uuid,
    pub sequence: i32,
    pub source_question_id: Uuid,
    pub condition: Value,
    pub action: String,
    pub target_section_id: Option<Uuid>,
    pub target_question_id: Option<Uuid>,
    pub explanation: Option<String>,
}

// ---------------------------------------------------------------------------
// Submission models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = submissions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct SubmissionRow {
    pub id: Uuid,
    pub survey_id: Uuid,
    pub sector: String,
    pub year: i32,
    pub quarter: i16,
    pub size_band: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = submissions)]
pub(crate) struct NewSubmissionRow<'a> {
    pub id: Uuid,
    pub survey_id: Uuid,
    pub sector: &'a str,
    pub year: i32,
    pub quarter: i16,
    pub size_band: &'a str,
}

/// Exactly one of the two value columns is `Some`.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = answers)]
pub(crate) struct NewAnswerRow {
    pub submission_id: Uuid,
    pub question_id: Uuid,
    pub answer_value: Option<String>,
    pub answer_values: Option<Value>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = receipt_codes)]
pub(crate) struct NewReceiptCodeRow<'a> {
    pub code_hash: &'a str,
    pub submission_id: Uuid,
}

// ---------------------------------------------------------------------------
// Aggregate cache models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = aggregates_cache)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct AggregateCacheRow {
    pub cache_key: String,
    pub dimensions: Value,
    pub result: Value,
    pub response_count: i64,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = aggregates_cache)]
pub(crate) struct NewAggregateCacheRow {
    pub cache_key: String,
    pub dimensions: Value,
    pub result: Value,
    pub response_count: i64,
    pub computed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Audit log models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = admin_audit_log)]
pub(crate) struct NewAuditLogRow<'a> {
    pub actor: &'a str,
    pub action: &'a str,
    pub details: Value,
}
