//! PostgreSQL-backed `SubmissionRepository` implementation.
//!
//! The submission row, its answers, and its receipt hash are written in one
//! transaction. The survey's active flag is re-read under a share lock in
//! the same transaction so a survey retired mid-request rejects the write.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};

use crate::domain::ports::{
    NewSubmission, SubmissionRecord, SubmissionRepository, SubmissionRepositoryError,
};
use crate::domain::{Sector, SizeBand, SurveyPeriod};

use super::diesel_error_mapping::{map_basic_diesel_error, pool_error_message, unique_violation};
use super::models::{NewAnswerRow, NewReceiptCodeRow, NewSubmissionRow, SubmissionRow};
use super::pool::{DbPool, PoolError};
use super::schema::{answers, receipt_codes, submissions, surveys};

const RECEIPT_HASH_CONSTRAINT: &str = "receipt_codes_code_hash_key";

/// Diesel-backed implementation of the `SubmissionRepository` port.
#[derive(Clone)]
pub struct DieselSubmissionRepository {
    pool: DbPool,
}

impl DieselSubmissionRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Failure inside the write transaction.
#[derive(Debug)]
enum RecordError {
    Diesel(diesel::result::Error),
    SurveyUnavailable,
}

impl From<diesel::result::Error> for RecordError {
    fn from(error: diesel::result::Error) -> Self {
        Self::Diesel(error)
    }
}

fn map_pool_error(error: PoolError) -> SubmissionRepositoryError {
    SubmissionRepositoryError::connection(pool_error_message(error))
}

fn map_diesel_error(error: diesel::result::Error) -> SubmissionRepositoryError {
    if unique_violation(&error) == Some(RECEIPT_HASH_CONSTRAINT) {
        return SubmissionRepositoryError::duplicate_receipt();
    }
    map_basic_diesel_error(
        &error,
        SubmissionRepositoryError::query,
        SubmissionRepositoryError::connection,
    )
}

fn to_record(row: SubmissionRow) -> Result<SubmissionRecord, SubmissionRepositoryError> {
    let invalid = |what: String| {
        SubmissionRepositoryError::query(format!("submission {} has invalid {what}", row.id))
    };
    let sector: Sector = row
        .sector
        .parse()
        .map_err(|err| invalid(format!("sector: {err}")))?;
    let quarter = u8::try_from(row.quarter).map_err(|err| invalid(format!("quarter: {err}")))?;
    let period =
        SurveyPeriod::new(row.year, quarter).map_err(|err| invalid(format!("period: {err}")))?;
    let size_band =
        SizeBand::new(&row.size_band).map_err(|err| invalid(format!("size band: {err}")))?;
    Ok(SubmissionRecord {
        id: row.id,
        survey_id: row.survey_id,
        sector,
        period,
        size_band,
        submitted_at: row.submitted_at,
    })
}

fn answer_rows(submission: &NewSubmission) -> Vec<NewAnswerRow> {
    submission
        .answers
        .iter()
        .map(|answer| {
            let (answer_value, answer_values) = answer.value.to_stored().into_columns();
            NewAnswerRow {
                submission_id: submission.id,
                question_id: answer.question_id,
                answer_value,
                answer_values,
            }
        })
        .collect()
}

#[async_trait]
impl SubmissionRepository for DieselSubmissionRepository {
    async fn record(
        &self,
        submission: &NewSubmission,
    ) -> Result<SubmissionRecord, SubmissionRepositoryError> {
        let new_row = NewSubmissionRow {
            id: submission.id,
            survey_id: submission.survey_id,
            sector: submission.sector.as_str(),
            year: submission.period.year(),
            quarter: i16::from(submission.period.quarter()),
            size_band: submission.size_band.as_str(),
        };
        let answers_rows = answer_rows(submission);
        let receipt_row = NewReceiptCodeRow {
            code_hash: submission.receipt_hash.as_str(),
            submission_id: submission.id,
        };
        let survey_id = submission.survey_id;

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = conn
            .transaction::<SubmissionRow, RecordError, _>(|conn| {
                async move {
                    let active: Option<bool> = surveys::table
                        .filter(surveys::id.eq(survey_id))
                        .select(surveys::is_active)
                        .for_share()
                        .first(conn)
                        .await
                        .optional()?;
                    if active != Some(true) {
                        return Err(RecordError::SurveyUnavailable);
                    }

                    let row = diesel::insert_into(submissions::table)
                        .values(&new_row)
                        .returning(SubmissionRow::as_returning())
                        .get_result(conn)
                        .await?;
                    if !answers_rows.is_empty() {
                        diesel::insert_into(answers::table)
                            .values(&answers_rows)
                            .execute(conn)
                            .await?;
                    }
                    diesel::insert_into(receipt_codes::table)
                        .values(&receipt_row)
                        .execute(conn)
                        .await?;
                    Ok(row)
                }
                .scope_boxed()
            })
            .await
            .map_err(|error| match error {
                RecordError::Diesel(error) => map_diesel_error(error),
                RecordError::SurveyUnavailable => {
                    SubmissionRepositoryError::survey_unavailable(survey_id)
                }
            })?;

        to_record(row)
    }

    async fn find_by_receipt_hash(
        &self,
        receipt_hash: &str,
    ) -> Result<Option<SubmissionRecord>, SubmissionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<SubmissionRow> = receipt_codes::table
            .inner_join(submissions::table)
            .filter(receipt_codes::code_hash.eq(receipt_hash))
            .select(SubmissionRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(to_record).transpose()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use rstest::rstest;
    use serde_json::json;

    use uuid::Uuid;

    // Explicit imports: a glob would bring `diesel_async::RunQueryDsl` into
    // scope, whose blanket `first` shadows the slice method on `Vec`.
    use super::{
        NewSubmission, Sector, SizeBand, SubmissionRepositoryError, SubmissionRow, SurveyPeriod,
        answer_rows, to_record,
    };
    use crate::domain::{AnswerValue, SubmittedAnswer};

    fn row(sector: &str, quarter: i16) -> SubmissionRow {
        SubmissionRow {
            id: Uuid::new_v4(),
            survey_id: Uuid::new_v4(),
            sector: sector.to_owned(),
            year: 2025,
            quarter,
            size_band: "10-49".to_owned(),
            submitted_at: Utc::now(),
        }
    }

    #[rstest]
    fn rows_convert_to_records() {
        let record = to_record(row("diamond_dealers", 2)).expect("valid row");
        assert_eq!(record.sector, Sector::DiamondDealers);
        assert_eq!(record.period.quarter(), 2);
    }

    #[rstest]
    #[case("gold", 1)]
    #[case("refiners", 0)]
    fn invalid_rows_are_query_errors(#[case] sector: &str, #[case] quarter: i16) {
        let error = to_record(row(sector, quarter)).expect_err("invalid row");
        assert!(matches!(error, SubmissionRepositoryError::Query { .. }));
    }

    #[rstest]
    fn answers_fill_exactly_one_column() {
        let submission = NewSubmission {
            id: Uuid::new_v4(),
            survey_id: Uuid::new_v4(),
            sector: Sector::Retailers,
            period: SurveyPeriod::new(2025, 3).expect("valid period"),
            size_band: SizeBand::new("1-9").expect("valid band"),
            answers: vec![
                SubmittedAnswer {
                    question_id: Uuid::new_v4(),
                    value: AnswerValue::Text("18ct".to_owned()),
                },
                SubmittedAnswer {
                    question_id: Uuid::new_v4(),
                    value: AnswerValue::Split(BTreeMap::from([("gold".to_owned(), 100.0)])),
                },
            ],
            receipt_hash: "ab".repeat(32),
        };

        let rows = answer_rows(&submission);
        let scalar = rows.first().expect("scalar row");
        let complex = rows.get(1).expect("complex row");
        assert_eq!(scalar.answer_value.as_deref(), Some("18ct"));
        assert!(scalar.answer_values.is_none());
        assert!(complex.answer_value.is_none());
        assert_eq!(complex.answer_values, Some(json!({ "gold": 100.0 })));
    }
}
