//! PostgreSQL-backed `AnswerAggregationSource` implementation.
//!
//! Grouping happens in the database so the domain fold only sees one row per
//! distinct stored representation.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::{Array, BigInt, Int2, Int4, Nullable, Text, Uuid as SqlUuid};
use diesel_async::RunQueryDsl;
use tracing::warn;
use uuid::Uuid;

use crate::domain::ports::{AnswerAggregationSource, AnswerAggregationSourceError};
use crate::domain::{AggregationFilter, AnswerGroup, SizeBand};

use super::diesel_error_mapping::{count_from_db, map_basic_diesel_error, pool_error_message};
use super::pool::{DbPool, PoolError};
use super::schema::submissions;

const ANSWER_GROUPS_SQL: &str = r#"
SELECT a.answer_value AS answer_value,
       a.answer_values::text AS answer_values_text,
       COUNT(*) AS row_count,
       array_agg(DISTINCT a.submission_id) AS submission_ids
FROM answers a
JOIN submissions s ON s.id = a.submission_id
WHERE a.question_id = $1
  AND s.survey_id = $2
  AND s.sector = $3
  AND s.year = $4
  AND s.quarter = $5
  AND ($6::text IS NULL OR s.size_band = $6)
GROUP BY a.answer_value, a.answer_values::text
"#;

/// Diesel-backed implementation of the `AnswerAggregationSource` port.
#[derive(Clone)]
pub struct DieselAnswerAggregationSource {
    pool: DbPool,
}

impl DieselAnswerAggregationSource {
    /// Create a new source with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, QueryableByName)]
struct AnswerGroupRow {
    #[diesel(sql_type = Nullable<Text>)]
    answer_value: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    answer_values_text: Option<String>,
    #[diesel(sql_type = BigInt)]
    row_count: i64,
    #[diesel(sql_type = Array<SqlUuid>)]
    submission_ids: Vec<Uuid>,
}

impl From<AnswerGroupRow> for AnswerGroup {
    fn from(row: AnswerGroupRow) -> Self {
        Self {
            value: row.answer_value,
            values: row.answer_values_text,
            row_count: count_from_db(row.row_count),
            submission_ids: row.submission_ids,
        }
    }
}

fn map_pool_error(error: PoolError) -> AnswerAggregationSourceError {
    AnswerAggregationSourceError::connection(pool_error_message(error))
}

fn map_diesel_error(error: diesel::result::Error) -> AnswerAggregationSourceError {
    map_basic_diesel_error(
        &error,
        AnswerAggregationSourceError::query,
        AnswerAggregationSourceError::connection,
    )
}

/// Parse stored size bands, skipping any that no longer validate.
fn parse_size_bands(raw: Vec<String>) -> Vec<SizeBand> {
    let mut bands: Vec<SizeBand> = raw
        .into_iter()
        .filter_map(|value| match SizeBand::new(&value) {
            Ok(band) => Some(band),
            Err(error) => {
                warn!(size_band = %value, %error, "skipping unparseable size band");
                None
            }
        })
        .collect();
    bands.sort();
    bands.dedup();
    bands
}

#[async_trait]
impl AnswerAggregationSource for DieselAnswerAggregationSource {
    async fn answer_groups(
        &self,
        question_id: Uuid,
        filter: &AggregationFilter,
    ) -> Result<Vec<AnswerGroup>, AnswerAggregationSourceError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<AnswerGroupRow> = sql_query(ANSWER_GROUPS_SQL)
            .bind::<SqlUuid, _>(question_id)
            .bind::<SqlUuid, _>(filter.survey_id)
            .bind::<Text, _>(filter.sector.as_str())
            .bind::<Int4, _>(filter.period.year())
            .bind::<Int2, _>(i16::from(filter.period.quarter()))
            .bind::<Nullable<Text>, _>(filter.size_band.as_ref().map(SizeBand::as_str))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(rows.into_iter().map(AnswerGroup::from).collect())
    }

    async fn distinct_size_bands(
        &self,
        survey_id: Uuid,
    ) -> Result<Vec<SizeBand>, AnswerAggregationSourceError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let raw: Vec<String> = submissions::table
            .filter(submissions::survey_id.eq(survey_id))
            .select(submissions::size_band)
            .distinct()
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(parse_size_bands(raw))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn group_rows_keep_both_columns_verbatim() {
        let id = Uuid::new_v4();
        let group = AnswerGroup::from(AnswerGroupRow {
            answer_value: None,
            answer_values_text: Some(r#"["a", "b"]"#.to_owned()),
            row_count: 3,
            submission_ids: vec![id],
        });
        assert_eq!(group.value, None);
        assert_eq!(group.values.as_deref(), Some(r#"["a", "b"]"#));
        assert_eq!(group.row_count, 3);
        assert_eq!(group.submission_ids, vec![id]);
    }

    #[rstest]
    fn size_bands_are_sorted_and_invalid_ones_dropped() {
        let bands = parse_size_bands(vec![
            "50+".to_owned(),
            "   ".to_owned(),
            "1-9".to_owned(),
            "1-9".to_owned(),
        ]);
        let names: Vec<&str> = bands.iter().map(SizeBand::as_str).collect();
        assert_eq!(names, vec!["1-9", "50+"]);
    }
}
