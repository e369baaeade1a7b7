//! PostgreSQL-backed `SubmissionStatsQuery` implementation.
//!
//! One grouped query returns a count per (sector, period, size band) cell;
//! the breakdowns are folded from those cells.

use std::collections::BTreeMap;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::{BigInt, Int2, Int4, Nullable, Text};
use diesel_async::RunQueryDsl;
use tracing::warn;

use crate::domain::ports::{
    PeriodCount, SubmissionCountFilter, SubmissionCounts, SubmissionStatsQuery,
    SubmissionStatsQueryError,
};
use crate::domain::{Sector, SizeBand};

use super::diesel_error_mapping::{count_from_db, map_basic_diesel_error, pool_error_message};
use super::pool::{DbPool, PoolError};

const COUNTS_SQL: &str = r#"
SELECT sector, year, quarter, size_band, COUNT(*) AS submissions
FROM submissions
WHERE ($1::text IS NULL OR sector = $1)
  AND ($2::int4 IS NULL OR year = $2)
  AND ($3::int2 IS NULL OR quarter = $3)
  AND ($4::text IS NULL OR size_band = $4)
GROUP BY sector, year, quarter, size_band
"#;

/// Diesel-backed implementation of the `SubmissionStatsQuery` port.
#[derive(Clone)]
pub struct DieselSubmissionStatsQuery {
    pool: DbPool,
}

impl DieselSubmissionStatsQuery {
    /// Create a new query adapter with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, QueryableByName)]
struct CountCell {
    #[diesel(sql_type = Text)]
    sector: String,
    #[diesel(sql_type = Int4)]
    year: i32,
    #[diesel(sql_type = Int2)]
    quarter: i16,
    #[diesel(sql_type = Text)]
    size_band: String,
    #[diesel(sql_type = BigInt)]
    submissions: i64,
}

fn map_pool_error(error: PoolError) -> SubmissionStatsQueryError {
    SubmissionStatsQueryError::connection(pool_error_message(error))
}

fn map_diesel_error(error: diesel::result::Error) -> SubmissionStatsQueryError {
    map_basic_diesel_error(
        &error,
        SubmissionStatsQueryError::query,
        SubmissionStatsQueryError::connection,
    )
}

fn fold_cells(cells: Vec<CountCell>) -> SubmissionCounts {
    let mut counts = SubmissionCounts::default();
    let mut by_period: BTreeMap<(i32, u8), u64> = BTreeMap::new();

    for cell in cells {
        let count = count_from_db(cell.submissions);
        counts.total += count;

        match cell.sector.parse::<Sector>() {
            Ok(sector) => *counts.by_sector.entry(sector).or_default() += count,
            Err(error) => warn!(sector = %cell.sector, %error, "uncounted sector"),
        }
        match u8::try_from(cell.quarter) {
            Ok(quarter) => *by_period.entry((cell.year, quarter)).or_default() += count,
            Err(error) => warn!(quarter = cell.quarter, %error, "uncounted quarter"),
        }
        match SizeBand::new(&cell.size_band) {
            Ok(band) => *counts.by_size_band.entry(band).or_default() += count,
            Err(error) => warn!(size_band = %cell.size_band, %error, "uncounted size band"),
        }
    }

    counts.by_period = by_period
        .into_iter()
        .map(|((year, quarter), count)| PeriodCount {
            year,
            quarter,
            count,
        })
        .collect();
    counts
}

#[async_trait]
impl SubmissionStatsQuery for DieselSubmissionStatsQuery {
    async fn counts(
        &self,
        filter: &SubmissionCountFilter,
    ) -> Result<SubmissionCounts, SubmissionStatsQueryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let cells: Vec<CountCell> = sql_query(COUNTS_SQL)
            .bind::<Nullable<Text>, _>(filter.sector.map(Sector::as_str))
            .bind::<Nullable<Int4>, _>(filter.year)
            .bind::<Nullable<Int2>, _>(filter.quarter.map(i16::from))
            .bind::<Nullable<Text>, _>(filter.size_band.as_ref().map(SizeBand::as_str))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(fold_cells(cells))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn cell(sector: &str, year: i32, quarter: i16, band: &str, n: i64) -> CountCell {
        CountCell {
            sector: sector.to_owned(),
            year,
            quarter,
            size_band: band.to_owned(),
            submissions: n,
        }
    }

    #[rstest]
    fn cells_fold_into_every_breakdown() {
        let counts = fold_cells(vec![
            cell("retailers", 2025, 2, "1-9", 3),
            cell("retailers", 2025, 1, "10-49", 2),
            cell("refiners", 2025, 2, "1-9", 4),
        ]);

        assert_eq!(counts.total, 9);
        assert_eq!(counts.by_sector.get(&Sector::Retailers), Some(&5));
        assert_eq!(counts.by_sector.get(&Sector::Refiners), Some(&4));
        assert_eq!(
            counts.by_period,
            vec![
                PeriodCount { year: 2025, quarter: 1, count: 2 },
                PeriodCount { year: 2025, quarter: 2, count: 7 },
            ]
        );
        let small = SizeBand::new("1-9").expect("valid band");
        assert_eq!(counts.by_size_band.get(&small), Some(&7));
    }

    #[rstest]
    fn unknown_sectors_still_count_towards_the_total() {
        let counts = fold_cells(vec![cell("jewellers", 2024, 4, "50+", 1)]);
        assert_eq!(counts.total, 1);
        assert!(counts.by_sector.is_empty());
    }

    #[rstest]
    fn no_cells_mean_zero_counts() {
        assert_eq!(fold_cells(Vec::new()), SubmissionCounts::default());
    }
}
