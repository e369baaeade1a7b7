//! PostgreSQL-backed `AggregateCacheRepository` implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use tracing::warn;

use crate::domain::ports::{AggregateCacheRepository, AggregateCacheRepositoryError};
use crate::domain::{AggregateCacheEntry, AggregateCacheKey, Aggregation, CacheDimensions};

use super::diesel_error_mapping::{count_from_db, map_basic_diesel_error, pool_error_message};
use super::models::{AggregateCacheRow, NewAggregateCacheRow};
use super::pool::{DbPool, PoolError};
use super::schema::aggregates_cache;

/// Diesel-backed implementation of the `AggregateCacheRepository` port.
#[derive(Clone)]
pub struct DieselAggregateCacheRepository {
    pool: DbPool,
}

impl DieselAggregateCacheRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> AggregateCacheRepositoryError {
    AggregateCacheRepositoryError::connection(pool_error_message(error))
}

fn map_diesel_error(error: diesel::result::Error) -> AggregateCacheRepositoryError {
    map_basic_diesel_error(
        &error,
        AggregateCacheRepositoryError::query,
        AggregateCacheRepositoryError::connection,
    )
}

fn to_row(entry: &AggregateCacheEntry) -> Result<NewAggregateCacheRow, AggregateCacheRepositoryError> {
    let encode_failed = |error: serde_json::Error| {
        AggregateCacheRepositoryError::query(format!(
            "failed to encode cache entry {}: {error}",
            entry.key
        ))
    };
    Ok(NewAggregateCacheRow {
        cache_key: entry.key.as_str().to_owned(),
        dimensions: serde_json::to_value(&entry.dimensions).map_err(encode_failed)?,
        result: serde_json::to_value(&entry.aggregation.result).map_err(encode_failed)?,
        response_count: i64::try_from(entry.aggregation.response_count).unwrap_or(i64::MAX),
        computed_at: entry.computed_at,
    })
}

fn to_entry(row: AggregateCacheRow) -> Result<AggregateCacheEntry, AggregateCacheRepositoryError> {
    let corrupt = |error: serde_json::Error| {
        warn!(cache_key = %row.cache_key, %error, "undecodable aggregate cache row");
        AggregateCacheRepositoryError::corrupt(row.cache_key.as_str())
    };
    let dimensions: CacheDimensions =
        serde_json::from_value(row.dimensions.clone()).map_err(corrupt)?;
    let result: BTreeMap<String, f64> =
        serde_json::from_value(row.result.clone()).map_err(corrupt)?;
    Ok(AggregateCacheEntry {
        key: AggregateCacheKey::from_stored(row.cache_key),
        dimensions,
        aggregation: Aggregation {
            result,
            response_count: count_from_db(row.response_count),
        },
        computed_at: row.computed_at,
    })
}

#[async_trait]
impl AggregateCacheRepository for DieselAggregateCacheRepository {
    async fn find(
        &self,
        key: &AggregateCacheKey,
    ) -> Result<Option<AggregateCacheEntry>, AggregateCacheRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<AggregateCacheRow> = aggregates_cache::table
            .filter(aggregates_cache::cache_key.eq(key.as_str()))
            .select(AggregateCacheRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(to_entry).transpose()
    }

    async fn upsert(
        &self,
        entry: &AggregateCacheEntry,
    ) -> Result<(), AggregateCacheRepositoryError> {
        let row = to_row(entry)?;
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(aggregates_cache::table)
            .values(&row)
            .on_conflict(aggregates_cache::cache_key)
            .do_update()
            .set((
                aggregates_cache::dimensions.eq(excluded(aggregates_cache::dimensions)),
                aggregates_cache::result.eq(excluded(aggregates_cache::result)),
                aggregates_cache::response_count.eq(excluded(aggregates_cache::response_count)),
                aggregates_cache::computed_at.eq(excluded(aggregates_cache::computed_at)),
            ))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(())
    }

    async fn replace_all(
        &self,
        entries: &[AggregateCacheEntry],
    ) -> Result<usize, AggregateCacheRepositoryError> {
        let rows = entries
            .iter()
            .map(to_row)
            .collect::<Result<Vec<_>, _>>()?;
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction(|conn| {
            async move {
                diesel::delete(aggregates_cache::table).execute(conn).await?;
                let mut written = 0;
                // Keep each statement well under the bind-parameter limit.
                for chunk in rows.chunks(1_000) {
                    written += diesel::insert_into(aggregates_cache::table)
                        .values(chunk)
                        .execute(conn)
                        .await?;
                }
                Ok::<_, diesel::result::Error>(written)
            }
            .scope_boxed()
        })
        .await
        .map_err(map_diesel_error)
    }

    async fn list_recent(
        &self,
        limit: usize,
    ) -> Result<Vec<AggregateCacheEntry>, AggregateCacheRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<AggregateCacheRow> = aggregates_cache::table
            .order(aggregates_cache::computed_at.desc())
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .select(AggregateCacheRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(to_entry).collect()
    }
}
