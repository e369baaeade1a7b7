//! PostgreSQL-backed `DataResetRepository` implementation.
//!
//! Child tables are emptied before their parents so foreign keys never
//! block the wipe. The audit row is written in the same transaction.

use async_trait::async_trait;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde_json::json;

use crate::domain::ports::{
    DataResetAudit, DataResetRepository, DataResetRepositoryError, DeletedCounts,
};

use super::diesel_error_mapping::{map_basic_diesel_error, pool_error_message};
use super::models::NewAuditLogRow;
use super::pool::{DbPool, PoolError};
use super::schema::{admin_audit_log, aggregates_cache, answers, receipt_codes, submissions};

const RESET_ACTION: &str = "reset_all_survey_data";

/// Diesel-backed implementation of the `DataResetRepository` port.
#[derive(Clone)]
pub struct DieselDataResetRepository {
    pool: DbPool,
}

impl DieselDataResetRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> DataResetRepositoryError {
    DataResetRepositoryError::connection(pool_error_message(error))
}

fn map_diesel_error(error: diesel::result::Error) -> DataResetRepositoryError {
    map_basic_diesel_error(
        &error,
        DataResetRepositoryError::query,
        DataResetRepositoryError::connection,
    )
}

fn as_count(rows: usize) -> u64 {
    u64::try_from(rows).unwrap_or(u64::MAX)
}

#[async_trait]
impl DataResetRepository for DieselDataResetRepository {
    async fn reset_all(
        &self,
        audit: &DataResetAudit,
    ) -> Result<DeletedCounts, DataResetRepositoryError> {
        let actor = audit.requested_by.as_str();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction(|conn| {
            async move {
                let counts = DeletedCounts {
                    answers: as_count(diesel::delete(answers::table).execute(conn).await?),
                    receipt_codes: as_count(
                        diesel::delete(receipt_codes::table).execute(conn).await?,
                    ),
                    submissions: as_count(diesel::delete(submissions::table).execute(conn).await?),
                    cache_entries: as_count(
                        diesel::delete(aggregates_cache::table).execute(conn).await?,
                    ),
                };
                diesel::insert_into(admin_audit_log::table)
                    .values(&NewAuditLogRow {
                        actor,
                        action: RESET_ACTION,
                        details: json!({ "deleted": counts }),
                    })
                    .execute(conn)
                    .await?;
                Ok::<_, diesel::result::Error>(counts)
            }
            .scope_boxed()
        })
        .await
        .map_err(map_diesel_error)
    }
}
