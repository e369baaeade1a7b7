//! Port for the destructive administrative reset.

use async_trait::async_trait;
use serde::Serialize;

use super::define_port_error;

define_port_error! {
    /// Errors raised while wiping survey data.
    pub enum DataResetRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "data reset connection failed: {message}",
        /// The transaction failed and was rolled back.
        Query { message: String } => "data reset failed: {message}",
    }
}

/// Rows removed by a reset, per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedCounts {
    pub answers: u64,
    pub receipt_codes: u64,
    pub submissions: u64,
    pub cache_entries: u64,
}

/// Who asked for the reset, recorded in the audit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataResetAudit {
    pub requested_by: String,
}

/// Atomic wipe of respondent data.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataResetRepository: Send + Sync {
    /// Delete all answers, receipt codes, submissions, and cache rows, and
    /// append an audit-log row, in one transaction.
    ///
    /// Survey definitions and earlier audit-log rows are left untouched.
    async fn reset_all(
        &self,
        audit: &DataResetAudit,
    ) -> Result<DeletedCounts, DataResetRepositoryError>;
}
