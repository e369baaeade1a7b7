//! Port for the aggregate cache table.
//!
//! The cache is a derived view. Only the aggregation service writes to it
//! and every row can be recomputed from raw answers.

use async_trait::async_trait;

use crate::domain::{AggregateCacheEntry, AggregateCacheKey};

use super::define_port_error;

define_port_error! {
    /// Errors raised by aggregate cache adapters.
    pub enum AggregateCacheRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "aggregate cache connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "aggregate cache query failed: {message}",
        /// Stored row could not be decoded.
        Corrupt { key: String } => "aggregate cache row {key} is corrupt",
    }
}

/// Storage for precomputed aggregations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AggregateCacheRepository: Send + Sync {
    /// Fetch one entry by key.
    async fn find(
        &self,
        key: &AggregateCacheKey,
    ) -> Result<Option<AggregateCacheEntry>, AggregateCacheRepositoryError>;

    /// Insert or overwrite the entry with the same key.
    async fn upsert(&self, entry: &AggregateCacheEntry)
    -> Result<(), AggregateCacheRepositoryError>;

    /// Atomically replace the whole cache with `entries`.
    ///
    /// Returns the number of rows written.
    async fn replace_all(
        &self,
        entries: &[AggregateCacheEntry],
    ) -> Result<usize, AggregateCacheRepositoryError>;

    /// Most recently computed entries, newest first.
    async fn list_recent(
        &self,
        limit: usize,
    ) -> Result<Vec<AggregateCacheEntry>, AggregateCacheRepositoryError>;
}
