//! Read side for dashboards and exports.
//!
//! Distributions come only from the aggregate cache and always pass through
//! the k-anonymity guard. Submission totals are live and unsuppressed.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::aggregation::map_cache_error;
use super::ports::{
    AggregateCacheRepository, SubmissionCountFilter, SubmissionCounts, SubmissionStatsQuery,
    SubmissionStatsQueryError, port_failure,
};
use super::{
    AggregateCacheEntry, AggregateCacheKey, Aggregation, CacheDimensions, DefaultKAnonymityEnv,
    DimensionTuple, Error, KAnonResult, KAnonymityEnv, KAnonymityGuard,
};

/// Upper bound for one listing page.
pub const MAX_RECENT_DISTRIBUTIONS: usize = 500;

/// One guarded cache entry for a listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardedDistribution {
    pub key: AggregateCacheKey,
    pub dimensions: CacheDimensions,
    pub computed_at: DateTime<Utc>,
    #[serde(flatten)]
    pub result: KAnonResult<BTreeMap<String, f64>>,
}

fn map_stats_error(error: SubmissionStatsQueryError) -> Error {
    port_failure("submission stats", &error)
}

/// Serves cached distributions and live submission totals.
#[derive(Clone)]
pub struct ReportingService<C, Q, E = DefaultKAnonymityEnv> {
    cache: Arc<C>,
    stats: Arc<Q>,
    guard: KAnonymityGuard<E>,
}

impl<C, Q, E> ReportingService<C, Q, E> {
    pub fn new(cache: Arc<C>, stats: Arc<Q>, guard: KAnonymityGuard<E>) -> Self {
        Self {
            cache,
            stats,
            guard,
        }
    }
}

impl<C, Q, E> ReportingService<C, Q, E>
where
    C: AggregateCacheRepository,
    Q: SubmissionStatsQuery,
    E: KAnonymityEnv,
{
    /// Guarded distribution for one dimension tuple. Uncached tuples read
    /// as zero responses and are therefore suppressed.
    pub async fn distribution(
        &self,
        tuple: &DimensionTuple,
    ) -> Result<KAnonResult<BTreeMap<String, f64>>, Error> {
        let aggregation = self
            .cache
            .find(&tuple.cache_key())
            .await
            .map_err(map_cache_error)?
            .map_or_else(Aggregation::empty, |entry| entry.aggregation);
        Ok(self
            .guard
            .check(aggregation.result, aggregation.response_count))
    }

    /// Most recently computed cache entries, newest first, each guarded.
    ///
    /// `limit` is clamped to [`MAX_RECENT_DISTRIBUTIONS`].
    pub async fn recent_distributions(
        &self,
        limit: usize,
    ) -> Result<Vec<GuardedDistribution>, Error> {
        let entries = self
            .cache
            .list_recent(limit.min(MAX_RECENT_DISTRIBUTIONS))
            .await
            .map_err(map_cache_error)?;
        Ok(entries
            .into_iter()
            .map(|entry| self.guard_entry(entry))
            .collect())
    }

    fn guard_entry(&self, entry: AggregateCacheEntry) -> GuardedDistribution {
        let AggregateCacheEntry {
            key,
            dimensions,
            aggregation,
            computed_at,
        } = entry;
        GuardedDistribution {
            key,
            dimensions,
            computed_at,
            result: self
                .guard
                .check(aggregation.result, aggregation.response_count),
        }
    }

    /// Live submission totals. Not suppressed: counts alone do not
    /// identify a respondent.
    pub async fn submission_counts(
        &self,
        filter: &SubmissionCountFilter,
    ) -> Result<SubmissionCounts, Error> {
        self.stats.counts(filter).await.map_err(map_stats_error)
    }
}
