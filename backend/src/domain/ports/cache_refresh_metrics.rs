//! Domain port surface for recording cache refresh outcomes.
//!
//! Operators watch these counts to spot dimensions that keep failing to
//! refresh. Implementations may export to Prometheus or discard everything.

use async_trait::async_trait;

use super::define_port_error;

define_port_error! {
    /// Errors exposed when recording cache refresh metrics.
    pub enum CacheRefreshMetricsError {
        /// Metric exporter rejected the write.
        Export { message: String } => "cache refresh metrics exporter failed: {message}",
    }
}

/// Which slice a refresh outcome refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshScope {
    /// A sector-wide entry.
    SectorWide,
    /// A size-band entry.
    SizeBand,
    /// A whole refresh job, before any entry was attempted.
    Job,
}

impl RefreshScope {
    /// Metric label value.
    pub fn as_label(self) -> &'static str {
        match self {
            Self::SectorWide => "sector",
            Self::SizeBand => "size_band",
            Self::Job => "job",
        }
    }
}

/// Metrics recording port for cache refresh outcomes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheRefreshMetrics: Send + Sync {
    /// Record a successfully refreshed entry.
    async fn record_refreshed(&self, scope: RefreshScope) -> Result<(), CacheRefreshMetricsError>;

    /// Record a failed refresh.
    async fn record_failed(&self, scope: RefreshScope) -> Result<(), CacheRefreshMetricsError>;
}

/// No-op implementation for when metrics are disabled or in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpCacheRefreshMetrics;

#[async_trait]
impl CacheRefreshMetrics for NoOpCacheRefreshMetrics {
    async fn record_refreshed(&self, _scope: RefreshScope) -> Result<(), CacheRefreshMetricsError> {
        Ok(())
    }

    async fn record_failed(&self, _scope: RefreshScope) -> Result<(), CacheRefreshMetricsError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! Ensures the no-op recorder accepts every scope.
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(RefreshScope::SectorWide)]
    #[case(RefreshScope::SizeBand)]
    #[case(RefreshScope::Job)]
    #[tokio::test]
    async fn noop_accepts_all_scopes(#[case] scope: RefreshScope) {
        let metrics = NoOpCacheRefreshMetrics;
        assert!(metrics.record_refreshed(scope).await.is_ok());
        assert!(metrics.record_failed(scope).await.is_ok());
    }

    #[rstest]
    fn labels_are_distinct() {
        let labels = [
            RefreshScope::SectorWide.as_label(),
            RefreshScope::SizeBand.as_label(),
            RefreshScope::Job.as_label(),
        ];
        assert_eq!(labels, ["sector", "size_band", "job"]);
    }
}
