//! Prometheus adapter for cache refresh outcomes.

use async_trait::async_trait;
use prometheus::{CounterVec, Opts, Registry};

use crate::domain::ports::{CacheRefreshMetrics, CacheRefreshMetricsError, RefreshScope};

const METRIC_NAME: &str = "survey_cache_refresh_total";

/// Counts cache refresh outcomes.
///
/// # Exported series
///
/// - **Name**: `survey_cache_refresh_total`
/// - **Type**: Counter
/// - **Labels**:
///   - `outcome`: `succeeded` or `failed`
///   - `scope`: `sector`, `size_band`, or `job`
pub struct PrometheusCacheRefreshMetrics {
    refresh_total: CounterVec,
}

impl PrometheusCacheRefreshMetrics {
    /// Create and register the counter with `registry`.
    ///
    /// # Errors
    ///
    /// Fails when a metric with the same name is already registered.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let refresh_total = CounterVec::new(
            Opts::new(METRIC_NAME, "Aggregate cache refreshes by outcome and scope"),
            &["outcome", "scope"],
        )?;
        registry.register(Box::new(refresh_total.clone()))?;
        Ok(Self { refresh_total })
    }

    fn record(&self, outcome: &str, scope: RefreshScope) {
        self.refresh_total
            .with_label_values(&[outcome, scope.as_label()])
            .inc();
    }
}

#[async_trait]
impl CacheRefreshMetrics for PrometheusCacheRefreshMetrics {
    async fn record_refreshed(&self, scope: RefreshScope) -> Result<(), CacheRefreshMetricsError> {
        self.record("succeeded", scope);
        Ok(())
    }

    async fn record_failed(&self, scope: RefreshScope) -> Result<(), CacheRefreshMetricsError> {
        self.record("failed", scope);
        Ok(())
    }
}
