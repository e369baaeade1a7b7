//! In-process cache refresh queue backed by the Tokio runtime.
//!
//! Each accepted request becomes a spawned task that waits for a semaphore
//! permit, so at most `concurrency` refreshes touch the database at once.
//! Outcomes are logged and never reported to the submitter.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::domain::ports::{
    AggregateCacheRepository, AnswerAggregationSource, CacheRefreshMetrics, CacheRefreshQueue,
    CacheRefreshQueueError, SurveyRepository,
};
use crate::domain::{AggregationService, RefreshRequest};

/// Spawns post-submission cache refreshes onto the current Tokio runtime.
pub struct TokioCacheRefreshQueue<S, A, C, M> {
    service: Arc<AggregationService<S, A, C, M>>,
    permits: Arc<Semaphore>,
}

impl<S, A, C, M> Clone for TokioCacheRefreshQueue<S, A, C, M> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            permits: Arc::clone(&self.permits),
        }
    }
}

impl<S, A, C, M> TokioCacheRefreshQueue<S, A, C, M> {
    /// Create a queue running at most `concurrency` refreshes at a time.
    /// Zero is treated as one.
    pub fn new(service: Arc<AggregationService<S, A, C, M>>, concurrency: usize) -> Self {
        Self {
            service,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }
}

#[async_trait]
impl<S, A, C, M> CacheRefreshQueue for TokioCacheRefreshQueue<S, A, C, M>
where
    S: SurveyRepository + 'static,
    A: AnswerAggregationSource + 'static,
    C: AggregateCacheRepository + 'static,
    M: CacheRefreshMetrics + 'static,
{
    async fn enqueue(&self, request: RefreshRequest) -> Result<(), CacheRefreshQueueError> {
        let handle = Handle::try_current()
            .map_err(|err| CacheRefreshQueueError::rejected(err.to_string()))?;
        let service = Arc::clone(&self.service);
        let permits = Arc::clone(&self.permits);

        handle.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                warn!(survey_id = %request.survey_id, "refresh queue closed; job dropped");
                return;
            };
            match service.refresh_cache_for_submission(&request).await {
                Ok(report) if report.failed == 0 => debug!(
                    survey_id = %request.survey_id,
                    refreshed = report.refreshed,
                    "aggregate cache refreshed"
                ),
                Ok(report) => warn!(
                    survey_id = %request.survey_id,
                    refreshed = report.refreshed,
                    failed = report.failed,
                    "aggregate cache partially refreshed"
                ),
                Err(err) => error!(
                    survey_id = %request.survey_id,
                    sector = %request.sector.as_str(),
                    size_band = %request.size_band.as_str(),
                    error = %err,
                    "aggregate cache refresh failed"
                ),
            }
        });
        Ok(())
    }
}
