//! Port for dispatching cache refreshes after a submission commits.
//!
//! Dispatch is fire-and-forget: adapters report only whether the job was
//! accepted, never how the refresh went.

use async_trait::async_trait;

use crate::domain::RefreshRequest;

use super::define_port_error;

define_port_error! {
    /// Errors raised when a refresh cannot be queued.
    pub enum CacheRefreshQueueError {
        /// The queue refused the job.
        Rejected { message: String } => "cache refresh was not queued: {message}",
    }
}

/// Accepts refresh jobs for background execution.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheRefreshQueue: Send + Sync {
    /// Queue a refresh for the given submission dimensions.
    async fn enqueue(&self, request: RefreshRequest) -> Result<(), CacheRefreshQueueError>;
}
