//! Port for live submission totals.
//!
//! Raw totals are not identifying, so these counts are shown without
//! k-anonymity suppression. Distributions never come through this port.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::{Sector, SizeBand};

use super::define_port_error;

define_port_error! {
    /// Errors raised by submission statistics adapters.
    pub enum SubmissionStatsQueryError {
        /// Connection could not be established.
        Connection { message: String } => "submission stats connection failed: {message}",
        /// Query failed during execution.
        Query { message: String } => "submission stats query failed: {message}",
    }
}

/// Optional exact-match filters; `None` means unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionCountFilter {
    pub sector: Option<Sector>,
    pub year: Option<i32>,
    pub quarter: Option<u8>,
    pub size_band: Option<SizeBand>,
}

/// Live submission totals broken down by dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionCounts {
    pub total: u64,
    pub by_sector: BTreeMap<Sector, u64>,
    /// Ordered by period.
    pub by_period: Vec<PeriodCount>,
    pub by_size_band: BTreeMap<SizeBand, u64>,
}

/// Submissions within one reporting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodCount {
    pub year: i32,
    pub quarter: u8,
    pub count: u64,
}

/// Live count queries over raw submissions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubmissionStatsQuery: Send + Sync {
    /// Totals for submissions matching `filter`.
    async fn counts(
        &self,
        filter: &SubmissionCountFilter,
    ) -> Result<SubmissionCounts, SubmissionStatsQueryError>;
}
