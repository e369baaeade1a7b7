//! Outbound adapters implementing the domain ports.
//!
//! - **persistence**: PostgreSQL repositories built on Diesel
//! - **cache**: verification attempt counters (in-process and Redis)
//! - **queue**: Tokio-spawned cache refresh jobs
//! - **metrics**: Prometheus exporters (feature `metrics`)

pub mod cache;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod persistence;
pub mod queue;
