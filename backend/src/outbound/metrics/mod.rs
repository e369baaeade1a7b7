//! Prometheus exporters for domain metrics ports.
//!
//! Only compiled with the `metrics` feature.

mod prometheus_cache_refresh;

pub use prometheus_cache_refresh::PrometheusCacheRefreshMetrics;
