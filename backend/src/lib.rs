//! Aggregation core for quarterly sector surveys.
//!
//! `domain` holds the survey model, branching, k-anonymity, aggregation, and
//! the services driving them through ports. `outbound` adapts those ports to
//! PostgreSQL, Redis, Tokio, and Prometheus, and `wiring` assembles the
//! services over them.

pub mod domain;
pub mod outbound;
pub mod settings;
pub mod telemetry;
pub mod wiring;
