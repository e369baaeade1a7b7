//! Tracing subscriber bootstrap for the survey binaries.

use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the JSON `fmt` subscriber filtered by `RUST_LOG`.
///
/// Safe to call more than once; later calls log a warning and leave the
/// first subscriber in place.
pub fn init_tracing() {
    if let Err(error) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %error, "tracing init failed");
    }
}
