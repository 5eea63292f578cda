//! Log output for binaries and tests built on this crate.
//!
//! The crate itself only emits `tracing` events; nothing is printed until a
//! subscriber is installed.

use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{GraphError, Result};

/// Installs a global `fmt` subscriber filtered by `level`.
///
/// `level` uses `EnvFilter` syntax, e.g. `"info"` or
/// `"bsp_graph::comm=debug"`. Fails if a global subscriber is already set.
pub fn init_logging(level: &str) -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(level)
                .map_err(|e| GraphError::InvalidArgument(format!("invalid log filter: {e}")))?,
        )
        .with_target(true)
        .with_thread_names(true)
        .try_init()
        .map_err(|_| GraphError::InvalidArgument("logging already initialized".into()))
}

/// Like [`init_logging`], reading the filter from `RUST_LOG` and falling
/// back to `default_level`. An existing subscriber is left in place.
pub fn try_init_from_env(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
