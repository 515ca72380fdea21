//! Tracing bootstrap for embedded deployments whose host process has no
//! subscriber of its own.

use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{GraphError, Result};

/// Installs the process-wide subscriber. `directives` seeds the filter;
/// a `RUST_LOG` value in the environment takes precedence over it.
/// Fails when the directives do not parse or a subscriber is already
/// installed.
pub fn init_logging(directives: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directives))
        .map_err(|e| GraphError::InvalidArgument(format!("bad log filter: {e}")))?;
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|_| {
            GraphError::InvalidArgument("a tracing subscriber is already installed".into())
        })
}
