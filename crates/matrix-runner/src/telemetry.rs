//! Logging setup for binaries and test harnesses embedding the runner

use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,matrix_runner=debug";

/// Initialize logging with a default filter.
///
/// Use the `RUST_LOG` environment variable to override [`DEFAULT_FILTER`].
/// Calling this more than once, or after another subscriber was installed,
/// is a no-op.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
