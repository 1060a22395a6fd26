//! # Logging
//!
//! The crate reports through `tracing`. Libraries embedding it usually install their
//! own subscriber; [`init_logging`] is a convenience for binaries and tests.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "info";

/// Installs a formatting subscriber filtered by `RUST_LOG` (default `info`).
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
///
/// # Example
///
/// ```rust,no_run
/// use runweave::logging::init_logging;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
///   init_logging()?;
///   tracing::info!("pipeline host started");
///   Ok(())
/// }
/// ```
pub fn init_logging() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(true)
    .try_init()
}
