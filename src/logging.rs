//! Terminal logging with progress bars.

use tracing::Level;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Installs the global subscriber. Log lines are printed above the live
/// progress bars; `RUST_LOG` overrides the default `info` level.
///
/// Calling this more than once is harmless, later calls are ignored.
pub fn init_logging() {
    let indicatif = IndicatifLayer::new();

    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let fmt = fmt::layer()
        .with_target(false)
        .with_writer(indicatif.get_stderr_writer());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt)
        .with(indicatif)
        .try_init()
        .ok();
}
