//! Telemetry initialization (structured logging via the `tracing` ecosystem).
//!
//! Log verbosity is controlled with the standard `RUST_LOG` environment
//! variable, e.g. `RUST_LOG=storyforge=debug,tower_http=info`. Defaults to
//! `info` when unset.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the global tracing subscriber.
///
/// Safe to call once per process; returns an error if a subscriber has
/// already been installed.
pub fn init_telemetry() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}
