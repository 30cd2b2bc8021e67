//! Tracing setup for binaries and demos built on this crate

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn level_for(verbosity: u8) -> tracing::Level {
    match verbosity {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    }
}

/// Install a formatted subscriber at the given verbosity (0..=3)
///
/// `RUST_LOG` overrides the level when set. Calling this more than once is
/// harmless; later calls leave the first subscriber in place.
pub fn init_tracing(verbosity: u8) {
    let level = level_for(verbosity);

    // Allow RUST_LOG to override if set
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .try_init();
}

/// Like [`init_tracing`], but emits one JSON object per event
pub fn init_json_tracing(verbosity: u8) {
    let level = level_for(verbosity);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().json())
        .with(filter)
        .try_init();
}
