//! Logging initialization for the cluster engine.

use crate::config::{GlobalConfig, LogFormat};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber from the engine's log settings.
///
/// `RUST_LOG` wins when set. Returns false when a subscriber was already
/// installed (the settings of the first caller stay in effect), so an
/// embedding proxy that configures tracing itself is left alone.
pub fn init_logging(config: &GlobalConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));

    let registry = tracing_subscriber::registry().with(filter);
    let events = fmt::layer().with_target(true);

    match config.log_format {
        LogFormat::Json => registry
            .with(events.json().flatten_event(true))
            .try_init()
            .is_ok(),
        LogFormat::Pretty => registry.with(events.pretty()).try_init().is_ok(),
    }
}

/// Filter directives for the configured level.
///
/// At debug and trace the health checkers emit one line per failed probe,
/// per node, per tick; while a backend is down that drowns out the topology
/// log, so probe logging stays at info unless opted into via `RUST_LOG`.
fn filter_directives(config: &GlobalConfig) -> String {
    let mut directives = config.log_level.clone();
    if matches!(config.log_level.as_str(), "debug" | "trace") {
        directives.push_str(",rustmc::health::checker=info");
    }
    directives
}
