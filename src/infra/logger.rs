// src/infra/logger.rs — Structured logging with tracing

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. `SPACEPORT_LOG` wins over `RUST_LOG`,
/// and `level` applies when neither is set.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_env("SPACEPORT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level));

    // A second call (e.g. from tests) keeps the first subscriber.
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .try_init();
}
