//! Tracing subscriber setup for programs embedding the engine.
//!
//! The engine itself only emits events (`obs`); wiring them to an output
//! is the embedder's call. [`init_tracing`] installs a global subscriber
//! once per process; later calls are no-ops.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable single-line output.
    Text,
    /// Newline-delimited JSON, for log aggregation pipelines.
    Json,
}

/// Install the global tracing subscriber.
///
/// `level` is the default verbosity; the `RUST_LOG` environment variable
/// takes precedence when set. Safe to call more than once — the global
/// subscriber can only be installed once per process, so later calls are
/// silently ignored.
pub fn init_tracing(format: LogFormat, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing(LogFormat::Text, Level::DEBUG);
        init_tracing(LogFormat::Json, Level::INFO);
    }
}
