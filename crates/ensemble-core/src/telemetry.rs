//! Centralised tracing initialisation for hosts embedding the engine.
//!
//! Call [`init_tracing`] once at program start to configure the global
//! subscriber with an `EnvFilter` and optional JSON formatting.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global tracing subscriber.
///
/// * `json` — emit newline-delimited JSON log lines.
/// * `level` — verbosity for `ensemble_core` when `RUST_LOG` is not set;
///   other crates log at `warn`.
///
/// Only the first call in a process takes effect; later calls are ignored.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = if json {
        registry
            .with(fmt::layer().with_target(false).json())
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };

    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Filter used when `RUST_LOG` is unset.
fn default_directives(level: Level) -> String {
    format!("warn,{}={}", env!("CARGO_CRATE_NAME"), level.as_str().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_scope_the_crate() {
        assert_eq!(default_directives(Level::DEBUG), "warn,ensemble_core=debug");
        assert!(default_directives(Level::INFO)
            .parse::<EnvFilter>()
            .is_ok());
    }

    #[test]
    fn test_init_tracing_twice_is_harmless() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
        tracing::info!(event = "telemetry.ready", "subscriber installed");
    }
}
