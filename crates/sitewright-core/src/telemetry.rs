//! Process-wide tracing setup for the daemon.
//!
//! [`init_tracing`] installs one global subscriber: an `EnvFilter` driven by
//! `RUST_LOG` in front of a human-readable or JSON formatter. Only the first
//! call in a process has an effect.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Log line format, selected with `LOG_FORMAT` / `--log-format`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Compact single-line text.
    #[default]
    Text,
    /// Newline-delimited JSON with event fields flattened to the top level
    /// and the enclosing build span attached.
    Json,
}

/// Install the global subscriber.
///
/// `level` is the default verbosity when `RUST_LOG` is unset or invalid.
pub fn init_tracing(format: LogFormat, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let base = fmt::layer().with_target(false);
    let formatter = match format {
        LogFormat::Json => base
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Text => base.compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(formatter)
        .try_init()
        .ok();
}
