//! Tracing subscriber setup for hosts embedding the connector.

use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    /// `TONLINK_LOG_JSON=1` selects JSON lines
    pub fn from_env() -> Self {
        match std::env::var("TONLINK_LOG_JSON").as_deref() {
            Ok("1") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Install a stderr subscriber using [`LogFormat::from_env`]
pub fn init_logging() {
    init_logging_with(LogFormat::from_env());
}

/// Install a stderr subscriber. Filter from `RUST_LOG` (default `info`).
/// Does nothing if a global subscriber is already set.
pub fn init_logging_with(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
}
