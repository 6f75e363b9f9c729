use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::TerminalError;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the configured level. Fails if a subscriber is
/// already installed, which callers in tests may ignore.
pub fn init_logging(config: &LoggingConfig) -> Result<(), TerminalError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| TerminalError::Logging(e.to_string()))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format.as_str() {
        "json" => registry.with(fmt::layer().json().with_target(true)).try_init(),
        "text" => registry.with(fmt::layer().with_target(true)).try_init(),
        other => {
            return Err(TerminalError::Logging(format!("unknown log format {other:?}")));
        }
    };
    result.map_err(|e| TerminalError::Logging(e.to_string()))
}
