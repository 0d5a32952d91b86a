//! Tracing subscriber setup.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing::Subscriber;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Install the global subscriber described by `config`.
///
/// `RUST_LOG` takes precedence over `config.filter`.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    subscriber(config, std::env::var("RUST_LOG").ok())?
        .try_init()
        .map_err(|e| Error::invalid_config(format!("tracing already initialized: {e}")))
}

/// Build a subscriber writing to the sink chosen by `config`.
pub fn subscriber(
    config: &LoggingConfig,
    rust_log: Option<String>,
) -> Result<impl Subscriber + Send + Sync + 'static> {
    let directives = rust_log
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| config.filter.clone());
    let filter = EnvFilter::try_new(&directives)
        .map_err(|e| Error::invalid_config(format!("invalid log filter '{directives}': {e}")))?;

    let (writer, ansi) = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| Error::io(path, e))?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), config.ansi),
    };

    Ok(tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer).with_ansi(ansi)))
}
