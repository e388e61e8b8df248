//! Subscriber setup for the binary.

use swplug_core::config::LoggingConfig;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter directives when `RUST_LOG` is unset.
///
/// `--verbose` forces `debug`; otherwise the configured level (or `info`)
/// is used. Per-target filters are appended after the level.
pub fn directives(verbose: bool, logging: &LoggingConfig) -> String {
    let level = if verbose {
        "debug"
    } else {
        logging.level.as_deref().unwrap_or("info")
    };
    std::iter::once(level)
        .chain(logging.filters.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn init(verbose: bool, logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(directives(verbose, logging))?,
    };
    let registry = tracing_subscriber::registry().with(filter);
    let json = logging.format == "json";
    let stdout = logging.output == "stdout";

    match (json, stdout) {
        (true, true) => registry
            .with(fmt::layer().json().with_writer(std::io::stdout))
            .try_init()?,
        (true, false) => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?,
        (false, true) => registry
            .with(fmt::layer().with_writer(std::io::stdout))
            .try_init()?,
        (false, false) => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()?,
    }
    Ok(())
}
