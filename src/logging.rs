//! Tracing subscriber setup for the binary
//!
//! Library code only emits `tracing` events; with no subscriber installed
//! those are no-ops.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// `RUST_LOG` wins over the configured level when set
pub fn init_logging(config: &LoggingConfig) {
    let default_filter = format!("recipe_engine={}", config.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());
    let registry = tracing_subscriber::registry().with(filter);

    // Writing to stderr keeps stdout free for JSON results
    let result = if config.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    if let Err(e) = result {
        eprintln!("Logging already initialised: {e}");
    }
}
