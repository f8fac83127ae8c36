//! Logging init for the werkscan CLI: stderr plus an optional plain file.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "werkscan=info,werkscan_engine=info";
const VERBOSE_LOG_FILTER: &str = "werkscan=debug,werkscan_engine=debug";

fn filter(verbose: bool) -> EnvFilter {
    let base = if verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(base))
}

/// Initialize tracing. RUST_LOG overrides the built-in filters.
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(filter(verbose)),
    );

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(Mutex::new(file))
                        .with_ansi(false)
                        .with_filter(filter(verbose)),
                )
                .init();
        }
        None => registry.init(),
    }
    Ok(())
}
