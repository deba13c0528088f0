// src/logging.rs

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// The persistent log always captures the full diagnostic stream; only the
/// terminal mirror is gated by verbosity.
const FILE_LEVEL: LevelFilter = LevelFilter::DEBUG;

fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "deckhand=debug,info"
    } else {
        "deckhand=info"
    }
}

fn terminal_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)))
}

/// Initializes the two logging sinks: a concise mirror on the terminal and a
/// timestamped, append-only JSON file. Returns the log file path so the
/// operator knows where to look.
pub fn init(verbose: bool) -> Result<PathBuf, String> {
    let log_path = PathBuf::from(format!(
        "deckhand-{}.log",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    ));
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| format!("cannot open log file {}: {}", log_path.display(), e))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_filter(terminal_filter(verbose)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(Arc::new(log_file))
                .with_filter(FILE_LEVEL),
        )
        .init();

    Ok(log_path)
}
