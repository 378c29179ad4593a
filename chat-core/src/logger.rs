//! Tracing initialization: console and log file share one fmt layer (level, target, spans, fields).
//!
//! Without `RUST_LOG` the engine crates log at debug (reconciliation and recount steps) and
//! sqlx statement logging is cut down to warnings.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{
    fmt::format::FmtSpan,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

/// Directives used when `RUST_LOG` is unset or unparseable.
pub const DEFAULT_FILTER: &str = "info,chat_sync=debug,change_feed=debug,storage=info,sqlx=warn";

/// Installs the global tracing subscriber.
/// Output is tee'd to stdout and `log_file_path` (append mode; parent directories are created).
/// The level comes from `RUST_LOG` (e.g. info, debug, chat_sync=trace) and defaults to
/// [`DEFAULT_FILTER`].
/// Load `.env` before calling this, otherwise `RUST_LOG` from the file is not seen.
pub fn init_tracing(log_file_path: &str) -> anyhow::Result<()> {
    if let Some(parent) = Path::new(log_file_path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)?;
    let file = Arc::new(file);

    let env_filter = env_filter();

    use tracing_subscriber::fmt::writer::MakeWriterExt;
    let writer = io::stdout.and(file);

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    Registry::default()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set global subscriber: {}", e))?;

    Ok(())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_raises_engine_crates() {
        let rendered = EnvFilter::new(DEFAULT_FILTER).to_string().to_lowercase();

        assert!(rendered.contains("chat_sync=debug"));
        assert!(rendered.contains("sqlx=warn"));
    }
}
