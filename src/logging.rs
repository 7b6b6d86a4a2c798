//! Logging setup and the run-scoped logger handle.
//!
//! The process installs one `tracing` subscriber at startup (console plus an
//! optional log file). Orchestrators never log "globally": each receives a
//! [`RunLogger`] whose span tags every event with the run kind and run id.

use indicatif::ProgressBar;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{Span, field, info, info_span};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Dedupe index builds report progress every this many hashed files.
pub const PROGRESS_EVERY: usize = 500;

/// Level of the log file layer, independent of the console level.
pub const FILE_LOG_LEVEL: &str = "debug";

/// Logger handle owned by one orchestrator call.
pub struct RunLogger {
    span: Span,
    progress: Option<ProgressBar>,
}

impl RunLogger {
    /// Creates a logger for a run of the given kind (`sort`, `replay`, `undo`).
    pub fn new(kind: &'static str) -> Self {
        Self {
            span: info_span!("run", kind = kind, run_id = field::Empty),
            progress: None,
        }
    }

    /// Attaches a progress bar ticked while the dedupe index is built.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    /// The span every event of this run is recorded under.
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub(crate) fn bind_run(&self, run_id: &str) {
        self.span.record("run_id", run_id);
    }

    pub(crate) fn hashing_progress(&self, hashed: usize) {
        if let Some(bar) = &self.progress {
            bar.set_position(hashed as u64);
        }
        if hashed % PROGRESS_EVERY == 0 {
            info!(hashed, "dedupe index: hashing");
        }
    }

    pub(crate) fn finish_progress(&self) {
        if let Some(bar) = &self.progress {
            bar.finish_and_clear();
        }
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` overrides `level` on the console when set. With `log_file`, a
/// second layer writes uncolored lines there at [`FILE_LOG_LEVEL`]; the returned
/// guard must be held until exit so buffered lines are flushed.
pub fn init_logging(level: &str, log_file: Option<&Path>) -> io::Result<Option<WorkerGuard>> {
    let console = fmt::layer()
        .with_target(false)
        .without_time()
        .with_writer(io::stderr)
        .with_filter(console_filter(level));

    let (file_layer, guard) = match log_file.and_then(|p| Some((p.parent()?, p.file_name()?))) {
        Some((dir, name)) => {
            let dir = if dir.as_os_str().is_empty() {
                Path::new(".")
            } else {
                dir
            };
            fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .with_filter(file_filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .init();

    Ok(guard)
}

fn console_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn file_filter() -> EnvFilter {
    EnvFilter::new(FILE_LOG_LEVEL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn test_file_filter_keeps_debug_lines() {
        assert_eq!(file_filter().max_level_hint(), Some(LevelFilter::DEBUG));
    }
}
