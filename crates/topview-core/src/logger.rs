//! Stderr logging for the calibration tools.
//!
//! Records from the `topview*` crates pass at the requested level; anything
//! else (image decoders, dependencies) is capped at `warn`. Lines look like
//! `[  0.104s  INFO node-thread topview_calib::node] message`.
//!
//! With the `tracing` feature, [`init_tracing`] installs a
//! `tracing-subscriber` that applies the same scoping unless `RUST_LOG` is set.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

const WORKSPACE_PREFIX: &str = "topview";
const FOREIGN_CAP: LevelFilter = LevelFilter::Warn;

/// Failure to install the process-wide logger.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerError {
    #[error("another logger is already installed")]
    AlreadyInstalled,
}

/// Effective threshold for records from `target`.
fn threshold(target: &str, level: LevelFilter) -> LevelFilter {
    if target.starts_with(WORKSPACE_PREFIX) {
        level
    } else {
        level.min(FOREIGN_CAP)
    }
}

struct StderrLogger {
    level: LevelFilter,
    started: Instant,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= threshold(metadata.target(), self.level)
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let thread = std::thread::current();
        let _ = writeln!(
            std::io::stderr().lock(),
            "[{:8.3}s {:>5} {} {}] {}",
            self.started.elapsed().as_secs_f64(),
            record.level(),
            thread.name().unwrap_or("-"),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger.
///
/// Later calls are no-ops; the first level sticks.
pub fn init_with_level(level: LevelFilter) -> Result<(), LoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| StderrLogger {
        level,
        started: Instant::now(),
    });
    log::set_logger(logger).map_err(|_| LoggerError::AlreadyInstalled)?;
    log::set_max_level(level);
    Ok(())
}

/// Parse `off|error|warn|info|debug|trace`, case-insensitive.
pub fn parse_level(name: &str) -> Option<LevelFilter> {
    name.parse().ok()
}

/// `EnvFilter` directives equivalent to the stderr logger's scoping.
pub fn filter_directives(level: LevelFilter) -> String {
    let foreign = threshold("", level).as_str().to_ascii_lowercase();
    let level = level.as_str().to_ascii_lowercase();
    format!("{foreign},topview={level},topview_core={level},topview_calib={level}")
}

/// Install a `tracing` subscriber. `RUST_LOG` overrides `level` when set.
#[cfg(feature = "tracing")]
pub fn init_tracing(level: LevelFilter, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(level)));
    let builder = fmt().with_env_filter(filter).with_span_events(FmtSpan::CLOSE);
    let installed = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder
            .with_thread_names(true)
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init()
    };
    if installed.is_err() {
        log::debug!("tracing subscriber already installed");
    }
}
