//! Logging context.
//!
//! A [`LogContext`] is constructed explicitly from a [`LogConfig`] and
//! handed to the components that log; nothing is registered globally unless
//! the caller asks for it with [`LogContext::install_global`].
//!
//! Destinations:
//! - console (stdout), always;
//! - a daily-rotating file `canoe.<date>.log` under `log_directory`, only
//!   when that option is non-empty.  At most [`MAX_LOG_FILES`] files are
//!   kept.
//!
//! Line format: `<timestamp> [CANOE] [LEVEL] message`.
//!
//! # Teardown
//!
//! The file destination writes through a `tracing-appender` worker thread.
//! Dropping the last clone of the context flushes and joins it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::dispatcher::{self, DefaultGuard, Dispatch};
use tracing::{Event, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::{FormatTime, SystemTime};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{Layer, Registry};

use crate::errors::{CanoeError, Result};

/// File name prefix of the rolling log file.
pub const LOG_FILE_PREFIX: &str = "canoe";
/// File name suffix of the rolling log file.
pub const LOG_FILE_SUFFIX: &str = "log";
/// Number of rotated files kept on disk.
pub const MAX_LOG_FILES: usize = 5;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Minimum level written to the destinations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

/// Logging options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Directory for the rolling log file.  Empty disables file logging.
    pub log_directory: String,
    pub level: LogLevel,
}

impl LogConfig {
    pub fn with_directory(dir: impl Into<String>) -> Self {
        Self {
            log_directory: dir.into(),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Line format
// ---------------------------------------------------------------------------

/// `<timestamp> [CANOE] [LEVEL] message`
struct CanoeLineFormat;

impl<S, N> FormatEvent<S, N> for CanoeLineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        SystemTime.format_time(&mut writer)?;
        write!(writer, " [CANOE] [{:<5}] ", event.metadata().level().as_str())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

struct LogInner {
    dispatch: Dispatch,
    file_directory: Option<PathBuf>,
    _file_guard: Option<WorkerGuard>,
}

/// Explicitly constructed logging context.  Cheap to clone.
#[derive(Clone)]
pub struct LogContext {
    inner: Arc<LogInner>,
}

impl LogContext {
    /// Build the console destination and, if `config.log_directory` is
    /// non-empty, the rolling file destination.
    pub fn init(config: &LogConfig) -> Result<Self> {
        let level = LevelFilter::from(config.level);

        let console = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(false)
            .event_format(CanoeLineFormat)
            .with_filter(level);

        let (file_layer, file_guard, file_directory) = if config.log_directory.trim().is_empty() {
            (None, None, None)
        } else {
            let dir = PathBuf::from(config.log_directory.trim());
            std::fs::create_dir_all(&dir).map_err(|e| {
                CanoeError::LoggingError(format!("cannot create log directory {}: {e}", dir.display()))
            })?;

            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_FILE_PREFIX)
                .filename_suffix(LOG_FILE_SUFFIX)
                .max_log_files(MAX_LOG_FILES)
                .build(&dir)
                .map_err(|e| {
                    CanoeError::LoggingError(format!("cannot open log file in {}: {e}", dir.display()))
                })?;
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .event_format(CanoeLineFormat)
                .with_filter(level);
            (Some(layer), Some(guard), Some(dir))
        };

        let subscriber = Registry::default().with(console).with(file_layer);

        Ok(Self {
            inner: Arc::new(LogInner {
                dispatch: Dispatch::new(subscriber),
                file_directory,
                _file_guard: file_guard,
            }),
        })
    }

    /// A context that discards everything.
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(LogInner {
                dispatch: Dispatch::none(),
                file_directory: None,
                _file_guard: None,
            }),
        }
    }

    /// Route this thread's `tracing` events to this context until the
    /// returned guard is dropped.
    pub fn enter(&self) -> DefaultGuard {
        dispatcher::set_default(&self.inner.dispatch)
    }

    /// Run `f` with this context as the thread's default.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        dispatcher::with_default(&self.inner.dispatch, f)
    }

    /// Make this context the process-wide default.  Succeeds at most once
    /// per process.
    pub fn install_global(&self) -> Result<()> {
        dispatcher::set_global_default(self.inner.dispatch.clone())
            .map_err(|e| CanoeError::LoggingError(format!("global logger already set: {e}")))
    }

    pub fn has_file_destination(&self) -> bool {
        self.inner.file_directory.is_some()
    }

    /// Directory holding the rolling log file, if file logging is enabled.
    pub fn log_file_directory(&self) -> Option<&Path> {
        self.inner.file_directory.as_deref()
    }
}

impl fmt::Debug for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogContext")
            .field("file_directory", &self.inner.file_directory)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
