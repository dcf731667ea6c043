//! Bridges the `log` facade to a logger provided by the host app.

use std::sync::{Arc, OnceLock};

/// Receives log messages emitted by `SeedKit`.
///
/// Implemented by the host app and registered once with [`set_logger`].
/// Messages never contain seed material or PINs.
///
/// # Examples
///
/// ```rust
/// use seedkit_core::logger::{LogLevel, Logger};
///
/// struct StderrLogger;
///
/// impl Logger for StderrLogger {
///     fn log(&self, level: LogLevel, message: String) {
///         eprintln!("[{level:?}] {message}");
///     }
/// }
/// ```
///
/// ## Swift
///
/// ```swift
/// class SeedKitLoggerBridge: SeedKit.Logger {
///     static let shared = SeedKitLoggerBridge()
///
///     func log(level: SeedKit.LogLevel, message: String) {
///         Log.log(level.toCoreLevel(), message)
///     }
/// }
///
/// SeedKit.setLogger(logger: SeedKitLoggerBridge.shared) // once, at launch
/// ```
#[uniffi::export(with_foreign)]
pub trait Logger: Sync + Send {
    /// Logs `message` at `level`.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum LogLevel {
    /// Very detailed messages, such as superseded derivations.
    Trace,
    /// Workflow transitions.
    Debug,
    /// Identities committed or removed.
    Info,
    /// Recoverable failures, such as a failed commit.
    Warn,
    /// Failures that lose work, such as a leaked seed reference.
    Error,
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Self::Error,
            log::Level::Warn => Self::Warn,
            log::Level::Info => Self::Info,
            log::Level::Debug => Self::Debug,
            log::Level::Trace => Self::Trace,
        }
    }
}

struct ForeignLogger;

impl ForeignLogger {
    // Debug and trace output from dependencies is noise for the host app.
    fn accepts(metadata: &log::Metadata) -> bool {
        metadata.level() <= log::Level::Info || metadata.target().starts_with("seedkit")
    }
}

impl log::Log for ForeignLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        Self::accepts(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !Self::accepts(record.metadata()) {
            return;
        }
        if let Some(logger) = LOGGER_INSTANCE.get() {
            logger.log(record.level().into(), record.args().to_string());
        } else {
            eprintln!("Logger not set: {}", record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// Registers the host app's logger and routes the `log` facade to it.
///
/// Only the first call has an effect; later calls are reported on stderr and
/// otherwise ignored.
#[uniffi::export]
pub fn set_logger(logger: Arc<dyn Logger>) {
    if LOGGER_INSTANCE.set(logger).is_err() {
        eprintln!("Logger already set");
        return;
    }
    if let Err(e) = init_logger() {
        eprintln!("Failed to set logger: {e}");
    }
}

fn init_logger() -> Result<(), log::SetLoggerError> {
    static LOGGER: ForeignLogger = ForeignLogger;
    log::set_logger(&LOGGER)?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}
