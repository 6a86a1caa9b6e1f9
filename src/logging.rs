use log::{Metadata, Record};

// const LOGGER: OnceCell<CallbackLogger<Box<dyn Fn(LogLevel, &str)>>> = OnceCell::new();

/// Set the callback function that is called when logging.
///
/// The `callback` function's first parameter is the level of the message being
/// logged, and the second is the message itself.
pub fn set_logging_callback<T>(callback: T)
where
    T: Fn(LogLevel, &str) + Send + Sync + 'static,
{
    // FIXME: set_boxed_logger can only be called once, and it's not possible to retrieve and downcast the logger from log once set.
    let logger = Box::new(CallbackLogger { callback });

    log::set_boxed_logger(logger)
        .map(|_| log::set_max_level(log::LevelFilter::Trace))
        .unwrap();
}

/// Set the minimum level of message that will be logged.
pub fn set_log_level(level: LogLevel) {
    log::set_max_level(level.into());
}

pub(crate) fn is_log_enabled(level: LogLevel) -> bool {
    log::max_level() >= level.into()
}

/// Formats an error together with the messages of the errors that caused it.
pub(crate) fn format_details(error: &dyn std::error::Error) -> String {
    let mut details = error.to_string();

    let mut cause = error.source();
    while let Some(error) = cause {
        details.push_str(": ");
        details.push_str(&error.to_string());
        cause = error.source();
    }

    details
}

macro_rules! trace {
    ($($arg:tt)+) => { log::trace!(target: "libloot", $($arg)+) };
}
pub(crate) use trace;

macro_rules! debug {
    ($($arg:tt)+) => { log::debug!(target: "libloot", $($arg)+) };
}
pub(crate) use debug;

macro_rules! info {
    ($($arg:tt)+) => { log::info!(target: "libloot", $($arg)+) };
}
pub(crate) use info;

macro_rules! warn {
    ($($arg:tt)+) => { log::warn!(target: "libloot", $($arg)+) };
}
pub(crate) use warn;

macro_rules! error {
    ($($arg:tt)+) => { log::error!(target: "libloot", $($arg)+) };
}
pub(crate) use error;

/// Codes used to specify different levels of API logging.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warning => write!(f, "warning"),
            LogLevel::Error => write!(f, "error"),
            LogLevel::Fatal => write!(f, "fatal"),
        }
    }
}

impl From<log::Level> for LogLevel {
    fn from(value: log::Level) -> Self {
        match value {
            log::Level::Trace => LogLevel::Trace,
            log::Level::Debug => LogLevel::Debug,
            log::Level::Info => LogLevel::Info,
            log::Level::Warn => LogLevel::Warning,
            log::Level::Error => LogLevel::Error,
        }
    }
}

impl From<LogLevel> for log::LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warning => log::LevelFilter::Warn,
            // The log crate has no level more severe than Error.
            LogLevel::Error | LogLevel::Fatal => log::LevelFilter::Error,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
struct CallbackLogger<T: Fn(LogLevel, &str)> {
    callback: T,
}

impl<T: Fn(LogLevel, &str) + Send + Sync> log::Log for CallbackLogger<T> {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            (self.callback)(record.level().into(), &format!("{}", record.args()));
        }
    }

    fn flush(&self) {}
}
