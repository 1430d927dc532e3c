//! # Logging Utilities
//!
//! Logging setup for faultline binaries and tests, built on `tracing`.
//!
//! Console output goes to stderr so that reports printed on stdout stay
//! machine-readable. File output, when requested, rolls daily and never
//! contains ANSI escapes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use faultline_utils::init_logging;
//!
//! // Keep the guard alive for as long as file output should be flushed.
//! let _guard = init_logging().expect("Failed to initialize logging");
//!
//! tracing::info!("Fault recovery enabled");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: filter directive (e.g. `RUST_LOG=debug`, `RUST_LOG=faultline_core=trace`)
//! - `FAULTLINE_LOG_FORMAT`: `pretty` or `json` (default: `pretty`)
//! - `FAULTLINE_LOG_FILE`: optional log file path; a date suffix is appended
//!
//! An explicit level in [`LogConfig`] (the CLI's `--log-level`) wins over
//! `RUST_LOG`.

use std::env;
use std::fmt as std_fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Environment variable selecting the output format
pub const LOG_FORMAT_ENV: &str = "FAULTLINE_LOG_FORMAT";

/// Environment variable naming an optional log file
pub const LOG_FILE_ENV: &str = "FAULTLINE_LOG_FILE";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Human-readable, colored on a terminal
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {s}. Use 'pretty' or 'json'")),
        }
    }
}

impl std_fmt::Display for LogFormat
{
    fn fmt(&self, f: &mut std_fmt::Formatter<'_>) -> std_fmt::Result
    {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    /// Errors only
    Error,
    /// Warnings and errors
    Warn,
    /// Setup milestones (default)
    Info,
    /// Handler installation and signal selection details
    Debug,
    /// Everything
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!(
                "Unknown log level: {s}. Use 'error', 'warn', 'info', 'debug', or 'trace'"
            )),
        }
    }
}

/// Resolved logging configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig
{
    /// Explicit level; overrides `RUST_LOG` when set
    pub level: Option<LogLevel>,
    /// Output format
    pub format: LogFormat,
    /// Optional log file
    pub file: Option<PathBuf>,
}

impl LogConfig
{
    /// Configuration from `FAULTLINE_LOG_FORMAT` and `FAULTLINE_LOG_FILE`
    ///
    /// ## Errors
    ///
    /// - `InvalidFormat`: `FAULTLINE_LOG_FORMAT` is set to something unknown
    pub fn from_env() -> Result<Self, LoggingError>
    {
        Self::from_vars(env::var(LOG_FORMAT_ENV).ok(), env::var(LOG_FILE_ENV).ok())
    }

    fn from_vars(format: Option<String>, file: Option<String>) -> Result<Self, LoggingError>
    {
        let format = match format {
            Some(value) if !value.trim().is_empty() => value.parse().map_err(LoggingError::InvalidFormat)?,
            _ => LogFormat::default(),
        };
        let file = file.filter(|path| !path.trim().is_empty()).map(PathBuf::from);

        Ok(LogConfig {
            level: None,
            format,
            file,
        })
    }

    /// Apply command-line overrides
    #[must_use]
    pub fn with_overrides(mut self, level: Option<LogLevel>, format: Option<LogFormat>) -> Self
    {
        if level.is_some() {
            self.level = level;
        }
        if let Some(format) = format {
            self.format = format;
        }
        self
    }

    /// Filter directive: explicit level, else `rust_log`, else `info`
    fn filter_directive(&self, rust_log: Option<&str>) -> String
    {
        match (self.level, rust_log) {
            (Some(level), _) => Level::from(level).to_string(),
            (None, Some(directive)) if !directive.trim().is_empty() => directive.to_string(),
            _ => Level::INFO.to_string(),
        }
    }

    fn env_filter(&self) -> EnvFilter
    {
        let rust_log = env::var(EnvFilter::DEFAULT_ENV).ok();
        let directive = self.filter_directive(rust_log.as_deref());
        EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()))
    }
}

/// Keeps the background file writer alive
///
/// Dropping it flushes and stops file output. Console output is unaffected.
#[must_use = "dropping the guard stops file logging"]
#[derive(Debug)]
pub struct LoggingGuard
{
    file: Option<WorkerGuard>,
}

impl LoggingGuard
{
    /// Whether a log file is being written
    pub fn has_file(&self) -> bool
    {
        self.file.is_some()
    }
}

/// Initialize logging from the environment
///
/// ## Errors
///
/// - `InvalidFormat`: see [`LogConfig::from_env`]
/// - `InitializationFailed`: a global subscriber is already set
pub fn init_logging() -> Result<LoggingGuard, LoggingError>
{
    init_logging_with(&LogConfig::from_env()?)
}

/// Initialize logging with an explicit configuration
///
/// ## Example
///
/// ```rust,no_run
/// use faultline_utils::{init_logging_with, LogConfig, LogFormat, LogLevel};
///
/// let config = LogConfig::default().with_overrides(Some(LogLevel::Debug), Some(LogFormat::Json));
/// let _guard = init_logging_with(&config).expect("Failed to initialize logging");
/// ```
///
/// ## Errors
///
/// - `FileError`: the log file's directory cannot be created
/// - `InitializationFailed`: a global subscriber is already set
pub fn init_logging_with(config: &LogConfig) -> Result<LoggingGuard, LoggingError>
{
    let mut layers: Vec<BoxedLayer> = vec![build_layer(config.format, io::stderr, true).with_filter(config.env_filter()).boxed()];

    let mut guard = LoggingGuard { file: None };
    if let Some(path) = &config.file {
        let (directory, file_name) = split_log_path(path);
        std::fs::create_dir_all(&directory)?;

        let appender = tracing_appender::rolling::daily(directory, file_name);
        let (writer, worker) = tracing_appender::non_blocking(appender);
        layers.push(build_layer(config.format, writer, false).with_filter(config.env_filter()).boxed());
        guard.file = Some(worker);
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;
    Ok(guard)
}

fn build_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(writer);

    match format {
        LogFormat::Pretty => layer.with_ansi(ansi).boxed(),
        LogFormat::Json => layer.json().with_current_span(true).with_span_list(true).boxed(),
    }
}

/// Directory and file name for the rolling appender
fn split_log_path(path: &Path) -> (PathBuf, PathBuf)
{
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path.file_name().map_or_else(|| PathBuf::from("faultline.log"), PathBuf::from);
    (directory, file_name)
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    /// Failed to initialize logging
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_log_format_from_str()
    {
        assert_eq!(LogFormat::from_str("pretty").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("JSON").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str(" text ").unwrap(), LogFormat::Pretty);
        assert!(LogFormat::from_str("yaml").is_err());
    }

    #[test]
    fn test_log_level_from_str()
    {
        assert_eq!(LogLevel::from_str("error").unwrap(), LogLevel::Error);
        assert_eq!(LogLevel::from_str("Warning").unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::from_str("info").unwrap(), LogLevel::Info);
        assert_eq!(LogLevel::from_str("debug").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("trace").unwrap(), LogLevel::Trace);
        assert!(LogLevel::from_str("verbose").is_err());
    }

    #[test]
    fn test_config_from_vars()
    {
        let config = LogConfig::from_vars(Some("json".into()), Some("/var/log/faultline.log".into())).unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.file, Some(PathBuf::from("/var/log/faultline.log")));

        let empty = LogConfig::from_vars(Some(String::new()), Some("  ".into())).unwrap();
        assert_eq!(empty, LogConfig::default());

        assert!(matches!(
            LogConfig::from_vars(Some("xml".into()), None),
            Err(LoggingError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_explicit_level_beats_rust_log()
    {
        let config = LogConfig::default();
        assert_eq!(config.filter_directive(None), "INFO");
        assert_eq!(config.filter_directive(Some("faultline_core=trace")), "faultline_core=trace");

        let config = config.with_overrides(Some(LogLevel::Warn), None);
        assert_eq!(config.filter_directive(Some("faultline_core=trace")), "WARN");
    }

    #[test]
    fn test_overrides_keep_unset_fields()
    {
        let config = LogConfig {
            level: Some(LogLevel::Debug),
            format: LogFormat::Json,
            file: None,
        }
        .with_overrides(None, None);
        assert_eq!(config.level, Some(LogLevel::Debug));
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_split_log_path()
    {
        assert_eq!(
            split_log_path(Path::new("logs/faultline.log")),
            (PathBuf::from("logs"), PathBuf::from("faultline.log"))
        );
        assert_eq!(
            split_log_path(Path::new("faultline.log")),
            (PathBuf::from("."), PathBuf::from("faultline.log"))
        );
    }

    #[test]
    fn test_log_level_to_tracing_level()
    {
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
    }
}
