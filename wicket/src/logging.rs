// Copyright 2024 Oxide Computer Company
//! Logging configuration and per-request loggers, all using slog
//!
//! Wicket logs through whatever [`slog::Logger`] the application hands the
//! [`crate::Dispatcher`].  [`ConfigLogging`] is provided for applications that
//! want Wicket to build that root logger from their configuration file.

use crate::request::RequestInfo;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use serde::Deserialize;
use serde::Serialize;
use slog::o;
use slog::Drain;
use slog::Level;
use slog::Logger;
use std::fs::OpenOptions;
use std::io;
use std::io::LineWriter;

/// Where log output goes and how much of it there is.  This is expected to be
/// a top-level block in a TOML config file, although that's not required.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "mode")]
pub enum ConfigLogging {
    /// Pretty-printed output to stderr, assumed to support terminal escapes.
    StderrTerminal { level: ConfigLoggingLevel },
    /// Bunyan-formatted output to a specified file.
    File {
        level: ConfigLoggingLevel,
        path: Utf8PathBuf,
        if_exists: ConfigLoggingIfExists,
    },
}

/// Log messages have a level that's used for filtering in the usual way.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLoggingLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl From<ConfigLoggingLevel> for Level {
    fn from(config_level: ConfigLoggingLevel) -> Level {
        match config_level {
            ConfigLoggingLevel::Trace => Level::Trace,
            ConfigLoggingLevel::Debug => Level::Debug,
            ConfigLoggingLevel::Info => Level::Info,
            ConfigLoggingLevel::Warn => Level::Warning,
            ConfigLoggingLevel::Error => Level::Error,
            ConfigLoggingLevel::Critical => Level::Critical,
        }
    }
}

/// What to do when the log file already exists.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLoggingIfExists {
    Fail,
    Truncate,
    Append,
}

impl ConfigLogging {
    /// Create a root logger based on the requested configuration.
    pub fn to_logger<S: AsRef<str>>(
        &self,
        log_name: S,
    ) -> Result<Logger, io::Error> {
        match self {
            ConfigLogging::StderrTerminal { level } => {
                let decorator = slog_term::TermDecorator::new().build();
                let drain =
                    slog_term::FullFormat::new(decorator).build().fuse();
                Ok(async_root_logger(*level, drain))
            }

            ConfigLogging::File { level, path, if_exists } => {
                let mut open_options = OpenOptions::new();
                open_options.write(true).create(true);
                match if_exists {
                    ConfigLoggingIfExists::Fail => {
                        open_options.create_new(true);
                    }
                    ConfigLoggingIfExists::Append => {
                        open_options.append(true);
                    }
                    ConfigLoggingIfExists::Truncate => {
                        open_options.truncate(true);
                    }
                }

                let drain = file_drain(&open_options, path, log_name.as_ref())?;
                Ok(async_root_logger(*level, drain))
            }
        }
    }
}

fn async_root_logger<T>(level: ConfigLoggingLevel, drain: T) -> Logger
where
    T: Drain + Send + 'static,
    <T as Drain>::Err: std::fmt::Debug,
{
    let level_drain = slog::LevelFilter(drain, Level::from(level)).fuse();
    let async_drain =
        slog_async::Async::new(level_drain).chan_size(1024).build().fuse();
    Logger::root(async_drain, o!())
}

fn file_drain(
    open_options: &OpenOptions,
    path: &Utf8Path,
    log_name: &str,
) -> Result<slog::Fuse<slog_json::Json<LineWriter<std::fs::File>>>, io::Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = LineWriter::new(open_options.open(path)?);

    // The bunyan builder wants a `&'static str` name.  Loggers are created a
    // handful of times per process, so leaking the name is tolerable.
    let log_name: &'static str =
        Box::leak(log_name.to_string().into_boxed_str());
    Ok(slog_bunyan::with_name(log_name, file).build().fuse())
}

/// Creates the logger for one request.
///
/// Every entry carries the request id, method, and URI.  Each header named in
/// `log_headers` that is present (and valid text) is included as well, under
/// a key like `hdr_x_forwarded_for` for `X-Forwarded-For`.
pub fn request_logger(
    root: &Logger,
    request_id: &str,
    request: &RequestInfo,
    log_headers: &[String],
) -> Logger {
    let mut log = root.new(o!(
        "req_id" => request_id.to_string(),
        "method" => request.method().as_str().to_string(),
        "uri" => request.uri().to_string(),
    ));

    // slog can only layer on dynamic keys one child logger at a time.
    for name in log_headers {
        let value = request
            .headers()
            .get(name.as_str())
            .and_then(|v| v.to_str().ok().map(str::to_string));
        if let Some(value) = value {
            let key = format!("hdr_{}", name.to_lowercase().replace('-', "_"));
            log = log.new(o!(key => value));
        }
    }

    log
}
