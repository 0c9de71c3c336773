//! Typed error taxonomy shared by the pipeline stages and the process driver.
//!
//! Command handlers wrap these in `anyhow` with context; the types exist so
//! callers can tell a fatal configuration problem from a per-function
//! rejection or a subject that stopped responding.
use std::path::PathBuf;
use thiserror::Error;

/// Problems that stop the pipeline before any work is done.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no report file found in {dir} (expected a file matching {pattern}); pass the report path explicitly")]
    ReportNotFound { dir: PathBuf, pattern: String },
    #[error("report file {0} does not exist")]
    ReportMissing(PathBuf),
    #[error("no test sources found in {dir} (expected files matching {pattern})")]
    NoTestSources { dir: PathBuf, pattern: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Reasons an implementation could not be rewritten safely.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InstrumentError {
    #[error("`{token}` at line {line} is referenced without being called; refusing to rewrite")]
    AmbiguousReference { token: String, line: usize },
    #[error("definition of `{name}` not found in its source text")]
    MissingDefinition { name: String },
    #[error("`{name}` does not start with the test prefix `{prefix}`")]
    UnexpectedName { name: String, prefix: String },
}

/// Failures while driving the subject process.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("subject command is empty")]
    EmptyCommand,
    #[error("parse subject command {command:?}: {message}")]
    BadCommand { command: String, message: String },
    #[error("subject executable {0} not found")]
    NotFound(String),
    #[error("spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("subject stdin already closed")]
    StdinClosed,
    #[error("subject has already been reaped")]
    Reaped,
    #[error("subject session deadline passed")]
    DeadlineExceeded,
    #[error("subject i/o: {0}")]
    Io(#[from] std::io::Error),
}
