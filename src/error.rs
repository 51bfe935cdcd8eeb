use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification attached to a failed (or partially failed) probe outcome.
///
/// `ConfigError` and `IoError` only ever surface through [`TargetError::kind`];
/// they abort enumeration and never appear inside a report.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConnectTimeout,
    ConnectError,
    ReadTimeout,
    ReadError,
    TlsError,
    ConfigError,
    IoError,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConnectTimeout => "connect_timeout",
            ErrorKind::ConnectError => "connect_error",
            ErrorKind::ReadTimeout => "read_timeout",
            ErrorKind::ReadError => "read_error",
            ErrorKind::TlsError => "tls_error",
            ErrorKind::ConfigError => "config_error",
            ErrorKind::IoError => "io_error",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal errors raised while expanding a target specification.
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("invalid target specification: {message}")]
    Config { message: String },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TargetError {
    pub fn config(message: impl Into<String>) -> Self {
        TargetError::Config {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TargetError::Config { .. } => ErrorKind::ConfigError,
            TargetError::Io { .. } => ErrorKind::IoError,
        }
    }
}

/// Errors returned by the scheduler itself.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Targets(#[from] TargetError),

    #[error("report holds {outcomes} outcomes for {requested} requested targets")]
    OutcomeCountMismatch { requested: usize, outcomes: usize },
}
