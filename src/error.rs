// MIT License - Copyright (c) 2021 TJForc

use std::fmt;

use crate::constants::status;

/// How a response's status code affects interpretation.
///
/// Derived from the 3-digit code family: 2xx is success, 404 is a missing
/// file or data entry, and anything else is a generic failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 2xx - the command succeeded
    None,
    /// 404 - the referenced media, template or data entry does not exist
    FileNotFound,
    /// Any other 1xx/3xx/4xx/5xx code
    Other,
}

impl ErrorKind {
    /// Classify a status code.
    pub fn from_status(code: u16) -> Self {
        match code {
            200..=299 => Self::None,
            status::FILE_NOT_FOUND => Self::FileNotFound,
            _ => Self::Other,
        }
    }

    /// Returns true for the success family.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Human-readable description of an AMCP status code.
pub fn describe_status(code: u16) -> &'static str {
    match code {
        100 => "Information",
        101 => "Information",
        200 => "OK, multi-line data follows",
        201 => "OK, one line of data follows",
        202 => "OK",
        400 => "Command not understood",
        401 => "Illegal video channel",
        402 => "Parameter missing",
        403 => "Illegal parameter",
        404 => "Media file not found",
        500 => "Internal server error",
        501 => "Internal server error",
        502 => "Media file unreadable",
        503 => "Access error",
        _ => "Unknown status",
    }
}

/// A status code paired with its description, for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub u16);

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.0, describe_status(self.0))
    }
}

/// All errors that can occur in the AMCP client library.
#[derive(Debug, thiserror::Error)]
pub enum AmcpError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to connect to {host}:{port}: {source}")]
    ConnectFailed {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Connect to {host}:{port} abandoned: connection closed meanwhile")]
    ConnectAborted { host: String, port: u16 },

    #[error("Connection closed by server")]
    ConnectionClosed,

    #[error("Not connected")]
    NotConnected,

    #[error("Write queue closed")]
    ChannelClosed,

    #[error("Invalid response header: {line:?}")]
    InvalidHeader { line: String },

    #[error("Malformed {kind} entry {line:?}: {details}")]
    MalformedEntry {
        kind: &'static str,
        line: String,
        details: String,
    },

    #[error("Invalid timestamp {value:?}: {source}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Unknown media type: {0}")]
    UnknownMediaType(String),

    #[error("Invalid number: {value:?}")]
    InvalidNumber { value: String },
}

impl AmcpError {
    /// Whether this error is transient and the connection should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AmcpError::Io(_)
                | AmcpError::ConnectFailed { .. }
                | AmcpError::ConnectionClosed
                | AmcpError::ChannelClosed
        )
    }

    pub(crate) fn connect_failed(host: &str, port: u16, source: &std::io::Error) -> Self {
        AmcpError::ConnectFailed {
            host: host.to_string(),
            port,
            source: std::io::Error::new(source.kind(), source.to_string()),
        }
    }

    pub(crate) fn malformed(kind: &'static str, line: &str, details: impl Into<String>) -> Self {
        AmcpError::MalformedEntry {
            kind,
            line: line.to_string(),
            details: details.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AmcpError>;
