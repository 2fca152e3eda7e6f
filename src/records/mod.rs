// MIT License - Copyright (c) 2021 TJForc

//! Server-side entities decoded from list responses (`CLS`, `TLS`, `INFO`).
//!
//! Each entity owns the grammar of its response line. Parsing one line never
//! touches any other line; callers decide what to do with a failure.

pub mod channel;
pub mod media;
pub mod template;

pub use channel::{ChannelInfo, ChannelStatus};
pub use media::{MediaInfo, MediaType};
pub use template::TemplateInfo;

use chrono::NaiveDateTime;

use crate::constants::TIMESTAMP_FORMAT;
use crate::error::{AmcpError, Result};

/// Split a server path on its last separator into `(folder, name)`.
///
/// Servers from 2.0.7 on use `/`; older ones use `\`.
pub(crate) fn split_path(path: &str) -> (String, String) {
    let delim = path.rfind('/').or_else(|| path.rfind('\\'));
    match delim {
        Some(idx) => (path[..idx].to_string(), path[idx + 1..].to_string()),
        None => (String::new(), path.to_string()),
    }
}

/// Join a folder and a name back into a server path.
pub(crate) fn join_path(folder: &str, name: &str) -> String {
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", folder, name)
    }
}

/// Return the text between the first pair of double quotes and everything
/// after the last double quote.
pub(crate) fn split_quoted<'a>(kind: &'static str, line: &'a str) -> Result<(&'a str, &'a str)> {
    let open = line
        .find('"')
        .ok_or_else(|| AmcpError::malformed(kind, line, "missing opening quote"))?;
    let close = line[open + 1..]
        .find('"')
        .map(|idx| open + 1 + idx)
        .ok_or_else(|| AmcpError::malformed(kind, line, "missing closing quote"))?;
    let last = line.rfind('"').unwrap_or(close);
    Ok((&line[open + 1..close], &line[last + 1..]))
}

/// Parse a `yyyyMMddHHmmss` timestamp.
pub(crate) fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).map_err(|source| {
        AmcpError::InvalidTimestamp {
            value: value.to_string(),
            source,
        }
    })
}

pub(crate) fn parse_number<T: std::str::FromStr>(value: &str) -> Result<T> {
    value.parse::<T>().map_err(|_| AmcpError::InvalidNumber {
        value: value.to_string(),
    })
}
