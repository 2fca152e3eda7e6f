// MIT License - Copyright (c) 2021 TJForc

use std::fmt;

use crate::constants::DELIMITER;

/// Commands the client sends to the server.
///
/// Only the commands whose responses the client decodes are modelled;
/// anything else goes through [`Command::Raw`] verbatim.
///
/// # Responses
///
/// | command | status | payload |
/// |---|---|---|
/// | `VERSION` | 201 | server version |
/// | `INFO` | 200 | one `<id> <videoMode> <status>` line per channel |
/// | `CLS` | 200 | one media line per file |
/// | `TLS` | 200 | one template line per file |
/// | `DATA LIST` | 200 | one data name per line |
/// | `DATA STORE` | 202 | none |
/// | `DATA RETRIEVE` | 201 / 404 | stored payload |
/// | `DATA REMOVE` | 202 / 404 | none |
/// | `THUMBNAIL LIST` | 200 | one thumbnail line per file |
/// | `THUMBNAIL RETRIEVE` | 201 / 404 | base64 PNG |
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `VERSION` - query the server version string.
    Version,
    /// `INFO` - list channels and their video modes.
    Info,
    /// `CLS` - list media files.
    Cls,
    /// `TLS` - list templates.
    Tls,
    /// `DATA LIST` - list stored data entries.
    DataList,
    /// `DATA STORE "<name>" "<payload>"` - store a payload.
    /// The payload is sent as-is and must already be escaped for AMCP.
    DataStore { name: String, payload: String },
    /// `DATA RETRIEVE "<name>"` - fetch a stored payload.
    DataRetrieve { name: String },
    /// `DATA REMOVE "<name>"` - delete a stored payload.
    DataRemove { name: String },
    /// `THUMBNAIL LIST` - list generated thumbnails.
    ThumbnailList,
    /// `THUMBNAIL RETRIEVE "<name>"` - fetch a thumbnail as base64 PNG.
    ThumbnailRetrieve { name: String },
    /// Raw command string (for any unlisted commands).
    Raw(String),
}

impl Command {
    /// Convert the command to its wire string representation (without delimiter).
    pub fn to_wire_string(&self) -> String {
        match self {
            Command::Version => "VERSION".to_string(),
            Command::Info => "INFO".to_string(),
            Command::Cls => "CLS".to_string(),
            Command::Tls => "TLS".to_string(),
            Command::DataList => "DATA LIST".to_string(),
            Command::DataStore { name, payload } => {
                format!("DATA STORE \"{}\" \"{}\"", name, payload)
            }
            Command::DataRetrieve { name } => format!("DATA RETRIEVE \"{}\"", name),
            Command::DataRemove { name } => format!("DATA REMOVE \"{}\"", name),
            Command::ThumbnailList => "THUMBNAIL LIST".to_string(),
            Command::ThumbnailRetrieve { name } => format!("THUMBNAIL RETRIEVE \"{}\"", name),
            Command::Raw(s) => s.clone(),
        }
    }

    /// Encode the command as UTF-8 bytes terminated by the line delimiter.
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        encode_line(&self.to_wire_string())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire_string())
    }
}

/// Encode one command line for the wire.
pub fn encode_line(line: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(line.len() + DELIMITER.len());
    bytes.extend_from_slice(line.as_bytes());
    bytes.extend_from_slice(DELIMITER.as_bytes());
    bytes
}

/// Command token at the start of a response status line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AmcpCommand {
    Version,
    Cls,
    Tls,
    Info,
    Data,
    Thumbnail,
    Load,
    LoadBg,
    Play,
    Stop,
    Cg,
    Cinf,
    /// Any command the client has no special handling for.
    Other(String),
}

impl AmcpCommand {
    pub fn from_token(token: &str) -> Self {
        match token {
            "VERSION" => Self::Version,
            "CLS" => Self::Cls,
            "TLS" => Self::Tls,
            "INFO" => Self::Info,
            "DATA" => Self::Data,
            "THUMBNAIL" => Self::Thumbnail,
            "LOAD" => Self::Load,
            "LOADBG" => Self::LoadBg,
            "PLAY" => Self::Play,
            "STOP" => Self::Stop,
            "CG" => Self::Cg,
            "CINF" => Self::Cinf,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Version => "VERSION",
            Self::Cls => "CLS",
            Self::Tls => "TLS",
            Self::Info => "INFO",
            Self::Data => "DATA",
            Self::Thumbnail => "THUMBNAIL",
            Self::Load => "LOAD",
            Self::LoadBg => "LOADBG",
            Self::Play => "PLAY",
            Self::Stop => "STOP",
            Self::Cg => "CG",
            Self::Cinf => "CINF",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for AmcpCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
