// MIT License - Copyright (c) 2021 TJForc

use serde::Serialize;

use crate::error::{AmcpError, Result};
use crate::records::parse_number;

/// Playback status of a channel.
///
/// The server's status column is not decoded; every channel parsed from
/// `INFO` is reported as `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ChannelStatus {
    Playing,
    #[default]
    Stopped,
}

/// One video channel from an `INFO` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelInfo {
    /// 1-based channel number
    pub id: u32,
    /// Video mode string as sent by the server (e.g. `1080i5000`, `PAL`)
    pub video_mode: String,
    pub status: ChannelStatus,
    /// Active layer; not reported by `INFO`
    pub active_layer: String,
}

impl ChannelInfo {
    pub fn new(id: u32, video_mode: impl Into<String>) -> Self {
        Self {
            id,
            video_mode: video_mode.into(),
            status: ChannelStatus::Stopped,
            active_layer: String::new(),
        }
    }

    /// Parse one `INFO` line: `<id> <videoMode> [...]`.
    pub fn parse(line: &str) -> Result<Self> {
        let mut fields = line.split_whitespace();
        let id: u32 = match fields.next() {
            Some(id) => parse_number(id)?,
            None => return Err(AmcpError::malformed("channel", line, "empty line")),
        };
        if id == 0 {
            return Err(AmcpError::malformed("channel", line, "channel ids start at 1"));
        }
        let video_mode = fields
            .next()
            .ok_or_else(|| AmcpError::malformed("channel", line, "missing video mode"))?;

        Ok(Self::new(id, video_mode))
    }
}
