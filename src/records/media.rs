// MIT License - Copyright (c) 2021 TJForc

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::constants::ZERO_TIMECODE;
use crate::error::{AmcpError, Result};
use crate::records::{join_path, parse_number, parse_timestamp, split_path, split_quoted};

/// Kind of media file reported by `CLS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaType {
    Still,
    Movie,
    Audio,
    All,
}

impl MediaType {
    /// The wire token (`STILL`, `MOVIE`, `AUDIO`, `ALL`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Still => "STILL",
            Self::Movie => "MOVIE",
            Self::Audio => "AUDIO",
            Self::All => "ALL",
        }
    }
}

impl FromStr for MediaType {
    type Err = AmcpError;

    /// Case-sensitive, as the server always sends upper case.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "STILL" => Ok(Self::Still),
            "MOVIE" => Ok(Self::Movie),
            "AUDIO" => Ok(Self::Audio),
            "ALL" => Ok(Self::All),
            other => Err(AmcpError::UnknownMediaType(other.to_string())),
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One media file from a `CLS` listing.
///
/// Everything except `thumbnail` comes from the listing line. The thumbnail
/// is fetched separately and attached later with [`MediaInfo::set_thumbnail`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaInfo {
    pub folder: String,
    pub name: String,
    pub media_type: MediaType,
    /// File size in bytes
    pub size: u64,
    pub last_updated: NaiveDateTime,
    /// `HH:MM:SS:FF` duration
    pub timecode: String,
    pub frames: u64,
    pub fps: f64,
    /// Base64 PNG returned by `THUMBNAIL RETRIEVE`
    pub thumbnail: Option<String>,
}

impl MediaInfo {
    /// Parse one `CLS` line.
    ///
    /// Grammar: `"<path>" <TYPE> <size> <yyyyMMddHHmmss> [<frames> <num>/<den>]`
    ///
    /// ```
    /// use caspar_amcp::records::MediaInfo;
    ///
    /// let media = MediaInfo::parse("\"F/name.mov\" MOVIE 12345 20230101120000 125 1/25").unwrap();
    /// assert_eq!(media.folder, "F");
    /// assert_eq!(media.timecode, "00:00:05:00");
    /// ```
    pub fn parse(line: &str) -> Result<Self> {
        let (path, rest) = split_quoted("media", line)?;
        let (folder, name) = split_path(path);

        let params: Vec<&str> = rest.split_whitespace().collect();
        if params.len() < 3 {
            return Err(AmcpError::malformed(
                "media",
                line,
                format!("expected type, size and date, got {} fields", params.len()),
            ));
        }

        let media_type: MediaType = params[0].parse()?;
        let size: u64 = parse_number(params[1])?;
        let last_updated = parse_timestamp(params[2])?;

        let (frames, fps) = if params.len() > 3 {
            let frames = match params[3] {
                "NaN" => 0,
                value => parse_number(value)?,
            };
            let timebase = params
                .get(4)
                .ok_or_else(|| AmcpError::malformed("media", line, "frame count without timebase"))?;
            (frames, parse_timebase(line, timebase)?)
        } else {
            (0, 0.0)
        };

        Ok(Self {
            folder,
            name,
            media_type,
            size,
            last_updated,
            timecode: timecode(frames, fps),
            frames,
            fps,
            thumbnail: None,
        })
    }

    /// Folder and name joined with `/`.
    pub fn full_name(&self) -> String {
        join_path(&self.folder, &self.name)
    }

    pub fn set_thumbnail(&mut self, data: impl Into<String>) {
        self.thumbnail = Some(data.into());
    }
}

impl fmt::Display for MediaInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// Turn a `num/den` seconds-per-frame fraction into frames per second.
fn parse_timebase(line: &str, timebase: &str) -> Result<f64> {
    let (num, den) = timebase
        .split_once('/')
        .ok_or_else(|| AmcpError::malformed("media", line, format!("bad timebase {timebase:?}")))?;
    let num: f64 = parse_number(num)?;
    let den: f64 = parse_number(den)?;
    if num == 0.0 {
        return Ok(0.0);
    }
    Ok(den / num)
}

/// Format a frame count at a frame rate as `HH:MM:SS:FF`.
pub fn timecode(frames: u64, fps: f64) -> String {
    if frames == 0 || fps <= 0.0 || !fps.is_finite() {
        return ZERO_TIMECODE.to_string();
    }

    let time = frames as f64 / fps;
    let hours = (time / 3600.0) as u64;
    let minutes = ((time - (hours * 3600) as f64) / 60.0) as u64;
    let seconds = (time - (hours * 3600 + minutes * 60) as f64) as u64;
    let remainder = time - (hours * 3600 + minutes * 60 + seconds) as f64;
    // Absorb float noise so 5.04s at 25fps lands on frame 1, not 0.
    let frame = (remainder * fps + 1e-6) as u64;

    format!("{:02}:{:02}:{:02}:{:02}", hours, minutes, seconds, frame)
}
