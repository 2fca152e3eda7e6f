// MIT License - Copyright (c) 2021 TJForc

use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::{AmcpError, Result};
use crate::records::{join_path, parse_number, parse_timestamp, split_path, split_quoted};

/// One template from a `TLS` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateInfo {
    pub folder: String,
    pub name: String,
    pub size: u64,
    /// `None` when the server uses the legacy unquoted listing, which carries
    /// no usable modification time.
    pub last_updated: Option<NaiveDateTime>,
}

impl TemplateInfo {
    /// Parse one `TLS` line.
    ///
    /// Two generations exist:
    /// - quoted: `"<path>" <size> <yyyyMMddHHmmss>`
    /// - legacy: `<path> <size> <date>` where the path runs up to the size
    ///   column and the date is not trusted
    pub fn parse(line: &str) -> Result<Self> {
        if line.contains('"') {
            Self::parse_quoted(line)
        } else {
            Self::parse_legacy(line)
        }
    }

    fn parse_quoted(line: &str) -> Result<Self> {
        let (path, rest) = split_quoted("template", line)?;
        let mut fields = rest.split_whitespace();
        let (Some(size), Some(date)) = (fields.next(), fields.next()) else {
            return Err(AmcpError::malformed("template", line, "expected size and date"));
        };

        let (folder, name) = split_path(path);
        Ok(Self {
            folder,
            name,
            size: parse_number(size)?,
            last_updated: Some(parse_timestamp(date)?),
        })
    }

    fn parse_legacy(line: &str) -> Result<Self> {
        let trimmed = line.trim();
        let (path, size) = trimmed
            .rsplit_once(char::is_whitespace)
            .and_then(|(rest, _date)| rest.trim_end().rsplit_once(char::is_whitespace))
            .ok_or_else(|| AmcpError::malformed("template", line, "expected path, size and date"))?;

        let path = path.trim_end();
        if path.is_empty() {
            return Err(AmcpError::malformed("template", line, "empty path"));
        }

        let (folder, name) = split_path(path);
        Ok(Self {
            folder,
            name,
            size: parse_number(size)?,
            last_updated: None,
        })
    }

    /// Folder and name joined with `/`.
    pub fn full_name(&self) -> String {
        join_path(&self.folder, &self.name)
    }
}

impl fmt::Display for TemplateInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_parse_quoted() {
        let template =
            TemplateInfo::parse("\"CASPAR_TEXT\" 6192 20170412103442").unwrap();
        assert_eq!(template.folder, "");
        assert_eq!(template.name, "CASPAR_TEXT");
        assert_eq!(template.size, 6192);
        assert_eq!(template.last_updated.unwrap().year(), 2017);
    }

    #[test]
    fn test_parse_quoted_with_folder() {
        let template =
            TemplateInfo::parse("\"LOWER/THIRDS/NAME STRAP\" 180 20220301081500").unwrap();
        assert_eq!(template.folder, "LOWER/THIRDS");
        assert_eq!(template.name, "NAME STRAP");
        assert_eq!(template.full_name(), "LOWER/THIRDS/NAME STRAP");
    }

    #[test]
    fn test_parse_legacy_has_unknown_date() {
        let template = TemplateInfo::parse("LOWER\\THIRD 4096 20100101000000").unwrap();
        assert_eq!(template.folder, "LOWER");
        assert_eq!(template.name, "THIRD");
        assert_eq!(template.size, 4096);
        assert_eq!(template.last_updated, None);

        // The date column is not parsed in legacy mode.
        let template = TemplateInfo::parse("CLOCK 512 garbage").unwrap();
        assert_eq!(template.name, "CLOCK");
        assert_eq!(template.last_updated, None);
    }

    #[test]
    fn test_parse_legacy_path_with_spaces() {
        let template = TemplateInfo::parse("MY TEMPLATE  77  20100101000000").unwrap();
        assert_eq!(template.name, "MY TEMPLATE");
        assert_eq!(template.size, 77);
    }

    #[test]
    fn test_malformed_lines() {
        assert!(TemplateInfo::parse("\"X\" 12").is_err());
        assert!(TemplateInfo::parse("\"X\" big 20170412103442").is_err());
        assert!(TemplateInfo::parse("\"X\" 12 yesterday").is_err());
        assert!(TemplateInfo::parse("LONELY").is_err());
        assert!(TemplateInfo::parse("X many 20100101000000").is_err());
    }
}
