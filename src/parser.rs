// MIT License - Copyright (c) 2021 TJForc

//! Splits the decoded response stream into AMCP frames.
//!
//! A frame starts with a status line `<code> <COMMAND> [<SUBCOMMAND>] <STATUS>`
//! and the code decides how much payload follows:
//!
//! - `200`: a block of lines closed by an empty line
//! - `201`: exactly one line
//! - `400`: exactly one line (the server echoes the rejected request)
//! - anything else: no payload
//!
//! The parser is fed arbitrary chunks and keeps partial lines and partial
//! frames between calls.

use tracing::{debug, trace, warn};

use crate::constants::{status, STATUS_PHRASE_WORDS};
use crate::error::{AmcpError, ErrorKind, Result, StatusCode};
use crate::protocol::AmcpCommand;

/// One complete response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    /// Command token, e.g. `CLS`; empty for a bare `400 ERROR`
    pub command: String,
    /// Remaining tokens before the status phrase, e.g. `RETRIEVE`
    pub subcommand: String,
    pub status_code: u16,
    /// Payload lines in arrival order
    pub data: Vec<String>,
    /// Whether the payload was an empty-line-terminated block
    pub is_block: bool,
}

impl ParsedResponse {
    pub fn error_kind(&self) -> ErrorKind {
        ErrorKind::from_status(self.status_code)
    }

    pub fn command_kind(&self) -> AmcpCommand {
        AmcpCommand::from_token(&self.command)
    }

    pub fn first_line(&self) -> Option<&str> {
        self.data.first().map(String::as_str)
    }
}

/// A decoded status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub code: u16,
    pub command: String,
    pub subcommand: String,
}

/// Parse a status line such as `201 DATA RETRIEVE OK`.
pub fn parse_status_line(line: &str) -> Result<StatusLine> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let invalid = || AmcpError::InvalidHeader {
        line: line.to_string(),
    };

    let code_token = tokens.first().ok_or_else(invalid)?;
    if code_token.len() != 3 || !code_token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let code: u16 = code_token.parse().map_err(|_| invalid())?;

    let mut rest = &tokens[1..];
    if rest.ends_with(&["FILE", "NOT", "FOUND"]) {
        rest = &rest[..rest.len() - 3];
    } else if let Some(last) = rest.last() {
        if STATUS_PHRASE_WORDS.contains(last) {
            rest = &rest[..rest.len() - 1];
        }
    }

    let command = rest.first().map(|s| s.to_string()).unwrap_or_default();
    let subcommand = rest.get(1..).map(|s| s.join(" ")).unwrap_or_default();

    Ok(StatusLine {
        code,
        command,
        subcommand,
    })
}

#[derive(Debug)]
enum ParserState {
    ExpectingHeader,
    ExpectingOneLine(ParsedResponse),
    ExpectingBlock(ParsedResponse),
}

/// Stateful frame parser for one connection.
#[derive(Debug)]
pub struct ResponseParser {
    buffer: String,
    state: ParserState,
    malformed_frames: u64,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseParser {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            state: ParserState::ExpectingHeader,
            malformed_frames: 0,
        }
    }

    /// Consume decoded text and return every frame it completes, in order.
    ///
    /// A malformed status line is logged, counted and skipped; the frames
    /// around it are still returned.
    pub fn feed(&mut self, text: &str) -> Vec<ParsedResponse> {
        self.buffer.push_str(text);

        let mut complete = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let mut line: String = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            self.parse_line(line, &mut complete);
        }
        complete
    }

    /// Number of frames dropped because their status line was unreadable.
    pub fn malformed_frames(&self) -> u64 {
        self.malformed_frames
    }

    /// Whether a frame or line has started but not finished.
    pub fn is_mid_frame(&self) -> bool {
        !self.buffer.is_empty() || !matches!(self.state, ParserState::ExpectingHeader)
    }

    fn parse_line(&mut self, line: String, complete: &mut Vec<ParsedResponse>) {
        match std::mem::replace(&mut self.state, ParserState::ExpectingHeader) {
            ParserState::ExpectingHeader => {
                if line.trim().is_empty() {
                    return;
                }
                match parse_status_line(&line) {
                    Ok(header) => self.start_frame(header, complete),
                    Err(e) => {
                        self.malformed_frames += 1;
                        warn!(
                            malformed_frames = self.malformed_frames,
                            "Skipping malformed response frame: {}", e
                        );
                    }
                }
            }
            ParserState::ExpectingOneLine(mut response) => {
                if !line.is_empty() {
                    response.data.push(line);
                }
                Self::finish(response, complete);
            }
            ParserState::ExpectingBlock(mut response) => {
                if line.is_empty() {
                    Self::finish(response, complete);
                } else {
                    trace!("Block line for {}: {}", response.command, line);
                    response.data.push(line);
                    self.state = ParserState::ExpectingBlock(response);
                }
            }
        }
    }

    fn start_frame(&mut self, header: StatusLine, complete: &mut Vec<ParsedResponse>) {
        let mut response = ParsedResponse {
            command: header.command,
            subcommand: header.subcommand,
            status_code: header.code,
            data: Vec::new(),
            is_block: false,
        };

        if !response.error_kind().is_success() {
            debug!(
                "Server returned {} for {} {}",
                StatusCode(response.status_code),
                response.command,
                response.subcommand
            );
        }

        match header.code {
            status::OK_MULTILINE => {
                response.is_block = true;
                self.state = ParserState::ExpectingBlock(response);
            }
            status::OK_SINGLE_LINE | status::UNDEFINED_ERROR => {
                self.state = ParserState::ExpectingOneLine(response);
            }
            _ => Self::finish(response, complete),
        }
    }

    fn finish(response: ParsedResponse, complete: &mut Vec<ParsedResponse>) {
        debug!(
            "Parsed response: {} {} {} ({} lines)",
            response.status_code,
            response.command,
            response.subcommand,
            response.data.len()
        );
        complete.push(response);
    }
}
