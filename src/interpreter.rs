// MIT License - Copyright (c) 2021 TJForc

//! Turns parsed frames into typed events.

use tracing::{debug, warn};

use crate::error::{ErrorKind, Result};
use crate::event::AmcpEvent;
use crate::parser::ParsedResponse;
use crate::protocol::AmcpCommand;
use crate::records::{ChannelInfo, MediaInfo, TemplateInfo};

/// Maps each [`ParsedResponse`] to at most one [`AmcpEvent`].
///
/// Holds the channel list so that successive `INFO` answers are merged by
/// channel id rather than replacing each other.
#[derive(Debug, Default)]
pub struct ResponseInterpreter {
    channels: Vec<ChannelInfo>,
    malformed_entries: u64,
}

impl ResponseInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interpret one response. Returns `None` when the response carries
    /// nothing for the application (plain acknowledgements, most errors).
    pub fn interpret(&mut self, response: &ParsedResponse) -> Option<AmcpEvent> {
        let kind = response.error_kind();

        match response.command_kind() {
            AmcpCommand::Data => self.interpret_data(response, kind),
            AmcpCommand::Thumbnail => {
                let data = if kind.is_success() {
                    first_line_or_empty(response)
                } else {
                    String::new()
                };
                Some(AmcpEvent::ThumbnailRetrieved {
                    data,
                    command: response.command.clone(),
                })
            }
            _ if !kind.is_success() => {
                debug!(
                    "Dropping {} response to {} {}",
                    response.status_code, response.command, response.subcommand
                );
                None
            }
            AmcpCommand::Version => match response.first_line() {
                Some(version) => Some(AmcpEvent::VersionUpdated(version.to_string())),
                None => {
                    warn!("VERSION response without a version line");
                    None
                }
            },
            AmcpCommand::Cls => Some(AmcpEvent::MediaListUpdated(self.parse_lines(
                "media",
                &response.data,
                MediaInfo::parse,
            ))),
            AmcpCommand::Tls => Some(AmcpEvent::TemplateListUpdated(self.parse_lines(
                "template",
                &response.data,
                TemplateInfo::parse,
            ))),
            AmcpCommand::Info if response.subcommand.is_empty() => Some(self.interpret_info(response)),
            AmcpCommand::Load
            | AmcpCommand::LoadBg
            | AmcpCommand::Play
            | AmcpCommand::Stop
            | AmcpCommand::Cg
            | AmcpCommand::Cinf => None,
            AmcpCommand::Info | AmcpCommand::Other(_) => Some(passthrough(response)),
        }
    }

    /// Current merged channel list.
    pub fn channels(&self) -> &[ChannelInfo] {
        &self.channels
    }

    /// Number of list lines skipped because they failed to parse.
    pub fn malformed_entries(&self) -> u64 {
        self.malformed_entries
    }

    fn interpret_data(&self, response: &ParsedResponse, kind: ErrorKind) -> Option<AmcpEvent> {
        let retrieve = response.subcommand == "RETRIEVE";
        match kind {
            ErrorKind::None if retrieve => {
                Some(AmcpEvent::DataRetrieved(first_line_or_empty(response)))
            }
            ErrorKind::None if response.subcommand == "LIST" => {
                Some(AmcpEvent::DataListUpdated(response.data.clone()))
            }
            ErrorKind::None => Some(passthrough(response)),
            ErrorKind::FileNotFound => Some(AmcpEvent::DataRetrieved(String::new())),
            ErrorKind::Other if retrieve => Some(AmcpEvent::DataRetrieved(String::new())),
            ErrorKind::Other => {
                debug!(
                    "Dropping {} response to DATA {}",
                    response.status_code, response.subcommand
                );
                None
            }
        }
    }

    fn interpret_info(&mut self, response: &ParsedResponse) -> AmcpEvent {
        if let Some(first) = response.first_line() {
            if first.starts_with('<') {
                return AmcpEvent::InfoReceived(response.data.join("\n"));
            }
        }

        let parsed = self.parse_lines("channel", &response.data, ChannelInfo::parse);
        for channel in parsed {
            match self.channels.binary_search_by_key(&channel.id, |c| c.id) {
                Ok(slot) => self.channels[slot].video_mode = channel.video_mode,
                Err(slot) => self.channels.insert(slot, channel),
            }
        }
        AmcpEvent::ChannelListUpdated(self.channels.clone())
    }

    fn parse_lines<T>(
        &mut self,
        kind: &str,
        lines: &[String],
        parse: impl Fn(&str) -> Result<T>,
    ) -> Vec<T> {
        let mut entries = Vec::with_capacity(lines.len());
        for line in lines {
            match parse(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    self.malformed_entries += 1;
                    warn!("Skipping {} line: {}", kind, e);
                }
            }
        }
        entries
    }
}

fn first_line_or_empty(response: &ParsedResponse) -> String {
    response.first_line().unwrap_or_default().to_string()
}

fn passthrough(response: &ParsedResponse) -> AmcpEvent {
    AmcpEvent::ServerResponded {
        command: response.command.clone(),
        subcommand: response.subcommand.clone(),
        data: response.data.clone(),
    }
}
