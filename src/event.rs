// MIT License - Copyright (c) 2021 TJForc

use std::sync::Arc;

use crate::error::AmcpError;
use crate::records::{ChannelInfo, MediaInfo, TemplateInfo};

/// A change in connection state.
///
/// A disconnect caused by a failure carries the error; a requested close
/// does not.
#[derive(Debug, Clone)]
pub struct ConnectionEvent {
    pub host: String,
    pub port: u16,
    pub connected: bool,
    pub error: Option<Arc<AmcpError>>,
}

impl ConnectionEvent {
    pub fn connected(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connected: true,
            error: None,
        }
    }

    pub fn disconnected(host: impl Into<String>, port: u16, error: Option<AmcpError>) -> Self {
        Self {
            host: host.into(),
            port,
            connected: false,
            error: error.map(Arc::new),
        }
    }

    /// Whether this is a disconnect caused by an error.
    pub fn is_failure(&self) -> bool {
        !self.connected && self.error.is_some()
    }
}

/// All events that can be emitted by the client.
///
/// Users subscribe via `client.subscribe()` to receive a
/// `tokio::sync::broadcast::Receiver<AmcpEvent>`.
#[derive(Debug, Clone)]
pub enum AmcpEvent {
    /// Connection established or lost
    ConnectionStateChanged(ConnectionEvent),
    /// `VERSION` answered
    VersionUpdated(String),
    /// `CLS` answered; replaces the whole media list
    MediaListUpdated(Vec<MediaInfo>),
    /// `TLS` answered; replaces the whole template list
    TemplateListUpdated(Vec<TemplateInfo>),
    /// `INFO` answered; the merged channel list
    ChannelListUpdated(Vec<ChannelInfo>),
    /// `DATA LIST` answered
    DataListUpdated(Vec<String>),
    /// `DATA RETRIEVE` answered; empty when the entry is missing
    DataRetrieved(String),
    /// `THUMBNAIL` answered
    ThumbnailRetrieved { data: String, command: String },
    /// `INFO` answered with an XML document instead of a channel list
    InfoReceived(String),
    /// Any other successful response, passed through untouched
    ServerResponded {
        command: String,
        subcommand: String,
        data: Vec<String>,
    },
}

impl AmcpEvent {
    /// Short name used in logs and the console output.
    pub fn name(&self) -> &'static str {
        match self {
            AmcpEvent::ConnectionStateChanged(_) => "connection_state_changed",
            AmcpEvent::VersionUpdated(_) => "version_updated",
            AmcpEvent::MediaListUpdated(_) => "media_list_updated",
            AmcpEvent::TemplateListUpdated(_) => "template_list_updated",
            AmcpEvent::ChannelListUpdated(_) => "channel_list_updated",
            AmcpEvent::DataListUpdated(_) => "data_list_updated",
            AmcpEvent::DataRetrieved(_) => "data_retrieved",
            AmcpEvent::ThumbnailRetrieved { .. } => "thumbnail_retrieved",
            AmcpEvent::InfoReceived(_) => "info_received",
            AmcpEvent::ServerResponded { .. } => "server_responded",
        }
    }
}

/// Type alias for the broadcast sender.
pub type EventSender = tokio::sync::broadcast::Sender<AmcpEvent>;

/// Type alias for the broadcast receiver.
pub type EventReceiver = tokio::sync::broadcast::Receiver<AmcpEvent>;

/// Create a new event channel with the given capacity.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    tokio::sync::broadcast::channel(capacity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_event_constructors() {
        let up = ConnectionEvent::connected("localhost", 5250);
        assert!(up.connected);
        assert!(!up.is_failure());

        let closed = ConnectionEvent::disconnected("localhost", 5250, None);
        assert!(!closed.connected);
        assert!(!closed.is_failure());

        let lost =
            ConnectionEvent::disconnected("localhost", 5250, Some(AmcpError::ConnectionClosed));
        assert!(lost.is_failure());
        assert!(matches!(
            lost.error.as_deref(),
            Some(AmcpError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_event_channel_fan_out() {
        let (tx, mut rx1) = event_channel(4);
        let mut rx2 = tx.subscribe();
        tx.send(AmcpEvent::VersionUpdated("2.3.0".into())).unwrap();

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                AmcpEvent::VersionUpdated(v) => assert_eq!(v, "2.3.0"),
                other => panic!("unexpected event {:?}", other),
            }
        }
    }
}
