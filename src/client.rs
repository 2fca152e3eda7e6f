// MIT License - Copyright (c) 2021 TJForc

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::constants::UNKNOWN_VERSION;
use crate::error::Result;
use crate::event::{event_channel, AmcpEvent, ConnectionEvent, EventReceiver, EventSender};
use crate::interpreter::ResponseInterpreter;
use crate::parser::ParsedResponse;
use crate::protocol::Command;
use crate::records::{ChannelInfo, MediaInfo, TemplateInfo};
use crate::transport::{ReconnectPolicy, ReconnectState, ReconnectionCoordinator, ServerConnection};

/// What the client currently knows about the server.
#[derive(Debug, Clone)]
struct ServerState {
    version: String,
    channels: Vec<ChannelInfo>,
    media: Vec<MediaInfo>,
    templates: Vec<TemplateInfo>,
    datafiles: Vec<String>,
}

impl Default for ServerState {
    fn default() -> Self {
        Self {
            version: UNKNOWN_VERSION.to_string(),
            channels: Vec::new(),
            media: Vec::new(),
            templates: Vec::new(),
            datafiles: Vec::new(),
        }
    }
}

impl ServerState {
    fn apply(&mut self, event: &AmcpEvent) {
        match event {
            AmcpEvent::VersionUpdated(version) => self.version = version.clone(),
            AmcpEvent::ChannelListUpdated(channels) => self.channels = channels.clone(),
            AmcpEvent::MediaListUpdated(media) => self.media = media.clone(),
            AmcpEvent::TemplateListUpdated(templates) => self.templates = templates.clone(),
            AmcpEvent::DataListUpdated(names) => self.datafiles = names.clone(),
            _ => {}
        }
    }
}

/// The main public API for talking to a CasparCG server.
///
/// # Example
///
/// ```no_run
/// use caspar_amcp::{AmcpClient, AmcpEvent, ClientConfig};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = ClientConfig::builder()
///         .hostname("192.168.0.50")
///         .auto_connect(true)
///         .build();
///
///     let client = AmcpClient::new(config);
///     let mut events = client.subscribe();
///     client.connect().await?;
///
///     client.refresh_mediafiles().await?;
///     while let Ok(event) = events.recv().await {
///         if let AmcpEvent::MediaListUpdated(media) = event {
///             for file in &media {
///                 println!("{} {} {}", file.full_name(), file.media_type, file.timecode);
///             }
///             break;
///         }
///     }
///
///     client.disconnect().await;
///     Ok(())
/// }
/// ```
pub struct AmcpClient {
    config: Arc<RwLock<ClientConfig>>,
    connection: ServerConnection,
    coordinator: ReconnectionCoordinator,
    state: Arc<RwLock<ServerState>>,
    event_tx: EventSender,
    dispatch_handle: JoinHandle<()>,
    state_handle: JoinHandle<()>,
}

impl AmcpClient {
    /// Create an idle client. Must be called inside a Tokio runtime.
    pub fn new(mut config: ClientConfig) -> Self {
        config.event_capacity = config.event_capacity.max(1);
        let (event_tx, _event_rx) = event_channel(config.event_capacity);
        let (connection, responses) = ServerConnection::new();
        let (coordinator, notifications) =
            ReconnectionCoordinator::spawn(connection.clone(), ReconnectPolicy::from_config(&config));
        let state = Arc::new(RwLock::new(ServerState::default()));

        let dispatch_handle = spawn_dispatch_task(responses, state.clone(), event_tx.clone());
        let state_handle =
            spawn_connection_state_task(notifications, connection.clone(), event_tx.clone());

        Self {
            config: Arc::new(RwLock::new(config)),
            connection,
            coordinator,
            state,
            event_tx,
            dispatch_handle,
            state_handle,
        }
    }

    /// Subscribe to client events.
    pub fn subscribe(&self) -> EventReceiver {
        self.event_tx.subscribe()
    }

    pub async fn config(&self) -> ClientConfig {
        self.config.read().await.clone()
    }

    /// Connect with the stored settings.
    ///
    /// Returns `Ok(false)` without doing anything if already connected. With
    /// auto-connect enabled a failed first attempt still starts the retry
    /// cycle; the error is returned either way.
    pub async fn connect(&self) -> Result<bool> {
        if self.connection.is_connected().await {
            return Ok(false);
        }

        let config = self.config.read().await.clone();
        self.coordinator
            .set_policy(ReconnectPolicy::from_config(&config));
        self.connection
            .connect(config.effective_hostname(), config.port)
            .await?;
        Ok(true)
    }

    /// Store new settings and connect. No-op returning `Ok(false)` if already
    /// connected, in which case the settings are left untouched.
    pub async fn connect_to(&self, host: &str, port: u16, auto_reconnect: bool) -> Result<bool> {
        if self.connection.is_connected().await {
            return Ok(false);
        }
        {
            let mut config = self.config.write().await;
            config.hostname = host.to_string();
            config.port = port;
            config.auto_connect = auto_reconnect;
        }
        self.connect().await
    }

    /// Stop any reconnection cycle, then close the link.
    ///
    /// Returns false if there was no open connection.
    pub async fn disconnect(&self) -> bool {
        info!("Disconnecting from server");
        self.coordinator.cancel().await;
        self.connection.close().await
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.is_connected().await
    }

    pub fn reconnect_state(&self) -> ReconnectState {
        self.coordinator.state()
    }

    /// Malformed frames and invalid UTF-8 sequences seen on the link.
    pub fn protocol_errors(&self) -> u64 {
        self.connection.protocol_errors()
    }

    // ---- Commands ----

    /// Send a raw command line.
    pub async fn send_string(&self, line: &str) -> Result<()> {
        self.connection.send_string(line).await
    }

    pub async fn send_command(&self, command: &Command) -> Result<()> {
        self.connection.send_command(command).await
    }

    pub async fn refresh_version(&self) -> Result<()> {
        self.send_command(&Command::Version).await
    }

    pub async fn refresh_channels(&self) -> Result<()> {
        self.send_command(&Command::Info).await
    }

    pub async fn refresh_mediafiles(&self) -> Result<()> {
        self.send_command(&Command::Cls).await
    }

    pub async fn refresh_templates(&self) -> Result<()> {
        self.send_command(&Command::Tls).await
    }

    pub async fn refresh_datalist(&self) -> Result<()> {
        self.send_command(&Command::DataList).await
    }

    /// Store a payload under `name`. The payload must already be escaped.
    pub async fn store_data(&self, name: &str, payload: &str) -> Result<()> {
        self.send_command(&Command::DataStore {
            name: name.to_string(),
            payload: payload.to_string(),
        })
        .await
    }

    pub async fn retrieve_data(&self, name: &str) -> Result<()> {
        self.send_command(&Command::DataRetrieve {
            name: name.to_string(),
        })
        .await
    }

    pub async fn remove_data(&self, name: &str) -> Result<()> {
        self.send_command(&Command::DataRemove {
            name: name.to_string(),
        })
        .await
    }

    pub async fn refresh_thumbnails(&self) -> Result<()> {
        self.send_command(&Command::ThumbnailList).await
    }

    pub async fn retrieve_thumbnail(&self, name: &str) -> Result<()> {
        self.send_command(&Command::ThumbnailRetrieve {
            name: name.to_string(),
        })
        .await
    }

    // ---- Cached state ----

    /// Server version, `"unknown"` until `VERSION` has been answered.
    pub async fn version(&self) -> String {
        self.state.read().await.version.clone()
    }

    pub async fn channels(&self) -> Vec<ChannelInfo> {
        self.state.read().await.channels.clone()
    }

    pub async fn media(&self) -> Vec<MediaInfo> {
        self.state.read().await.media.clone()
    }

    pub async fn templates(&self) -> Vec<TemplateInfo> {
        self.state.read().await.templates.clone()
    }

    pub async fn datafiles(&self) -> Vec<String> {
        self.state.read().await.datafiles.clone()
    }

    /// Attach a thumbnail to the cached media file named `full_name`.
    ///
    /// Returns false if no such file is cached.
    pub async fn set_thumbnail(&self, full_name: &str, data: &str) -> bool {
        let mut state = self.state.write().await;
        match state.media.iter_mut().find(|m| m.full_name() == full_name) {
            Some(media) => {
                media.set_thumbnail(data);
                true
            }
            None => false,
        }
    }
}

impl Drop for AmcpClient {
    fn drop(&mut self) {
        self.dispatch_handle.abort();
        self.state_handle.abort();
    }
}

/// Spawn the task that interprets parsed responses and publishes events.
fn spawn_dispatch_task(
    mut responses: mpsc::UnboundedReceiver<ParsedResponse>,
    state: Arc<RwLock<ServerState>>,
    event_tx: EventSender,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interpreter = ResponseInterpreter::new();
        while let Some(response) = responses.recv().await {
            let Some(event) = interpreter.interpret(&response) else {
                continue;
            };
            state.write().await.apply(&event);
            debug!("Publishing {}", event.name());
            let _ = event_tx.send(event);
        }
        debug!("Response stream closed");
    })
}

/// Spawn the task that republishes connection changes and primes a fresh
/// connection with `VERSION` and `INFO`.
fn spawn_connection_state_task(
    mut notifications: mpsc::UnboundedReceiver<ConnectionEvent>,
    connection: ServerConnection,
    event_tx: EventSender,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            let connected = notification.connected;
            let _ = event_tx.send(AmcpEvent::ConnectionStateChanged(notification));

            if connected {
                for command in [Command::Version, Command::Info] {
                    if let Err(e) = connection.send_command(&command).await {
                        warn!("Failed to send {}: {}", command, e);
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AmcpError;

    #[test]
    fn test_state_defaults() {
        let state = ServerState::default();
        assert_eq!(state.version, "unknown");
        assert!(state.channels.is_empty());
        assert!(state.media.is_empty());
    }

    #[test]
    fn test_state_apply() {
        let mut state = ServerState::default();
        state.apply(&AmcpEvent::VersionUpdated("2.3.0".into()));
        state.apply(&AmcpEvent::ChannelListUpdated(vec![ChannelInfo::new(1, "PAL")]));
        state.apply(&AmcpEvent::DataListUpdated(vec!["score".into()]));
        state.apply(&AmcpEvent::DataRetrieved("ignored".into()));

        assert_eq!(state.version, "2.3.0");
        assert_eq!(state.channels.len(), 1);
        assert_eq!(state.datafiles, vec!["score".to_string()]);
    }

    #[tokio::test]
    async fn test_commands_require_connection() {
        let client = AmcpClient::new(ClientConfig::default());
        assert!(!client.is_connected().await);
        assert!(matches!(
            client.refresh_mediafiles().await,
            Err(AmcpError::NotConnected)
        ));
        assert!(matches!(
            client.store_data("x", "y").await,
            Err(AmcpError::NotConnected)
        ));
        assert!(!client.disconnect().await);
        assert_eq!(client.version().await, "unknown");
        assert_eq!(client.reconnect_state(), ReconnectState::Idle);
    }

    #[tokio::test]
    async fn test_zero_event_capacity_is_clamped() {
        let client = AmcpClient::new(ClientConfig {
            event_capacity: 0,
            ..Default::default()
        });
        assert_eq!(client.config().await.event_capacity, 1);

        let mut events = client.subscribe();
        let _ = client.event_tx.send(AmcpEvent::DataRetrieved("x".into()));
        assert!(matches!(events.recv().await, Ok(AmcpEvent::DataRetrieved(ref d)) if d == "x"));
    }

    #[tokio::test]
    async fn test_set_thumbnail_on_cached_media() {
        let client = AmcpClient::new(ClientConfig::default());
        client.state.write().await.apply(&AmcpEvent::MediaListUpdated(vec![
            MediaInfo::parse("\"CLIPS/AMB\" MOVIE 10 20200101000000 50 1/25").unwrap(),
        ]));

        assert!(client.set_thumbnail("CLIPS/AMB", "iVBORw0KGgo=").await);
        assert!(!client.set_thumbnail("CLIPS/MISSING", "x").await);
        assert_eq!(
            client.media().await[0].thumbnail.as_deref(),
            Some("iVBORw0KGgo=")
        );
    }
}
