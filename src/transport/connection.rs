// MIT License - Copyright (c) 2021 TJForc

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::config::resolve_hostname;
use crate::constants::{EVENT_CHANNEL_CAPACITY, READ_BUFFER_SIZE, WRITE_QUEUE_CAPACITY};
use crate::error::{AmcpError, Result};
use crate::event::ConnectionEvent;
use crate::parser::{ParsedResponse, ResponseParser};
use crate::protocol::{encode_line, Command};
use crate::transport::decoder::Utf8Decoder;

/// Owns the single TCP link to the server.
///
/// Each successful `connect` spawns a reader task (socket → decoder →
/// parser → response stream) and a writer task draining a FIFO queue, so
/// at most one write is in flight. Connection state changes are broadcast
/// as [`ConnectionEvent`]s; the engine never retries on its own.
#[derive(Clone)]
pub struct ServerConnection {
    inner: Arc<Inner>,
}

struct Inner {
    active: Mutex<Option<ActiveConnection>>,
    events: broadcast::Sender<ConnectionEvent>,
    responses: mpsc::UnboundedSender<ParsedResponse>,
    next_id: AtomicU64,
    /// Bumped by every `close`, always under the `active` lock
    close_generation: AtomicU64,
    protocol_errors: AtomicU64,
}

struct ActiveConnection {
    id: u64,
    host: String,
    port: u16,
    writes: mpsc::Sender<Vec<u8>>,
    shutdown: watch::Sender<bool>,
    reader_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
}

impl ServerConnection {
    /// Create an idle engine and the stream its parsed responses arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ParsedResponse>) {
        let (responses, response_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let connection = Self {
            inner: Arc::new(Inner {
                active: Mutex::new(None),
                events,
                responses,
                next_id: AtomicU64::new(0),
                close_generation: AtomicU64::new(0),
                protocol_errors: AtomicU64::new(0),
            }),
        };
        (connection, response_rx)
    }

    /// Subscribe to connection state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    /// Open a new connection, tearing down any existing one first.
    ///
    /// A failed attempt is reported both as the returned error and as a
    /// disconnect notification carrying it. If `close` is called while the
    /// attempt is pending, the attempt is abandoned without a notification.
    pub async fn connect(&self, host: &str, port: u16) -> Result<()> {
        let host = resolve_hostname(host).to_string();

        let generation = {
            let mut active = self.inner.active.lock().await;
            if let Some(previous) = active.take() {
                debug!("Replacing connection to {}:{}", previous.host, previous.port);
                self.inner.retire(previous, None);
            }
            self.inner.close_generation.load(Ordering::Relaxed)
        };

        info!("Connecting to {}:{}", host, port);
        match TcpStream::connect((host.as_str(), port)).await {
            Ok(stream) => self.install(stream, host, port, generation).await,
            Err(e) => {
                warn!("Connect to {}:{} failed: {}", host, port, e);
                let _active = self.inner.active.lock().await;
                if self.inner.close_generation.load(Ordering::Relaxed) == generation {
                    let _ = self.inner.events.send(ConnectionEvent::disconnected(
                        &host,
                        port,
                        Some(AmcpError::connect_failed(&host, port, &e)),
                    ));
                }
                Err(AmcpError::connect_failed(&host, port, &e))
            }
        }
    }

    /// Install a freshly connected stream, unless `close` ran since
    /// `generation` was read.
    async fn install(
        &self,
        stream: TcpStream,
        host: String,
        port: u16,
        generation: u64,
    ) -> Result<()> {
        // Hold the lock while installing so a reader that fails immediately
        // cannot report the disconnect before the connect.
        let mut active = self.inner.active.lock().await;
        if self.inner.close_generation.load(Ordering::Relaxed) != generation {
            info!("Dropping connection to {}:{}: closed while connecting", host, port);
            return Err(AmcpError::ConnectAborted { host, port });
        }
        if let Some(raced) = active.take() {
            self.inner.retire(raced, None);
        }

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle: {}", e);
        }

        let (reader, writer) = stream.into_split();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (write_tx, write_rx) = mpsc::channel(WRITE_QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let reader_handle = spawn_reader_task(
            reader,
            id,
            Arc::downgrade(&self.inner),
            shutdown_rx.clone(),
        );
        let writer_handle = spawn_writer_task(
            writer,
            id,
            Arc::downgrade(&self.inner),
            write_rx,
            shutdown_rx,
        );

        *active = Some(ActiveConnection {
            id,
            host: host.clone(),
            port,
            writes: write_tx,
            shutdown: shutdown_tx,
            reader_handle,
            writer_handle,
        });

        info!("Connected to {}:{}", host, port);
        let _ = self.inner.events.send(ConnectionEvent::connected(host, port));
        Ok(())
    }

    /// Close the active connection.
    ///
    /// Returns false if nothing was open, in which case no notification is sent.
    pub async fn close(&self) -> bool {
        let mut active = self.inner.active.lock().await;
        self.inner.close_generation.fetch_add(1, Ordering::Relaxed);
        match active.take() {
            Some(connection) => {
                self.inner.retire(connection, None);
                true
            }
            None => false,
        }
    }

    /// Queue raw bytes for transmission.
    pub async fn send(&self, payload: Vec<u8>) -> Result<()> {
        let writes = {
            let active = self.inner.active.lock().await;
            active
                .as_ref()
                .map(|c| c.writes.clone())
                .ok_or(AmcpError::NotConnected)?
        };
        writes
            .send(payload)
            .await
            .map_err(|_| AmcpError::ChannelClosed)
    }

    /// Queue one command line, appending the delimiter.
    pub async fn send_string(&self, line: &str) -> Result<()> {
        debug!("Sending: {}", line);
        self.send(encode_line(line)).await
    }

    pub async fn send_command(&self, command: &Command) -> Result<()> {
        self.send_string(&command.to_wire_string()).await
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.active.lock().await.is_some()
    }

    /// Host and port of the active connection.
    pub async fn endpoint(&self) -> Option<(String, u16)> {
        self.inner
            .active
            .lock()
            .await
            .as_ref()
            .map(|c| (c.host.clone(), c.port))
    }

    /// Malformed frames and invalid UTF-8 sequences seen so far.
    pub fn protocol_errors(&self) -> u64 {
        self.inner.protocol_errors.load(Ordering::Relaxed)
    }
}

impl Inner {
    /// Tear down the connection `id` after an I/O failure. Ignored if that
    /// connection has already been replaced or closed.
    async fn teardown(&self, id: u64, error: AmcpError) {
        let mut active = self.active.lock().await;
        if !matches!(active.as_ref(), Some(c) if c.id == id) {
            debug!("Ignoring failure of stale connection {}: {}", id, error);
            return;
        }
        if let Some(connection) = active.take() {
            self.retire(connection, Some(error));
        }
    }

    fn retire(&self, connection: ActiveConnection, error: Option<AmcpError>) {
        let _ = connection.shutdown.send(true);
        match &error {
            Some(e) => warn!(
                "Connection to {}:{} lost: {}",
                connection.host, connection.port, e
            ),
            None => info!(
                "Disconnected from {}:{}",
                connection.host, connection.port
            ),
        }
        let _ = self.events.send(ConnectionEvent::disconnected(
            connection.host,
            connection.port,
            error,
        ));
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(connection) = self.active.get_mut().take() {
            connection.reader_handle.abort();
            connection.writer_handle.abort();
        }
    }
}

/// Spawn the reader task that feeds incoming data through the parser.
fn spawn_reader_task(
    mut reader: OwnedReadHalf,
    id: u64,
    inner: Weak<Inner>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut decoder = Utf8Decoder::new();
        let mut parser = ResponseParser::new();
        let mut reported_errors = 0;

        let failure = loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    debug!("Reader {}: shut down", id);
                    return;
                }
                read = reader.read(&mut buf) => match read {
                    Ok(0) => {
                        debug!("Reader {}: connection closed by server", id);
                        if parser.is_mid_frame() || decoder.pending_len() > 0 {
                            warn!("Reader {}: connection closed in the middle of a response", id);
                            if let Some(engine) = inner.upgrade() {
                                engine.protocol_errors.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        break AmcpError::ConnectionClosed;
                    }
                    Ok(n) => {
                        trace!("Reader {}: {} bytes", id, n);
                        let text = decoder.decode(&buf[..n]);
                        let responses = parser.feed(&text);

                        let Some(engine) = inner.upgrade() else { return };
                        let errors = parser.malformed_frames() + decoder.invalid_sequences();
                        if errors > reported_errors {
                            engine
                                .protocol_errors
                                .fetch_add(errors - reported_errors, Ordering::Relaxed);
                            reported_errors = errors;
                        }
                        for response in responses {
                            if engine.responses.send(response).is_err() {
                                debug!("Reader {}: response stream dropped", id);
                            }
                        }
                    }
                    Err(e) => {
                        error!("Reader {}: read error: {}", id, e);
                        break AmcpError::Io(e);
                    }
                }
            }
        };

        if let Some(inner) = inner.upgrade() {
            inner.teardown(id, failure).await;
        }
    })
}

/// Spawn the writer task; one payload is written at a time, in queue order.
fn spawn_writer_task(
    mut writer: OwnedWriteHalf,
    id: u64,
    inner: Weak<Inner>,
    mut writes: mpsc::Receiver<Vec<u8>>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let payload = tokio::select! {
                biased;
                _ = shutdown.changed() => return,
                next = writes.recv() => match next {
                    Some(payload) => payload,
                    None => return,
                },
            };

            if let Err(e) = writer.write_all(&payload).await {
                error!("Writer {}: write error: {}", id, e);
                if let Some(inner) = inner.upgrade() {
                    inner.teardown(id, AmcpError::Io(e)).await;
                }
                return;
            }
            trace!("Writer {}: wrote {} bytes", id, payload.len());
        }
    })
}
