// MIT License - Copyright (c) 2021 TJForc

use std::time::Duration;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::event::ConnectionEvent;
use crate::transport::connection::ServerConnection;

/// Where the coordinator is in its retry cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectState {
    /// Following the engine; notifications pass straight through
    Idle,
    /// Link lost; attempting to connect on a fixed interval
    Retrying,
    /// An attempt succeeded; about to hand back to `Idle`
    Reconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub interval: Duration,
}

impl ReconnectPolicy {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            enabled: config.auto_connect,
            interval: config.reconnect_interval(),
        }
    }
}

enum Control {
    Cancel(oneshot::Sender<()>),
}

/// Keeps the link alive when auto-reconnect is enabled.
///
/// Sits between the engine's notifications and the application: while
/// `Idle` it forwards everything. A disconnect carrying an error moves it to
/// `Retrying`, where failed attempts are retried every `interval` without
/// surfacing. The first successful attempt is forwarded as a single
/// connected notification and the coordinator returns to `Idle`.
pub struct ReconnectionCoordinator {
    control: mpsc::UnboundedSender<Control>,
    policy: watch::Sender<ReconnectPolicy>,
    state: watch::Receiver<ReconnectState>,
    handle: JoinHandle<()>,
}

impl ReconnectionCoordinator {
    /// Start the coordinator and return the notification stream the
    /// application should follow instead of the engine's.
    pub fn spawn(
        connection: ServerConnection,
        policy: ReconnectPolicy,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        // Subscribe before anything can connect so no notification is missed.
        let engine_events = connection.subscribe();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (policy_tx, policy_rx) = watch::channel(policy);
        let (state_tx, state_rx) = watch::channel(ReconnectState::Idle);
        let (forward_tx, forward_rx) = mpsc::unbounded_channel();

        let worker = Worker {
            connection,
            engine_events,
            control: control_rx,
            policy: policy_rx,
            state: state_tx,
            forward: forward_tx,
            endpoint: None,
            retry_at: None,
        };
        let handle = tokio::spawn(worker.run());

        let coordinator = Self {
            control: control_tx,
            policy: policy_tx,
            state: state_rx,
            handle,
        };
        (coordinator, forward_rx)
    }

    pub fn state(&self) -> ReconnectState {
        *self.state.borrow()
    }

    /// Replace the policy; takes effect from the next disconnect or retry.
    pub fn set_policy(&self, policy: ReconnectPolicy) {
        self.policy.send_replace(policy);
    }

    /// Stop any retry cycle. Returns once the coordinator has acknowledged,
    /// so a following `close` cannot be undone by a pending attempt.
    pub async fn cancel(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.control.send(Control::Cancel(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }
}

impl Drop for ReconnectionCoordinator {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct Worker {
    connection: ServerConnection,
    engine_events: broadcast::Receiver<ConnectionEvent>,
    control: mpsc::UnboundedReceiver<Control>,
    policy: watch::Receiver<ReconnectPolicy>,
    state: watch::Sender<ReconnectState>,
    forward: mpsc::UnboundedSender<ConnectionEvent>,
    endpoint: Option<(String, u16)>,
    retry_at: Option<Instant>,
}

impl Worker {
    async fn run(mut self) {
        loop {
            let deadline = self.retry_at.unwrap_or_else(Instant::now);
            tokio::select! {
                biased;
                control = self.control.recv() => match control {
                    Some(Control::Cancel(ack)) => self.cancel(ack),
                    None => return,
                },
                event = self.engine_events.recv() => match event {
                    Ok(event) => self.on_event(event, true),
                    Err(RecvError::Lagged(n)) => warn!("Reconnection coordinator lagged by {} events", n),
                    Err(RecvError::Closed) => return,
                },
                _ = sleep_until(deadline), if self.retry_at.is_some() => {
                    self.retry_at = None;
                    self.attempt().await;
                }
            }
        }
    }

    fn current(&self) -> ReconnectState {
        *self.state.borrow()
    }

    fn set_state(&self, state: ReconnectState) {
        self.state.send_replace(state);
    }

    fn on_event(&mut self, event: ConnectionEvent, allow_retry: bool) {
        match self.current() {
            ReconnectState::Retrying if event.connected => {
                info!("Reconnected to {}:{}", event.host, event.port);
                self.retry_at = None;
                self.set_state(ReconnectState::Reconnected);
                self.forward(event);
                self.set_state(ReconnectState::Idle);
            }
            ReconnectState::Retrying => {
                debug!(
                    "Suppressed disconnect from {}:{} while retrying",
                    event.host, event.port
                );
            }
            ReconnectState::Idle | ReconnectState::Reconnected => {
                self.endpoint = Some((event.host.clone(), event.port));
                let policy = *self.policy.borrow();
                let retry = allow_retry && policy.enabled && event.is_failure();
                self.forward(event);
                if retry {
                    info!(
                        "Connection lost, retrying every {} ms",
                        policy.interval.as_millis()
                    );
                    self.set_state(ReconnectState::Retrying);
                    self.retry_at = Some(Instant::now() + policy.interval);
                }
            }
        }
    }

    fn forward(&self, event: ConnectionEvent) {
        if self.forward.send(event).is_err() {
            debug!("Connection notification receiver dropped");
        }
    }

    fn cancel(&mut self, ack: oneshot::Sender<()>) {
        // Anything already queued predates the cancel: deliver it, but never
        // let it start a new retry cycle.
        loop {
            match self.engine_events.try_recv() {
                Ok(event) => self.on_event(event, false),
                Err(TryRecvError::Lagged(n)) => {
                    warn!("Reconnection coordinator lagged by {} events", n)
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        if self.current() == ReconnectState::Retrying {
            info!("Reconnection cancelled");
        }
        self.retry_at = None;
        self.set_state(ReconnectState::Idle);
        let _ = ack.send(());
    }

    /// One connection attempt. A cancel arriving meanwhile abandons it.
    async fn attempt(&mut self) {
        let policy = *self.policy.borrow();
        let endpoint = match (&self.endpoint, policy.enabled) {
            (Some(endpoint), true) => endpoint.clone(),
            _ => {
                debug!("Auto-reconnect disabled, stopping retries");
                self.set_state(ReconnectState::Idle);
                return;
            }
        };

        let (host, port) = endpoint;
        debug!("Reconnection attempt to {}:{}", host, port);
        let connection = self.connection.clone();
        let connect = async move { connection.connect(&host, port).await };

        tokio::select! {
            biased;
            control = self.control.recv() => match control {
                Some(Control::Cancel(ack)) => self.cancel(ack),
                None => {}
            },
            result = connect => match result {
                Ok(()) => debug!("Reconnection attempt succeeded"),
                Err(e) => {
                    debug!("Reconnection attempt failed: {}", e);
                    self.retry_at = Some(Instant::now() + policy.interval);
                }
            },
        }
    }
}
