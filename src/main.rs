// MIT License - Copyright (c) 2026 Peter Wright
// AMCP console

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::AsyncBufReadExt;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use caspar_amcp::constants::{
    DEFAULT_HOSTNAME, DEFAULT_PORT, DEFAULT_RECONNECT_INTERVAL_MS, EVENT_CHANNEL_CAPACITY,
};
use caspar_amcp::{AmcpClient, AmcpEvent, ClientConfig, EventReceiver};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "amcp-console")]
#[command(about = "Interactive AMCP console for a CasparCG server")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "amcp.toml")]
    config: String,

    /// Server hostname, overriding the config file
    #[arg(long)]
    host: Option<String>,

    /// AMCP port, overriding the config file
    #[arg(long)]
    port: Option<u16>,

    /// Keep reconnecting after the link drops
    #[arg(long)]
    auto_reconnect: bool,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct Config {
    #[serde(default)]
    server: ServerToml,
    #[serde(default)]
    console: ConsoleToml,
}

#[derive(Debug, Deserialize)]
struct ServerToml {
    #[serde(default = "default_hostname")]
    hostname: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    auto_connect: bool,
    #[serde(default = "default_reconnect_interval")]
    reconnect_interval_ms: u64,
    #[serde(default = "default_event_capacity")]
    event_capacity: usize,
}

impl Default for ServerToml {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            port: default_port(),
            auto_connect: false,
            reconnect_interval_ms: default_reconnect_interval(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_hostname() -> String {
    DEFAULT_HOSTNAME.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_reconnect_interval() -> u64 {
    DEFAULT_RECONNECT_INTERVAL_MS
}
fn default_event_capacity() -> usize {
    EVENT_CHANNEL_CAPACITY
}

#[derive(Debug, Default, Deserialize)]
struct ConsoleToml {
    /// Commands sent after every successful connect, after VERSION and INFO
    #[serde(default)]
    startup_commands: Vec<String>,
}

/// Load the config file. A missing file means all defaults.
fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        info!("No config file at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(path).context("Failed to read config file")?;
    toml::from_str(&text).context("Failed to parse config file")
}

fn build_client_config(server: &ServerToml, cli: &Cli) -> ClientConfig {
    ClientConfig::builder()
        .hostname(cli.host.clone().unwrap_or_else(|| server.hostname.clone()))
        .port(cli.port.unwrap_or(server.port))
        .auto_connect(cli.auto_reconnect || server.auto_connect)
        .reconnect_interval_ms(server.reconnect_interval_ms)
        .event_capacity(server.event_capacity)
        .build()
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

// Every line: {now, op, ...event fields}
#[derive(Serialize)]
struct ConsoleEvent {
    now: u64,
    op: &'static str,
    #[serde(flatten)]
    body: serde_json::Value,
}

fn now_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

fn event_body(event: &AmcpEvent) -> serde_json::Value {
    match event {
        AmcpEvent::ConnectionStateChanged(e) => json!({
            "host": e.host,
            "port": e.port,
            "connected": e.connected,
            "error": e.error.as_ref().map(|err| err.to_string()),
        }),
        AmcpEvent::VersionUpdated(version) => json!({ "version": version }),
        AmcpEvent::MediaListUpdated(media) => json!({ "media": media }),
        AmcpEvent::TemplateListUpdated(templates) => json!({ "templates": templates }),
        AmcpEvent::ChannelListUpdated(channels) => json!({ "channels": channels }),
        AmcpEvent::DataListUpdated(names) => json!({ "names": names }),
        AmcpEvent::DataRetrieved(data) => json!({ "data": data }),
        AmcpEvent::ThumbnailRetrieved { data, command } => {
            json!({ "command": command, "data": data })
        }
        AmcpEvent::InfoReceived(xml) => json!({ "xml": xml }),
        AmcpEvent::ServerResponded {
            command,
            subcommand,
            data,
        } => json!({ "command": command, "subcommand": subcommand, "data": data }),
    }
}

fn event_line(event: &AmcpEvent) -> Result<String> {
    let msg = ConsoleEvent {
        now: now_epoch_ms(),
        op: event.name(),
        body: event_body(event),
    };
    serde_json::to_string(&msg).context("Failed to serialize event")
}

/// Print events until the client goes away; replay startup commands on connect.
fn spawn_event_printer(
    client: Arc<AmcpClient>,
    mut rx: EventReceiver,
    startup_commands: Vec<String>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    match event_line(&event) {
                        Ok(line) => println!("{line}"),
                        Err(e) => error!("{e:#}"),
                    }
                    if let AmcpEvent::ConnectionStateChanged(ref change) = event {
                        if change.connected {
                            for command in &startup_commands {
                                if let Err(e) = client.send_string(command).await {
                                    warn!("Startup command {command:?} failed: {e}");
                                }
                            }
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Event printer lagged, skipped {n} events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event channel closed");
                    break;
                }
            }
        }
    })
}

/// Read stdin for the whole process lifetime so lines survive restarts.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("stdin closed");
                    break;
                }
                Err(e) => {
                    error!("Failed to read stdin: {e}");
                    break;
                }
            }
        }
    });
    rx
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=caspar_amcp=trace).
    // Default: info. Logs go to stderr so stdout stays pure JSON lines.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps, so omit them when running under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt()
            .without_time()
            .with_writer(std::io::stderr)
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(env_filter)
            .init();
    }

    let cli = Cli::parse();
    let config_path = Path::new(&cli.config);
    let mut config = load_config(config_path)?;

    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut stdin_lines = spawn_stdin_reader();

    loop {
        let client_config = build_client_config(&config.server, &cli);
        let auto_connect = client_config.auto_connect;
        info!(
            "Connecting to CasparCG server at {}:{}",
            client_config.effective_hostname(),
            client_config.port
        );

        let client = Arc::new(AmcpClient::new(client_config));
        let printer_handle = spawn_event_printer(
            Arc::clone(&client),
            client.subscribe(),
            config.console.startup_commands.clone(),
        );

        if let Err(e) = client.connect().await {
            if !auto_connect {
                printer_handle.abort();
                return Err(e).context("Failed to connect to server");
            }
            warn!("Initial connect failed, retrying in the background: {e}");
        }

        let restart = loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl-C, shutting down...");
                    break false;
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down...");
                    break false;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, reloading config and reconnecting...");
                    break true;
                }
                Some(line) = stdin_lines.recv() => {
                    if let Err(e) = client.send_string(&line).await {
                        warn!("Could not send {line:?}: {e}");
                    }
                }
            }
        };

        client.disconnect().await;
        printer_handle.abort();

        if !restart {
            break;
        }

        // Reload config from disk; keep previous config on failure
        info!("Reloading config from {}", cli.config);
        match load_config(config_path) {
            Ok(new_config) => {
                config = new_config;
                info!("Config reloaded successfully");
            }
            Err(e) => warn!("Failed to reload config, keeping previous: {e:#}"),
        }
    }

    info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use caspar_amcp::event::ConnectionEvent;
    use caspar_amcp::AmcpError;
    use std::io::Write;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("amcp-console").chain(args.iter().copied()))
    }

    #[test]
    fn test_load_full_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[server]
hostname = "playout-1"
port = 5251
auto_connect = true
reconnect_interval_ms = 1000

[console]
startup_commands = ["CLS", "TLS"]
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.hostname, "playout-1");
        assert_eq!(config.server.port, 5251);
        assert!(config.server.auto_connect);
        assert_eq!(config.server.reconnect_interval_ms, 1000);
        assert_eq!(config.server.event_capacity, EVENT_CHANNEL_CAPACITY);
        assert_eq!(config.console.startup_commands, vec!["CLS", "TLS"]);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[server]\nhostname = \"10.0.0.5\"\n").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.hostname, "10.0.0.5");
        assert_eq!(config.server.port, 5250);
        assert!(!config.server.auto_connect);
        assert_eq!(config.server.reconnect_interval_ms, 5000);
        assert!(config.console.startup_commands.is_empty());
    }

    #[test]
    fn test_missing_and_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.hostname, "localhost");

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[server]\nport = \"many\"\n").unwrap();
        assert!(load_config(&bad).is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let server = ServerToml::default();
        let config = build_client_config(&server, &cli(&["--host", "cg-2", "--port", "6250"]));
        assert_eq!(config.hostname, "cg-2");
        assert_eq!(config.port, 6250);
        assert!(!config.auto_connect);

        let config = build_client_config(&server, &cli(&["--auto-reconnect"]));
        assert_eq!(config.hostname, "localhost");
        assert!(config.auto_connect);
    }

    #[test]
    fn test_event_lines() {
        let line = event_line(&AmcpEvent::VersionUpdated("2.3.0".into())).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["op"], "version_updated");
        assert_eq!(value["version"], "2.3.0");
        assert!(value["now"].as_u64().unwrap() > 0);

        let lost = ConnectionEvent::disconnected("cg", 5250, Some(AmcpError::ConnectionClosed));
        let line = event_line(&AmcpEvent::ConnectionStateChanged(lost)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["op"], "connection_state_changed");
        assert_eq!(value["connected"], false);
        assert_eq!(value["error"], "Connection closed by server");
    }
}
