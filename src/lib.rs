// MIT License - Copyright (c) 2021 TJForc
//
//! # caspar-amcp
//!
//! Asynchronous client for the AMCP text protocol spoken by CasparCG
//! playout servers.
//!
//! The client keeps a single TCP connection, parses the server's status-line
//! framed responses, decodes media/template/channel listings into typed
//! records and publishes everything as [`AmcpEvent`]s. With auto-connect
//! enabled a lost link is retried at a fixed interval until it comes back.
//!
//! ## Quick Start
//!
//! ```no_run
//! use caspar_amcp::{AmcpClient, AmcpEvent, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::builder()
//!         .hostname("192.168.0.50")
//!         .port(5250)
//!         .auto_connect(true)
//!         .build();
//!
//!     let client = AmcpClient::new(config);
//!
//!     let mut events = client.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     client.connect().await?;
//!     client.refresh_templates().await?;
//!     client.send_string("PLAY 1-10 AMB LOOP").await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod interpreter;
pub mod parser;
pub mod protocol;
pub mod records;
pub mod transport;

// Re-exports for convenience
pub use client::AmcpClient;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{AmcpError, ErrorKind, Result};
pub use event::{AmcpEvent, ConnectionEvent, EventReceiver};
pub use parser::{ParsedResponse, ResponseParser};
pub use protocol::{AmcpCommand, Command};
pub use records::{ChannelInfo, ChannelStatus, MediaInfo, MediaType, TemplateInfo};
pub use transport::{ReconnectState, ServerConnection};
