// MIT License - Copyright (c) 2021 TJForc

pub mod connection;
pub mod decoder;
pub mod reconnect;

pub use connection::ServerConnection;
pub use reconnect::{ReconnectPolicy, ReconnectState, ReconnectionCoordinator};
