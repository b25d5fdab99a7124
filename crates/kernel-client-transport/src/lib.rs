//! Transport layer for Jupyter kernel channels.
//!
//! Provides:
//! - Connection configuration and endpoint construction
//! - Wire codec (JSON text frames) (feature: websocket)
//! - WebSocket `ChannelSession` and `WebsocketConnector` (feature: websocket)

pub mod config;

#[cfg(feature = "websocket")]
pub mod protocol;

#[cfg(feature = "websocket")]
mod tls;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use config::ChannelConfig;

#[cfg(feature = "websocket")]
pub use websocket::{ChannelSession, WebsocketConnector};
