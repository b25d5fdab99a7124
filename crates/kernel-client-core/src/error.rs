//! Errors shared across the client crates.

use thiserror::Error;

/// Invalid client or message configuration.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Message header needs a msg_type")]
    MissingMsgType,
    #[error("Invalid message header: {0}")]
    InvalidHeader(#[source] serde_json::Error),
    #[error("A kernel id is required")]
    MissingKernelId,
    #[error("A token and an explicit header map are mutually exclusive")]
    ConflictingAuth,
    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),
    #[error("TLS setup failed: {0}")]
    Tls(String),
    #[error("Invalid handshake header {name}: {reason}")]
    InvalidHandshakeHeader { name: String, reason: String },
}

/// Connection, send or receive failure.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(String),
    #[error("Send failed: {0}")]
    Send(String),
    #[error("Receive failed: {0}")]
    Receive(String),
    #[error("Connection closed before the kernel went idle")]
    Closed,
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
