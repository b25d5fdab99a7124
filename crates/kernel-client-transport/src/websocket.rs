//! WebSocket transport for kernel channels.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use kernel_client_core::{
    ChannelConnector, ConfigurationError, Envelope, KernelChannel, RecvError, TransportError,
};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    Connector, MaybeTlsStream, WebSocketStream, connect_async_tls_with_config,
    tungstenite::{
        Error as WsError,
        client::IntoClientRequest,
        http::{HeaderName, HeaderValue},
    },
};
use url::Url;

use crate::config::ChannelConfig;
use crate::protocol::{self, Frame};
use crate::tls;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One open connection to a kernel's channels endpoint.
///
/// Dropping the session drops the socket; [`ChannelSession::close`]
/// additionally sends a close frame.
pub struct ChannelSession {
    socket: Socket,
    closed: bool,
}

impl ChannelSession {
    /// Open a connection to `url` with the given handshake headers.
    ///
    /// # Errors
    /// Returns `TransportError::Connect` if the handshake fails.
    pub async fn open(
        url: &Url,
        headers: &[(HeaderName, HeaderValue)],
        tls: Option<Arc<rustls::ClientConfig>>,
    ) -> Result<Self, TransportError> {
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        for (name, value) in headers {
            request.headers_mut().insert(name.clone(), value.clone());
        }

        let connector = tls.map(Connector::Rustls);
        let (socket, response) = connect_async_tls_with_config(request, None, false, connector)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        tracing::debug!(
            endpoint = %url.path(),
            status = %response.status(),
            "Kernel channel connected"
        );

        Ok(Self {
            socket,
            closed: false,
        })
    }

    /// Whether the connection has been closed by either side.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait]
impl KernelChannel for ChannelSession {
    async fn send(&mut self, envelope: &Envelope) -> Result<(), TransportError> {
        let frame = protocol::encode(envelope)?;
        self.socket
            .send(frame)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))?;
        tracing::debug!(
            channel = %envelope.channel,
            msg_type = envelope.msg_type(),
            msg_id = envelope.msg_id(),
            "Sent envelope"
        );
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Envelope, RecvError>> {
        if self.closed {
            return None;
        }
        loop {
            let message = match self.socket.next().await {
                Some(Ok(message)) => message,
                None | Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                    self.closed = true;
                    return None;
                }
                Some(Err(e)) => {
                    return Some(Err(TransportError::Receive(e.to_string()).into()));
                }
            };

            match protocol::decode(message) {
                Ok(Frame::Envelope(envelope)) => return Some(Ok(*envelope)),
                Ok(Frame::Skip) => {}
                Ok(Frame::Closed) => {
                    tracing::debug!("Kernel channel closed by server");
                    self.closed = true;
                    return None;
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.socket.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {
                tracing::debug!("Kernel channel closed");
                Ok(())
            }
            Err(e) => Err(TransportError::Send(e.to_string())),
        }
    }
}

/// Opens [`ChannelSession`]s for a validated [`ChannelConfig`].
#[derive(Debug, Clone)]
pub struct WebsocketConnector {
    config: ChannelConfig,
    headers: Vec<(HeaderName, HeaderValue)>,
    tls: Option<Arc<rustls::ClientConfig>>,
}

impl WebsocketConnector {
    /// Validate `config` and prepare handshake headers and TLS settings.
    ///
    /// # Errors
    /// Returns `ConfigurationError` if the config is invalid or a header
    /// name or value cannot be sent.
    pub fn new(config: ChannelConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        // Surface host errors now rather than on first execute.
        config.endpoint("")?;

        let headers = config
            .handshake_headers()
            .into_iter()
            .map(|(name, value)| {
                let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                    ConfigurationError::InvalidHandshakeHeader {
                        name: name.clone(),
                        reason: e.to_string(),
                    }
                })?;
                let header_value = HeaderValue::from_str(&value).map_err(|e| {
                    ConfigurationError::InvalidHandshakeHeader {
                        name: name.clone(),
                        reason: e.to_string(),
                    }
                })?;
                Ok((header_name, header_value))
            })
            .collect::<Result<Vec<_>, ConfigurationError>>()?;

        let tls = if config.is_secure() && !config.verify_tls {
            tracing::warn!(host = %config.host, "TLS certificate verification disabled");
            Some(tls::unverified_client_config()?)
        } else {
            None
        };

        Ok(Self {
            config,
            headers,
            tls,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &ChannelConfig {
        &self.config
    }
}

#[async_trait]
impl ChannelConnector for WebsocketConnector {
    type Channel = ChannelSession;

    async fn connect(&self, session_id: &str) -> Result<ChannelSession, TransportError> {
        let url = self
            .config
            .endpoint(session_id)
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        ChannelSession::open(&url, &self.headers, self.tls.clone()).await
    }
}
