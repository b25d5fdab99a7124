//! Wire codec between envelopes and websocket frames.

use kernel_client_core::{Envelope, ProtocolViolation};
use tokio_tungstenite::tungstenite::Message;

/// Outcome of decoding one websocket frame.
#[derive(Debug)]
pub enum Frame {
    /// A kernel message.
    Envelope(Box<Envelope>),
    /// Control traffic (ping, pong, raw frames) with no envelope.
    Skip,
    /// The server closed the connection.
    Closed,
}

/// Encode an envelope as a JSON text frame.
///
/// # Errors
/// Returns error if the envelope cannot be serialized.
pub fn encode(envelope: &Envelope) -> Result<Message, serde_json::Error> {
    Ok(Message::text(envelope.to_json()?))
}

/// Decode one inbound frame.
///
/// Text frames and UTF-8 binary frames carry JSON envelopes.
///
/// # Errors
/// Returns `ProtocolViolation` for non-UTF-8 binary frames and
/// undecodable envelopes.
pub fn decode(message: Message) -> Result<Frame, ProtocolViolation> {
    let envelope = match message {
        Message::Text(text) => Envelope::from_json(text.as_str())?,
        Message::Binary(data) => {
            let text = std::str::from_utf8(&data).map_err(|_| ProtocolViolation::NonUtf8Frame)?;
            Envelope::from_json(text)?
        }
        Message::Close(_) => return Ok(Frame::Closed),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => return Ok(Frame::Skip),
    };
    Ok(Frame::Envelope(Box::new(envelope)))
}
