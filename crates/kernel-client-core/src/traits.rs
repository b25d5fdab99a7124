//! Core traits for kernel channel connections.

use async_trait::async_trait;
use futures::{Stream, stream};

use crate::envelope::{Envelope, ProtocolViolation};
use crate::error::TransportError;

/// Failure while reading the next inbound envelope.
#[derive(Debug, thiserror::Error)]
pub enum RecvError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),
}

/// One open, bidirectional kernel channel connection.
#[async_trait]
pub trait KernelChannel: Send {
    /// Send an envelope to the kernel.
    async fn send(&mut self, envelope: &Envelope) -> Result<(), TransportError>;

    /// Next inbound envelope, or `None` once the connection has closed.
    async fn recv(&mut self) -> Option<Result<Envelope, RecvError>>;

    /// Close the connection. Closing twice is a no-op.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Lazy stream of inbound envelopes, ending when the connection closes.
///
/// The stream borrows the channel; drop it before sending again.
pub fn envelopes<C: KernelChannel + ?Sized>(
    channel: &mut C,
) -> impl Stream<Item = Result<Envelope, RecvError>> + Send + '_ {
    stream::unfold(channel, |channel| async move {
        channel.recv().await.map(|item| (item, channel))
    })
}

/// Opens kernel channel connections for one client session.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    type Channel: KernelChannel;

    /// Open a new connection identified by `session_id`.
    async fn connect(&self, session_id: &str) -> Result<Self::Channel, TransportError>;
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use futures::StreamExt;

    use super::*;
    use crate::{Channel, MessageFactory};

    struct Scripted {
        inbound: VecDeque<Envelope>,
        closes: usize,
    }

    #[async_trait]
    impl KernelChannel for Scripted {
        async fn send(&mut self, _envelope: &Envelope) -> Result<(), TransportError> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<Envelope, RecvError>> {
            self.inbound.pop_front().map(Ok)
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.closes += 1;
            Ok(())
        }
    }

    #[test]
    fn test_envelopes_drains_in_order_until_close() {
        let factory = MessageFactory::new("s");
        let first = factory.kernel_info_request().unwrap();
        let second = factory
            .envelope(Channel::Control)
            .msg_type("interrupt_request")
            .build()
            .unwrap();
        let mut channel = Scripted {
            inbound: VecDeque::from([first.clone(), second.clone()]),
            closes: 0,
        };

        let received: Vec<Envelope> = tokio_test::block_on(async {
            envelopes(&mut channel)
                .map(|item| item.unwrap())
                .collect()
                .await
        });

        assert_eq!(received, vec![first, second]);
        assert_eq!(channel.closes, 0);
    }
}
