//! Request/reply state machine for one execute call.

use std::time::Duration;

use futures::StreamExt;
use kernel_client_core::{
    ChannelConnector, ConfigurationError, ExecutionResult, KernelChannel, MessageFactory,
    OutputAggregator, ProtocolViolation, RecvError, TransportError, envelopes,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::callbacks::{CallbackError, CallbackRegistry};

/// Execute call error.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),
    #[error(transparent)]
    Callback(#[from] CallbackError),
    #[error("Execution cancelled")]
    Cancelled,
    #[error("Execution timed out after {0:?}")]
    TimedOut(Duration),
}

impl From<RecvError> for ExecuteError {
    fn from(err: RecvError) -> Self {
        match err {
            RecvError::Transport(e) => Self::Transport(e),
            RecvError::Protocol(e) => Self::Protocol(e),
        }
    }
}

/// Phases of an execute call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Opening the channel.
    Start,
    /// Waiting for the kernel to answer a `kernel_info_request`.
    AwaitKernelIdle,
    /// `execute_request` written.
    Sent,
    /// Draining replies until idle.
    Collecting,
    /// Result assembled.
    Done,
}

/// Per-call options.
///
/// The defaults wait forever, matching a kernel that is expected to go
/// idle eventually; set a timeout or cancellation token to bound the call.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Round-trip a `kernel_info_request` before executing.
    pub wait_for_idle: bool,
    /// Abort the call when this token fires.
    pub cancellation: Option<CancellationToken>,
    /// Abort the call after this long.
    pub timeout: Option<Duration>,
}

impl ExecuteOptions {
    #[must_use]
    pub const fn wait_for_idle(mut self, wait: bool) -> Self {
        self.wait_for_idle = wait;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Drives execute calls over connections opened by `C`.
pub struct ExecutionCoordinator<C: ChannelConnector> {
    connector: C,
    factory: MessageFactory,
    callbacks: CallbackRegistry,
}

impl<C: ChannelConnector> ExecutionCoordinator<C> {
    #[must_use]
    pub const fn new(connector: C, factory: MessageFactory, callbacks: CallbackRegistry) -> Self {
        Self {
            connector,
            factory,
            callbacks,
        }
    }

    #[must_use]
    pub const fn factory(&self) -> &MessageFactory {
        &self.factory
    }

    #[must_use]
    pub const fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    /// Execute `code` and collect its outputs until the kernel is idle.
    ///
    /// A fresh connection is opened for the call and closed on every exit
    /// path.
    ///
    /// # Errors
    /// Returns `ExecuteError` on connection, protocol or callback failure,
    /// on cancellation, and when the timeout elapses. No partial result is
    /// returned.
    pub async fn execute(
        &self,
        code: &str,
        options: &ExecuteOptions,
    ) -> Result<ExecutionResult, ExecuteError> {
        let mut slot: Option<C::Channel> = None;
        let outcome = bounded(options, self.drive(&mut slot, code, options.wait_for_idle)).await;

        if let Some(mut channel) = slot {
            if let Err(e) = channel.close().await {
                tracing::warn!("Failed to close kernel channel: {e}");
            }
        }
        outcome
    }

    async fn drive(
        &self,
        slot: &mut Option<C::Channel>,
        code: &str,
        wait_for_idle: bool,
    ) -> Result<ExecutionResult, ExecuteError> {
        tracing::debug!(phase = ?Phase::Start, session = self.factory.session_id(), "Opening kernel channel");
        let channel = slot.insert(self.connector.connect(self.factory.session_id()).await?);

        if wait_for_idle {
            tracing::debug!(phase = ?Phase::AwaitKernelIdle, "Waiting for kernel idle");
            self.await_kernel_idle(channel).await?;
        }

        let request = self.factory.execute_request(code)?;
        channel.send(&request).await?;
        let correlation = request.msg_id();
        tracing::debug!(phase = ?Phase::Sent, msg_id = correlation, "Sent execute_request");

        let result = self.collect(channel, correlation).await?;
        tracing::debug!(
            phase = ?Phase::Done,
            outputs = result.outputs.len(),
            execution_count = ?result.execution_count,
            "Execution finished"
        );
        Ok(result)
    }

    async fn await_kernel_idle(&self, channel: &mut C::Channel) -> Result<(), ExecuteError> {
        let request = self.factory.kernel_info_request()?;
        channel.send(&request).await?;

        let inbound = envelopes(channel);
        tokio::pin!(inbound);
        while let Some(envelope) = inbound.next().await {
            let envelope = envelope?;
            if envelope.channel.is_broadcast()
                && envelope.is_reply_to(request.msg_id())
                && envelope.is_idle()
            {
                return Ok(());
            }
            tracing::trace!(msg_type = envelope.msg_type(), "Dropped envelope while awaiting idle");
        }
        Err(TransportError::Closed.into())
    }

    async fn collect(
        &self,
        channel: &mut C::Channel,
        correlation: &str,
    ) -> Result<ExecutionResult, ExecuteError> {
        tracing::debug!(phase = ?Phase::Collecting, "Collecting replies");
        let mut aggregator = OutputAggregator::new();

        let inbound = envelopes(channel);
        tokio::pin!(inbound);
        while let Some(envelope) = inbound.next().await {
            let envelope = envelope?;
            if !envelope.is_reply_to(correlation) {
                tracing::trace!(
                    channel = %envelope.channel,
                    msg_type = envelope.msg_type(),
                    "Dropped uncorrelated envelope"
                );
                continue;
            }

            let idle = aggregator.process(&envelope)?;
            self.callbacks.notify().await?;
            if idle {
                return Ok(aggregator.into_result());
            }
        }
        Err(TransportError::Closed.into())
    }
}

/// Apply the caller's timeout and cancellation token to `run`.
async fn bounded<F>(options: &ExecuteOptions, run: F) -> Result<ExecutionResult, ExecuteError>
where
    F: Future<Output = Result<ExecutionResult, ExecuteError>>,
{
    let timed = async {
        match options.timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .unwrap_or(Err(ExecuteError::TimedOut(limit))),
            None => run.await,
        }
    };

    tokio::select! {
        biased;
        () = cancelled(options.cancellation.as_ref()) => Err(ExecuteError::Cancelled),
        result = timed => result,
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}
