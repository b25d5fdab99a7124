//! Kernel client: one session identity, shared callbacks, many executions.

use std::sync::Arc;

use kernel_client_core::{ChannelConnector, ConfigurationError, ExecutionResult, MessageFactory};
use kernel_client_transport::{ChannelConfig, WebsocketConnector};
use uuid::Uuid;

use crate::callbacks::{CallbackRegistry, Notifiable};
use crate::coordinator::{ExecuteError, ExecuteOptions, ExecutionCoordinator};

/// Client that executes code on one kernel.
///
/// Every execute call opens its own connection; all calls share the
/// client's session id and callbacks. Clones share both.
///
/// # Example
/// ```ignore
/// let client = KernelClient::new(ChannelConfig::new(kernel_id).with_port(port))?;
/// let result = client.execute("print('hello world')").await?;
/// assert_eq!(result.execution_count, Some(1));
/// ```
pub struct KernelClient<C: ChannelConnector = WebsocketConnector> {
    coordinator: Arc<ExecutionCoordinator<C>>,
}

impl<C: ChannelConnector> Clone for KernelClient<C> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
        }
    }
}

impl KernelClient<WebsocketConnector> {
    /// Create a websocket client for the configured kernel.
    ///
    /// # Errors
    /// Returns `ConfigurationError` if the configuration is invalid.
    pub fn new(config: ChannelConfig) -> Result<Self, ConfigurationError> {
        Ok(Self::with_connector(WebsocketConnector::new(config)?))
    }
}

impl<C: ChannelConnector> KernelClient<C> {
    /// Create a client over any connector, with a fresh session id.
    #[must_use]
    pub fn with_connector(connector: C) -> Self {
        let session_id = Uuid::new_v4().to_string();
        tracing::debug!(session = %session_id, "Created kernel client");
        Self {
            coordinator: Arc::new(ExecutionCoordinator::new(
                connector,
                MessageFactory::new(session_id),
                CallbackRegistry::new(),
            )),
        }
    }

    /// Session id sent in every header and as the `session_id` parameter.
    #[must_use]
    pub fn session_id(&self) -> &str {
        self.coordinator.factory().session_id()
    }

    /// Register a notifiable to run after each processed reply.
    pub fn register_callback(&self, notifiable: Arc<dyn Notifiable>) {
        self.coordinator.callbacks().register(notifiable);
    }

    /// Execute `code` with default options.
    ///
    /// # Errors
    /// See [`ExecutionCoordinator::execute`].
    pub async fn execute(&self, code: &str) -> Result<ExecutionResult, ExecuteError> {
        self.execute_with(code, &ExecuteOptions::default()).await
    }

    /// Execute `code` with explicit options.
    ///
    /// # Errors
    /// See [`ExecutionCoordinator::execute`].
    pub async fn execute_with(
        &self,
        code: &str,
        options: &ExecuteOptions,
    ) -> Result<ExecutionResult, ExecuteError> {
        self.coordinator.execute(code, options).await
    }
}
