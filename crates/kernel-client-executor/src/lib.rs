//! Code execution on a Jupyter kernel over its websocket channels.
//!
//! Provides:
//! - `KernelClient` - Session identity, callbacks and execute entry points
//! - `ExecutionCoordinator` - Idle handshake, request correlation, output collection
//! - `Notifiable` / `CallbackRegistry` - Hooks fired after each processed reply

pub mod callbacks;
pub mod client;
pub mod coordinator;

pub use callbacks::{AsyncFnNotifiable, CallbackError, CallbackRegistry, FnNotifiable, Notifiable};
pub use client::KernelClient;
pub use coordinator::{ExecuteError, ExecuteOptions, ExecutionCoordinator, Phase};
pub use kernel_client_core::{ExecutionResult, OutputRecord};
pub use kernel_client_transport::ChannelConfig;
