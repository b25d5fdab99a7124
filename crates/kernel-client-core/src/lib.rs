//! Core building blocks for driving a Jupyter kernel over its channels.
//!
//! This crate provides:
//! - `Envelope` - One protocol message, with its `Channel` and `Header`
//! - `MessageFactory` - Envelope construction with header defaults
//! - `OutputAggregator` - Broadcast output accumulation and idle detection
//! - `KernelChannel` / `ChannelConnector` traits for transports

pub mod envelope;
pub mod error;
pub mod message;
pub mod output;
pub mod traits;

pub use envelope::{Channel, Envelope, Header, JsonMap, PROTOCOL_VERSION, ProtocolViolation};
pub use error::{ConfigurationError, TransportError};
pub use message::{EnvelopeBuilder, ExecuteRequest, MessageFactory};
pub use output::{ExecutionResult, IopubContent, OutputAggregator, OutputRecord};
pub use traits::{ChannelConnector, KernelChannel, RecvError, envelopes};
