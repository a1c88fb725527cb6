//! # DefiBot Core
//!
//! Domain types, traits, and error definitions for the DefiBot assistant.
//! Every other crate in the workspace depends inward on this one.
//!
//! - [`provider`]: the LLM backend abstraction
//! - [`tool`]: tools the LLM can call, and the registry that holds them
//! - [`protocol`]: the JSON frames exchanged with chat clients
//! - [`event`]: domain events for observability

pub mod error;
pub mod event;
pub mod message;
pub mod protocol;
pub mod provider;
pub mod tool;

pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{ChatHistory, Message, MessageToolCall, Role};
pub use protocol::{ComponentType, GeneratedUiComponent, InboundMessage, OutboundMessage, RequestId};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ResponseFormat, ToolDefinition};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
