//! Error types for the DefiBot domain.
//!
//! Each bounded context (LLM provider, tools) has its own enum; the
//! top-level [`Error`] wraps them so `?` works across crate boundaries.

use thiserror::Error;

/// The top-level error type for DefiBot operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An inbound client frame could not be understood.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    /// The provider answered, but not in the shape we asked for.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Upstream API returned {status} for {tool_name}")]
    UpstreamStatus { tool_name: String, status: u16 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool discovery failed for {source_url}: {reason}")]
    DiscoveryFailed { source_url: String, reason: String },
}

impl ToolError {
    /// Shorthand for wrapping a transport or decode failure.
    pub fn failed(tool_name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ExecutionFailed {
            tool_name: tool_name.into(),
            reason: reason.to_string(),
        }
    }
}
