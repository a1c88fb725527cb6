//! Client wire protocol.
//!
//! Chat clients send `{"type":"chat","content":"..."}` frames and receive
//! `response` or `error` frames. Every request produces two `response`
//! frames sharing one `requestId`: the quick acknowledgement first, then the
//! detailed answer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// Correlates the quick and detailed replies of one chat request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    /// A fresh random id. Never derived from the clock, so concurrent
    /// requests on one connection cannot collide.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Frames accepted from the client.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Chat { content: String },
}

impl InboundMessage {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        serde_json::from_str(raw).map_err(|e| Error::Protocol(format!("invalid message: {e}")))
    }
}

/// Frames sent to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    #[serde(rename_all = "camelCase")]
    Response {
        content: String,
        is_quick_response: bool,
        request_id: RequestId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ui_component: Option<GeneratedUiComponent>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        processing_time_ms: Option<u64>,
        /// Set when `content` is the apology for a failed detailed reply.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        error: bool,
        timestamp: i64,
    },
    Error {
        content: String,
        timestamp: i64,
    },
}

impl OutboundMessage {
    pub fn quick(request_id: RequestId, content: impl Into<String>) -> Self {
        Self::Response {
            content: content.into(),
            is_quick_response: true,
            request_id,
            ui_component: None,
            processing_time_ms: None,
            error: false,
            timestamp: now_ms(),
        }
    }

    pub fn detailed(
        request_id: RequestId,
        content: impl Into<String>,
        ui_component: Option<GeneratedUiComponent>,
        processing_time_ms: u64,
    ) -> Self {
        Self::Response {
            content: content.into(),
            is_quick_response: false,
            request_id,
            ui_component,
            processing_time_ms: Some(processing_time_ms),
            error: false,
            timestamp: now_ms(),
        }
    }

    /// The detailed slot of a request that failed; carries the error flag.
    pub fn failed(request_id: RequestId, content: impl Into<String>, processing_time_ms: u64) -> Self {
        Self::Response {
            content: content.into(),
            is_quick_response: false,
            request_id,
            ui_component: None,
            processing_time_ms: Some(processing_time_ms),
            error: true,
            timestamp: now_ms(),
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::Error {
            content: content.into(),
            timestamp: now_ms(),
        }
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            Self::Response { request_id, .. } => Some(request_id),
            Self::Error { .. } => None,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Response { content, .. } | Self::Error { content, .. } => content,
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// What kind of widget the generated component renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentType {
    Chart,
    DataDisplay,
    Interactive,
    Comparison,
}

/// An LLM-generated UI component for the chat client to render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedUiComponent {
    pub component_code: String,
    #[serde(default)]
    pub props: serde_json::Map<String, serde_json::Value>,
    pub explanation: String,
    pub component_type: ComponentType,
}
