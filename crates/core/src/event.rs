//! Domain events: observable milestones of a chat request.
//!
//! The orchestrator publishes these; the gateway log stream and tests
//! subscribe. Publishing with no subscribers is a no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    ChatReceived {
        request_id: String,
        content_preview: String,
        pre_warmed_tools: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    QuickReplySent {
        request_id: String,
        fallback: bool,
        timestamp: DateTime<Utc>,
    },

    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The detailed responder forced a tool-use retry turn.
    RetryIssued {
        request_id: String,
        available_tools: usize,
        timestamp: DateTime<Utc>,
    },

    ComponentGenerated {
        request_id: String,
        cache_hit: bool,
        fallback: bool,
        timestamp: DateTime<Utc>,
    },

    DetailedReplySent {
        request_id: String,
        tool_calls: usize,
        processing_time_ms: u64,
        timestamp: DateTime<Utc>,
    },

    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
