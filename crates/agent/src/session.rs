//! Per-connection chat state.

use defibot_core::message::{ChatHistory, Message};
use defibot_core::protocol::RequestId;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::time::Instant;

use crate::prewarm::PreWarmed;

/// A request between arrival and its detailed reply.
#[derive(Debug)]
pub struct PendingRequest {
    started_at: Instant,
    user_message: String,
    pre_warmed: Option<PreWarmed>,
}

impl PendingRequest {
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Milliseconds since the message arrived.
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started_at.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// History and in-flight requests for one client connection.
///
/// Messages on a connection are handled concurrently, so both maps sit
/// behind their own lock.
#[derive(Debug)]
pub struct ChatSession {
    history: Mutex<ChatHistory>,
    pending: Mutex<HashMap<RequestId, PendingRequest>>,
}

impl ChatSession {
    pub fn new(history_limit: usize) -> Self {
        Self {
            history: Mutex::new(ChatHistory::new(history_limit)),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn history(&self) -> Vec<Message> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .to_vec()
    }

    pub fn record_exchange(&self, user: &str, assistant: &str) {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.push(Message::user(user));
        history.push(Message::assistant(assistant));
    }

    pub fn begin(&self, id: RequestId, user_message: &str, pre_warmed: PreWarmed) {
        let pending = PendingRequest {
            started_at: Instant::now(),
            user_message: user_message.to_string(),
            pre_warmed: Some(pre_warmed),
        };
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, pending);
    }

    /// Hand over the pre-warm handles, leaving the request registered.
    pub fn take_pre_warmed(&self, id: &RequestId) -> Option<PreWarmed> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(id)
            .and_then(|p| p.pre_warmed.take())
    }

    pub fn finish(&self, id: &RequestId) -> Option<PendingRequest> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
    }

    /// Close out a request. A successful `reply` is appended to history
    /// after the original user message. Returns the processing time.
    pub fn complete(&self, id: &RequestId, reply: Option<&str>) -> Option<u64> {
        let pending = self.finish(id)?;
        if let Some(reply) = reply {
            self.record_exchange(pending.user_message(), reply);
        }
        Some(pending.elapsed_ms())
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
