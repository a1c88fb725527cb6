//! Immediate acknowledgement reply.

use defibot_core::message::Message;
use defibot_core::provider::{Provider, ProviderRequest};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::prompts::{QUICK_FALLBACK, QUICK_SYSTEM_PROMPT};

pub struct QuickResponder {
    provider: Arc<dyn Provider>,
    model: String,
    max_tokens: u32,
}

impl QuickResponder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens,
        }
    }

    /// One tool-less completion. Never fails: any error or a blank reply
    /// yields [`QUICK_FALLBACK`].
    pub async fn quick_reply(&self, user_message: &str) -> String {
        self.try_reply(user_message)
            .await
            .unwrap_or_else(|| QUICK_FALLBACK.to_string())
    }

    /// `None` when the fallback had to be used.
    pub async fn try_reply(&self, user_message: &str) -> Option<String> {
        let request = ProviderRequest::new(
            &self.model,
            vec![
                Message::system(QUICK_SYSTEM_PROMPT),
                Message::user(user_message),
            ],
        )
        .with_temperature(0.5)
        .with_max_tokens(Some(self.max_tokens));

        match self.provider.complete(request).await {
            Ok(response) => {
                let text = response.message.content.trim().to_string();
                if text.is_empty() {
                    debug!("Quick reply was blank; using fallback");
                    None
                } else {
                    Some(text)
                }
            }
            Err(e) => {
                warn!(error = %e, "Quick reply failed; using fallback");
                None
            }
        }
    }
}
