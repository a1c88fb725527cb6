//! Two-phase request handling.
//!
//! Every chat message gets two replies with the same request id: a quick
//! acknowledgement, then the detailed tool-backed answer (or an apology
//! flagged as an error). Nothing is returned to the transport as an error.

use chrono::Utc;
use defibot_config::AppConfig;
use defibot_core::event::{DomainEvent, EventBus};
use defibot_core::protocol::{OutboundMessage, RequestId};
use defibot_core::provider::Provider;
use defibot_core::tool::ToolRegistry;
use defibot_tools::ToolSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::detailed::DetailedResponder;
use crate::prewarm::PreWarmer;
use crate::prompts::{APOLOGY, QUICK_FALLBACK};
use crate::quick::QuickResponder;
use crate::session::ChatSession;
use crate::ui::{ComponentGenerator, ComponentOrigin, should_generate_ui};

const PREVIEW_CHARS: usize = 80;

pub struct ChatOrchestrator {
    quick: QuickResponder,
    detailed: DetailedResponder,
    prewarmer: PreWarmer,
    components: ComponentGenerator,
    event_bus: Arc<EventBus>,
    generate_ui: bool,
    history_limit: usize,
}

impl ChatOrchestrator {
    pub fn new(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        tools: ToolRegistry,
        sources: Vec<Arc<dyn ToolSource>>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let quick = QuickResponder::new(
            provider.clone(),
            &config.llm.quick_model,
            config.agent.quick_max_tokens,
        );

        let mut detailed = DetailedResponder::new(
            provider.clone(),
            &config.llm.model,
            tools.clone(),
            event_bus.clone(),
        )
        .with_temperature(config.llm.temperature)
        .with_max_tokens(config.llm.max_tokens)
        .with_max_steps(config.agent.max_steps)
        .with_sources(sources);
        if let Some(prompt) = &config.agent.system_prompt_override {
            detailed = detailed.with_system_prompt(prompt);
        }

        let components = ComponentGenerator::new(
            provider,
            &config.llm.model,
            config.cache.component_capacity,
        )
        .with_timeout(Duration::from_secs(config.cache.ui_timeout_secs));

        Self {
            quick,
            detailed,
            prewarmer: PreWarmer::new(tools),
            components,
            event_bus,
            generate_ui: config.agent.generate_ui,
            history_limit: config.agent.history_limit,
        }
    }

    pub fn new_session(&self) -> ChatSession {
        ChatSession::new(self.history_limit)
    }

    pub fn components(&self) -> &ComponentGenerator {
        &self.components
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Handle one chat message, sending both replies to `sink`.
    ///
    /// A closed sink abandons the request; in-flight calls are not cancelled.
    pub async fn handle(
        &self,
        session: &ChatSession,
        content: &str,
        sink: &mpsc::Sender<OutboundMessage>,
    ) {
        let request_id = RequestId::new();

        let pre_warmed = self.prewarmer.pre_warm(content);
        self.event_bus.publish(DomainEvent::ChatReceived {
            request_id: request_id.to_string(),
            content_preview: content.chars().take(PREVIEW_CHARS).collect(),
            pre_warmed_tools: pre_warmed.tool_names(),
            timestamp: Utc::now(),
        });
        info!(
            request_id = %request_id,
            pre_warmed = ?pre_warmed.tool_names(),
            "Chat message received"
        );
        session.begin(request_id.clone(), content, pre_warmed);

        let quick = self.quick.try_reply(content).await;
        self.event_bus.publish(DomainEvent::QuickReplySent {
            request_id: request_id.to_string(),
            fallback: quick.is_none(),
            timestamp: Utc::now(),
        });
        let quick = quick.unwrap_or_else(|| QUICK_FALLBACK.to_string());

        if sink
            .send(OutboundMessage::quick(request_id.clone(), quick))
            .await
            .is_err()
        {
            warn!(request_id = %request_id, "Client went away before the quick reply");
            session.finish(&request_id);
            return;
        }

        let pre_warmed = match session.take_pre_warmed(&request_id) {
            Some(handles) => handles.resolve().await,
            None => Default::default(),
        };
        let history = session.history();

        let outbound = match self
            .detailed
            .detailed_reply(&request_id, &history, content, pre_warmed)
            .await
        {
            Ok(reply) => {
                let ui_component = if self.generate_ui
                    && !reply.tool_results.is_empty()
                    && should_generate_ui(&reply.tool_results, content)
                {
                    let (component, origin) = self
                        .components
                        .generate_tracked(&reply.tool_results, content)
                        .await;
                    self.event_bus.publish(DomainEvent::ComponentGenerated {
                        request_id: request_id.to_string(),
                        cache_hit: origin == ComponentOrigin::Cached,
                        fallback: origin == ComponentOrigin::Fallback,
                        timestamp: Utc::now(),
                    });
                    Some(component)
                } else {
                    None
                };

                let elapsed_ms = session
                    .complete(&request_id, Some(&reply.text))
                    .unwrap_or_default();
                self.event_bus.publish(DomainEvent::DetailedReplySent {
                    request_id: request_id.to_string(),
                    tool_calls: reply.tool_calls.len(),
                    processing_time_ms: elapsed_ms,
                    timestamp: Utc::now(),
                });
                info!(
                    request_id = %request_id,
                    tool_calls = reply.tool_calls.len(),
                    retried = reply.retried,
                    synthesized = reply.synthesized,
                    steps = reply.steps,
                    elapsed_ms,
                    "Detailed reply ready"
                );

                OutboundMessage::detailed(request_id.clone(), reply.text, ui_component, elapsed_ms)
            }
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "Detailed reply failed");
                self.event_bus.publish(DomainEvent::ErrorOccurred {
                    context: format!("detailed reply {request_id}"),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                let elapsed_ms = session.complete(&request_id, None).unwrap_or_default();
                OutboundMessage::failed(request_id.clone(), APOLOGY, elapsed_ms)
            }
        };

        if sink.send(outbound).await.is_err() {
            warn!(request_id = %request_id, "Client went away before the detailed reply");
        }
    }
}
