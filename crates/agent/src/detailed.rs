//! The tool-using detailed reply.
//!
//! A turn is a loop of LLM calls: when the model requests tools they are
//! executed and their outputs appended to the transcript, then the model
//! is called again, up to `max_steps` calls. Around the main turn:
//!
//! 1. pre-warmed results are injected as system context;
//! 2. if the turn used no tools, or every tool came back empty, one retry
//!    turn insists on tool use;
//! 3. if the final text is blank although tools ran, one tool-less
//!    synthesis call writes the answer from the gathered outputs.

use chrono::Utc;
use defibot_core::event::{DomainEvent, EventBus};
use defibot_core::message::{Message, MessageToolCall};
use defibot_core::provider::{Provider, ProviderRequest, ToolDefinition};
use defibot_core::protocol::RequestId;
use defibot_core::tool::{ToolCall, ToolRegistry, ToolResult};
use defibot_tools::ToolSource;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::prompts::{PREFETCHED_HEADER, SYNTHESIS_INSTRUCTION, retry_instruction};

/// One executed tool call and what it produced. `result` is `None` when
/// the call failed.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub call: ToolCall,
    pub result: Option<ToolResult>,
}

impl ToolOutcome {
    pub fn is_empty(&self) -> bool {
        self.result.as_ref().is_none_or(ToolResult::is_empty)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DetailedReply {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolOutcome>,
    /// A forced tool-use retry was issued.
    pub retried: bool,
    /// The text came from the tool-less synthesis call.
    pub synthesized: bool,
    /// LLM calls made across all turns.
    pub steps: u32,
}

/// What a single turn produced.
#[derive(Debug, Default)]
struct Turn {
    text: String,
    outcomes: Vec<ToolOutcome>,
    transcript: Vec<Message>,
    steps: u32,
}

impl Turn {
    fn needs_retry(&self) -> bool {
        self.outcomes.is_empty() || self.outcomes.iter().all(ToolOutcome::is_empty)
    }
}

pub struct DetailedResponder {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_steps: u32,
    system_prompt: String,
    tools: ToolRegistry,
    sources: Vec<Arc<dyn ToolSource>>,
    event_bus: Arc<EventBus>,
}

impl DetailedResponder {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: ToolRegistry,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.3,
            max_tokens: None,
            max_steps: 10,
            system_prompt: crate::prompts::SYSTEM_PROMPT.to_string(),
            tools,
            sources: Vec::new(),
            event_bus,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Cap on LLM calls per turn. At least one call is always made.
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_sources(mut self, sources: Vec<Arc<dyn ToolSource>>) -> Self {
        self.sources = sources;
        self
    }

    /// Local tools plus whatever the external sources offer right now.
    /// Local tools win on a name clash; a failing source is skipped.
    pub async fn available_tools(&self) -> ToolRegistry {
        if self.sources.is_empty() {
            return self.tools.clone();
        }

        let discovered = join_all(self.sources.iter().map(|source| async move {
            match source.discover().await {
                Ok(tools) => tools,
                Err(e) => {
                    warn!(source = %source.source_url(), error = %e, "Tool discovery failed");
                    Vec::new()
                }
            }
        }))
        .await;

        self.tools.merged_with(discovered.into_iter().flatten())
    }

    pub async fn detailed_reply(
        &self,
        request_id: &RequestId,
        history: &[Message],
        user_message: &str,
        pre_warmed: HashMap<String, Option<ToolResult>>,
    ) -> defibot_core::Result<DetailedReply> {
        let tools = self.available_tools().await;
        let definitions = tools.definitions();

        let mut base = vec![Message::system(&self.system_prompt)];
        if let Some(context) = prefetched_context(&pre_warmed) {
            base.push(Message::system(context));
        }
        base.extend(history.iter().cloned());
        base.push(Message::user(user_message));

        info!(
            request_id = %request_id,
            tools = definitions.len(),
            history = history.len(),
            "Starting detailed reply"
        );

        let mut turn = self.run_turn(base.clone(), &tools, &definitions).await?;
        let mut steps = turn.steps;
        let mut retried = false;

        if turn.needs_retry() {
            let names = tools.names();
            self.event_bus.publish(DomainEvent::RetryIssued {
                request_id: request_id.to_string(),
                available_tools: names.len(),
                timestamp: Utc::now(),
            });
            info!(request_id = %request_id, "No useful tool data; forcing a tool-use retry");

            let mut retry_messages = base;
            retry_messages.push(Message::user(retry_instruction(&names)));
            let retry = self.run_turn(retry_messages, &tools, &definitions).await?;
            steps += retry.steps;
            retried = true;

            if !retry.outcomes.is_empty() {
                turn = retry;
            }
        }

        let mut synthesized = false;
        if turn.text.trim().is_empty() && !turn.outcomes.is_empty() {
            debug!(request_id = %request_id, "Blank answer after tool use; synthesizing");
            turn.text = self.synthesize(turn.transcript.clone()).await?;
            steps += 1;
            synthesized = true;
        }

        Ok(DetailedReply {
            text: turn.text,
            tool_calls: turn.outcomes.iter().map(|o| o.call.clone()).collect(),
            tool_results: turn.outcomes,
            retried,
            synthesized,
            steps,
        })
    }

    async fn run_turn(
        &self,
        mut messages: Vec<Message>,
        tools: &ToolRegistry,
        definitions: &[ToolDefinition],
    ) -> defibot_core::Result<Turn> {
        let mut turn = Turn::default();

        while turn.steps < self.max_steps {
            turn.steps += 1;

            let request = ProviderRequest::new(&self.model, messages.clone())
                .with_temperature(self.temperature)
                .with_max_tokens(self.max_tokens)
                .with_tools(definitions.to_vec());

            let response = self.provider.complete(request).await?;

            if response.message.tool_calls.is_empty() {
                turn.text = response.message.content.clone();
                messages.push(response.message);
                turn.transcript = messages;
                return Ok(turn);
            }

            let requested = response.message.tool_calls.clone();
            messages.push(response.message);

            debug!(step = turn.steps, tool_count = requested.len(), "Executing tool calls");
            let outcomes = join_all(requested.iter().map(|tc| self.dispatch(tools, tc))).await;

            for (outcome, content) in outcomes {
                messages.push(Message::tool_result(&outcome.call.id, content));
                turn.outcomes.push(outcome);
            }
        }

        warn!(steps = turn.steps, "Step budget exhausted before a final answer");
        turn.transcript = messages;
        Ok(turn)
    }

    /// Parse the model's arguments and run the call. Returns the outcome
    /// and the tool message fed back to the model.
    async fn dispatch(
        &self,
        tools: &ToolRegistry,
        requested: &MessageToolCall,
    ) -> (ToolOutcome, String) {
        let raw = match requested.arguments.trim() {
            "" => "{}",
            raw => raw,
        };
        let arguments = match serde_json::from_str(raw) {
            Ok(arguments) => arguments,
            Err(e) => {
                warn!(tool = %requested.name, error = %e, "Malformed tool call arguments");
                let outcome = ToolOutcome {
                    call: ToolCall {
                        id: requested.id.clone(),
                        name: requested.name.clone(),
                        arguments: serde_json::Value::Null,
                    },
                    result: None,
                };
                let content =
                    format!("Error: invalid arguments for tool '{}': {e}", requested.name);
                return (outcome, content);
            }
        };

        let call = ToolCall {
            id: requested.id.clone(),
            name: requested.name.clone(),
            arguments,
        };
        let outcome = self.execute(tools, call).await;
        let content = match &outcome.result {
            Some(result) => result.output.clone(),
            None => format!("Error: tool '{}' failed", outcome.call.name),
        };
        (outcome, content)
    }

    async fn execute(&self, tools: &ToolRegistry, call: ToolCall) -> ToolOutcome {
        let start = Instant::now();
        let result = tools.execute(&call).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        self.event_bus.publish(DomainEvent::ToolExecuted {
            tool_name: call.name.clone(),
            success: result.is_ok(),
            duration_ms,
            timestamp: Utc::now(),
        });

        let result = match result {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                None
            }
        };
        ToolOutcome { call, result }
    }

    async fn synthesize(&self, mut transcript: Vec<Message>) -> defibot_core::Result<String> {
        transcript.push(Message::user(SYNTHESIS_INSTRUCTION));
        let request = ProviderRequest::new(&self.model, transcript)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        let response = self.provider.complete(request).await?;
        Ok(response.message.content)
    }
}

/// Render useful pre-warmed results as a context block, sorted by tool name.
fn prefetched_context(pre_warmed: &HashMap<String, Option<ToolResult>>) -> Option<String> {
    let mut entries: Vec<(&String, &ToolResult)> = pre_warmed
        .iter()
        .filter_map(|(name, result)| result.as_ref().map(|r| (name, r)))
        .filter(|(_, result)| !result.is_empty())
        .collect();
    if entries.is_empty() {
        return None;
    }
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let mut context = String::from(PREFETCHED_HEADER);
    for (name, result) in entries {
        context.push_str(&format!("\n- {name}: {}", result.output));
    }
    Some(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        ScriptedProvider, StaticTool, text_response, tool_call, tool_call_response,
    };
    use async_trait::async_trait;
    use defibot_core::error::{ProviderError, ToolError};
    use defibot_core::message::Role;
    use defibot_core::provider::ProviderResponse;
    use defibot_core::tool::Tool;
    use serde_json::json;

    fn registry(tools: Vec<Arc<StaticTool>>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool);
        }
        registry
    }

    fn responder(provider: Arc<ScriptedProvider>, tools: ToolRegistry) -> DetailedResponder {
        DetailedResponder::new(provider, "gpt-4o", tools, Arc::new(EventBus::default()))
    }

    #[tokio::test]
    async fn tool_call_then_answer() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(tool_call_response(vec![tool_call(
                "c1",
                "search_tokens",
                json!({"query": "AERO"}),
            )])),
            Ok(text_response("AERO trades at $0.85.")),
        ]));
        let tool = Arc::new(StaticTool::new(
            "search_tokens",
            Some(json!([{"token": "AERO", "price": 0.85}])),
        ));
        let detailed = responder(provider.clone(), registry(vec![tool.clone()]));

        let reply = detailed
            .detailed_reply(&RequestId::new(), &[], "price of AERO", HashMap::new())
            .await
            .unwrap();

        assert_eq!(reply.text, "AERO trades at $0.85.");
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.tool_calls[0].arguments["query"], "AERO");
        assert!(!reply.retried);
        assert!(!reply.synthesized);
        assert_eq!(reply.steps, 2);
        assert_eq!(tool.calls(), 1);

        // The second call sees the tool output.
        let second = &provider.requests()[1];
        let last = second.messages.last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert_eq!(last.tool_call_id.as_deref(), Some("c1"));
        assert!(last.content.contains("0.85"));
    }

    #[tokio::test]
    async fn toolless_turns_retry_exactly_once() {
        let provider =
            Arc::new(ScriptedProvider::texts(&["I think it's fine.", "Still no tools."]));
        let tool = Arc::new(StaticTool::new("search_tokens", Some(json!([1]))));
        let detailed = responder(provider.clone(), registry(vec![tool]));

        let reply = detailed
            .detailed_reply(&RequestId::new(), &[], "how is AERO doing", HashMap::new())
            .await
            .unwrap();

        assert_eq!(provider.call_count(), 2);
        assert!(reply.retried);
        assert_eq!(reply.text, "I think it's fine.");
        assert!(reply.tool_calls.is_empty());

        let retry_request = &provider.requests()[1];
        let instruction = &retry_request.messages.last().unwrap().content;
        assert!(instruction.contains("search_tokens"));
    }

    #[tokio::test]
    async fn retry_with_tools_supersedes_first_turn() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(text_response("Guessing.")),
            Ok(tool_call_response(vec![tool_call("c1", "search_tokens", json!({"query": "eth"}))])),
            Ok(text_response("ETH is $3,000.")),
        ]));
        let tool = Arc::new(StaticTool::new("search_tokens", Some(json!([{"price": 3000}]))));
        let detailed = responder(provider.clone(), registry(vec![tool]));

        let reply = detailed
            .detailed_reply(&RequestId::new(), &[], "eth", HashMap::new())
            .await
            .unwrap();

        assert!(reply.retried);
        assert_eq!(reply.text, "ETH is $3,000.");
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.steps, 3);
    }

    #[tokio::test]
    async fn empty_results_trigger_retry_and_failed_retry_keeps_first() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(tool_call_response(vec![tool_call("c1", "search_tokens", json!({"query": "zzz"}))])),
            Ok(text_response("Nothing found.")),
            Ok(text_response("Still nothing.")),
        ]));
        let tool = Arc::new(StaticTool::new("search_tokens", Some(json!([]))));
        let detailed = responder(provider.clone(), registry(vec![tool]));

        let reply = detailed
            .detailed_reply(&RequestId::new(), &[], "zzz token", HashMap::new())
            .await
            .unwrap();

        assert!(reply.retried);
        assert_eq!(reply.text, "Nothing found.");
        assert_eq!(reply.tool_results.len(), 1);
        assert!(reply.tool_results[0].is_empty());
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn blank_answer_after_tools_is_synthesized() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(tool_call_response(vec![tool_call(
                "c1",
                "search_tokens",
                json!({"query": "AERO"}),
            )])),
            Ok(text_response("   ")),
            Ok(text_response("AERO is at $0.85 with $40M liquidity.")),
        ]));
        let tool = Arc::new(StaticTool::new("search_tokens", Some(json!([{"price": 0.85}]))));
        let detailed = responder(provider.clone(), registry(vec![tool]));

        let reply = detailed
            .detailed_reply(&RequestId::new(), &[], "AERO", HashMap::new())
            .await
            .unwrap();

        assert!(reply.synthesized);
        assert!(!reply.retried);
        assert_eq!(reply.text, "AERO is at $0.85 with $40M liquidity.");

        let synthesis = &provider.requests()[2];
        assert!(synthesis.tools.is_empty());
        assert_eq!(synthesis.messages.last().unwrap().content, SYNTHESIS_INSTRUCTION);
    }

    #[tokio::test]
    async fn step_budget_ends_in_synthesis() {
        let call = || -> Result<ProviderResponse, ProviderError> {
            Ok(tool_call_response(vec![tool_call("c", "search_tokens", json!({"query": "x"}))]))
        };
        let provider = Arc::new(ScriptedProvider::new(vec![
            call(),
            call(),
            Ok(text_response("Summary from data.")),
        ]));
        let tool = Arc::new(StaticTool::new("search_tokens", Some(json!([1]))));
        let detailed = responder(provider.clone(), registry(vec![tool.clone()])).with_max_steps(2);

        let reply = detailed
            .detailed_reply(&RequestId::new(), &[], "x", HashMap::new())
            .await
            .unwrap();

        assert_eq!(tool.calls(), 2);
        assert!(reply.synthesized);
        assert_eq!(reply.text, "Summary from data.");
        assert_eq!(reply.steps, 3);
    }

    #[tokio::test]
    async fn failed_tool_is_reported_to_model() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(tool_call_response(vec![tool_call("c1", "analyze_address", json!({}))])),
            Ok(text_response("The analytics service is down.")),
            Ok(text_response("Sorry, no data.")),
        ]));
        let tool = Arc::new(StaticTool::new("analyze_address", None));
        let detailed = responder(provider.clone(), registry(vec![tool]));

        let reply = detailed
            .detailed_reply(&RequestId::new(), &[], "wallet", HashMap::new())
            .await
            .unwrap();

        let second = &provider.requests()[1];
        assert!(second.messages.last().unwrap().content.starts_with("Error"));
        assert!(reply.retried);
        assert!(reply.tool_results[0].result.is_none());
    }

    #[tokio::test]
    async fn malformed_arguments_are_reported_without_running_the_tool() {
        let mut bad = tool_call("c1", "search_tokens", json!({}));
        bad.arguments = "{not json".into();
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(tool_call_response(vec![bad])),
            Ok(text_response("Could not search.")),
            Ok(text_response("Still nothing.")),
        ]));
        let tool = Arc::new(StaticTool::new("search_tokens", Some(json!([{"token": "AERO"}]))));
        let detailed = responder(provider.clone(), registry(vec![tool.clone()]));

        let reply = detailed
            .detailed_reply(&RequestId::new(), &[], "price of AERO", HashMap::new())
            .await
            .unwrap();

        assert_eq!(tool.calls(), 0);
        let fed_back = provider.requests()[1].messages.last().unwrap().clone();
        assert_eq!(fed_back.role, Role::Tool);
        assert!(fed_back.content.starts_with("Error: invalid arguments for tool 'search_tokens'"));
        assert!(reply.retried);
    }

    #[tokio::test]
    async fn blank_arguments_mean_no_arguments() {
        let mut call = tool_call("c1", "search_tokens", json!({}));
        call.arguments = String::new();
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(tool_call_response(vec![call])),
            Ok(text_response("AERO is listed.")),
        ]));
        let tool = Arc::new(StaticTool::new("search_tokens", Some(json!([{"token": "AERO"}]))));
        let detailed = responder(provider, registry(vec![tool.clone()]));

        let reply = detailed
            .detailed_reply(&RequestId::new(), &[], "tokens", HashMap::new())
            .await
            .unwrap();

        assert_eq!(tool.calls(), 1);
        assert_eq!(reply.tool_calls[0].arguments, json!({}));
        assert!(!reply.retried);
    }

    #[tokio::test]
    async fn pre_warmed_data_is_injected() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(tool_call_response(vec![tool_call(
                "c1",
                "search_tokens",
                json!({"query": "AERO"}),
            )])),
            Ok(text_response("done")),
        ]));
        let tool = Arc::new(StaticTool::new("search_tokens", Some(json!([1]))));
        let detailed = responder(provider.clone(), registry(vec![tool]));

        let mut pre_warmed = HashMap::new();
        pre_warmed.insert(
            "search_tokens".to_string(),
            Some(ToolResult::json(json!([{"token": "AERO", "price": 0.85}]))),
        );
        pre_warmed.insert("analyze_address".to_string(), None);

        detailed
            .detailed_reply(&RequestId::new(), &[Message::user("earlier")], "AERO?", pre_warmed)
            .await
            .unwrap();

        let first = &provider.requests()[0];
        assert_eq!(first.messages[1].role, Role::System);
        assert!(first.messages[1].content.starts_with(PREFETCHED_HEADER));
        assert!(first.messages[1].content.contains("\"price\":0.85"));
        assert!(!first.messages[1].content.contains("analyze_address"));
        assert_eq!(first.messages[2].content, "earlier");
        assert_eq!(first.messages[3].content, "AERO?");
    }

    #[tokio::test]
    async fn provider_error_propagates() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(ProviderError::ApiError {
            status_code: 500,
            message: "boom".into(),
        })]));
        let detailed = responder(provider, ToolRegistry::new());
        let result = detailed
            .detailed_reply(&RequestId::new(), &[], "hi", HashMap::new())
            .await;
        assert!(result.is_err());
    }

    struct FixedSource {
        tools: Vec<Arc<dyn Tool>>,
        fail: bool,
    }

    #[async_trait]
    impl ToolSource for FixedSource {
        fn source_url(&self) -> &str {
            "memory://fixed"
        }

        async fn discover(&self) -> Result<Vec<Arc<dyn Tool>>, ToolError> {
            if self.fail {
                return Err(ToolError::DiscoveryFailed {
                    source_url: "memory://fixed".into(),
                    reason: "offline".into(),
                });
            }
            Ok(self.tools.clone())
        }
    }

    #[tokio::test]
    async fn discovered_tools_merge_with_local_precedence() {
        let local = Arc::new(StaticTool::new("search_tokens", Some(json!("local"))));
        let remote_clash: Arc<dyn Tool> =
            Arc::new(StaticTool::new("search_tokens", Some(json!("remote"))));
        let remote_new: Arc<dyn Tool> = Arc::new(StaticTool::new("gas_price", Some(json!(12))));

        let detailed = responder(Arc::new(ScriptedProvider::texts(&[])), registry(vec![local]))
            .with_sources(vec![
                Arc::new(FixedSource {
                    tools: vec![remote_clash, remote_new],
                    fail: false,
                }),
                Arc::new(FixedSource {
                    tools: vec![],
                    fail: true,
                }),
            ]);

        let tools = detailed.available_tools().await;
        assert_eq!(tools.names(), vec!["gas_price", "search_tokens"]);

        let call = ToolCall {
            id: "1".into(),
            name: "search_tokens".into(),
            arguments: json!({}),
        };
        assert_eq!(tools.execute(&call).await.unwrap().data, Some(json!("local")));
    }
}
