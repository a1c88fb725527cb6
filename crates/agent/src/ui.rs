//! Generated UI components for detailed replies.
//!
//! [`should_generate_ui`] decides whether a reply deserves a component;
//! [`ComponentGenerator`] asks the model for one in JSON mode, bounded by
//! a timeout, and keeps successful results in an LRU keyed by the shape
//! of the data rather than its values.

use defibot_core::message::Message;
use defibot_core::protocol::{ComponentType, GeneratedUiComponent};
use defibot_core::provider::{Provider, ProviderRequest};
use lru::LruCache;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::detailed::ToolOutcome;
use crate::prompts::COMPONENT_STYLE_GUIDE;

const UI_KEYWORDS: &[&str] = &[
    "price",
    "token",
    "yield",
    "portfolio",
    "chart",
    "apy",
    "tvl",
    "volume",
    "balance",
    "liquidity",
    "pool",
    "market cap",
    "compare",
    "trend",
];

const CONTEXT_KEY_CHARS: usize = 50;
const MAX_DATA_CHARS: usize = 8_000;

pub const DEFAULT_CAPACITY: usize = 256;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// True when the user text or the serialized tool data mention a
/// visualizable concept.
pub fn should_generate_ui(tool_results: &[ToolOutcome], user_text: &str) -> bool {
    let text = user_text.to_lowercase();
    if UI_KEYWORDS.iter().any(|k| text.contains(k)) {
        return true;
    }

    let data = serialize_results(tool_results).to_lowercase();
    UI_KEYWORDS.iter().any(|k| data.contains(k))
}

fn serialize_results(tool_results: &[ToolOutcome]) -> String {
    let values: Vec<Value> = tool_results
        .iter()
        .map(|o| {
            json!({
                "tool": o.call.name,
                "data": o.result.as_ref().map(|r| {
                    r.data
                        .clone()
                        .unwrap_or_else(|| Value::String(r.output.clone()))
                }),
            })
        })
        .collect();
    Value::Array(values).to_string()
}

/// `empty`, `array_N`, `object_N` or `primitive`.
fn shape_of(outcome: &ToolOutcome) -> String {
    match outcome.result.as_ref().and_then(|r| r.data.as_ref()) {
        _ if outcome.is_empty() => "empty".into(),
        Some(Value::Array(items)) => format!("array_{}", items.len()),
        Some(Value::Object(fields)) => format!("object_{}", fields.len()),
        _ => "primitive".into(),
    }
}

/// Cache key over tool names, the first characters of the normalized
/// context, and the shape of each result.
pub fn component_key(tool_results: &[ToolOutcome], context: &str) -> String {
    let mut parts: Vec<(String, String)> = tool_results
        .iter()
        .map(|o| (o.call.name.clone(), shape_of(o)))
        .collect();
    parts.sort();

    let normalized: String = context
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .chars()
        .take(CONTEXT_KEY_CHARS)
        .collect();

    let names: Vec<&str> = parts.iter().map(|(n, _)| n.as_str()).collect();
    let shapes: Vec<&str> = parts.iter().map(|(_, s)| s.as_str()).collect();
    let material = json!([names, normalized, shapes]).to_string();

    Sha256::digest(material.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Strip Markdown fences, module syntax and framework pragmas.
pub fn sanitize_code(code: &str) -> String {
    let lines: Vec<&str> = code
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !(trimmed.starts_with("```")
                || trimmed.starts_with("import ")
                || trimmed.starts_with("export ")
                || trimmed.trim_end_matches(';') == "\"use client\""
                || trimmed.trim_end_matches(';') == "'use client'")
        })
        .collect();
    lines.join("\n").trim().to_string()
}

/// Where a component came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentOrigin {
    Cached,
    Generated,
    Fallback,
}

pub struct ComponentGenerator {
    provider: Arc<dyn Provider>,
    model: String,
    timeout: Duration,
    cache: Mutex<LruCache<String, GeneratedUiComponent>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ComponentGenerator {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            provider,
            model: model.into(),
            timeout: DEFAULT_TIMEOUT,
            cache: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn generate(
        &self,
        tool_results: &[ToolOutcome],
        context: &str,
    ) -> GeneratedUiComponent {
        self.generate_tracked(tool_results, context).await.0
    }

    /// Like [`generate`](Self::generate), also reporting the origin.
    pub async fn generate_tracked(
        &self,
        tool_results: &[ToolOutcome],
        context: &str,
    ) -> (GeneratedUiComponent, ComponentOrigin) {
        let key = component_key(tool_results, context);

        let cached = self
            .cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .cloned();
        if let Some(component) = cached {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(cache_hit = true, "UI component served from cache");
            return (component, ComponentOrigin::Cached);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let request = self.build_request(tool_results, context);
        let outcome = tokio::time::timeout(self.timeout, self.provider.complete(request)).await;

        let response = match outcome {
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "UI generation timed out");
                let fallback = fallback_component(tool_results, "generation timed out");
                return (fallback, ComponentOrigin::Fallback);
            }
            Ok(Err(e)) => {
                warn!(error = %e, "UI generation failed");
                let fallback = fallback_component(tool_results, "generation failed");
                return (fallback, ComponentOrigin::Fallback);
            }
            Ok(Ok(response)) => response,
        };

        match parse_component(&response.message.content) {
            Some(component) => {
                self.cache
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .put(key, component.clone());
                debug!(
                    cache_hit = false,
                    kind = ?component.component_type,
                    "UI component generated"
                );
                (component, ComponentOrigin::Generated)
            }
            None => {
                warn!("UI generation returned an unusable component");
                (fallback_component(tool_results, "invalid component"), ComponentOrigin::Fallback)
            }
        }
    }

    fn build_request(&self, tool_results: &[ToolOutcome], context: &str) -> ProviderRequest {
        let data: String = serialize_results(tool_results).chars().take(MAX_DATA_CHARS).collect();
        let prompt = format!(
            "User question: {context}\n\nTool data (JSON):\n{data}\n\nGenerate the component."
        );

        ProviderRequest::new(
            &self.model,
            vec![Message::system(COMPONENT_STYLE_GUIDE), Message::user(prompt)],
        )
        .with_temperature(0.2)
        .with_max_tokens(Some(2_000))
        .json_object()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn parse_component(raw: &str) -> Option<GeneratedUiComponent> {
    let body = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```");
    let mut component: GeneratedUiComponent = serde_json::from_str(body.trim()).ok()?;
    component.component_code = sanitize_code(&component.component_code);
    (!component.component_code.is_empty()).then_some(component)
}

const FALLBACK_CODE: &str = r#"function Component({ tools }) {
  return (
    <div className="bg-zinc-900 rounded-xl p-4 text-zinc-100">
      <div className="text-sm text-zinc-400">Data received</div>
      <div className="mt-1 text-lg">{tools.join(", ")}</div>
    </div>
  );
}"#;

/// Deterministic data card used when generation does not succeed.
pub fn fallback_component(tool_results: &[ToolOutcome], reason: &str) -> GeneratedUiComponent {
    let mut tools: Vec<&str> = tool_results.iter().map(|o| o.call.name.as_str()).collect();
    tools.sort_unstable();
    tools.dedup();

    let mut props = serde_json::Map::new();
    props.insert("tools".into(), json!(tools));

    GeneratedUiComponent {
        component_code: FALLBACK_CODE.to_string(),
        props,
        explanation: format!("Fallback component: {reason}"),
        component_type: ComponentType::DataDisplay,
    }
}
