//! Speculative tool calls started as soon as a message arrives.
//!
//! Keyword matching on the raw text decides which tools are likely to be
//! needed. The calls run in spawned tasks while the quick reply is being
//! produced, and go through the same cached tools the model uses, so a
//! finished pre-warm turns the model's later call into a cache hit.

use defibot_core::tool::{ToolRegistry, ToolResult};
use regex_lite::Regex;
use serde_json::json;
use std::collections::HashMap;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const TOKEN_KEYWORDS: &[&str] = &["token", "search", "price", "find"];
const WALLET_KEYWORDS: &[&str] = &["portfolio", "address", "wallet", "holdings"];

/// Pick out the first EVM address in `text`.
pub fn extract_address(text: &str) -> Option<String> {
    let pattern = Regex::new(r"\b0x[a-fA-F0-9]{40}\b").ok()?;
    pattern.find(text).map(|m| m.as_str().to_string())
}

/// Tool calls the text suggests, as `(tool name, arguments)`.
pub fn plan(text: &str) -> Vec<(&'static str, serde_json::Value)> {
    let lower = text.to_lowercase();
    let mut calls = Vec::new();

    if TOKEN_KEYWORDS.iter().any(|k| lower.contains(k)) {
        calls.push(("search_tokens", json!({ "query": text })));
    }

    if WALLET_KEYWORDS.iter().any(|k| lower.contains(k)) {
        match extract_address(text) {
            Some(address) => calls.push(("analyze_address", json!({ "address": address }))),
            None => debug!("Wallet keywords without an address; skipping pre-warm"),
        }
    }

    calls
}

/// Handles for in-flight pre-warm calls, keyed by tool name.
#[derive(Debug, Default)]
pub struct PreWarmed {
    handles: HashMap<String, JoinHandle<Option<ToolResult>>>,
}

impl PreWarmed {
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handles.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every call. Failed or aborted calls resolve to `None`.
    pub async fn resolve(self) -> HashMap<String, Option<ToolResult>> {
        let mut resolved = HashMap::with_capacity(self.handles.len());
        for (name, handle) in self.handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!(tool = %name, error = %e, "Pre-warm task did not complete");
                    None
                }
            };
            resolved.insert(name, result);
        }
        resolved
    }
}

pub struct PreWarmer {
    registry: ToolRegistry,
}

impl PreWarmer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    /// Spawn the planned calls and return immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn pre_warm(&self, text: &str) -> PreWarmed {
        let mut handles = HashMap::new();

        for (name, arguments) in plan(text) {
            let Some(tool) = self.registry.get(name) else {
                continue;
            };

            debug!(tool = name, "Pre-warming tool");
            let handle = tokio::spawn(async move {
                match tool.execute(arguments).await {
                    Ok(result) => Some(result),
                    Err(e) => {
                        warn!(tool = %tool.name(), error = %e, "Pre-warm call failed");
                        None
                    }
                }
            });
            handles.insert(name.to_string(), handle);
        }

        PreWarmed { handles }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::StaticTool;
    use std::sync::Arc;

    const WALLET: &str = "0x52908400098527886E0F7030069857D2E4169EE7";

    #[test]
    fn token_keywords_plan_search() {
        let calls = plan("What's the PRICE of AERO?");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "search_tokens");
        assert_eq!(calls[0].1["query"], "What's the PRICE of AERO?");
    }

    #[test]
    fn wallet_keywords_need_a_real_address() {
        assert!(plan("show my portfolio").is_empty());
        assert!(plan("wallet 0x1234").is_empty());

        let calls = plan(&format!("analyze wallet {WALLET} please"));
        assert_eq!(calls, vec![("analyze_address", json!({ "address": WALLET }))]);
    }

    #[test]
    fn both_plans_can_fire() {
        let calls = plan(&format!("find token holdings for {WALLET}"));
        let names: Vec<_> = calls.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["search_tokens", "analyze_address"]);
    }

    #[test]
    fn unrelated_text_plans_nothing() {
        assert!(plan("hello there").is_empty());
        assert_eq!(extract_address("no address here"), None);
    }

    #[tokio::test]
    async fn failing_pre_warm_resolves_to_none() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(StaticTool::new("search_tokens", None)));
        registry.register(Arc::new(StaticTool::new(
            "analyze_address",
            Some(json!({"totalValueUsd": 10})),
        )));

        let warmed = PreWarmer::new(registry).pre_warm(&format!("token price and wallet {WALLET}"));
        assert_eq!(warmed.tool_names(), vec!["analyze_address", "search_tokens"]);

        let resolved = warmed.resolve().await;
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved["search_tokens"], None);
        assert_eq!(
            resolved["analyze_address"].as_ref().and_then(|r| r.data.clone()),
            Some(json!({"totalValueUsd": 10}))
        );
    }

    #[tokio::test]
    async fn unregistered_tools_are_skipped() {
        let warmed = PreWarmer::new(ToolRegistry::new()).pre_warm("token price");
        assert!(warmed.is_empty());
        assert!(warmed.resolve().await.is_empty());
    }
}
