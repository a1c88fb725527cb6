//! Tool trait and the registry the model calls into.
//!
//! Tools are how the assistant reaches live data: token analytics,
//! wallet analysis, protocol search, and anything discovered from an
//! external tool server.

use crate::error::ToolError;
use crate::provider::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Matches the LLM's tool_call.id
    pub id: String,

    pub name: String,

    pub arguments: serde_json::Value,
}

/// The result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Text handed back to the LLM
    pub output: String,

    /// Structured payload, used for caching and UI generation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    /// Wrap a JSON payload; the LLM sees its compact serialization.
    pub fn json(data: serde_json::Value) -> Self {
        Self {
            output: data.to_string(),
            data: Some(data),
        }
    }

    /// True when the tool produced nothing useful: no data or `null`,
    /// an empty array or object, or blank text.
    pub fn is_empty(&self) -> bool {
        match &self.data {
            Some(serde_json::Value::Null) => true,
            None => self.output.trim().is_empty(),
            Some(serde_json::Value::Array(items)) => items.is_empty(),
            Some(serde_json::Value::Object(fields)) => fields.is_empty(),
            Some(serde_json::Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        }
    }
}

/// Each tool implements this trait and is registered in a [`ToolRegistry`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "search_tokens").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// Tools are stored behind `Arc` so the pre-warmer can move a handle into
/// a spawned task and so registries can be merged cheaply.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Definitions for the LLM, sorted by name so prompts are stable.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        tool.execute(call.arguments.clone()).await
    }

    /// Sorted tool names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// A new registry with `extra` added. Tools already present keep
    /// precedence over same-named extras.
    pub fn merged_with(&self, extra: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        let mut merged = self.clone();
        for tool in extra {
            merged
                .tools
                .entry(tool.name().to_string())
                .or_insert(tool);
        }
        merged
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool {
        name: &'static str,
        description: &'static str,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            self.description
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::json(arguments["text"].clone()))
        }
    }

    fn echo(name: &'static str, description: &'static str) -> Arc<dyn Tool> {
        Arc::new(EchoTool { name, description })
    }

    #[tokio::test]
    async fn registry_execute_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(echo("echo", "local"));

        let call = ToolCall {
            id: "call_1".into(),
            name: "echo".into(),
            arguments: serde_json::json!({"text": "hello world"}),
        };
        let result = registry.execute(&call).await.unwrap();
        assert_eq!(result.data, Some(serde_json::json!("hello world")));
    }

    #[tokio::test]
    async fn registry_execute_missing_tool() {
        let registry = ToolRegistry::new();
        let call = ToolCall {
            id: "call_1".into(),
            name: "nonexistent".into(),
            arguments: serde_json::json!({}),
        };
        let err = registry.execute(&call).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[test]
    fn merge_keeps_local_tool_on_clash() {
        let mut registry = ToolRegistry::new();
        registry.register(echo("echo", "local"));

        let merged = registry.merged_with(vec![echo("echo", "remote"), echo("zeta", "remote")]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.get("echo").unwrap().description(), "local");
        assert_eq!(merged.names(), vec!["echo", "zeta"]);
        // The original registry is untouched
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn definitions_are_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(echo("b_tool", "b"));
        registry.register(echo("a_tool", "a"));
        let defs = registry.definitions();
        assert_eq!(defs[0].name, "a_tool");
        assert_eq!(defs[1].name, "b_tool");
    }

    #[test]
    fn emptiness_of_results() {
        assert!(ToolResult::json(serde_json::json!([])).is_empty());
        assert!(ToolResult::json(serde_json::json!({})).is_empty());
        assert!(ToolResult::json(serde_json::Value::Null).is_empty());
        assert!(!ToolResult::json(serde_json::json!([{"token": "AERO"}])).is_empty());
        assert!(!ToolResult::json(serde_json::json!(0.85)).is_empty());
    }
}
