//! Time-bounded cache for tool results.
//!
//! Entries are keyed by a SHA-256 digest of the tool name, the normalized
//! query text and a canonical rendering of the call parameters, so two
//! argument objects that differ only in key order share an entry.
//!
//! Expiry is lazy on lookup; [`ToolCache::cleanup`] sweeps the whole map
//! and is driven by the gateway's interval task.

use async_trait::async_trait;
use defibot_core::error::ToolError;
use defibot_core::tool::{Tool, ToolResult};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Default lifetime of a cached result.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct CacheEntry {
    result: Value,
    stored_at: Instant,
    query: String,
    tool_name: String,
}

/// Shared tool result cache.
#[derive(Debug)]
pub struct ToolCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl Default for ToolCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl ToolCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a live entry. An expired entry is removed and reported as a miss.
    pub fn get(&self, tool_name: &str, query: &str, params: Option<&Value>) -> Option<Value> {
        let key = cache_key(tool_name, query, params);
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        let entry = entries.get(&key)?;
        if entry.stored_at.elapsed() > self.ttl {
            debug!(tool = %entry.tool_name, query = %entry.query, "Cache entry expired");
            entries.remove(&key);
            return None;
        }
        Some(entry.result.clone())
    }

    /// Store a result, replacing whatever was under the same key.
    pub fn set(&self, tool_name: &str, query: &str, result: Value, params: Option<&Value>) {
        let key = cache_key(tool_name, query, params);
        let entry = CacheEntry {
            result,
            stored_at: Instant::now(),
            query: query.to_string(),
            tool_name: tool_name.to_string(),
        };
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, entry);
    }

    /// Remove every expired entry and return how many were dropped.
    pub fn cleanup(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| entry.stored_at.elapsed() <= self.ttl);
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, remaining = entries.len(), "Tool cache cleanup");
        }
        removed
    }

    /// Return the cached value or run `fetch`, caching its `Ok` output.
    /// Errors pass through untouched and are never cached.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        tool_name: &str,
        query: &str,
        params: Option<&Value>,
        fetch: F,
    ) -> Result<Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        if let Some(hit) = self.get(tool_name, query, params) {
            debug!(tool = tool_name, cache_hit = true, "Tool cache hit");
            return Ok(hit);
        }

        debug!(tool = tool_name, cache_hit = false, "Tool cache miss");
        let value = fetch().await?;
        self.set(tool_name, query, value.clone(), params);
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Digest of the three key components.
///
/// Each part is encoded as a JSON string inside an array so no two
/// distinct inputs can collide through concatenation.
pub fn cache_key(tool_name: &str, query: &str, params: Option<&Value>) -> String {
    let params = params.map(canonical_json).unwrap_or_default();
    let material = serde_json::json!([tool_name, normalize_query(query), params]).to_string();

    let digest = Sha256::digest(material.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Serialize with object keys sorted at every depth.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", Value::String(k.clone()), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

/// A [`Tool`] wrapper that serves repeated calls from a [`ToolCache`].
///
/// The arguments object is the cache key, so a pre-warm call and a later
/// model call with the same arguments hit the same entry.
pub struct CachedTool {
    inner: Arc<dyn Tool>,
    cache: Arc<ToolCache>,
}

impl CachedTool {
    pub fn new(inner: Arc<dyn Tool>, cache: Arc<ToolCache>) -> Self {
        Self { inner, cache }
    }

    pub fn wrap(inner: Arc<dyn Tool>, cache: Arc<ToolCache>) -> Arc<dyn Tool> {
        Arc::new(Self::new(inner, cache))
    }
}

#[async_trait]
impl Tool for CachedTool {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn parameters_schema(&self) -> Value {
        self.inner.parameters_schema()
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let name = self.inner.name();
        let inner = Arc::clone(&self.inner);
        let call_args = arguments.clone();
        let stored = self
            .cache
            .get_or_fetch(name, "", Some(&arguments), move || async move {
                let result = inner.execute(call_args).await?;
                serde_json::to_value(&result).map_err(|e| ToolError::failed(name, e))
            })
            .await?;

        serde_json::from_value(stored).map_err(|e| ToolError::failed(name, e))
    }
}
