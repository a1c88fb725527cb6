//! External tool discovery.
//!
//! A [`ToolSource`] contributes extra tools at request time. The HTTP
//! source lists tools with `GET {base}/tools` and executes them with
//! `POST {base}/tools/{name}`, passing the arguments as the JSON body.

use async_trait::async_trait;
use defibot_core::error::ToolError;
use defibot_core::tool::{Tool, ToolResult};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait ToolSource: Send + Sync {
    /// Where the tools come from, for logs.
    fn source_url(&self) -> &str;

    async fn discover(&self) -> Result<Vec<Arc<dyn Tool>>, ToolError>;
}

#[derive(Debug, Clone, Deserialize)]
struct RemoteToolSpec {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default = "empty_object_schema")]
    parameters: serde_json::Value,
}

fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

/// Discovers tools served by an HTTP tool server.
pub struct HttpToolSource {
    base_url: String,
    client: reqwest::Client,
}

impl HttpToolSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn discovery_error(&self, reason: impl std::fmt::Display) -> ToolError {
        ToolError::DiscoveryFailed {
            source_url: self.base_url.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl ToolSource for HttpToolSource {
    fn source_url(&self) -> &str {
        &self.base_url
    }

    async fn discover(&self) -> Result<Vec<Arc<dyn Tool>>, ToolError> {
        let response = self
            .client
            .get(format!("{}/tools", self.base_url))
            .send()
            .await
            .map_err(|e| self.discovery_error(e))?;

        if !response.status().is_success() {
            return Err(self.discovery_error(format!("status {}", response.status())));
        }

        let specs: Vec<RemoteToolSpec> = response
            .json()
            .await
            .map_err(|e| self.discovery_error(e))?;

        debug!(source = %self.base_url, count = specs.len(), "Discovered external tools");

        Ok(specs
            .into_iter()
            .map(|spec| {
                Arc::new(RemoteTool {
                    spec,
                    base_url: self.base_url.clone(),
                    client: self.client.clone(),
                }) as Arc<dyn Tool>
            })
            .collect())
    }
}

/// A tool executed by a remote tool server.
struct RemoteTool {
    spec: RemoteToolSpec,
    base_url: String,
    client: reqwest::Client,
}

#[async_trait]
impl Tool for RemoteTool {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn description(&self) -> &str {
        &self.spec.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.spec.parameters.clone()
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let name = self.spec.name.as_str();
        let response = self
            .client
            .post(format!("{}/tools/{name}", self.base_url))
            .json(&arguments)
            .send()
            .await
            .map_err(|e| ToolError::failed(name, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::UpstreamStatus {
                tool_name: name.to_string(),
                status: status.as_u16(),
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ToolError::failed(name, e))?;
        Ok(ToolResult::json(body))
    }
}
