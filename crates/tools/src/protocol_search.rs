//! `search_protocols`: full-text protocol search with TVL/APY filters.

use async_trait::async_trait;
use defibot_core::error::ToolError;
use defibot_core::tool::{Tool, ToolResult};
use std::sync::Arc;

use crate::client::{SearchClient, SearchQuery, SortOrder};

pub struct ProtocolSearchTool {
    client: Arc<SearchClient>,
}

impl ProtocolSearchTool {
    pub fn new(client: Arc<SearchClient>) -> Self {
        Self { client }
    }
}

/// Translate tool arguments into a [`SearchQuery`].
fn build_query(arguments: &serde_json::Value) -> Result<SearchQuery, ToolError> {
    let term = arguments["query"].as_str().unwrap_or("*");
    let mut query = SearchQuery::new(term)
        .range(
            "tvl",
            arguments["min_tvl"].as_f64(),
            arguments["max_tvl"].as_f64(),
        )
        .range(
            "apy",
            arguments["min_apy"].as_f64(),
            arguments["max_apy"].as_f64(),
        );

    if let Some(audited) = arguments["audited"].as_bool() {
        query = query.flag("audited", audited);
    }

    if let Some(field) = arguments["sort_by"].as_str() {
        if !matches!(field, "tvl" | "apy" | "volume") {
            return Err(ToolError::InvalidArguments(format!(
                "Unsupported sort field '{field}'"
            )));
        }
        let order = match arguments["order"].as_str() {
            Some("asc") => SortOrder::Asc,
            _ => SortOrder::Desc,
        };
        query = query.sort(field, order);
    }

    if let Some(limit) = arguments["limit"].as_u64() {
        query = query.per_page(u32::try_from(limit).unwrap_or(u32::MAX));
    }

    Ok(query)
}

#[async_trait]
impl Tool for ProtocolSearchTool {
    fn name(&self) -> &str {
        "search_protocols"
    }

    fn description(&self) -> &str {
        "Search DeFi protocols and pools. Supports TVL and APY ranges, an audited flag and sorting by tvl, apy or volume."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Free text, e.g. \"stablecoin lending\"" },
                "min_tvl": { "type": "number", "description": "Minimum TVL in USD" },
                "max_tvl": { "type": "number", "description": "Maximum TVL in USD" },
                "min_apy": { "type": "number", "description": "Minimum APY in percent" },
                "max_apy": { "type": "number", "description": "Maximum APY in percent" },
                "audited": { "type": "boolean", "description": "Only audited protocols" },
                "sort_by": { "type": "string", "enum": ["tvl", "apy", "volume"] },
                "order": { "type": "string", "enum": ["asc", "desc"], "default": "desc" },
                "limit": { "type": "integer", "default": 10 }
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = build_query(&arguments)?;
        let documents = self.client.search(&query).await?;
        Ok(ToolResult::json(documents))
    }
}
