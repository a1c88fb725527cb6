//! `search_tokens`: token prices, market data and metadata by name or symbol.

use async_trait::async_trait;
use defibot_core::error::ToolError;
use defibot_core::tool::{Tool, ToolResult};
use std::sync::Arc;

use crate::client::AnalyticsClient;

const DEFAULT_LIMIT: u32 = 5;
const MAX_LIMIT: u32 = 25;

pub struct TokenSearchTool {
    client: Arc<AnalyticsClient>,
}

impl TokenSearchTool {
    pub fn new(client: Arc<AnalyticsClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for TokenSearchTool {
    fn name(&self) -> &str {
        "search_tokens"
    }

    fn description(&self) -> &str {
        "Search tokens by name, symbol or free text. Returns price, market cap, volume, liquidity and chain for each match."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Token name, symbol or question, e.g. \"AERO\" or \"price of WETH\""
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of tokens to return (default 5)",
                    "default": DEFAULT_LIMIT
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        let data = self.client.search_tokens(query, parse_limit(&arguments)).await?;
        Ok(ToolResult::json(data))
    }
}

fn parse_limit(arguments: &serde_json::Value) -> u32 {
    arguments["limit"]
        .as_u64()
        .map(|l| u32::try_from(l).unwrap_or(MAX_LIMIT).clamp(1, MAX_LIMIT))
        .unwrap_or(DEFAULT_LIMIT)
}
