//! `analyze_address`: wallet holdings, balances and DeFi positions.

use async_trait::async_trait;
use defibot_core::error::ToolError;
use defibot_core::tool::{Tool, ToolResult};
use std::sync::Arc;

use crate::client::AnalyticsClient;

pub struct AddressAnalysisTool {
    client: Arc<AnalyticsClient>,
}

impl AddressAnalysisTool {
    pub fn new(client: Arc<AnalyticsClient>) -> Self {
        Self { client }
    }
}

/// `0x` followed by exactly 40 hex digits.
pub fn is_evm_address(candidate: &str) -> bool {
    candidate.len() == 42
        && candidate.starts_with("0x")
        && candidate[2..].chars().all(|c| c.is_ascii_hexdigit())
}

#[async_trait]
impl Tool for AddressAnalysisTool {
    fn name(&self) -> &str {
        "analyze_address"
    }

    fn description(&self) -> &str {
        "Analyze a wallet address: token holdings, USD balances, DeFi positions and recent activity."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "address": {
                    "type": "string",
                    "description": "EVM wallet address (0x followed by 40 hex characters)"
                },
                "chain": {
                    "type": "string",
                    "description": "Chain to analyze (default \"base\")",
                    "default": "base"
                }
            },
            "required": ["address"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let address = arguments["address"]
            .as_str()
            .map(str::trim)
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'address' argument".into()))?;

        if !is_evm_address(address) {
            return Err(ToolError::InvalidArguments(format!(
                "'{address}' is not a valid EVM address"
            )));
        }

        let chain = arguments["chain"].as_str().unwrap_or("base");
        let data = self.client.analyze_address(address, chain).await?;
        Ok(ToolResult::json(data))
    }
}
