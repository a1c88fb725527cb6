//! DeFi data tools for DefiBot.
//!
//! Tools give the assistant live market data: token search, wallet
//! analysis and protocol search. Every built-in tool is wrapped in a
//! [`CachedTool`] so pre-warm calls and model calls share results.
//!
//! Extra tools can be discovered at request time from external tool
//! servers listed under `[tools] external_sources`.

pub mod address_analysis;
pub mod cache;
pub mod client;
pub mod discovery;
pub mod protocol_search;
pub mod token_search;

use defibot_config::{ApisConfig, ToolsConfig};
use defibot_core::tool::ToolRegistry;
use std::sync::Arc;

pub use cache::{CachedTool, ToolCache};
pub use client::{AnalyticsClient, SearchClient, SearchQuery, SortOrder};
pub use discovery::{HttpToolSource, ToolSource};

/// Build the registry of built-in tools, each backed by `cache`.
pub fn default_registry(apis: &ApisConfig, cache: Arc<ToolCache>) -> ToolRegistry {
    let analytics = Arc::new(AnalyticsClient::from_config(apis));
    let search = Arc::new(SearchClient::from_config(apis));

    let mut registry = ToolRegistry::new();
    registry.register(CachedTool::wrap(
        Arc::new(token_search::TokenSearchTool::new(analytics.clone())),
        cache.clone(),
    ));
    registry.register(CachedTool::wrap(
        Arc::new(address_analysis::AddressAnalysisTool::new(analytics)),
        cache.clone(),
    ));
    registry.register(CachedTool::wrap(
        Arc::new(protocol_search::ProtocolSearchTool::new(search)),
        cache,
    ));
    registry
}

/// One HTTP source per configured base URL.
pub fn sources_from_config(tools: &ToolsConfig) -> Vec<Arc<dyn ToolSource>> {
    tools
        .external_sources
        .iter()
        .map(|url| Arc::new(HttpToolSource::new(url)) as Arc<dyn ToolSource>)
        .collect()
}
