//! REST clients for the data backends the tools wrap.
//!
//! - [`AnalyticsClient`]: token search and wallet analysis.
//! - [`SearchClient`]: Typesense-style full-text search over DeFi protocols.
//!
//! One attempt per call. A non-2xx status becomes
//! [`ToolError::UpstreamStatus`]; transport and decode failures become
//! [`ToolError::ExecutionFailed`].

use defibot_config::ApisConfig;
use defibot_core::error::ToolError;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_default()
}

async fn read_json(tool_name: &str, response: reqwest::Response) -> Result<Value, ToolError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(tool = tool_name, status = status.as_u16(), body = %body, "Upstream API error");
        return Err(ToolError::UpstreamStatus {
            tool_name: tool_name.to_string(),
            status: status.as_u16(),
        });
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| ToolError::failed(tool_name, format!("invalid JSON body: {e}")))
}

/// Many analytics endpoints wrap their payload as `{ "data": ... }`.
fn unwrap_data(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Client for the token and wallet analytics API.
#[derive(Debug, Clone)]
pub struct AnalyticsClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl AnalyticsClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout_secs: u64) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client: http_client(timeout_secs),
        }
    }

    pub fn from_config(apis: &ApisConfig) -> Self {
        Self::new(
            &apis.analytics_url,
            apis.analytics_api_key.clone(),
            apis.request_timeout_secs,
        )
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(format!("{}{path}", self.base_url));
        match &self.api_key {
            Some(key) => request.header("x-api-key", key),
            None => request,
        }
    }

    /// `GET /tokens/search?query=&limit=`
    pub async fn search_tokens(&self, query: &str, limit: u32) -> Result<Value, ToolError> {
        debug!(query, limit, "Analytics token search");
        let response = self
            .get("/tokens/search")
            .query(&[("query", query.to_string()), ("limit", limit.to_string())])
            .send()
            .await
            .map_err(|e| ToolError::failed("search_tokens", e))?;

        read_json("search_tokens", response).await.map(unwrap_data)
    }

    /// `GET /addresses/{address}/analysis?chain=`
    pub async fn analyze_address(&self, address: &str, chain: &str) -> Result<Value, ToolError> {
        debug!(address, chain, "Analytics address analysis");
        let response = self
            .get(&format!("/addresses/{address}/analysis"))
            .query(&[("chain", chain)])
            .send()
            .await
            .map_err(|e| ToolError::failed("analyze_address", e))?;

        read_json("analyze_address", response).await.map(unwrap_data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct RangeFilter {
    field: String,
    min: Option<f64>,
    max: Option<f64>,
}

/// A structured full-text search request.
///
/// Filters are rendered in Typesense syntax: ranges as
/// `field:>=min && field:<=max`, flags as `field:=true`, all joined
/// with ` && `.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub term: String,
    pub query_by: Vec<String>,
    ranges: Vec<RangeFilter>,
    flags: Vec<(String, bool)>,
    sort: Option<(String, SortOrder)>,
    pub per_page: u32,
}

impl SearchQuery {
    pub fn new(term: impl Into<String>) -> Self {
        let term = term.into();
        Self {
            term: if term.trim().is_empty() { "*".into() } else { term },
            query_by: vec!["name".into(), "description".into(), "category".into()],
            ranges: Vec::new(),
            flags: Vec::new(),
            sort: None,
            per_page: 10,
        }
    }

    /// Constrain a numeric field. A range with neither bound is ignored.
    pub fn range(mut self, field: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        if min.is_some() || max.is_some() {
            self.ranges.push(RangeFilter {
                field: field.into(),
                min,
                max,
            });
        }
        self
    }

    pub fn flag(mut self, field: impl Into<String>, value: bool) -> Self {
        self.flags.push((field.into(), value));
        self
    }

    pub fn sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some((field.into(), order));
        self
    }

    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page.clamp(1, 250);
        self
    }

    pub fn filter_by(&self) -> Option<String> {
        let mut clauses = Vec::new();
        for range in &self.ranges {
            if let Some(min) = range.min {
                clauses.push(format!("{}:>={min}", range.field));
            }
            if let Some(max) = range.max {
                clauses.push(format!("{}:<={max}", range.field));
            }
        }
        for (field, value) in &self.flags {
            clauses.push(format!("{field}:={value}"));
        }

        (!clauses.is_empty()).then(|| clauses.join(" && "))
    }

    pub fn sort_by(&self) -> Option<String> {
        self.sort
            .as_ref()
            .map(|(field, order)| format!("{field}:{}", order.as_str()))
    }

    fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("q", self.term.clone()),
            ("query_by", self.query_by.join(",")),
            ("per_page", self.per_page.to_string()),
        ];
        if let Some(filter) = self.filter_by() {
            params.push(("filter_by", filter));
        }
        if let Some(sort) = self.sort_by() {
            params.push(("sort_by", sort));
        }
        params
    }
}

/// Client for the Typesense-compatible protocol search index.
#[derive(Debug, Clone)]
pub struct SearchClient {
    base_url: String,
    api_key: Option<String>,
    collection: String,
    client: reqwest::Client,
}

impl SearchClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        collection: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            collection: collection.into(),
            client: http_client(timeout_secs),
        }
    }

    pub fn from_config(apis: &ApisConfig) -> Self {
        Self::new(
            &apis.search_url,
            apis.search_api_key.clone(),
            &apis.search_collection,
            apis.request_timeout_secs,
        )
    }

    /// Run a search and return the matched documents as a JSON array.
    pub async fn search(&self, query: &SearchQuery) -> Result<Value, ToolError> {
        let url = format!(
            "{}/collections/{}/documents/search",
            self.base_url, self.collection
        );
        debug!(term = %query.term, filter = ?query.filter_by(), "Protocol search");

        let mut request = self.client.get(url).query(&query.to_params());
        if let Some(key) = &self.api_key {
            request = request.header("X-TYPESENSE-API-KEY", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ToolError::failed("search_protocols", e))?;
        let body = read_json("search_protocols", response).await?;

        let documents: Vec<Value> = body["hits"]
            .as_array()
            .map(|hits| hits.iter().map(|hit| hit["document"].clone()).collect())
            .unwrap_or_default();
        Ok(Value::Array(documents))
    }
}
