//! End-to-end tests for the DefiBot backend.
//!
//! These run the real gateway on a local port with a scripted LLM and a
//! stub analytics API, and talk to it over WebSocket and REST.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::extract::Query;
use axum::response::Json;
use axum::routing::get;
use defibot_config::AppConfig;
use defibot_core::error::ProviderError;
use defibot_core::message::{Message, MessageToolCall};
use defibot_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message as WsMessage;

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted responses in sequence.
struct ScriptedProvider {
    responses: Mutex<VecDeque<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::Network("script exhausted".into()))
    }
}

fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock".into(),
    }
}

fn tool_response(name: &str, args: Value) -> ProviderResponse {
    let mut msg = Message::assistant("");
    msg.tool_calls = vec![MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: args.to_string(),
    }];
    ProviderResponse {
        message: msg,
        usage: None,
        model: "mock".into(),
    }
}

fn component_response() -> ProviderResponse {
    text_response(
        &json!({
            "componentCode": "function Component({ price }) { return <span>{price}</span>; }",
            "props": {"price": 0.85},
            "explanation": "Current AERO price",
            "componentType": "data-display"
        })
        .to_string(),
    )
}

// ── Stub servers ─────────────────────────────────────────────────────────

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("127.0.0.1:{}", addr.port())
}

/// Analytics API stub that counts token searches.
async fn analytics_stub(hits: Arc<AtomicUsize>) -> String {
    let router = Router::new().route(
        "/tokens/search",
        get(move |Query(q): Query<std::collections::HashMap<String, String>>| {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Json(json!({"data": [{"symbol": "AERO", "priceUsd": 0.85, "query": q.get("query")}]}))
            }
        }),
    );
    format!("http://{}", serve(router).await)
}

async fn gateway(provider: Arc<ScriptedProvider>, analytics_url: String) -> String {
    let mut config = AppConfig::default();
    config.apis.analytics_url = analytics_url;
    let state = defibot_gateway::build_state(&config, provider);
    serve(defibot_gateway::build_router(state)).await
}

async fn next_frame<S>(ws: &mut S) -> Value
where
    S: futures::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = ws.next().await.unwrap().unwrap();
        if msg.is_text() {
            return serde_json::from_str(&msg.into_text().unwrap()).unwrap();
        }
    }
}

// ── E2E: WebSocket two-phase flow ────────────────────────────────────────

#[tokio::test]
async fn e2e_ws_quick_then_detailed_with_component() {
    let hits = Arc::new(AtomicUsize::new(0));
    let analytics = analytics_stub(hits.clone()).await;

    // Pre-warm issues the same call the model makes below, so the model's
    // call is served from the cache.
    let provider = Arc::new(ScriptedProvider::new(vec![
        text_response("Checking AERO for you..."),
        tool_response("search_tokens", json!({"query": "price of AERO"})),
        text_response("AERO trades at $0.85."),
        component_response(),
    ]));
    let addr = gateway(provider.clone(), analytics).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/v1/ws"))
        .await
        .unwrap();
    ws.send(WsMessage::text(r#"{"type":"chat","content":"price of AERO"}"#))
        .await
        .unwrap();

    let quick = next_frame(&mut ws).await;
    assert_eq!(quick["type"], "response");
    assert_eq!(quick["isQuickResponse"], true);
    assert_eq!(quick["content"], "Checking AERO for you...");

    let detailed = next_frame(&mut ws).await;
    assert_eq!(detailed["isQuickResponse"], false);
    assert_eq!(detailed["content"], "AERO trades at $0.85.");
    assert_eq!(detailed["requestId"], quick["requestId"]);
    assert!(detailed["processingTimeMs"].is_u64());
    assert_eq!(detailed["uiComponent"]["componentType"], "data-display");
    assert_eq!(detailed["uiComponent"]["props"]["price"], 0.85);

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(provider.calls(), 4);
}

#[tokio::test]
async fn e2e_ws_malformed_frame_gets_error_and_socket_survives() {
    let hits = Arc::new(AtomicUsize::new(0));
    let analytics = analytics_stub(hits).await;
    let provider = Arc::new(ScriptedProvider::new(vec![
        text_response("Hi!"),
        text_response("Hello, ask me about DeFi."),
        // tool-less turns get one retry
        text_response("Still happy to help."),
    ]));
    let addr = gateway(provider, analytics).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/v1/ws"))
        .await
        .unwrap();

    ws.send(WsMessage::text("not json")).await.unwrap();
    let err = next_frame(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert!(err["timestamp"].is_i64());

    ws.send(WsMessage::text(r#"{"type":"subscribe","content":"x"}"#))
        .await
        .unwrap();
    assert_eq!(next_frame(&mut ws).await["type"], "error");

    ws.send(WsMessage::text(r#"{"type":"chat","content":"hello"}"#))
        .await
        .unwrap();
    let quick = next_frame(&mut ws).await;
    assert_eq!(quick["content"], "Hi!");
    let detailed = next_frame(&mut ws).await;
    assert_eq!(detailed["content"], "Hello, ask me about DeFi.");
    assert!(detailed.get("uiComponent").is_none());
}

// ── E2E: REST and cache sharing ──────────────────────────────────────────

async fn post_chat(app: Router, message: &str) -> Vec<Value> {
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    let req = axum::http::Request::builder()
        .method("POST")
        .uri("/v1/chat")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(json!({ "message": message }).to_string()))
        .unwrap();

    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn e2e_rest_requests_share_tool_and_component_caches() {
    let hits = Arc::new(AtomicUsize::new(0));
    let analytics = analytics_stub(hits.clone()).await;

    // The second request reuses the cached component, so its script has
    // no component entry.
    let provider = Arc::new(ScriptedProvider::new(vec![
        text_response("One sec."),
        tool_response("search_tokens", json!({"query": "find AERO"})),
        text_response("Found AERO."),
        component_response(),
        text_response("Again, one sec."),
        tool_response("search_tokens", json!({"query": "find AERO"})),
        text_response("Found AERO again."),
    ]));

    let mut config = AppConfig::default();
    config.apis.analytics_url = analytics;
    let state = defibot_gateway::build_state(&config, provider.clone());
    let app = defibot_gateway::build_router(state.clone());

    let first = post_chat(app.clone(), "find AERO").await;
    assert_eq!(first.len(), 2);
    assert_eq!(first[1]["content"], "Found AERO.");

    let second = post_chat(app, "find AERO").await;
    assert_eq!(second[1]["content"], "Found AERO again.");
    assert_ne!(first[0]["requestId"], second[0]["requestId"]);

    // Pre-warm and model calls for both requests reach the API once.
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(state.tool_cache.len(), 1);

    assert_eq!(second[1]["uiComponent"], first[1]["uiComponent"]);
    assert_eq!(state.orchestrator.components().hits(), 1);
    assert_eq!(provider.calls(), 7);
}
