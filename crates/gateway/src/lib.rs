//! HTTP and WebSocket gateway for DefiBot.
//!
//! Exposes a health check, the WebSocket chat endpoint and a one-shot
//! REST chat endpoint. Built on Axum.

pub mod api_v1;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::HeaderValue;
use axum::{Router, response::Json, routing::get};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, info, warn};

use defibot_agent::ChatOrchestrator;
use defibot_config::AppConfig;
use defibot_core::event::EventBus;
use defibot_core::provider::Provider;
use defibot_tools::ToolCache;

/// Shared application state for the gateway.
///
/// Both stores live here for the life of the process and are handed to
/// the components that need them.
pub struct GatewayState {
    pub config: AppConfig,
    pub provider: Arc<dyn Provider>,
    pub orchestrator: Arc<ChatOrchestrator>,
    pub tool_cache: Arc<ToolCache>,
    pub event_bus: Arc<EventBus>,
}

pub type SharedState = Arc<GatewayState>;

/// Wire tools, cache and orchestrator around `provider`.
pub fn build_state(config: &AppConfig, provider: Arc<dyn Provider>) -> SharedState {
    let tool_cache = Arc::new(ToolCache::new(Duration::from_secs(
        config.cache.tool_ttl_secs,
    )));
    let tools = defibot_tools::default_registry(&config.apis, tool_cache.clone());
    let sources = defibot_tools::sources_from_config(&config.tools);
    let event_bus = Arc::new(EventBus::default());

    let orchestrator = Arc::new(ChatOrchestrator::new(
        config,
        provider.clone(),
        tools,
        sources,
        event_bus.clone(),
    ));

    Arc::new(GatewayState {
        config: config.clone(),
        provider,
        orchestrator,
        tool_cache,
        event_bus,
    })
}

/// [`build_state`] with the provider described by the config.
pub fn build_orchestrator(config: &AppConfig) -> SharedState {
    build_state(config, defibot_providers::build_from_config(config))
}

/// Build the full router.
///
/// Layers applied:
/// - CORS from `gateway.allowed_origins` (any origin when empty)
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let cors = cors_layer(&state.config.gateway.allowed_origins);

    Router::new()
        .route("/health", get(health_handler))
        .with_state(state.clone())
        .nest("/v1", api_v1::v1_router(state))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origin = if allowed_origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600))
}

/// Sweep expired tool results every `every`.
pub fn spawn_cache_cleanup(cache: Arc<ToolCache>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let removed = cache.cleanup();
            if removed > 0 {
                debug!(removed, remaining = cache.len(), "Expired tool results removed");
            }
        }
    })
}

/// Mirror domain events into the trace log.
pub fn spawn_event_logger(bus: &EventBus) -> JoinHandle<()> {
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => debug!(event = ?event, "Domain event"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event logger lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Start the gateway server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let state = build_orchestrator(&config);
    spawn_cache_cleanup(
        state.tool_cache.clone(),
        Duration::from_secs(config.cache.cleanup_interval_secs),
    );
    spawn_event_logger(&state.event_bus);

    let app = build_router(state);

    info!(addr = %addr, model = %config.llm.model, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    llm: LlmHealth,
}

#[derive(Serialize)]
struct LlmHealth {
    provider: String,
    reachable: bool,
}

/// `ok` when the LLM backend answers its health check, `degraded` when not.
/// The gateway itself is up either way, so this is always 200.
async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    let reachable = match state.provider.health_check().await {
        Ok(reachable) => reachable,
        Err(e) => {
            warn!(provider = state.provider.name(), error = %e, "LLM health check failed");
            false
        }
    };

    Json(HealthResponse {
        status: if reachable { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        llm: LlmHealth {
            provider: state.provider.name().to_string(),
            reachable,
        },
    })
}
