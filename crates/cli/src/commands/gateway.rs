//! `defibot gateway`: start the HTTP and WebSocket server.

use defibot_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    if !config.has_api_key() {
        tracing::warn!("No LLM API key configured; set DEFIBOT_API_KEY or OPENAI_API_KEY");
    }

    println!("DefiBot Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:     {} (quick: {})", config.llm.model, config.llm.quick_model);
    println!("   WebSocket: ws://{}:{}/v1/ws", config.gateway.host, config.gateway.port);

    defibot_gateway::start(config).await?;

    Ok(())
}
