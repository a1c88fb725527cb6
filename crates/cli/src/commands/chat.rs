//! `defibot chat`: one-shot or interactive chat in the terminal.
//!
//! Runs the same orchestrator the gateway uses and prints both replies
//! for every message, plus the generated component as JSON.

use defibot_config::AppConfig;
use defibot_core::protocol::OutboundMessage;
use defibot_gateway::SharedState;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

pub async fn run(message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    DEFIBOT_API_KEY=sk-...");
        eprintln!("    OPENAI_API_KEY=sk-...");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let state = defibot_gateway::build_orchestrator(&config);
    defibot_gateway::spawn_event_logger(&state.event_bus);

    if let Some(msg) = message {
        for frame in exchange(&state, vec![msg]).await? {
            print_frame(&frame)?;
        }
        return Ok(());
    }

    println!();
    println!("  DefiBot: Interactive Mode");
    println!("  Model: {} (quick: {})", config.llm.model, config.llm.quick_model);
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let session = state.orchestrator.new_session();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "exit" || line == "quit" {
            break;
        }
        if !line.is_empty() {
            let (tx, mut rx) = mpsc::channel(4);
            let handling = state.orchestrator.handle(&session, line, &tx);
            let printing = async {
                let mut printed = 0;
                while printed < 2 {
                    match rx.recv().await {
                        Some(frame) => {
                            print_frame(&frame)?;
                            printed += 1;
                        }
                        None => break,
                    }
                }
                Ok::<_, std::io::Error>(())
            };
            let ((), printed) = tokio::join!(handling, printing);
            printed?;
        }
        prompt()?;
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}

/// Send `messages` in order on one session and collect every frame.
pub(crate) async fn exchange(
    state: &SharedState,
    messages: Vec<String>,
) -> Result<Vec<OutboundMessage>, Box<dyn std::error::Error>> {
    let orchestrator = state.orchestrator.clone();
    let (tx, mut rx) = mpsc::channel(4);

    let task = tokio::spawn(async move {
        let session = orchestrator.new_session();
        for msg in messages {
            orchestrator.handle(&session, &msg, &tx).await;
        }
    });

    let mut frames = Vec::new();
    while let Some(frame) = rx.recv().await {
        frames.push(frame);
    }
    task.await?;
    Ok(frames)
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

fn print_frame(frame: &OutboundMessage) -> std::io::Result<()> {
    let mut out = std::io::stdout().lock();
    match frame {
        OutboundMessage::Response {
            content,
            is_quick_response: true,
            ..
        } => writeln!(out, "  ... {content}")?,
        OutboundMessage::Response {
            content,
            ui_component,
            processing_time_ms,
            error,
            ..
        } => {
            for line in content.lines() {
                writeln!(out, "  DefiBot > {line}")?;
            }
            if *error {
                writeln!(out, "  [request failed]")?;
            }
            if let Some(component) = ui_component {
                let json = serde_json::to_string_pretty(component).map_err(std::io::Error::other)?;
                writeln!(out, "  [ui component]\n{json}")?;
            }
            if let Some(ms) = processing_time_ms {
                writeln!(out, "  ({ms} ms)")?;
            }
            writeln!(out)?;
        }
        OutboundMessage::Error { content, .. } => writeln!(out, "  [Error] {content}")?,
    }
    Ok(())
}
