mod config;
use aloud_core::SpeechService;
use config::SpeakAgentConfig;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logging / tracing
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,aloud_core=info,speak_agent=info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(
        target = "speak_agent",
        "Starting speak agent demo: stdin turns → planner → synthesis worker"
    );

    // Load configuration (defaults + env + optional TOML overlay)
    let cfg = SpeakAgentConfig::load();
    let service = SpeechService::new(cfg.speech);

    if let Err(e) = service.enable().await {
        error!(target = "speak_agent", error = %e, "could not enable speech");
        return Err(e.into());
    }

    println!("Type a turn and press enter. Commands: /clear /voice <name> /speed <x> /stats /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix('/') {
            let mut parts = rest.split_whitespace();
            match parts.next().unwrap_or("") {
                "quit" | "q" => break,
                "clear" => {
                    service.interrupt().await;
                    println!("(cleared)");
                }
                "voice" => match parts.next() {
                    Some(name) => {
                        service.set_voice(name).await;
                        println!("(voice set to {name})");
                    }
                    None => println!("usage: /voice <name>"),
                },
                "speed" => match parts.next().and_then(|s| s.parse::<f64>().ok()) {
                    Some(speed) => {
                        service.set_speed(speed).await;
                        println!("(speed set)");
                    }
                    None => println!("usage: /speed <factor>"),
                },
                "stats" => {
                    let stats = service.stats().await;
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                }
                other => warn!(target = "speak_agent", command = %other, "unknown command"),
            }
            continue;
        }
        service.speak_turn(&line).await;
    }

    service.shutdown().await;
    info!(target = "speak_agent", "speak agent demo stopped");
    Ok(())
}
