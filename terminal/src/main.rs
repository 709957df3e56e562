//! Chatlink Terminal Client
//!
//! Line-oriented front end for conversations and calls.

mod commands;
mod render;

use anyhow::{Context, Result};
use chatlink_core::media::WebRtcBackend;
use chatlink_core::{ApiClient, AppConfig, ChatClient, ClientCommand, SignalingHub};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chatlink")]
#[command(about = "Chatlink terminal client")]
struct Cli {
    /// Data directory holding config.json
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Backend host
    #[arg(long)]
    host: Option<String>,

    /// Backend port
    #[arg(long)]
    port: Option<u16>,

    /// Use https/wss
    #[arg(long)]
    tls: bool,

    /// Local user id
    #[arg(short, long)]
    user: Option<String>,

    /// Display name shown to callees
    #[arg(long)]
    name: Option<String>,

    /// Bearer token from the auth service
    #[arg(long)]
    token: Option<String>,

    /// Start in the small-screen layout
    #[arg(long)]
    compact: bool,

    /// Write the effective settings back to config.json
    #[arg(long)]
    save: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "chatlink=info,chatlink_core=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    tracing::info!("Starting Chatlink v{}", env!("CARGO_PKG_VERSION"));

    let data_dir = cli.data_dir.clone().unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chatlink")
    });
    std::fs::create_dir_all(&data_dir).ok();
    tracing::info!("Data directory: {:?}", data_dir);

    let mut config = AppConfig::load(&data_dir).context("reading config.json")?;
    apply_overrides(&mut config, &cli);
    config.validate()?;
    if cli.save {
        config.save(&data_dir).context("writing config.json")?;
    }

    let hub = Arc::new(SignalingHub::new());
    let backend = Arc::new(ApiClient::new(&config)?);
    let media = Arc::new(WebRtcBackend::new(&config.call));
    let (client, updates) = ChatClient::new(config.clone(), hub, backend, media);

    client
        .connect()
        .await
        .with_context(|| format!("connecting to {}", config.ws_url()))?;
    println!("Connected as {}. Type /help for commands.", config.identity.user_id);

    let renderer = render::Renderer::new(config.notifications.clone());
    let render_task = tokio::spawn(renderer.run(updates));

    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("stdin: {}", e);
                    break;
                }
            };
            if line.trim() == "/help" {
                println!("{}", commands::HELP);
                continue;
            }
            match commands::parse(&line) {
                Ok(Some(command)) => {
                    let quit = command == ClientCommand::Quit;
                    if commands_tx.send(command).is_err() || quit {
                        break;
                    }
                }
                Ok(None) => {}
                Err(message) => eprintln!("{}", message),
            }
        }
    });

    client.run(commands_rx).await?;
    render_task.await.ok();

    tracing::info!("Bye");
    Ok(())
}

fn apply_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if cli.tls {
        config.server.use_tls = true;
    }
    if let Some(user) = &cli.user {
        config.identity.user_id = user.clone();
    }
    if let Some(name) = &cli.name {
        config.identity.display_name = name.clone();
    }
    if cli.token.is_some() {
        config.identity.token = cli.token.clone();
    }
    if cli.compact {
        config.ui.compact = true;
    }
    if config.identity.display_name.is_empty() {
        config.identity.display_name = config.identity.user_id.clone();
    }
}
