use std::time::Duration;

use anyhow::{Context, Result};
use avatar_chat::types::Role;
use avatar_chat::{AvatarSession, ChatClient, Config, Conversation, NativeConnector, StreamsClient};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

/// Chat with a talking avatar from the terminal.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Replaces the configured persona sent as the system message
    #[arg(long)]
    persona: Option<String>,

    /// Milliseconds between the avatar going silent and the idle visual returning
    #[arg(long)]
    idle_delay_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let (avatar, chat, mut settings) = config.into_parts();
    if let Some(persona) = cli.persona {
        settings.persona = persona;
    }
    if let Some(ms) = cli.idle_delay_ms {
        settings.idle_delay = Duration::from_millis(ms);
    }

    // --- 3. Connect ---
    let connector = NativeConnector::new().context("Failed to set up the WebRTC stack")?;
    let session = AvatarSession::new(StreamsClient::new(avatar), connector);
    let conversation = Conversation::new(session, ChatClient::new(chat), settings);
    conversation
        .connect()
        .await
        .context("Failed to connect to the avatar service")?;
    tracing::info!("Connected. Type a message, or /quit to leave.");

    // --- 4. Print the transcript as it is revealed ---
    let mut updates = conversation.subscribe();
    let printer = tokio::spawn(async move {
        let mut printed = 0;
        let mut waiting = false;
        while updates.changed().await.is_ok() {
            let state = updates.borrow_and_update().clone();
            let messages = state.transcript.messages();
            for message in messages.iter().skip(printed) {
                match message.role() {
                    Role::Assistant => println!("avatar> {}", message.content()),
                    _ => println!("you> {}", message.content()),
                }
            }
            printed = messages.len();

            let pending = state.transcript.pending().is_some();
            if pending && !waiting {
                println!("avatar> ...");
            }
            waiting = pending;
            if !state.connected {
                println!("session closed");
                break;
            }
        }
    });

    // --- 5. Read turns from stdin ---
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read from stdin")? {
        let line = line.trim();
        if line == "/quit" {
            break;
        }
        if line.is_empty() {
            continue;
        }
        let state = conversation.state();
        if !state.connected {
            tracing::warn!("The avatar session is closed.");
            break;
        }
        if !state.input_enabled() {
            println!("(the avatar is still answering)");
            continue;
        }
        conversation.set_input(line);
        if let Err(e) = conversation.send().await {
            tracing::error!("Turn failed: {}", e);
        }
    }

    // --- 6. Shut down ---
    let stats = conversation.chat().stats();
    tracing::info!(
        "Chat usage: {} requests, {} tokens ({} prompt, {} completion)",
        stats.requests(),
        stats.total_tokens(),
        stats.prompt_tokens(),
        stats.completion_tokens()
    );
    if let Err(e) = conversation.disconnect().await {
        tracing::warn!("Failed to end the avatar session: {}", e);
    }
    printer.abort();
    Ok(())
}
