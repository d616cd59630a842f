//! huddle daemon - matchmaking and match negotiation server
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (127.0.0.1:7400, matches of 4)
//! huddled
//!
//! # Custom config file and listen address
//! huddled --config /etc/huddle.toml --listen 0.0.0.0:7400
//!
//! # Same through the environment
//! HUDDLE_CONFIG=/etc/huddle.toml HUDDLE_LISTEN=0.0.0.0:7400 huddled
//!
//! # Enable debug logging
//! RUST_LOG=huddled=debug huddled
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use huddled::config::HuddleConfig;
use huddled::lobby::{spawn_lobby, LobbyEvent, LobbyHandle};
use huddled::server::HuddleServer;

/// huddle daemon - matchmaking queue and match negotiation
#[derive(Parser, Debug)]
#[command(name = "huddled", version, about)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "HUDDLE_CONFIG", default_value = "huddle.toml")]
    config: PathBuf,

    /// Address to listen on (overrides the config file)
    #[arg(short, long, env = "HUDDLE_LISTEN")]
    listen: Option<String>,

    /// Participants per match (overrides the config file)
    #[arg(short = 'n', long)]
    match_size: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("huddled=info".parse()?)
                .add_directive("huddle_core=info".parse()?)
                .add_directive("huddle_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "huddle daemon starting"
    );

    let mut config = HuddleConfig::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    if let Some(match_size) = args.match_size {
        config.matchmaking.match_size = match_size;
    }
    let settings = config.lobby_settings().context("Invalid configuration")?;

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let lobby = spawn_lobby(settings);
    info!(
        match_size = config.matchmaking.match_size,
        "Lobby started"
    );
    spawn_handoff_logger(&lobby, cancel_token.clone());

    let server = HuddleServer::bind(&config.server.listen, lobby, cancel_token)
        .await
        .context("Failed to start server")?;

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("huddle daemon stopped");
    Ok(())
}

/// Logs every lobby event. Launch events are the session handoff point.
fn spawn_handoff_logger(lobby: &LobbyHandle, cancel_token: CancellationToken) {
    let mut events = lobby.subscribe();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,

                result = events.recv() => match result {
                    Ok(LobbyEvent::MatchFormed { match_id, participants }) => {
                        info!(match_id = %match_id, participants = participants.len(), "Match formed");
                    }
                    Ok(LobbyEvent::MatchLaunched(payload)) => {
                        let slots: Vec<String> = payload
                            .participants
                            .iter()
                            .map(|slot| format!("{}={}", slot.id.short(), slot.color))
                            .collect();
                        info!(
                            match_id = %payload.match_id,
                            slots = %slots.join(","),
                            "Session handoff"
                        );
                    }
                    Ok(LobbyEvent::MatchAborted { match_id, disconnected }) => {
                        info!(match_id = %match_id, disconnected = %disconnected, "Match aborted");
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "Handoff logger lagged, skipped events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    });
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
