//! termgate gateway daemon
//!
//! Serves browser terminals over WebSocket and bridges each one to an
//! interactive SSH shell on the requested target.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tg_core::config::{self, CallerEntry, GatewayConfig};
use tg_gateway::access::generate_token;
use tg_gateway::{Gateway, GatewayServer};

#[derive(Parser)]
#[command(name = "tg-gateway")]
#[command(about = "termgate terminal gateway daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config)
    #[arg(short, long)]
    bind: Option<String>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a caller token and print the config entry for it
    Token {
        /// User id the token belongs to
        #[arg(long)]
        user_id: u32,

        /// Grant access to every target
        #[arg(long)]
        admin: bool,

        /// Targets the caller may open (repeatable)
        #[arg(long = "target")]
        targets: Vec<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(Command::Token {
        user_id,
        admin,
        targets,
    }) = args.command
    {
        print_token(user_id, admin, targets);
        return Ok(());
    }

    // Initialize logging
    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("termgate gateway starting...");

    // Load configuration
    let config: GatewayConfig = if let Some(config_path) = &args.config {
        config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        let default_path = config::default_config_path();
        if default_path.exists() {
            config::load_config(&default_path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
                GatewayConfig::default()
            })
        } else {
            tracing::info!("Using default configuration");
            GatewayConfig::default()
        }
    };

    // Override bind address if specified
    let bind_addr = args.bind.unwrap_or_else(|| config.bind_address.clone());

    let gateway = Arc::new(Gateway::from_config(config).context("Failed to initialize gateway")?);

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Setup signal handlers
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel_clone.cancel();
    });

    let server = GatewayServer::new(gateway, cancel);
    server.run(&bind_addr).await?;

    tracing::info!("Gateway shutdown complete");
    Ok(())
}

fn print_token(user_id: u32, admin: bool, targets: Vec<u32>) {
    let token = generate_token();
    let role = if admin { "admin" } else { "user" };

    println!("Token (give this to the caller, it is not stored):");
    println!("  {}", token);
    println!();
    println!("Add to the gateway config:");
    println!();
    println!("[[access.callers]]");
    println!("token_sha256 = \"{}\"", CallerEntry::hash_token(&token));
    println!("user_id = {}", user_id);
    println!("role = \"{}\"", role);
    if !admin {
        let list: Vec<String> = targets.iter().map(u32::to_string).collect();
        println!("targets = [{}]", list.join(", "));
    }
}
