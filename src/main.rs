//! toolproxy: ask a chat model questions it answers with local tools.
//!
//! Usage:
//!   toolproxy ask "What is the current date?"   Run one conversation
//!   toolproxy tools                             List the built-in tools
//!   toolproxy init-config                       Write a default config file

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use toolproxy::config::{self, ProxyConfig};
use toolproxy::tools::builtin;
use toolproxy::tools::RecordingInterceptor;
use toolproxy::types::*;
use toolproxy::{ConverseError, OpenAiEngine, ProxyOptions, ToolInvocationProxy};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "toolproxy")]
#[command(version = "0.1.0")]
#[command(about = "Capability-resolving tool-invocation proxy")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the config file (defaults to ~/.toolproxy/toolproxy.toml).
    #[arg(long)]
    config: Option<String>,

    /// Log level (debug, info, warn, error). Overrides the config file.
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send one request through the proxy and print the answer.
    Ask {
        /// The natural-language request.
        request: String,

        /// Also print the full turn history.
        #[arg(long, short)]
        verbose: bool,
    },

    /// List the built-in tools.
    Tools,

    /// Write a default config file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .as_deref()
        .map(config::resolve_path)
        .unwrap_or_else(config::default_config_path);

    let cfg = match &cli.command {
        Commands::InitConfig { .. } => ProxyConfig::default(),
        _ => config::load_config(&config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?,
    };

    // Initialize logging
    let level = cli.log_level.clone().unwrap_or_else(|| cfg.log_level.clone());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Ask { request, verbose } => cmd_ask(&cfg, &request, verbose).await,
        Commands::Tools => cmd_tools(),
        Commands::InitConfig { force } => cmd_init_config(&config_path, force),
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

async fn cmd_ask(cfg: &ProxyConfig, request: &str, verbose: bool) -> Result<()> {
    let Some(api_key) = cfg.effective_api_key() else {
        bail!("No API key configured. Set api_key in the config or OPENAI_API_KEY.");
    };

    let engine = OpenAiEngine::from_config(cfg, &api_key);
    info!("Using model '{}' at {}", engine.model(), cfg.base_url);

    let recorder = Arc::new(RecordingInterceptor::new());
    let registry = builtin::builtin_registry(recorder.clone())?;
    let proxy = ToolInvocationProxy::new(Arc::new(engine), ProxyOptions::from(cfg));

    // Ctrl+C cancels between rounds
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n{} Cancelling after the current round...", "<<<".red().bold());
            signal_cancel.cancel();
        }
    });

    match proxy.converse_detailed(request, &registry, &cancel).await {
        Ok(conversation) => {
            if verbose {
                print_turn(&conversation.turn);
                println!(
                    "  {} rounds, {} tokens, interceptor saw {} call(s)",
                    conversation.rounds,
                    conversation.usage.total_tokens,
                    recorder.invocations(),
                );
                println!();
            }
            println!("{}", conversation.answer);
            Ok(())
        }
        Err(ConverseError::LoopLimitExceeded { limit, turn }) => {
            error!("No final answer after {} rounds", limit);
            print_turn(&turn);
            bail!("loop limit of {} rounds exceeded", limit)
        }
        Err(e) => {
            error!("Conversation failed: {}", e);
            Err(e.into())
        }
    }
}

fn cmd_tools() -> Result<()> {
    let registry = builtin::builtin_registry(Arc::new(RecordingInterceptor::new()))?;

    println!();
    println!("{}", "=== Built-in Tools ===".bold());
    println!();
    for d in registry.descriptors() {
        println!("  {}  {}", d.name.green().bold(), d.description);
        for p in &d.parameters {
            let required = if p.required { "required" } else { "optional" };
            println!(
                "      {} ({}, {}): {}",
                p.name,
                p.kind.as_str(),
                required.dimmed(),
                p.description
            );
        }
    }
    println!();
    Ok(())
}

fn cmd_init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    config::save_config(&ProxyConfig::default(), path)?;
    println!("{} Wrote default config to {}", ">>>".green().bold(), path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn print_turn(turn: &ConversationTurn) {
    println!();
    println!("{}", "=== Turn ===".bold());
    for msg in turn.messages() {
        let line = msg.to_string();
        match msg {
            TurnMessage::ToolResult(r) if !r.is_success() => println!("  {}", line.red()),
            TurnMessage::ToolCall(_) => println!("  {}", line.cyan()),
            TurnMessage::FinalAnswer { .. } => println!("  {}", line.green()),
            _ => println!("  {}", line),
        }
    }
    println!();
}
