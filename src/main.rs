//! printrelay - Command-line client for a receipt-printing daemon
//!
//! Provides both a REPL and one-shot command execution.

mod commands;
mod config;
mod repl;

use chrono::Local;
use clap::{Parser, Subcommand};
use colored::Colorize;
use config::Config;
use printrelay_client::{ConnectionState, PrintClient};
use printrelay_protocol::{endpoint_for_host, InboundMessage};
use std::path::PathBuf;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "printrelay")]
#[command(about = "Send printer configuration, templates, tickets and text to a printing daemon")]
#[command(version)]
struct Cli {
    /// Daemon WebSocket endpoint (e.g. ws://localhost:8766/ws)
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Daemon host; expands to ws://<host>:8766/ws
    #[arg(short = 'H', long, conflicts_with = "endpoint")]
    host: Option<String>,

    /// Path to a YAML config file
    #[arg(short, long, env = "PRINTRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Delay between reconnect attempts, in milliseconds
    #[arg(long)]
    retry_delay_ms: Option<u64>,

    /// How long one-shot commands wait for the acknowledgement, in seconds
    #[arg(long)]
    ack_timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start interactive REPL
    Repl,

    /// Stream daemon messages and connection changes until Ctrl+C
    Watch,

    /// Select the printer on the daemon host
    Config {
        /// Printer name (defaults to printer.name from the config file)
        printer: Option<String>,

        /// Ask the daemon to log debug output
        #[arg(long)]
        debug_log: bool,
    },

    /// Send the ticket layout template
    Template {
        /// Template JSON (or @file.json); the standard layout when omitted
        template: Option<String>,
    },

    /// Print a sale ticket
    Ticket {
        /// Ticket JSON (or @file.json to read from file)
        ticket: String,
    },

    /// Write the effective configuration to a YAML file
    InitConfig {
        /// Destination path
        #[arg(default_value = "printrelay.yaml")]
        path: PathBuf,
    },

    /// Print free text
    Print {
        /// Text to print
        #[arg(required = true)]
        text: Vec<String>,

        /// Cut the paper afterwards
        #[arg(long)]
        cut: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).map_err(|e| {
        eprintln!("{}: {}", "Config error".red(), e);
        e
    })?;
    if let Some(host) = &cli.host {
        config.connection.endpoint = endpoint_for_host(host);
    }
    if let Some(endpoint) = cli.endpoint {
        config.connection.endpoint = endpoint;
    }
    if let Some(ms) = cli.retry_delay_ms {
        config.connection.retry_delay_ms = ms;
    }
    if let Some(secs) = cli.ack_timeout_secs {
        config.connection.ack_timeout_secs = secs;
    }
    config.validate().map_err(|e| {
        eprintln!("{}: {}", "Config error".red(), e);
        e
    })?;

    if let Some(Commands::InitConfig { path }) = &cli.command {
        match commands::init_config(&config, path) {
            Ok(output) => println!("{}", output),
            Err(e) => {
                eprintln!("{}: {}", "Error".red(), e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    tracing::debug!(
        "Using endpoint {} (retry every {}ms)",
        config.connection.endpoint,
        config.connection.retry_delay_ms
    );
    let client = PrintClient::new(config.connection.to_connection_config());

    match cli.command {
        Some(Commands::Repl) | None => {
            repl::run(client, config).await?;
        }
        Some(Commands::Watch) => {
            watch_daemon(&client, &config).await?;
        }
        Some(cmd) => {
            let ok = run_once(&client, &config, cmd).await?;
            client.stop();
            if !ok {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Connects, submits one job and waits for its acknowledgement.
///
/// Returns whether the daemon reported success.
async fn run_once(
    client: &PrintClient,
    config: &Config,
    cmd: Commands,
) -> Result<bool, Box<dyn std::error::Error>> {
    let endpoint = &config.connection.endpoint;

    let (state_tx, mut state_rx) = watch::channel(client.state());
    client.on_state_change(move |state| {
        let _ = state_tx.send(state);
    });
    let (message_tx, mut message_rx) = mpsc::unbounded_channel::<InboundMessage>();
    client.on_frame(move |message| {
        let _ = message_tx.send(message.clone());
    });

    client.start(endpoint.as_str())?;

    let connected = tokio::time::timeout(config.connection.connect_timeout(), async {
        state_rx.wait_for(ConnectionState::is_connected).await.is_ok()
    })
    .await
    .unwrap_or(false);
    if !connected {
        eprintln!(
            "{}: could not reach the printing daemon at {}",
            "Connection failed".red(),
            endpoint
        );
        return Ok(false);
    }

    match commands::execute(client, config, cmd) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            if let Some(hint) = commands::retry_hint(e.as_ref()) {
                eprintln!("{}", hint.dimmed());
            }
            return Ok(false);
        }
    }

    // Notices arriving before the acknowledgement are printed as they come.
    let ack_timeout = config.connection.ack_timeout();
    loop {
        match tokio::time::timeout(ack_timeout, message_rx.recv()).await {
            Ok(Some(message)) => {
                println!("{}", commands::format_message(&message, Local::now()));
                if let InboundMessage::Acknowledgement { succeeded, .. } = message {
                    return Ok(succeeded);
                }
            }
            Ok(None) => return Ok(false),
            Err(_) => {
                eprintln!(
                    "{}: no acknowledgement within {}s",
                    "Timeout".yellow(),
                    ack_timeout.as_secs()
                );
                return Ok(false);
            }
        }
    }
}

/// Prints every message and state change until interrupted.
async fn watch_daemon(
    client: &PrintClient,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let endpoint = config.connection.endpoint.clone();

    let state_endpoint = endpoint.clone();
    client.on_state_change(move |state| {
        println!("{}", commands::format_state(state, &state_endpoint, Local::now()));
    });
    client.on_frame(|message| {
        println!("{}", commands::format_message(message, Local::now()));
    });

    client.start(endpoint.as_str())?;
    eprintln!("{} {}", "Watching".green(), endpoint.cyan());
    eprintln!("{}", "Press Ctrl+C to stop...".dimmed());

    tokio::signal::ctrl_c().await?;
    eprintln!("\n{}", "Stopping watch...".dimmed());
    client.stop();

    Ok(())
}
