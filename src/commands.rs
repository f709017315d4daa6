//! Command execution.

use crate::config::Config;
use crate::Commands;
use chrono::{DateTime, Local};
use colored::Colorize;
use printrelay_client::{ClientError, ConnectionState, Connector, PrintClient};
use printrelay_protocol::models::{PrinterConfig, Ticket, TicketTemplate};
use printrelay_protocol::InboundMessage;
use serde_json::Value;
use std::path::Path;

/// Submits the job for a one-shot command and returns a summary line.
pub fn execute<C: Connector>(
    client: &PrintClient<C>,
    config: &Config,
    cmd: Commands,
) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Repl | Commands::Watch | Commands::InitConfig { .. } => unreachable!(),

        Commands::Config { printer, debug_log } => {
            send_config(client, config, printer, debug_log)
        }

        Commands::Template { template } => send_template(client, template.as_deref()),

        Commands::Ticket { ticket } => send_ticket(client, &ticket),

        Commands::Print { text, cut } => send_text(client, &text.join(" "), cut),
    }
}

/// Sends the printer selection, falling back to the configured printer.
pub fn send_config<C: Connector>(
    client: &PrintClient<C>,
    config: &Config,
    printer: Option<String>,
    debug_log: bool,
) -> Result<String, Box<dyn std::error::Error>> {
    let name = printer
        .or_else(|| config.printer.name.clone())
        .ok_or("no printer given and none configured")?;
    let job = PrinterConfig::new(&name).with_debug_log(debug_log || config.printer.debug_log);

    client.print_config(&job)?;
    Ok(format!("{} printer {}", "Selected".green(), name.cyan()))
}

/// Sends a ticket template. Without an argument the default layout is sent.
pub fn send_template<C: Connector>(
    client: &PrintClient<C>,
    arg: Option<&str>,
) -> Result<String, Box<dyn std::error::Error>> {
    let template: TicketTemplate = match arg {
        Some(arg) => serde_json::from_value(parse_json_arg(arg)?)?,
        None => TicketTemplate::default(),
    };

    client.print_template(&template)?;
    Ok(format!(
        "{} template ({} columns)",
        "Sent".green(),
        template.ticket_width
    ))
}

/// Sends a sale ticket.
pub fn send_ticket<C: Connector>(
    client: &PrintClient<C>,
    arg: &str,
) -> Result<String, Box<dyn std::error::Error>> {
    let ticket: Ticket = serde_json::from_value(parse_json_arg(arg)?)?;

    client.print_ticket(&ticket)?;
    Ok(format!(
        "{} ticket {} ({} items, total {:.2}, paid {:.2})",
        "Sent".green(),
        ticket.folio.cyan(),
        ticket.total_items(),
        ticket.total,
        ticket.paid_total()
    ))
}

/// Sends free text.
pub fn send_text<C: Connector>(
    client: &PrintClient<C>,
    text: &str,
    cut: bool,
) -> Result<String, Box<dyn std::error::Error>> {
    client.print_text(text, cut)?;
    Ok(format!(
        "{} {} characters{}",
        "Sent".green(),
        text.chars().count(),
        if cut { ", paper cut" } else { "" }
    ))
}

/// Writes the effective configuration to `path`.
pub fn init_config(config: &Config, path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    config.save(path)?;
    Ok(format!("{} {}", "Wrote".green(), path.display().to_string().cyan()))
}

/// Returns a follow-up hint when a failed command is worth running again.
pub fn retry_hint(err: &(dyn std::error::Error + 'static)) -> Option<&'static str> {
    err.downcast_ref::<ClientError>()
        .filter(|e| e.is_retryable())
        .map(|_| "the printing daemon may be restarting; try again in a few seconds")
}

/// Parses a JSON argument (either inline JSON or @file.json).
pub fn parse_json_arg(arg: &str) -> Result<Value, Box<dyn std::error::Error>> {
    if let Some(path) = arg.strip_prefix('@') {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(serde_json::from_str(arg)?)
    }
}

/// Formats an inbound message as a timestamped log line.
pub fn format_message(message: &InboundMessage, at: DateTime<Local>) -> String {
    let stamp = format!("[{}]", at.format("%H:%M:%S")).dimmed();
    match message {
        InboundMessage::Notice { text } => format!("{} {}", stamp, text),
        InboundMessage::Acknowledgement {
            succeeded: true,
            text,
        } => format!("{} {} {}", stamp, "OK".green(), text),
        InboundMessage::Acknowledgement {
            succeeded: false,
            text,
        } => format!("{} {} {}", stamp, "FAILED".red(), text),
    }
}

/// Formats a connection state change as a timestamped log line.
pub fn format_state(state: ConnectionState, endpoint: &str, at: DateTime<Local>) -> String {
    let stamp = format!("[{}]", at.format("%H:%M:%S")).dimmed();
    let label = match state {
        ConnectionState::Connected => "Connected".green(),
        ConnectionState::Connecting => "Connecting".yellow(),
        ConnectionState::Disconnected => "Disconnected".red(),
    };
    format!("{} {} {}", stamp, label, endpoint.dimmed())
}
