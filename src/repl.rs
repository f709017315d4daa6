//! Interactive REPL.

use crate::commands::{self, format_message, format_state};
use crate::config::Config;
use chrono::Local;
use colored::Colorize;
use printrelay_client::{Connector, PrintClient};
use printrelay_protocol::MessageKind;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config as EditorConfig, Editor};

const HELP_TEXT: &str = r#"
Available commands:
  help                          Show this help
  status                        Show connection state

  config [printer]              Select the printer (defaults to the configured one)
  template [json|@file]         Send the ticket template (defaults to the standard layout)
  ticket <json|@file>           Print a sale ticket
  print <text>                  Print free text
  printcut <text>               Print free text and cut the paper
  send <kind> <json|@file>      Send a raw job (config, template, ticket, print)

  quit, exit                    Exit the REPL
"#;

pub async fn run<C: Connector>(
    client: PrintClient<C>,
    config: Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let endpoint = config.connection.endpoint.clone();
    println!("{}", "printrelay CLI".bold().cyan());
    println!("Connecting to {}...", endpoint);

    // Replies and state changes arrive in the background and are printed as
    // they come, like a log panel.
    let state_endpoint = endpoint.clone();
    client.on_state_change(move |state| {
        println!("{}", format_state(state, &state_endpoint, Local::now()));
    });
    client.on_frame(|message| {
        println!("{}", format_message(message, Local::now()));
    });
    client.start(endpoint.as_str())?;

    let editor_config = EditorConfig::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(editor_config)?;

    let history_path = std::env::var("HOME")
        .map(|h| std::path::PathBuf::from(h).join(".printrelay_history"))
        .unwrap_or_else(|_| ".printrelay_history".into());
    let _ = rl.load_history(&history_path);

    println!("Type 'help' for available commands.\n");

    loop {
        let prompt = format!("{} ", "printrelay>".cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match execute_repl_command(&client, &config, line) {
                    Ok(Some(output)) => println!("{}\n", output),
                    Ok(None) => break,
                    Err(e) => println!("{}: {}\n", "Error".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);

    client.stop();
    println!("{}", "Disconnected.".dimmed());

    Ok(())
}

fn execute_repl_command<C: Connector>(
    client: &PrintClient<C>,
    config: &Config,
    line: &str,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd.to_lowercase(), rest.trim()),
        None => (line.to_lowercase(), ""),
    };

    match cmd.as_str() {
        "help" | "?" => Ok(Some(HELP_TEXT.to_string())),

        "quit" | "exit" | "q" => Ok(None),

        "status" => {
            let state = client.state();
            let state = if state.is_connected() {
                state.to_string().green()
            } else {
                state.to_string().yellow()
            };
            Ok(Some(format!(
                "{} {}{}",
                state,
                config.connection.endpoint,
                if client.is_busy() {
                    " (awaiting acknowledgement)"
                } else {
                    ""
                }
            )))
        }

        "config" => {
            let printer = (!rest.is_empty()).then(|| rest.to_string());
            commands::send_config(client, config, printer, false).map(Some)
        }

        "template" => {
            let arg = (!rest.is_empty()).then_some(rest);
            commands::send_template(client, arg).map(Some)
        }

        "ticket" => {
            if rest.is_empty() {
                return Ok(Some("Usage: ticket <json|@file>".to_string()));
            }
            commands::send_ticket(client, rest).map(Some)
        }

        "print" => commands::send_text(client, rest, false).map(Some),

        "printcut" => commands::send_text(client, rest, true).map(Some),

        "send" => {
            let Some((kind, payload)) = rest.split_once(char::is_whitespace) else {
                return Ok(Some("Usage: send <kind> <json|@file>".to_string()));
            };
            let kind: MessageKind = kind.parse()?;
            client.submit(kind, commands::parse_json_arg(payload.trim())?)?;
            Ok(Some(format!("{} {} job", "Sent".green(), kind)))
        }

        _ => Ok(Some(format!(
            "Unknown command: {}. Type 'help' for available commands.",
            cmd
        ))),
    }
}
