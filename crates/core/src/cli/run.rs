//! `sa-core run` — one-shot execution command.
//!
//! Sends a single message through the chat loop, streams the response to
//! stdout, and exits. Useful for scripting, piping, and quick CLI checks
//! without standing up the HTTP server.

use std::io::Write;

use sa_domain::config::Config;

use crate::bootstrap;
use crate::runtime::events::RunEvent;
use crate::runtime::{run_turn, TurnInput};

/// Execute a single turn and print the response.
///
/// This is the entry point for `sa-core run "message"`.
pub async fn run(
    config: Config,
    message: String,
    session_id: String,
    model: Option<String>,
    json_output: bool,
) -> anyhow::Result<()> {
    let state = bootstrap::build_app_state(config)?;

    let input = TurnInput {
        session_id,
        message,
        model,
    };

    let (_run_id, mut rx) = run_turn(state, input);

    let mut exit_code: i32 = 0;
    let mut collected_events: Vec<RunEvent> = Vec::new();

    while let Some(event) = rx.recv().await {
        if json_output {
            collected_events.push(event);
            continue;
        }
        match &event {
            RunEvent::Token { text } => {
                print!("{text}");
                std::io::stdout().flush().ok();
            }
            RunEvent::Thinking { text, .. } => {
                // Dim output to stderr so it doesn't pollute stdout.
                eprint!("\x1b[2m{text}\x1b[0m");
                std::io::stderr().flush().ok();
            }
            RunEvent::ToolCall { name, .. } => {
                eprintln!("\x1b[2m[tool: {name}]\x1b[0m");
            }
            RunEvent::Done { .. } => {
                // Ensure a trailing newline after streamed deltas.
                println!();
            }
            RunEvent::Error { message } => {
                eprintln!("error: {message}");
                exit_code = 1;
            }
            RunEvent::Aborted { reason } => {
                eprintln!("run aborted: {reason}");
            }
            _ => {}
        }
    }

    if json_output {
        let json = serde_json::to_string_pretty(&collected_events)
            .map_err(|e| anyhow::anyhow!("serializing events: {e}"))?;
        println!("{json}");
    }

    if exit_code != 0 {
        std::process::exit(exit_code);
    }

    Ok(())
}
