//! Operator console: one command per stdin line.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::api::parse_mode;
use crate::engine::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Command(Command),
    /// Re-print the status panel.
    Status,
    Quit,
}

/// Parse one console line (case-insensitive, surrounding whitespace ignored).
pub fn parse_input(line: &str) -> Result<Input, String> {
    let lower = line.trim().to_ascii_lowercase();
    let mut words = lower.split_whitespace();
    let input = match (words.next(), words.next(), words.next()) {
        (Some("toggle"), None, _) => Input::Command(Command::Toggle),
        (Some("mode"), Some(m), None) => match parse_mode(m) {
            Some(mode) => Input::Command(Command::SetMode(mode)),
            None => return Err(format!("unknown mode '{m}' (use manual/auto)")),
        },
        (Some("status"), None, _) => Input::Status,
        (Some("quit" | "exit"), None, _) => Input::Quit,
        _ => {
            return Err(format!(
                "unknown command '{}' (toggle | mode manual | mode auto | status | quit)",
                line.trim()
            ))
        }
    };
    Ok(input)
}

/// Forward parsed stdin lines to the polling loop. On end of input the
/// dashboard keeps running in monitor-only mode.
pub async fn read_stdin(tx: mpsc::Sender<Input>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => match parse_input(&line) {
                Ok(input) => {
                    if tx.send(input).await.is_err() {
                        return;
                    }
                }
                Err(msg) => warn!("{msg}"),
            },
            Ok(None) => break,
            Err(e) => {
                warn!("stdin read failed: {e}");
                break;
            }
        }
    }

    info!("operator input closed; monitoring only");
    // Hold the sender so the loop does not read a closed channel as "quit".
    tx.closed().await;
}

// ===========================================================================
// Tests
// ===========================================================================
