//! PTY (console) comms channel — reads lines from stdin, relays them to the
//! chat agent and prints the reply to stdout.
//!
//! Enabled with `-i`. Understands the same `/start` and `/reset` commands as
//! Telegram and talks as a single fixed user. Runs until the `shutdown` token
//! is cancelled (Ctrl-C) or stdin is closed.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::subsystems::memory::UserId;
use crate::subsystems::runtime::{Component, ComponentFuture};
use super::state::{CommsEvent, CommsState};

/// The console always speaks as this user.
pub const CONSOLE_USER: UserId = UserId(0);

const CONSOLE_NAME: &str = "console";

// ── PtyChannel ───────────────────────────────────────────────────────────────

pub struct PtyChannel {
    channel_id: String,
    state: Arc<CommsState>,
}

impl PtyChannel {
    pub fn new(channel_id: impl Into<String>, state: Arc<CommsState>) -> Self {
        Self { channel_id: channel_id.into(), state }
    }
}

impl Component for PtyChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_pty(self.channel_id, self.state, shutdown))
    }
}

/// What a console line asks for.
#[derive(Debug, PartialEq, Eq)]
enum ConsoleInput<'a> {
    Start,
    Reset,
    Text(&'a str),
}

fn parse_line(line: &str) -> Option<ConsoleInput<'_>> {
    match line.trim() {
        "" => None,
        "/start" => Some(ConsoleInput::Start),
        "/reset" => Some(ConsoleInput::Reset),
        text => Some(ConsoleInput::Text(text)),
    }
}

// ── run_pty ──────────────────────────────────────────────────────────────────

async fn run_pty(
    channel_id: String,
    state: Arc<CommsState>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    info!(%channel_id, "pty channel started — type a message and press Enter. Ctrl-C to quit.");
    println!("─────────────────────────────────");
    println!(" relay console  (Ctrl-C to quit)");
    println!("─────────────────────────────────");

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        print!("> ");
        use std::io::Write as _;
        let _ = std::io::stdout().flush();

        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                println!();
                info!(%channel_id, "shutdown signal received — closing console channel");
                break;
            }

            line = lines.next_line() => {
                let line = match line {
                    Err(e) => {
                        warn!("pty read error: {e}");
                        break;
                    }
                    Ok(None) => {
                        info!("pty stdin closed");
                        break;
                    }
                    Ok(Some(line)) => line,
                };

                let Some(input) = parse_line(&line) else { continue };
                debug!(?input, "pty received line");

                match input {
                    ConsoleInput::Start => println!("{}", state.welcome(CONSOLE_USER, CONSOLE_NAME)),
                    ConsoleInput::Reset => println!("{}", state.reset(CONSOLE_USER).await),
                    ConsoleInput::Text(text) => {
                        for chunk in state.send_message(&channel_id, CONSOLE_USER, text).await {
                            println!("{chunk}");
                        }
                    }
                }
            }
        }
    }

    state.report_event(CommsEvent::ChannelShutdown { channel_id });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_are_skipped() {
        assert_eq!(parse_line("   "), None);
    }

    #[test]
    fn commands_are_recognised() {
        assert_eq!(parse_line("/start"), Some(ConsoleInput::Start));
        assert_eq!(parse_line(" /reset \n"), Some(ConsoleInput::Reset));
    }

    #[test]
    fn text_is_trimmed() {
        assert_eq!(parse_line("  hello  "), Some(ConsoleInput::Text("hello")));
        assert_eq!(parse_line("/unknown"), Some(ConsoleInput::Text("/unknown")));
    }
}
