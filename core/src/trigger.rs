//! One-shot triggers shared between tasks.
//!
//! A `Trigger` is the cooperative cancellation/interrupt flag used across the
//! station: generation loops poll `is_fired()` between units of work, while
//! playback and call handling await `fired()` inside `select!`.

use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Clone, Debug)]
pub struct Trigger {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Trigger {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Fire the trigger. Idempotent.
    pub fn fire(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_fired(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the trigger has fired (immediately if it already has).
    pub async fn fired(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as any clone of this trigger, so the wait
        // can only end by observing `true`.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

impl Default for Trigger {
    fn default() -> Self {
        Self::new()
    }
}

/// Console commands understood by the call monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Call,
    End,
}

pub fn parse_console_command(line: &str) -> Option<ConsoleCommand> {
    match line.trim().to_lowercase().as_str() {
        "call" => Some(ConsoleCommand::Call),
        "end" | "hangup" | "bye" => Some(ConsoleCommand::End),
        _ => None,
    }
}

/// Watch a line-oriented reader (stdin in the binaries) and fire `call` / `end`.
///
/// The task exits after the end command, or when the reader is exhausted.
pub fn spawn_console_monitor<R>(reader: R, call: Trigger, end: Trigger) -> JoinHandle<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = reader.lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match parse_console_command(&line) {
                Some(ConsoleCommand::Call) => {
                    info!(target = "console", "Interrupt triggered: incoming call");
                    call.fire();
                }
                Some(ConsoleCommand::End) => {
                    info!(target = "console", "End of call requested");
                    end.fire();
                    break;
                }
                None => debug!(target = "console", input = %line, "Ignoring console input"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_case_insensitively() {
        assert_eq!(parse_console_command(" CALL "), Some(ConsoleCommand::Call));
        assert_eq!(parse_console_command("Hangup"), Some(ConsoleCommand::End));
        assert_eq!(parse_console_command("bye"), Some(ConsoleCommand::End));
        assert_eq!(parse_console_command("hello"), None);
    }

    #[tokio::test]
    async fn fired_resolves_after_fire() {
        let t = Trigger::new();
        assert!(!t.is_fired());
        let waiter = {
            let t = t.clone();
            tokio::spawn(async move { t.fired().await })
        };
        t.fire();
        waiter.await.unwrap();
        assert!(t.is_fired());
        // Already fired: resolves immediately
        t.fired().await;
    }
}
