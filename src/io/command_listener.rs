//! TCP listener for remote cart/search commands
//!
//! Line protocol, one command per line:
//!   ADD <item> | REMOVE <item> | START | STOP | STATUS
//! Verbs are case-insensitive; unknown lines are logged and ignored.
//! Parsed commands are forwarded to the main loop via try_send so a
//! flooding peer cannot stall the controller.

use crate::infra::metrics::Metrics;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Command from the UI boundary (TCP peer or local front end)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiCommand {
    Add(String),
    Remove(String),
    Start,
    Stop,
    Status,
}

/// Parse one protocol line; None for unknown/malformed input
pub fn parse_command(line: &str) -> Option<UiCommand> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    match verb.to_ascii_uppercase().as_str() {
        "ADD" if !rest.is_empty() => Some(UiCommand::Add(rest.to_string())),
        "REMOVE" if !rest.is_empty() => Some(UiCommand::Remove(rest.to_string())),
        "START" if rest.is_empty() => Some(UiCommand::Start),
        "STOP" if rest.is_empty() => Some(UiCommand::Stop),
        "STATUS" if rest.is_empty() => Some(UiCommand::Status),
        _ => None,
    }
}

/// Command listener configuration
#[derive(Debug, Clone)]
pub struct CommandListenerConfig {
    pub port: u16,
    pub enabled: bool,
}

impl Default for CommandListenerConfig {
    fn default() -> Self {
        Self { port: 65432, enabled: true }
    }
}

/// Start the command TCP listener
pub async fn start_command_listener(
    config: CommandListenerConfig,
    cmd_tx: mpsc::Sender<UiCommand>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if !config.enabled {
        info!("command_listener_disabled");
        return Ok(());
    }

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;

    info!(port = %config.port, "command_listener_started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("command_listener_shutdown");
                    return Ok(());
                }
            }
            result = listener.accept() => {
                match result {
                    Ok((socket, addr)) => {
                        let tx = cmd_tx.clone();
                        let m = metrics.clone();
                        tokio::spawn(async move {
                            handle_connection(socket, addr, tx, m).await;
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "command_listener_accept_failed");
                    }
                }
            }
        }
    }
}

async fn handle_connection(
    socket: tokio::net::TcpStream,
    addr: SocketAddr,
    cmd_tx: mpsc::Sender<UiCommand>,
    metrics: Arc<Metrics>,
) {
    let peer_ip = addr.ip().to_string();
    debug!(ip = %peer_ip, "command_connection_accepted");

    let reader = BufReader::new(socket);
    let mut lines = reader.lines();

    // Rate-limit drop warnings to 1 per second
    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);

    while let Ok(Some(line)) = lines.next_line().await {
        let Some(command) = parse_command(&line) else {
            if !line.trim().is_empty() {
                warn!(peer_ip = %peer_ip, line = %line.trim(), "command_unknown");
            }
            continue;
        };

        info!(peer_ip = %peer_ip, command = ?command, "command_received");

        match cmd_tx.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                metrics.record_command_dropped();
                if last_drop_warn.elapsed() > Duration::from_secs(1) {
                    warn!(peer_ip = %peer_ip, "command_dropped: channel full");
                    last_drop_warn = Instant::now();
                }
            }
            Err(TrySendError::Closed(_)) => {
                warn!(peer_ip = %peer_ip, "command_channel_closed");
                break;
            }
        }
    }

    debug!(peer_ip = %peer_ip, "command_connection_closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cart_commands() {
        assert_eq!(parse_command("ADD Coke"), Some(UiCommand::Add("Coke".to_string())));
        assert_eq!(parse_command("remove Pepsi"), Some(UiCommand::Remove("Pepsi".to_string())));
        assert_eq!(parse_command("  ADD   Mountain Dew  "), Some(UiCommand::Add("Mountain Dew".to_string())));
    }

    #[test]
    fn test_parse_control_commands() {
        assert_eq!(parse_command("START"), Some(UiCommand::Start));
        assert_eq!(parse_command("stop"), Some(UiCommand::Stop));
        assert_eq!(parse_command("Status"), Some(UiCommand::Status));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("ADD"), None);
        assert_eq!(parse_command("REMOVE   "), None);
        assert_eq!(parse_command("START now"), None);
        assert_eq!(parse_command("LAUNCH"), None);
    }
}
