//! # Slave Bridge Server
//!
//! Accepts master connections and feeds their commands to the control loop.
//!
//! Each connection runs on its own task. Commands are acknowledged as soon
//! as they are queued; the control loop applies them on its next iteration.
//! Telemetry requests are answered from the latest published report.

use std::net::SocketAddr;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc::error::TrySendError, watch};
use tracing::{debug, info, warn};

use super::protocol::{decode_line, encode_line, read_line, BridgeRequest, BridgeResponse};
use crate::control::runner::CommandSender;
use crate::error::Result;
use crate::telemetry::TelemetryReport;

/// Everything a connection needs to serve requests
#[derive(Debug, Clone)]
pub struct SlaveHandle {
    commands: CommandSender,
    telemetry: watch::Receiver<TelemetryReport>,
}

impl SlaveHandle {
    pub fn new(commands: CommandSender, telemetry: watch::Receiver<TelemetryReport>) -> Self {
        Self { commands, telemetry }
    }

    /// Produces the response for one request
    pub fn handle(&self, request: BridgeRequest) -> BridgeResponse {
        let Some((commands, mut skipped)) = request.into_commands() else {
            return BridgeResponse::Telemetry(self.telemetry.borrow().clone());
        };

        let mut accepted = 0;
        for command in commands {
            match self.commands.try_send(command) {
                Ok(()) => accepted += 1,
                Err(TrySendError::Full(command)) => {
                    warn!("Command queue full, dropping: {}", command);
                    skipped += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    return BridgeResponse::Error {
                        message: "control loop is not running".to_string(),
                    };
                }
            }
        }

        BridgeResponse::Ack { accepted, skipped }
    }

    /// Produces the response for one raw request line
    pub fn handle_line(&self, line: &str) -> BridgeResponse {
        match decode_line::<BridgeRequest>(line) {
            Ok(request) => {
                debug!("Bridge request: {:?}", request);
                self.handle(request)
            }
            Err(e) => {
                warn!("Malformed bridge request: {}", e);
                BridgeResponse::Error {
                    message: format!("malformed request: {}", e),
                }
            }
        }
    }
}

/// TCP server for master connections
pub struct SlaveServer {
    listener: TcpListener,
    handle: SlaveHandle,
}

impl SlaveServer {
    pub async fn bind(addr: &str, handle: SlaveHandle) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, handle })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until the task is dropped
    pub async fn run(self) -> Result<()> {
        info!("Bridge listening on {}", self.local_addr()?);

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept bridge connection: {}", e);
                    continue;
                }
            };

            let handle = self.handle.clone();
            tokio::spawn(async move {
                info!("Master connected from {}", peer);
                match serve_connection(stream, handle).await {
                    Ok(()) => info!("Master {} disconnected", peer),
                    Err(e) => warn!("Master {} connection closed: {}", peer, e),
                }
            });
        }
    }
}

async fn serve_connection(stream: TcpStream, handle: SlaveHandle) -> Result<()> {
    stream.set_nodelay(true)?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        if read_line(&mut reader, &mut line).await? == 0 {
            return Ok(());
        }
        if line.trim().is_empty() {
            continue;
        }

        let response = handle.handle_line(&line);
        writer.write_all(&encode_line(&response)?).await?;
    }
}
