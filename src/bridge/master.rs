//! # Master Bridge Client
//!
//! Sends commands to a slave and fetches its telemetry.
//!
//! [`BridgeLink`] is the transport seam; [`TcpBridgeLink`] is the real one.
//! Every request is bounded by a connect timeout and a response timeout and
//! fails with [`BridgeError::Unreachable`] instead of blocking. A broken
//! connection is dropped and re-established by the next request.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::protocol::{decode_line, encode_line, read_line, BridgeRequest, BridgeResponse};
use crate::config::BridgeConfig;
use crate::control::state::ControlMode;
use crate::crsf::protocol::CRSF_NUM_CHANNELS;
use crate::error::{BridgeError, Result};
use crate::telemetry::TelemetryReport;

/// Request/response transport to a slave
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BridgeLink: Send + Sync {
    /// Sends one request and waits for its response
    async fn request(&self, request: BridgeRequest) -> Result<BridgeResponse>;

    /// Where the slave lives, for log and error messages
    fn endpoint(&self) -> String;
}

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    line: String,
}

impl Connection {
    async fn exchange(&mut self, request: &[u8]) -> Result<BridgeResponse> {
        self.writer.write_all(request).await?;
        if read_line(&mut self.reader, &mut self.line).await? == 0 {
            return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "connection closed by slave").into());
        }
        decode_line(&self.line)
    }
}

/// [`BridgeLink`] over one persistent TCP connection
pub struct TcpBridgeLink {
    addr: String,
    connect_timeout: Duration,
    request_timeout: Duration,
    connection: Mutex<Option<Connection>>,
}

impl TcpBridgeLink {
    pub fn new(addr: impl Into<String>, connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout,
            request_timeout,
            connection: Mutex::new(None),
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(
            config.slave_addr.clone(),
            config.connect_timeout(),
            config.request_timeout(),
        )
    }

    fn unreachable(&self, reason: impl Into<String>) -> BridgeError {
        BridgeError::Unreachable {
            addr: self.addr.clone(),
            reason: reason.into(),
        }
    }

    async fn connect(&self) -> Result<Connection> {
        let stream = match timeout(self.connect_timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(self.unreachable(e.to_string())),
            Err(_) => {
                return Err(self.unreachable(format!("connect timed out after {:?}", self.connect_timeout)))
            }
        };
        stream.set_nodelay(true)?;
        info!("Connected to slave at {}", self.addr);

        let (reader, writer) = stream.into_split();
        Ok(Connection {
            reader: BufReader::new(reader),
            writer,
            line: String::new(),
        })
    }

    async fn exchange(&self, connection: &mut Connection, request: &[u8]) -> Result<BridgeResponse> {
        match timeout(self.request_timeout, connection.exchange(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(BridgeError::Io(e))) => Err(self.unreachable(e.to_string())),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(self.unreachable(format!("no response within {:?}", self.request_timeout))),
        }
    }
}

#[async_trait]
impl BridgeLink for TcpBridgeLink {
    async fn request(&self, request: BridgeRequest) -> Result<BridgeResponse> {
        let line = encode_line(&request)?;
        let mut slot = self.connection.lock().await;

        // A pooled connection may have been closed by a slave restart;
        // commands are absolute, so one retry on a fresh connection is safe.
        if let Some(mut connection) = slot.take() {
            match self.exchange(&mut connection, &line).await {
                Ok(response) => {
                    *slot = Some(connection);
                    return response.into_result();
                }
                Err(e) if e.is_unreachable() => debug!("Reconnecting after stale connection: {}", e),
                Err(e) => return Err(e),
            }
        }

        let mut connection = self.connect().await?;
        let response = self.exchange(&mut connection, &line).await?;
        *slot = Some(connection);
        response.into_result()
    }

    fn endpoint(&self) -> String {
        self.addr.clone()
    }
}

/// Outcome of a command request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Commands queued on the slave
    pub accepted: usize,
    /// Commands the slave rejected or could not queue
    pub skipped: usize,
}

/// Typed client for a slave node
#[derive(Clone)]
pub struct MasterClient {
    link: Arc<dyn BridgeLink>,
}

impl std::fmt::Debug for MasterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterClient")
            .field("endpoint", &self.link.endpoint())
            .finish()
    }
}

impl MasterClient {
    pub fn new(link: Arc<dyn BridgeLink>) -> Self {
        Self { link }
    }

    /// Client over TCP using the `[bridge]` settings
    pub fn connect_tcp(config: &BridgeConfig) -> Self {
        Self::new(Arc::new(TcpBridgeLink::from_config(config)))
    }

    pub fn endpoint(&self) -> String {
        self.link.endpoint()
    }

    async fn command(&self, request: BridgeRequest) -> Result<Ack> {
        match self.link.request(request).await? {
            BridgeResponse::Ack { accepted, skipped } => {
                if skipped > 0 {
                    warn!("Slave skipped {} of {} commands", skipped, accepted + skipped);
                }
                Ok(Ack { accepted, skipped })
            }
            BridgeResponse::Error { message } => Err(BridgeError::Remote(message)),
            other => Err(BridgeError::Remote(format!("unexpected response: {:?}", other))),
        }
    }

    pub async fn set_channel(&self, channel: usize, value: u16) -> Result<Ack> {
        self.command(BridgeRequest::SetChannel { channel, value }).await
    }

    pub async fn set_channels(&self, channels: Vec<(usize, u16)>) -> Result<Ack> {
        self.command(BridgeRequest::SetChannels { channels }).await
    }

    /// Sets all 16 channels, in channel order
    pub async fn set_all_channels(&self, values: [u16; CRSF_NUM_CHANNELS]) -> Result<Ack> {
        let channels = values.iter().enumerate().map(|(i, v)| (i + 1, *v)).collect();
        self.set_channels(channels).await
    }

    pub async fn set_mode(&self, mode: ControlMode) -> Result<Ack> {
        self.command(BridgeRequest::SetMode { mode }).await
    }

    pub async fn send_channels(&self) -> Result<Ack> {
        self.command(BridgeRequest::SendChannels).await
    }

    /// Forwards lines of the text command protocol
    pub async fn send_commands(&self, lines: Vec<String>) -> Result<Ack> {
        self.command(BridgeRequest::Commands { lines }).await
    }

    pub async fn telemetry(&self) -> Result<TelemetryReport> {
        match self.link.request(BridgeRequest::GetTelemetry).await? {
            BridgeResponse::Telemetry(report) => Ok(report),
            BridgeResponse::Error { message } => Err(BridgeError::Remote(message)),
            other => Err(BridgeError::Remote(format!("unexpected response: {:?}", other))),
        }
    }
}
