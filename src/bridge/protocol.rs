//! # Bridge Wire Protocol
//!
//! Newline-delimited JSON exchanged between master and slave. Every request
//! line gets exactly one response line.
//!
//! ```text
//! -> {"op":"set_channels","channels":[[1,1200],[3,1800]]}
//! <- {"status":"ack","accepted":1,"skipped":0}
//! -> {"op":"get_telemetry"}
//! <- {"status":"telemetry","timestamp_ms":...,"link":{...},...}
//! ```

use serde::{Deserialize, Serialize};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::control::command::{parse_batch, RemoteCommand};
use crate::control::state::ControlMode;
use crate::error::{BridgeError, Result};
use crate::telemetry::TelemetryReport;

/// Longest accepted request or response line
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Request sent by the master
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BridgeRequest {
    SetChannel { channel: usize, value: u16 },
    SetChannels { channels: Vec<(usize, u16)> },
    SetMode { mode: ControlMode },
    SendChannels,
    /// Lines in the text command protocol
    Commands { lines: Vec<String> },
    GetTelemetry,
}

/// Response sent by the slave
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BridgeResponse {
    /// Commands were queued for the control loop (not yet applied)
    Ack { accepted: usize, skipped: usize },
    Telemetry(TelemetryReport),
    Error { message: String },
}

impl BridgeRequest {
    /// Commands carried by this request, plus the count of rejected lines
    ///
    /// Returns `None` for requests that are not commands.
    pub fn into_commands(self) -> Option<(Vec<RemoteCommand>, usize)> {
        let commands = match self {
            BridgeRequest::SetChannel { channel, value } => {
                vec![RemoteCommand::SetChannel { channel, value }]
            }
            BridgeRequest::SetChannels { channels } => vec![RemoteCommand::SetChannels(channels)],
            BridgeRequest::SetMode { mode } => vec![RemoteCommand::SetMode(mode)],
            BridgeRequest::SendChannels => vec![RemoteCommand::SendChannels],
            BridgeRequest::Commands { lines } => {
                let batch = parse_batch(lines.iter().map(String::as_str));
                return Some((batch.commands, batch.skipped));
            }
            BridgeRequest::GetTelemetry => return None,
        };
        Some((commands, 0))
    }
}

/// Serializes a message as one line, newline included
pub fn encode_line<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    Ok(line)
}

/// Parses one line (trailing whitespace allowed)
pub fn decode_line<'a, T: Deserialize<'a>>(line: &'a str) -> Result<T> {
    Ok(serde_json::from_str(line.trim_end())?)
}

/// Reads one line of at most [`MAX_LINE_LEN`] bytes into `buf`
///
/// Returns 0 at end of stream.
pub async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R, buf: &mut String) -> Result<usize> {
    buf.clear();
    let n = reader.take(MAX_LINE_LEN as u64).read_line(buf).await?;
    if n == MAX_LINE_LEN && !buf.ends_with('\n') {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "bridge line too long").into());
    }
    Ok(n)
}

impl BridgeResponse {
    /// Turns an error response into [`BridgeError::Remote`]
    pub fn into_result(self) -> Result<BridgeResponse> {
        match self {
            BridgeResponse::Error { message } => Err(BridgeError::Remote(message)),
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let line = encode_line(&BridgeRequest::SetChannel { channel: 5, value: 1700 }).unwrap();
        assert_eq!(
            std::str::from_utf8(&line).unwrap(),
            "{\"op\":\"set_channel\",\"channel\":5,\"value\":1700}\n"
        );

        let request: BridgeRequest = decode_line("{\"op\":\"set_mode\",\"mode\":\"joystick\"}\n").unwrap();
        assert_eq!(request, BridgeRequest::SetMode { mode: ControlMode::Joystick });

        let request: BridgeRequest = decode_line("{\"op\":\"send_channels\"}").unwrap();
        assert_eq!(request, BridgeRequest::SendChannels);
    }

    #[test]
    fn test_unknown_op_rejected() {
        assert!(decode_line::<BridgeRequest>("{\"op\":\"arm\"}").is_err());
        assert!(decode_line::<BridgeRequest>("not json").is_err());
    }

    #[test]
    fn test_ack_wire_format() {
        let line = encode_line(&BridgeResponse::Ack { accepted: 2, skipped: 1 }).unwrap();
        assert_eq!(
            std::str::from_utf8(&line).unwrap(),
            "{\"status\":\"ack\",\"accepted\":2,\"skipped\":1}\n"
        );
    }

    #[test]
    fn test_command_batch_request_skips_bad_lines() {
        let request = BridgeRequest::Commands {
            lines: vec![
                "setChannel 5 1700".into(),
                "setChannel 5 9000".into(),
                "# comment".into(),
                "sendChannels".into(),
            ],
        };
        let (commands, skipped) = request.into_commands().unwrap();
        assert_eq!(commands.len(), 2);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn test_telemetry_request_is_not_a_command() {
        assert!(BridgeRequest::GetTelemetry.into_commands().is_none());
    }

    #[tokio::test]
    async fn test_read_line_splits_and_limits() {
        let data = b"{\"op\":\"send_channels\"}\n{\"op\":\"get_telemetry\"}\n";
        let mut reader = tokio::io::BufReader::new(&data[..]);
        let mut buf = String::new();

        read_line(&mut reader, &mut buf).await.unwrap();
        assert_eq!(decode_line::<BridgeRequest>(&buf).unwrap(), BridgeRequest::SendChannels);
        read_line(&mut reader, &mut buf).await.unwrap();
        assert_eq!(decode_line::<BridgeRequest>(&buf).unwrap(), BridgeRequest::GetTelemetry);
        assert_eq!(read_line(&mut reader, &mut buf).await.unwrap(), 0);

        let long = vec![b'x'; MAX_LINE_LEN + 10];
        let mut reader = tokio::io::BufReader::new(&long[..]);
        assert!(read_line(&mut reader, &mut buf).await.is_err());
    }

    #[test]
    fn test_error_response_becomes_remote_error() {
        let err = BridgeResponse::Error { message: "bad".into() }
            .into_result()
            .unwrap_err();
        assert!(matches!(err, BridgeError::Remote(m) if m == "bad"));
    }
}
