//! HTTP API for the master node.
//!
//! Provides:
//! - `POST /api/v1/channels` - set all channels (`{"channels":[...16 values]}`
//!   or `{"channels":{"1":1200,"3":1800}}`)
//! - `POST /api/command/setChannels` - alias of the above
//! - `POST /api/v1/channel` - set one channel
//! - `POST /api/v1/mode` - switch between manual and joystick
//! - `POST /api/v1/send` - request an immediate transmit
//! - `POST /api/v1/commands` - text command lines in the body
//! - `GET /api/v1/telemetry` - latest slave telemetry
//! - `GET /api/telemetry` - alias of the above
//! - `GET /health` - liveness
//!
//! Every command endpoint forwards to the slave and answers with the slave's
//! acknowledgement. An unreachable slave is reported as 503.

use std::collections::BTreeMap;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::master::{Ack, MasterClient};
use crate::control::state::{is_valid_channel_value, ControlMode};
use crate::crsf::protocol::CRSF_NUM_CHANNELS;
use crate::error::{BridgeError, Result};
use crate::telemetry::TelemetryReport;

/// Channel values as either a full list or a sparse channel map
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ChannelValues {
    List(Vec<u16>),
    /// Keys are channel numbers as JSON object keys
    Map(BTreeMap<String, u16>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelsBody {
    pub channels: ChannelValues,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelBody {
    pub channel: usize,
    pub value: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModeBody {
    pub mode: ControlMode,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    slave: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Handler failure, mapped onto an HTTP status
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Bridge(BridgeError),
}

impl From<BridgeError> for ApiError {
    fn from(e: BridgeError) -> Self {
        ApiError::Bridge(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Bridge(e) => {
                let status = match &e {
                    BridgeError::Unreachable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                    BridgeError::Remote(_) => StatusCode::BAD_GATEWAY,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                warn!("API request failed: {}", e);
                (status, e.to_string())
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

fn check(channel: usize, value: u16) -> std::result::Result<(usize, u16), ApiError> {
    if !(1..=CRSF_NUM_CHANNELS).contains(&channel) {
        return Err(ApiError::BadRequest(format!("channel {} out of range 1-16", channel)));
    }
    if !is_valid_channel_value(value) {
        return Err(ApiError::BadRequest(format!(
            "channel {} value {} out of range 1000-2000",
            channel, value
        )));
    }
    Ok((channel, value))
}

impl ChannelValues {
    /// Validated channel/value pairs, 1-based
    pub fn to_pairs(&self) -> std::result::Result<Vec<(usize, u16)>, ApiError> {
        match self {
            ChannelValues::List(values) => {
                if values.len() != CRSF_NUM_CHANNELS {
                    return Err(ApiError::BadRequest(format!(
                        "expected {} channel values, got {}",
                        CRSF_NUM_CHANNELS,
                        values.len()
                    )));
                }
                values.iter().enumerate().map(|(i, v)| check(i + 1, *v)).collect()
            }
            ChannelValues::Map(map) => {
                if map.is_empty() {
                    return Err(ApiError::BadRequest("no channels given".to_string()));
                }
                map.iter()
                    .map(|(key, v)| {
                        let channel = key
                            .trim()
                            .parse::<usize>()
                            .map_err(|_| ApiError::BadRequest(format!("invalid channel '{}'", key)))?;
                        check(channel, *v)
                    })
                    .collect()
            }
        }
    }
}

pub async fn set_channels(State(client): State<MasterClient>, Json(body): Json<ChannelsBody>) -> ApiResult<Ack> {
    let pairs = body.channels.to_pairs()?;
    Ok(Json(client.set_channels(pairs).await?))
}

pub async fn set_channel(State(client): State<MasterClient>, Json(body): Json<ChannelBody>) -> ApiResult<Ack> {
    let (channel, value) = check(body.channel, body.value)?;
    Ok(Json(client.set_channel(channel, value).await?))
}

pub async fn set_mode(State(client): State<MasterClient>, Json(body): Json<ModeBody>) -> ApiResult<Ack> {
    Ok(Json(client.set_mode(body.mode).await?))
}

pub async fn send_channels(State(client): State<MasterClient>) -> ApiResult<Ack> {
    Ok(Json(client.send_channels().await?))
}

pub async fn commands(State(client): State<MasterClient>, body: String) -> ApiResult<Ack> {
    let lines: Vec<String> = body.lines().map(str::to_string).collect();
    Ok(Json(client.send_commands(lines).await?))
}

pub async fn telemetry(State(client): State<MasterClient>) -> ApiResult<TelemetryReport> {
    Ok(Json(client.telemetry().await?))
}

async fn health(State(client): State<MasterClient>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        slave: client.endpoint(),
    })
}

pub fn router(client: MasterClient) -> Router {
    Router::new()
        .route("/api/v1/channels", post(set_channels))
        .route("/api/command/setChannels", post(set_channels))
        .route("/api/v1/channel", post(set_channel))
        .route("/api/v1/mode", post(set_mode))
        .route("/api/v1/send", post(send_channels))
        .route("/api/v1/commands", post(commands))
        .route("/api/v1/telemetry", get(telemetry))
        .route("/api/telemetry", get(telemetry))
        .route("/health", get(health))
        .with_state(client)
}

/// Serves the API until the task is dropped
pub async fn serve(listener: TcpListener, client: MasterClient) -> Result<()> {
    info!(
        "Master API listening on {} (slave {})",
        listener.local_addr()?,
        client.endpoint()
    );
    axum::serve(listener, router(client)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::master::MockBridgeLink;
    use crate::bridge::protocol::{BridgeRequest, BridgeResponse};
    use std::sync::Arc;

    fn client(mock: MockBridgeLink) -> MasterClient {
        MasterClient::new(Arc::new(mock))
    }

    fn acking() -> MockBridgeLink {
        let mut mock = MockBridgeLink::new();
        mock.expect_request()
            .returning(|_| Ok(BridgeResponse::Ack { accepted: 1, skipped: 0 }));
        mock
    }

    fn body(json: &str) -> ChannelsBody {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_channel_list_and_map_bodies() {
        let list = body("{\"channels\":[1000,1500,1500,1500,1500,1500,1500,1500,1500,1500,1500,1500,1500,1500,1500,2000]}");
        let pairs = list.channels.to_pairs().unwrap();
        assert_eq!(pairs.len(), 16);
        assert_eq!(pairs[0], (1, 1000));
        assert_eq!(pairs[15], (16, 2000));

        let map = body("{\"channels\":{\"1\":1200,\"3\":1800}}");
        assert_eq!(map.channels.to_pairs().unwrap(), vec![(1, 1200), (3, 1800)]);
    }

    #[test]
    fn test_invalid_channel_bodies_rejected() {
        assert!(body("{\"channels\":[1500,1500]}").channels.to_pairs().is_err());
        assert!(body("{\"channels\":{\"17\":1500}}").channels.to_pairs().is_err());
        assert!(body("{\"channels\":{\"2\":2500}}").channels.to_pairs().is_err());
        assert!(body("{\"channels\":{\"roll\":1500}}").channels.to_pairs().is_err());
        assert!(body("{\"channels\":{}}").channels.to_pairs().is_err());
    }

    #[tokio::test]
    async fn test_set_channels_forwards_pairs() {
        let mut mock = MockBridgeLink::new();
        mock.expect_request()
            .withf(|request| {
                matches!(request, BridgeRequest::SetChannels { channels } if channels == &vec![(1, 1200), (3, 1800)])
            })
            .times(1)
            .returning(|_| Ok(BridgeResponse::Ack { accepted: 1, skipped: 0 }));

        let Json(ack) = set_channels(State(client(mock)), Json(body("{\"channels\":{\"1\":1200,\"3\":1800}}")))
            .await
            .unwrap();
        assert_eq!(ack.accepted, 1);
    }

    #[tokio::test]
    async fn test_out_of_range_channel_is_400() {
        let response = set_channel(
            State(client(MockBridgeLink::new())),
            Json(ChannelBody { channel: 5, value: 999 }),
        )
        .await
        .unwrap_err()
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unreachable_slave_is_503() {
        let mut mock = MockBridgeLink::new();
        mock.expect_request().returning(|_| {
            Err(BridgeError::Unreachable {
                addr: "127.0.0.1:5760".into(),
                reason: "connection refused".into(),
            })
        });

        let response = send_channels(State(client(mock)))
            .await
            .unwrap_err()
            .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_commands_body_split_into_lines() {
        let mut mock = MockBridgeLink::new();
        mock.expect_request()
            .withf(|request| matches!(request, BridgeRequest::Commands { lines } if lines.len() == 2))
            .returning(|_| Ok(BridgeResponse::Ack { accepted: 2, skipped: 0 }));

        let Json(ack) = commands(State(client(mock)), "setChannel 5 1700\nsendChannels".to_string())
            .await
            .unwrap();
        assert_eq!(ack.accepted, 2);
    }

    #[tokio::test]
    async fn test_mode_and_telemetry() {
        let Json(ack) = set_mode(State(client(acking())), Json(ModeBody { mode: ControlMode::Joystick }))
            .await
            .unwrap();
        assert_eq!(ack.accepted, 1);

        let mut mock = MockBridgeLink::new();
        mock.expect_request().returning(|_| {
            Ok(BridgeResponse::Telemetry(TelemetryReport {
                timestamp_ms: 7,
                ..Default::default()
            }))
        });
        let Json(report) = telemetry(State(client(mock))).await.unwrap();
        assert_eq!(report.timestamp_ms, 7);
    }

    async fn http_get(addr: std::net::SocketAddr, path: &str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n", path);
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8_lossy(&response).into_owned()
    }

    #[tokio::test]
    async fn test_telemetry_served_on_both_paths() {
        let mut mock = MockBridgeLink::new();
        mock.expect_request()
            .withf(|request| matches!(request, BridgeRequest::GetTelemetry))
            .times(2)
            .returning(|_| {
                Ok(BridgeResponse::Telemetry(TelemetryReport {
                    timestamp_ms: 9,
                    ..Default::default()
                }))
            });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, client(mock)));

        for path in ["/api/telemetry", "/api/v1/telemetry"] {
            let response = http_get(addr, path).await;
            assert!(response.starts_with("HTTP/1.1 200"), "{}: {}", path, response);
            assert!(response.contains("\"timestamp_ms\":9"), "{}", response);
        }
    }
}
