//! Event-bridge client.
//!
//! A thin adapter over `tokio-tungstenite`: one background task owns the
//! socket, decodes text frames into [`Event`]s and reports every
//! [`ConnectionState`] transition. Reconnection follows [`ReconnectPolicy`].
//! Nothing outside this module computes connection state.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::{ProtocolError, SubProtocolError};
use tokio_tungstenite::tungstenite::http::{header::SEC_WEBSOCKET_PROTOCOL, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use lco_types::connection::ConnectionState;
use lco_types::event::Event;
use lco_types::settings::Settings;

/// Subprotocol announcing a consumer connection to the bridge. The auth
/// token, if any, follows as a second subprotocol entry.
pub const ROLE_PROTOCOL: &str = "laplace-event-bridge-role-client";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid bridge address {url}: {source}")]
    InvalidUrl {
        url: String,
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[error("token contains characters not allowed in a header")]
    InvalidToken,
    /// The server upgraded the connection without echoing the role
    /// subprotocol. The bridge must answer with `ROLE_PROTOCOL`.
    #[error("bridge did not accept the laplace-event-bridge-role-client subprotocol ({0})")]
    RoleNotAccepted(SubProtocolError),
    #[error("websocket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl ClientError {
    fn from_handshake(error: tokio_tungstenite::tungstenite::Error) -> Self {
        match error {
            tokio_tungstenite::tungstenite::Error::Protocol(
                ProtocolError::SecWebSocketSubProtocolError(reason),
            ) => Self::RoleNotAccepted(reason),
            other => Self::Socket(other),
        }
    }
}

/// What the client reports back to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    State(ConnectionState),
    Event(Event),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(30),
            multiplier: 1.5,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Wait before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exp);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    pub url: String,
    pub token: Option<String>,
    pub reconnect: ReconnectPolicy,
}

impl ClientOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        let token = Some(settings.server_password.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        Self {
            url: settings.bridge_url(),
            token,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Handle to a running client task.
pub struct BridgeClient {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl BridgeClient {
    /// Spawn the connection task. States and events arrive on `events`.
    pub fn connect(options: ClientOptions, events: mpsc::UnboundedSender<ClientEvent>) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(options, events, shutdown_rx));
        Self { shutdown, task }
    }

    /// Close the socket and wait for the task to report `disconnected`.
    pub async fn disconnect(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("Bridge client task ended abnormally: {e}");
        }
    }
}

enum ReadEnd {
    Shutdown,
    Closed,
    Failed(String),
}

async fn run(
    options: ClientOptions,
    events: mpsc::UnboundedSender<ClientEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let emit = |event: ClientEvent| events.send(event).is_ok();
    let mut attempt: u32 = 0;

    if !emit(ClientEvent::State(ConnectionState::Connecting)) {
        return;
    }

    loop {
        let connected = tokio::select! {
            _ = shutdown.changed() => break,
            res = open_socket(&options) => res,
        };

        match connected {
            Ok(mut ws) => {
                info!("Connected to event bridge at {}", options.url);
                attempt = 0;
                if !emit(ClientEvent::State(ConnectionState::Connected)) {
                    let _ = ws.close(None).await;
                    return;
                }
                match read_loop(&mut ws, &events, &mut shutdown).await {
                    ReadEnd::Shutdown => break,
                    ReadEnd::Closed => info!("Event bridge closed the connection"),
                    ReadEnd::Failed(e) => warn!("Event bridge connection lost: {e}"),
                }
            }
            Err(e) => warn!("Failed to connect to event bridge at {}: {e}", options.url),
        }

        if !options.reconnect.enabled {
            break;
        }
        attempt += 1;
        if let Some(max) = options.reconnect.max_attempts {
            if attempt > max {
                warn!("Giving up on event bridge after {max} reconnect attempts");
                break;
            }
        }
        if !emit(ClientEvent::State(ConnectionState::Reconnecting)) {
            return;
        }
        let delay = options.reconnect.delay_for(attempt);
        debug!("Reconnecting in {:.1}s (attempt {attempt})", delay.as_secs_f64());
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    let _ = events.send(ClientEvent::State(ConnectionState::Disconnected));
    debug!("Bridge client stopped");
}

async fn open_socket(options: &ClientOptions) -> Result<Socket, ClientError> {
    let mut request =
        options
            .url
            .as_str()
            .into_client_request()
            .map_err(|source| ClientError::InvalidUrl {
                url: options.url.clone(),
                source,
            })?;

    let protocols = match &options.token {
        Some(token) => format!("{ROLE_PROTOCOL}, {token}"),
        None => ROLE_PROTOCOL.to_string(),
    };
    let header = HeaderValue::from_str(&protocols).map_err(|_| ClientError::InvalidToken)?;
    request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, header);

    let (ws, _) = connect_async(request)
        .await
        .map_err(ClientError::from_handshake)?;
    Ok(ws)
}

async fn read_loop(
    ws: &mut Socket,
    events: &mpsc::UnboundedSender<ClientEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> ReadEnd {
    loop {
        let next = tokio::select! {
            _ = shutdown.changed() => {
                let _ = ws.close(None).await;
                return ReadEnd::Shutdown;
            }
            next = ws.next() => next,
        };

        match next {
            None => return ReadEnd::Closed,
            Some(Err(e)) => return ReadEnd::Failed(e.to_string()),
            Some(Ok(Message::Text(text))) => match classify(&text) {
                Inbound::Reply(reply) => {
                    if let Err(e) = ws.send(Message::Text(reply)).await {
                        return ReadEnd::Failed(e.to_string());
                    }
                }
                Inbound::Control => {}
                Inbound::Event(event) => {
                    if events.send(ClientEvent::Event(event)).is_err() {
                        let _ = ws.close(None).await;
                        return ReadEnd::Shutdown;
                    }
                }
            },
            Some(Ok(Message::Close(frame))) => {
                debug!("Close frame: {frame:?}");
                return ReadEnd::Closed;
            }
            // Ping/pong are answered by tungstenite itself.
            Some(Ok(_)) => {}
        }
    }
}

#[derive(Debug, PartialEq)]
enum Inbound {
    /// Housekeeping frame that needs an answer.
    Reply(String),
    /// Housekeeping frame, nothing to do.
    Control,
    Event(Event),
}

/// Sort a text frame into housekeeping or feed. Malformed frames and
/// unknown event types come back as `Control` so they are dropped.
fn classify(text: &str) -> Inbound {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            debug!("Dropping malformed frame ({e}): {text}");
            return Inbound::Control;
        }
    };

    match value.get("type").and_then(Value::as_str) {
        Some("ping") => {
            trace!("Bridge ping");
            let pong = serde_json::json!({
                "type": "pong",
                "timestamp": chrono::Utc::now().timestamp_millis(),
            });
            return Inbound::Reply(pong.to_string());
        }
        Some("established" | "heartbeat" | "pong") => {
            trace!("Bridge control frame: {text}");
            return Inbound::Control;
        }
        _ => {}
    }

    match serde_json::from_value::<Event>(value) {
        Ok(Event::Unknown) => {
            debug!("Dropping event of unknown type: {text}");
            Inbound::Control
        }
        Ok(event) => Inbound::Event(event),
        Err(e) => {
            debug!("Dropping malformed event ({e}): {text}");
            Inbound::Control
        }
    }
}
