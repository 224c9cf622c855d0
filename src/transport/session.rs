use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::events::{parse_event, ControlMessage, ServerEvent};
use crate::error::VoiceError;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

enum Outbound {
    Frame(Vec<u8>),
    Control(String),
    Close,
}

/// One persistent duplex connection to the voice service.
///
/// Outbound audio frames and control messages share a single writer task so
/// frames keep capture order; inbound messages are decoded by a single reader
/// task so the state machine never sees events out of order. Reconnection is
/// a new `connect` call, never a silent retry.
pub struct TransportSession {
    outbound_tx: mpsc::Sender<Outbound>,
    state_rx: watch::Receiver<ConnectionState>,
    closing: Arc<AtomicBool>,
    outbound_task: Option<tokio::task::JoinHandle<()>>,
    inbound_task: Option<tokio::task::JoinHandle<()>>,
}

impl TransportSession {
    /// Establish the connection and spawn the reader/writer loops.
    ///
    /// Returns the session plus the typed event stream. A connection that
    /// cannot be established within `timeout` is failed, never left hanging.
    pub async fn connect(
        endpoint: &str,
        token: &str,
        timeout: Duration,
    ) -> Result<(Self, mpsc::Receiver<ServerEvent>), VoiceError> {
        let mut request = endpoint
            .into_client_request()
            .map_err(|e| VoiceError::Connection(format!("invalid endpoint '{endpoint}': {e}")))?;

        if !token.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| VoiceError::Connection(format!("invalid token: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        info!("Connecting to voice service at {}", endpoint);

        let (ws, _response) = tokio::time::timeout(timeout, connect_async(request))
            .await
            .map_err(|_| {
                VoiceError::Connection(format!(
                    "connection to {endpoint} timed out after {}s",
                    timeout.as_secs()
                ))
            })?
            .map_err(|e| VoiceError::Connection(format!("failed to connect: {e}")))?;

        info!("Connected to voice service");

        let (sink, stream) = ws.split();
        let (outbound_tx, outbound_rx) = mpsc::channel::<Outbound>(64);
        let (events_tx, events_rx) = mpsc::channel::<ServerEvent>(64);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connected);
        let closing = Arc::new(AtomicBool::new(false));

        let outbound_task = tokio::spawn(outbound_loop(sink, outbound_rx));
        let inbound_task = tokio::spawn(inbound_loop(
            stream,
            events_tx,
            outbound_tx.clone(),
            state_tx,
            Arc::clone(&closing),
        ));

        Ok((
            Self {
                outbound_tx,
                state_rx,
                closing,
                outbound_task: Some(outbound_task),
                inbound_task: Some(inbound_task),
            },
            events_rx,
        ))
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Observe connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Send one binary audio frame. Frames are written in submission order.
    pub async fn send_frame(&self, bytes: Vec<u8>) -> Result<(), VoiceError> {
        self.outbound_tx
            .send(Outbound::Frame(bytes))
            .await
            .map_err(|_| VoiceError::Connection("transport writer is gone".to_string()))
    }

    pub async fn send_control(&self, message: &ControlMessage) -> Result<(), VoiceError> {
        let text = serde_json::to_string(message)
            .map_err(|e| VoiceError::Protocol(format!("failed to encode control message: {e}")))?;
        self.outbound_tx
            .send(Outbound::Control(text))
            .await
            .map_err(|_| VoiceError::Connection("transport writer is gone".to_string()))
    }

    /// Close the connection gracefully. Safe to call more than once.
    pub async fn close(&mut self) {
        self.closing.store(true, Ordering::SeqCst);
        let _ = self.outbound_tx.send(Outbound::Close).await;

        if let Some(task) = self.outbound_task.take() {
            if task.await.is_err() {
                error!("Transport writer task panicked");
            }
        }

        if let Some(task) = self.inbound_task.take() {
            let abort = task.abort_handle();
            // The reader normally exits on the close acknowledgement; a
            // remote that never acks should not hold teardown hostage.
            if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
                warn!("Transport reader did not finish in time, aborting");
                abort.abort();
            }
        }
    }
}

async fn outbound_loop(mut sink: WsSink, mut rx: mpsc::Receiver<Outbound>) {
    while let Some(item) = rx.recv().await {
        let result = match item {
            Outbound::Frame(bytes) => sink.send(Message::Binary(bytes)).await,
            Outbound::Control(text) => sink.send(Message::Text(text)).await,
            Outbound::Close => {
                if let Err(e) = sink.send(Message::Close(None)).await {
                    debug!("Close frame not sent: {}", e);
                }
                break;
            }
        };

        if let Err(e) = result {
            error!("Transport write failed: {}", e);
            break;
        }
    }
}

async fn inbound_loop(
    mut stream: WsStream,
    events_tx: mpsc::Sender<ServerEvent>,
    outbound_tx: mpsc::Sender<Outbound>,
    state_tx: watch::Sender<ConnectionState>,
    closing: Arc<AtomicBool>,
) {
    let mut failure: Option<String> = None;

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                dispatch_text(&text, &events_tx, &outbound_tx).await;
            }
            // Some servers frame JSON events as binary messages.
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => dispatch_text(&text, &events_tx, &outbound_tx).await,
                Err(_) => warn!("Ignoring opaque binary message"),
            },
            // The websocket layer answers protocol pings itself.
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
            Ok(Message::Close(frame)) => {
                debug!("Close frame received: {:?}", frame);
                break;
            }
            Err(e) => {
                failure = Some(e.to_string());
                break;
            }
        }
    }

    if !closing.load(Ordering::SeqCst) {
        let detail = failure.unwrap_or_else(|| "remote closed the connection".to_string());
        warn!("Connection lost: {}", detail);
        if events_tx
            .send(ServerEvent::connection_lost(&detail))
            .await
            .is_err()
        {
            debug!("Event consumer gone, connection-lost event dropped");
        }
    }

    let _ = state_tx.send(ConnectionState::Disconnected);
}

async fn dispatch_text(
    text: &str,
    events_tx: &mpsc::Sender<ServerEvent>,
    outbound_tx: &mpsc::Sender<Outbound>,
) {
    match parse_event(text) {
        // Keepalive stays inside the transport; the state machine never
        // sees it.
        Ok(Some(ServerEvent::Ping { payload })) => {
            let pong = ControlMessage::Pong { payload };
            match serde_json::to_string(&pong) {
                Ok(text) => {
                    if outbound_tx.send(Outbound::Control(text)).await.is_err() {
                        warn!("Writer gone, pong dropped");
                    }
                }
                Err(e) => error!("Failed to encode pong: {}", e),
            }
        }
        Ok(Some(event)) => {
            if events_tx.send(event).await.is_err() {
                debug!("Event consumer gone, inbound event dropped");
            }
        }
        Ok(None) => debug!("Ignoring unknown event type"),
        Err(e) => warn!("Dropping malformed inbound message: {}", e),
    }
}
