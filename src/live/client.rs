//! Gemini Live WebSocket transport
//!
//! Manages the WebSocket connection lifecycle for one voice session.
//!
//! # Connection Flow
//!
//! 1. `connect()` - Establish WebSocket, send `setup`, wait for `setupComplete`
//! 2. `LiveSink::send_audio()` - Stream microphone chunks
//! 3. Events arrive on `LiveStream::events` (fed by a background task)
//! 4. `LiveSink::close()` - Clean shutdown
//!
//! There is no retry: a failed connect or a dropped connection ends the
//! session and the user starts a new one.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{client::IntoClientRequest, protocol::frame::coding::CloseCode, Message},
    MaybeTlsStream, WebSocketStream,
};

use super::capture::OutboundChunk;
use super::protocol::{ClientMessage, InboundEvent, ServerMessage, SetupConfig, LIVE_API_URL};
use super::StreamingError;

/// Connection timeout for initial WebSocket handshake
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for waiting for setupComplete
const SETUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the inbound event channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of an open live stream. Only the sender task holds it.
#[async_trait]
pub trait LiveSink: Send {
    async fn send_audio(&mut self, chunk: &OutboundChunk) -> Result<(), StreamingError>;

    /// Close the stream. Errors are logged, never returned.
    async fn close(&mut self);
}

/// An open live stream: the write half plus the typed inbound events
pub struct LiveStream {
    pub sink: Box<dyn LiveSink>,
    pub events: mpsc::Receiver<InboundEvent>,
}

/// Opens live streams. The session controller only sees this trait.
#[async_trait]
pub trait LiveTransport: Send + Sync {
    /// Open a stream and complete the setup handshake
    async fn connect(&self, setup: &SetupConfig) -> Result<LiveStream, StreamingError>;
}

/// Transport for the Gemini Live `BidiGenerateContent` endpoint
#[derive(Clone)]
pub struct GeminiLiveTransport {
    api_key: String,
    endpoint: String,
}

impl GeminiLiveTransport {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: LIVE_API_URL.to_string(),
        }
    }

    /// Override the endpoint (proxies, regional endpoints)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn open_socket(&self) -> Result<WsStream, StreamingError> {
        if self.api_key.is_empty() {
            return Err(StreamingError::MissingApiKey);
        }

        let request = format!("{}?key={}", self.endpoint, self.api_key)
            .into_client_request()
            .map_err(|e| StreamingError::ConnectionFailed(e.to_string()))?;

        log::info!("LiveClient: connecting to {}", self.endpoint);

        let (ws_stream, _response) = timeout(
            CONNECTION_TIMEOUT,
            connect_async_with_config(
                request, None, true, // disable_nagle (small frames, low latency)
            ),
        )
        .await
        .map_err(|_| StreamingError::ConnectionFailed("Connection timeout".to_string()))?
        .map_err(|e| StreamingError::ConnectionFailed(e.to_string()))?;

        Ok(ws_stream)
    }
}

#[async_trait]
impl LiveTransport for GeminiLiveTransport {
    async fn connect(&self, setup: &SetupConfig) -> Result<LiveStream, StreamingError> {
        let ws_stream = self.open_socket().await?;
        let (mut write, mut read) = ws_stream.split();

        log::info!("LiveClient: WebSocket connected, sending setup ({})", setup.model);
        send_message(&mut write, &ClientMessage::setup(setup.clone())).await?;

        timeout(SETUP_TIMEOUT, wait_for_setup(&mut read))
            .await
            .map_err(|_| StreamingError::ConnectionFailed("Setup timeout".to_string()))??;
        log::info!("LiveClient: setup complete");

        let (event_tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let receiver_task = tokio::spawn(receive_loop(read, event_tx));

        Ok(LiveStream {
            sink: Box::new(GeminiSink {
                write,
                receiver_task,
                closed: false,
            }),
            events,
        })
    }
}

async fn send_message(
    write: &mut SplitSink<WsStream, Message>,
    msg: &ClientMessage,
) -> Result<(), StreamingError> {
    let json =
        serde_json::to_string(msg).map_err(|e| StreamingError::ProtocolError(e.to_string()))?;

    write
        .send(Message::Text(json))
        .await
        .map_err(|e| StreamingError::SendFailed(e.to_string()))
}

async fn wait_for_setup(read: &mut SplitStream<WsStream>) -> Result<(), StreamingError> {
    while let Some(msg_result) = read.next().await {
        let msg = msg_result.map_err(|e| StreamingError::ProtocolError(e.to_string()))?;
        match msg {
            Message::Close(frame) => {
                let reason = frame
                    .map(|f| format!("{} ({})", f.reason, u16::from(f.code)))
                    .unwrap_or_else(|| "connection closed before setup completed".to_string());
                return Err(StreamingError::SetupRejected(reason));
            }
            other => {
                if let Some(server) = parse_payload(&other) {
                    if server.is_setup_complete() {
                        return Ok(());
                    }
                    log::debug!("LiveClient: ignoring message while waiting for setupComplete");
                }
            }
        }
    }
    Err(StreamingError::Disconnected("Stream ended".to_string()))
}

/// Forward typed events until the socket ends or the receiver goes away
async fn receive_loop(mut read: SplitStream<WsStream>, event_tx: mpsc::Sender<InboundEvent>) {
    while let Some(msg_result) = read.next().await {
        let frame = match msg_result {
            Ok(msg) => classify_frame(msg),
            Err(e) => {
                log::warn!("LiveClient: WebSocket error: {}", e);
                Frame::Terminal(InboundEvent::Error {
                    message: e.to_string(),
                })
            }
        };

        match frame {
            Frame::Events(events) => {
                for event in events {
                    if event_tx.send(event).await.is_err() {
                        log::debug!("LiveClient: event channel closed");
                        return;
                    }
                }
            }
            Frame::Terminal(event) => {
                let _ = event_tx.send(event).await;
                log::debug!("LiveClient: receiver task exiting");
                return;
            }
            Frame::Ignore => {}
        }
    }

    log::info!("LiveClient: stream ended");
    let _ = event_tx.send(InboundEvent::Closed { reason: None }).await;
}

/// Outcome of one WebSocket frame
#[derive(Debug, PartialEq)]
enum Frame {
    Events(Vec<InboundEvent>),
    /// Last event of the stream
    Terminal(InboundEvent),
    Ignore,
}

fn parse_payload(msg: &Message) -> Option<ServerMessage> {
    let parsed = match msg {
        Message::Text(text) => serde_json::from_str::<ServerMessage>(text),
        // Live API sends JSON in binary frames too
        Message::Binary(bytes) => serde_json::from_slice::<ServerMessage>(bytes),
        _ => return None,
    };
    match parsed {
        Ok(server) => Some(server),
        Err(e) => {
            log::warn!("LiveClient: failed to parse message: {}", e);
            None
        }
    }
}

fn classify_frame(msg: Message) -> Frame {
    match msg {
        Message::Close(Some(frame)) => match frame.code {
            CloseCode::Normal | CloseCode::Away => {
                log::info!("LiveClient: closed by server: {}", frame.reason);
                Frame::Terminal(InboundEvent::Closed {
                    reason: Some(frame.reason.to_string()).filter(|r| !r.is_empty()),
                })
            }
            code => Frame::Terminal(InboundEvent::Error {
                message: format!("closed with code {}: {}", u16::from(code), frame.reason),
            }),
        },
        Message::Close(None) => Frame::Terminal(InboundEvent::Closed { reason: None }),
        other => match parse_payload(&other) {
            Some(server) => {
                let events = server.into_events();
                if events.is_empty() {
                    Frame::Ignore
                } else {
                    Frame::Events(events)
                }
            }
            None => Frame::Ignore,
        },
    }
}

struct GeminiSink {
    write: SplitSink<WsStream, Message>,
    receiver_task: tokio::task::JoinHandle<()>,
    closed: bool,
}

#[async_trait]
impl LiveSink for GeminiSink {
    async fn send_audio(&mut self, chunk: &OutboundChunk) -> Result<(), StreamingError> {
        if self.closed {
            return Err(StreamingError::SendFailed("stream closed".to_string()));
        }
        send_message(
            &mut self.write,
            &ClientMessage::realtime_audio(chunk.blob.clone()),
        )
        .await
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        log::info!("LiveClient: disconnecting");

        self.receiver_task.abort();
        if let Err(e) = self.write.close().await {
            log::warn!("LiveClient: error closing WebSocket: {}", e);
        }
    }
}

impl Drop for GeminiSink {
    fn drop(&mut self) {
        // Ensure receiver task is aborted if dropped without close()
        self.receiver_task.abort();
    }
}
