//! Real-time detection over WebSocket with backpressure support.
//!
//! Each connection owns a [`StreamSession`]. Messages are handled strictly in
//! arrival order and every text message gets exactly one reply.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use herd_media::{decode_base64_frame, Detector, MediaError};
use herd_models::{StreamErrorKind, StreamMessage, StreamRequest};
use serde_json::Number;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::state::AppState;

/// Global counter for active WebSocket connections.
static ACTIVE_WS_CONNECTIONS: AtomicI64 = AtomicI64::new(0);

/// Stream connections currently open on this process.
pub fn active_connections() -> i64 {
    ACTIVE_WS_CONNECTIONS.load(Ordering::SeqCst)
}

/// Configuration for WebSocket backpressure.
const WS_SEND_BUFFER_SIZE: usize = 32;

/// Log a progress line every this many processed frames.
const PROGRESS_LOG_EVERY: u64 = 30;

/// Lifecycle of a stream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, nothing received yet
    Open,
    /// A frame is being decoded or detected
    Processing,
    /// Waiting for the next message
    Idle,
    Closed,
}

/// Per-connection state of the detection stream.
pub struct StreamSession {
    detector: Arc<dyn Detector>,
    frames_processed: u64,
    last_error: Option<StreamErrorKind>,
    state: SessionState,
}

impl StreamSession {
    pub fn new(detector: Arc<dyn Detector>) -> Self {
        Self {
            detector,
            frames_processed: 0,
            last_error: None,
            state: SessionState::Open,
        }
    }

    /// Frames that produced a detection reply.
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn last_error(&self) -> Option<StreamErrorKind> {
        self.last_error
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Handle one text message and produce its reply.
    pub async fn handle_text(&mut self, text: &str) -> StreamMessage {
        match StreamRequest::parse(text) {
            Ok(StreamRequest::Ping) => {
                self.state = SessionState::Idle;
                StreamMessage::Pong
            }
            Ok(StreamRequest::Frame { data, timestamp }) => self.handle_frame(data, timestamp).await,
            Err(e) => {
                debug!("Rejected stream message: {}", e);
                self.fail(StreamErrorKind::InvalidMessage, "invalid message format")
            }
        }
    }

    /// Binary messages are not part of the protocol.
    pub fn handle_binary(&mut self) -> StreamMessage {
        self.fail(StreamErrorKind::InvalidMessage, "invalid message format")
    }

    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    async fn handle_frame(&mut self, data: String, timestamp: Number) -> StreamMessage {
        self.state = SessionState::Processing;

        // Base64 and image decoding are CPU-bound
        let decoded = tokio::task::spawn_blocking(move || decode_base64_frame(&data)).await;
        let frame = match decoded {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) => return self.fail(StreamErrorKind::UndecodableFrame, media_message(&e)),
            Err(e) => {
                warn!("Frame decode task failed: {}", e);
                return self.fail(StreamErrorKind::UndecodableFrame, "Failed to decode frame");
            }
        };

        let result = self.detector.detect(&frame).await;
        drop(frame);

        match result {
            Ok(detections) => {
                self.state = SessionState::Idle;
                self.frames_processed += 1;
                metrics::record_stream_frame(detections.len());

                if self.frames_processed % PROGRESS_LOG_EVERY == 0 {
                    info!(
                        frames = self.frames_processed,
                        cows = detections.len(),
                        "Stream session progress"
                    );
                }

                StreamMessage::detection(self.frames_processed, detections, timestamp)
            }
            Err(e) => self.fail(
                StreamErrorKind::EngineFailure,
                format!("processing error: {}", media_message(&e)),
            ),
        }
    }

    fn fail(&mut self, kind: StreamErrorKind, message: impl Into<String>) -> StreamMessage {
        self.state = SessionState::Idle;
        self.last_error = Some(kind);
        metrics::record_stream_error(kind.as_str());
        StreamMessage::error(message)
    }
}

fn media_message(error: &MediaError) -> String {
    match error {
        MediaError::UnreadableMedia(msg) | MediaError::EngineFailure(msg) => msg.clone(),
        other => other.to_string(),
    }
}

/// Send a stream message with backpressure handling.
async fn send_stream_message(tx: &mpsc::Sender<Message>, msg: &StreamMessage) -> bool {
    let json = match serde_json::to_string(msg) {
        Ok(j) => j,
        Err(_) => return false,
    };
    match tx.try_send(Message::Text(json)) {
        Ok(_) => true,
        Err(mpsc::error::TrySendError::Full(msg)) => {
            debug!("WebSocket send buffer full, applying backpressure");
            tx.send(msg).await.is_ok()
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// Live video detection endpoint.
pub async fn ws_stream_video(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    metrics::record_ws_connection("stream_video");

    ws.on_upgrade(|socket| async move {
        let count = ACTIVE_WS_CONNECTIONS.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_ws_active_connections(count);

        // Decrement on disconnect, including when the task is aborted
        let _guard = scopeguard::guard((), |_| {
            let count = ACTIVE_WS_CONNECTIONS.fetch_sub(1, Ordering::SeqCst) - 1;
            metrics::set_ws_active_connections(count);
        });

        handle_stream_socket(socket, Arc::clone(&state.detector)).await;
    })
}

/// Handle a stream WebSocket connection.
async fn handle_stream_socket(socket: WebSocket, detector: Arc<dyn Detector>) {
    let (ws_sender, mut receiver) = socket.split();

    // Bounded channel so a slow client applies backpressure to detection
    let (tx, mut rx) = mpsc::channel::<Message>(WS_SEND_BUFFER_SIZE);

    let send_task = tokio::spawn(async move {
        let mut ws_sender = ws_sender;
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let mut session = StreamSession::new(detector);
    info!("Stream session opened");

    while let Some(incoming) = receiver.next().await {
        let reply = match incoming {
            Ok(Message::Text(text)) => session.handle_text(&text).await,
            Ok(Message::Binary(_)) => session.handle_binary(),
            // Pings are answered by axum
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!("Stream socket error: {}", e);
                break;
            }
        };

        if !send_stream_message(&tx, &reply).await {
            debug!("Stream client went away before reply");
            break;
        }
    }

    session.close();
    drop(tx);
    let _ = send_task.await;

    info!(
        frames = session.frames_processed(),
        last_error = session.last_error().map(|k| k.as_str()),
        "Stream session closed"
    );
}
