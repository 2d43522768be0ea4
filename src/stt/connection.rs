//! WebSocket connection to the streaming transcription service.
//!
//! The connection bridges two execution domains: audio frames are pushed
//! from the capture thread without blocking, while decoded transcript
//! events are delivered to a blocking listener loop on whichever thread
//! calls [`Connection::start_listening`]. Two runtime tasks (writer and
//! reader) drive the socket itself.

use crate::error::{Result, VoxloopError};
use crate::stt::events::{ConnectionEvent, TranscriptEvent};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite};

/// Connection parameters consumed by the transcription service.
#[derive(Debug, Clone)]
pub struct ListenConfig {
    /// Model identifier, e.g. "flux-general-en".
    pub model: String,
    /// Audio encoding of outbound frames, e.g. "linear16".
    pub encoding: String,
    /// Sample rate of outbound frames in Hz.
    pub sample_rate: u32,
    /// End-of-turn detection confidence threshold.
    pub eot_threshold: f32,
    /// End-of-turn silence timeout in milliseconds.
    pub eot_timeout_ms: u32,
}

/// Render the listen URL with query parameters.
fn listen_url(base_url: &str, config: &ListenConfig) -> String {
    format!(
        "{}?model={}&encoding={}&sample_rate={}&eot_threshold={}&eot_timeout_ms={}",
        base_url,
        config.model,
        config.encoding,
        config.sample_rate,
        config.eot_threshold,
        config.eot_timeout_ms
    )
}

/// Build the WebSocket upgrade request with authentication.
fn build_ws_request(url: &str, api_key: &str) -> Result<tungstenite::http::Request<()>> {
    let uri: tungstenite::http::Uri =
        url.parse()
            .map_err(|e| VoxloopError::TranscriptionConnect {
                message: format!("invalid listen URL {url}: {e}"),
            })?;
    let host = uri
        .host()
        .ok_or_else(|| VoxloopError::TranscriptionConnect {
            message: format!("listen URL has no host: {url}"),
        })?
        .to_string();

    tungstenite::http::Request::builder()
        .uri(uri)
        .header("Host", host)
        .header("Connection", "Upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header(
            "Sec-WebSocket-Key",
            tungstenite::handshake::client::generate_key(),
        )
        .header("Authorization", format!("Token {api_key}"))
        .body(())
        .map_err(|e| VoxloopError::TranscriptionConnect {
            message: format!("failed to build request: {e}"),
        })
}

/// Receives connection lifecycle events from the blocking listener loop.
///
/// All methods default to no-ops except `on_message`, which every handler
/// must consume.
pub trait ConnectionHandler {
    fn on_open(&mut self) {}
    fn on_message(&mut self, event: TranscriptEvent);
    fn on_error(&mut self, _message: &str) {}
    fn on_close(&mut self) {}
}

/// Clone-able handle for pushing audio frames from the capture thread.
///
/// `send` never blocks; frames pushed after the connection ended are
/// dropped silently (reconnection is out of scope).
#[derive(Clone)]
pub struct AudioSender {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl AudioSender {
    pub(crate) fn from_raw(tx: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self { tx }
    }

    /// Queue one PCM frame for the connection's writer task.
    pub fn send(&self, frame: Vec<u8>) {
        let _ = self.tx.send(frame);
    }
}

/// An open transcription connection.
pub struct Connection {
    audio: AudioSender,
    events: crossbeam_channel::Receiver<ConnectionEvent>,
}

/// Open a connection and spawn its writer/reader tasks on the runtime.
///
/// The returned [`Connection`] is ready to accept audio immediately; the
/// `Opened` event is the handler-visible readiness signal.
pub async fn connect(base_url: &str, api_key: &str, config: &ListenConfig) -> Result<Connection> {
    let url = listen_url(base_url, config);
    let request = build_ws_request(&url, api_key)?;

    let (ws, _) = connect_async(request)
        .await
        .map_err(|e| VoxloopError::TranscriptionConnect {
            message: e.to_string(),
        })?;
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (audio_tx, mut audio_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let (event_tx, event_rx) = crossbeam_channel::unbounded();

    let _ = event_tx.send(ConnectionEvent::Opened);

    // Writer: drain queued audio frames into binary messages.
    tokio::spawn(async move {
        while let Some(frame) = audio_rx.recv().await {
            if ws_tx
                .send(tungstenite::Message::Binary(frame.into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    // Reader: decode text frames into transcript events. The listener loop
    // ends when this task drops the event sender.
    tokio::spawn(async move {
        while let Some(message) = ws_rx.next().await {
            match message {
                Ok(tungstenite::Message::Text(text)) => {
                    match serde_json::from_str::<TranscriptEvent>(text.as_str()) {
                        Ok(event) => {
                            if event_tx.send(ConnectionEvent::Message(event)).is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            let _ = event_tx
                                .send(ConnectionEvent::Error(format!("undecodable message: {e}")));
                        }
                    }
                }
                Ok(tungstenite::Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    let _ = event_tx.send(ConnectionEvent::Error(e.to_string()));
                    break;
                }
            }
        }
        let _ = event_tx.send(ConnectionEvent::Closed);
    });

    Ok(Connection {
        audio: AudioSender::from_raw(audio_tx),
        events: event_rx,
    })
}

impl Connection {
    /// Handle for the capture thread to push audio frames.
    pub fn audio_sender(&self) -> AudioSender {
        self.audio.clone()
    }

    /// Block the calling thread, delivering events to `handler` until the
    /// connection ends.
    ///
    /// Error and close events are informational; the loop only returns when
    /// the reader task hangs up.
    pub fn start_listening(self, handler: &mut dyn ConnectionHandler) {
        for event in self.events.iter() {
            match event {
                ConnectionEvent::Opened => handler.on_open(),
                ConnectionEvent::Message(event) => handler.on_message(event),
                ConnectionEvent::Error(message) => handler.on_error(&message),
                ConnectionEvent::Closed => handler.on_close(),
            }
        }
    }
}
