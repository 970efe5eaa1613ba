//! Realtime voice session protocol (OpenAI Realtime over WebSocket).
//!
//! Outbound: `session.update` once on connect, then `input_audio_buffer.append`
//! per microphone frame. Inbound: audio and text deltas, `response.text.done`
//! and `error`. Anything else, including non-JSON frames, is ignored.

use crate::pcm::pcm16_to_le_bytes;
use crate::prompts;
use crate::trigger::Trigger;
use crate::{OnAirError, Result};
use base64::Engine as _;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde_json::{json, Value};
use std::fmt::Display;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

pub type RealtimeSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Clone, Debug)]
pub struct RealtimeConfig {
    pub url: String,
    pub model: String,
    pub voice: String,
    pub api_key: Option<String>,
    pub instructions: String,
    pub temperature: f64,
    pub vad_threshold: f64,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        let context = std::env::var("CUSTOM_CONTEXT")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "No specific context provided.".to_string());
        Self {
            url: std::env::var("ONAIR_REALTIME_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "wss://api.openai.com/v1/realtime".to_string()),
            model: std::env::var("ONAIR_REALTIME_MODEL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "gpt-4o-realtime-preview-2024-10-01".to_string()),
            voice: "sage".to_string(),
            api_key: std::env::var("OPENAI_API_KEY").ok().filter(|s| !s.is_empty()),
            instructions: prompts::realtime_instructions(&context),
            temperature: 0.4,
            vad_threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 1000,
        }
    }
}

impl RealtimeConfig {
    pub fn endpoint(&self) -> String {
        format!("{}?model={}", self.url, self.model)
    }

    pub fn session_update(&self) -> Value {
        json!({
            "type": "session.update",
            "session": {
                "modalities": ["text", "audio"],
                "instructions": self.instructions,
                "voice": self.voice,
                "input_audio_format": "pcm16",
                "output_audio_format": "pcm16",
                "turn_detection": {
                    "type": "server_vad",
                    "threshold": self.vad_threshold,
                    "prefix_padding_ms": self.prefix_padding_ms,
                    "silence_duration_ms": self.silence_duration_ms,
                    "create_response": true
                },
                "temperature": self.temperature
            }
        })
    }
}

/// `input_audio_buffer.append` carrying one frame of PCM16 mono
pub fn input_audio_append(samples: &[i16]) -> String {
    input_audio_append_b64(&base64::engine::general_purpose::STANDARD.encode(pcm16_to_le_bytes(samples)))
}

/// Same as `input_audio_append` for audio that is already base64 encoded
pub fn input_audio_append_b64(audio: &str) -> String {
    json!({"type": "input_audio_buffer.append", "audio": audio}).to_string()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerEvent {
    /// Decoded PCM16 little-endian bytes
    AudioDelta(Vec<u8>),
    TextDelta(String),
    TextDone,
    TranscriptDelta(String),
    Error(String),
}

/// Parse one inbound frame; `None` for anything the session does not act on
pub fn parse_server_event(text: &str) -> Option<ServerEvent> {
    let v: Value = serde_json::from_str(text).ok()?;
    let delta = || v.get("delta").and_then(|d| d.as_str()).map(str::to_string);
    match v.get("type")?.as_str()? {
        "response.audio.delta" => base64::engine::general_purpose::STANDARD
            .decode(delta()?)
            .ok()
            .map(ServerEvent::AudioDelta),
        "response.text.delta" => delta().map(ServerEvent::TextDelta),
        "response.text.done" => Some(ServerEvent::TextDone),
        "response.audio_transcript.delta" => delta().map(ServerEvent::TranscriptDelta),
        "error" => Some(ServerEvent::Error(
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| v.to_string()),
        )),
        other => {
            debug!(target = "realtime", event = %other, "Ignoring server event");
            None
        }
    }
}

/// Open the WebSocket and send `session.update`
pub async fn connect(cfg: &RealtimeConfig) -> Result<RealtimeSocket> {
    let key = cfg
        .api_key
        .as_deref()
        .ok_or_else(|| OnAirError::RealtimeError("OPENAI_API_KEY is not set".into()))?;
    let mut req = cfg
        .endpoint()
        .into_client_request()
        .map_err(|e| OnAirError::RealtimeError(format!("Bad endpoint: {e}")))?;
    let auth = HeaderValue::from_str(&format!("Bearer {key}"))
        .map_err(|e| OnAirError::RealtimeError(format!("Bad API key header: {e}")))?;
    let headers = req.headers_mut();
    headers.insert("Authorization", auth);
    headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

    let (mut ws, _resp) = tokio_tungstenite::connect_async(req)
        .await
        .map_err(|e| OnAirError::RealtimeError(format!("Connect failed: {e}")))?;
    info!(target = "realtime", model = %cfg.model, "Connected to realtime service");

    ws.send(Message::Text(cfg.session_update().to_string()))
        .await
        .map_err(|e| OnAirError::RealtimeError(format!("session.update failed: {e}")))?;
    Ok(ws)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The end trigger fired
    Hangup,
    /// The service closed the connection
    RemoteClosed,
    /// The microphone feed ended
    CaptureClosed,
    /// Nobody is consuming server events any more
    OutputClosed,
}

/// Pump microphone frames up and server events down until one side ends.
pub async fn run_duplex<S, R, E, E2>(
    mut sink: S,
    mut stream: R,
    mut mic_rx: mpsc::Receiver<Vec<i16>>,
    events_tx: mpsc::Sender<ServerEvent>,
    end: Trigger,
) -> Result<SessionEnd>
where
    S: Sink<Message, Error = E> + Unpin,
    R: Stream<Item = std::result::Result<Message, E2>> + Unpin,
    E: Display,
    E2: Display,
{
    let outcome = loop {
        tokio::select! {
            _ = end.fired() => break SessionEnd::Hangup,
            frame = mic_rx.recv() => match frame {
                Some(samples) => {
                    if let Err(e) = sink.send(Message::Text(input_audio_append(&samples))).await {
                        return Err(OnAirError::RealtimeError(format!("Send failed: {e}")));
                    }
                }
                None => break SessionEnd::CaptureClosed,
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = parse_server_event(&text) {
                        if let ServerEvent::Error(m) = &event {
                            warn!(target = "realtime", error = %m, "Realtime service error");
                        }
                        if events_tx.send(event).await.is_err() {
                            break SessionEnd::OutputClosed;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break SessionEnd::RemoteClosed,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return Err(OnAirError::RealtimeError(format!("Receive failed: {e}")));
                }
            },
        }
    };
    if outcome != SessionEnd::RemoteClosed {
        let _ = sink.send(Message::Close(None)).await;
    }
    info!(target = "realtime", reason = ?outcome, "Realtime session ended");
    Ok(outcome)
}
