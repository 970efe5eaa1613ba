//! Browser caller <-> realtime service relay for `/ws/realtime-convo`.
//!
//! Browser frames: `{"event":"media","media":{"payload":<base64 PCM16 24 kHz>}}`.
//! Frames sent back: caller audio as `media` with `"speaker":"caller"`, text as
//! `text_delta` / `text_done`, and service errors as `error`.

use axum::extract::ws::{Message, WebSocket};
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use onair_core::pcm::REALTIME_SAMPLE_RATE;
use onair_core::realtime::{self, RealtimeConfig, ServerEvent};
use onair_core::{PcmAudio, Trigger};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const FRAME_QUEUE: usize = 64;

#[derive(Deserialize)]
struct BrowserFrame {
    event: String,
    #[serde(default)]
    media: Option<BrowserMedia>,
}

#[derive(Deserialize)]
struct BrowserMedia {
    payload: String,
}

/// Base64 payload of a browser `media` frame, if `text` is one
pub fn browser_media_payload(text: &str) -> Option<String> {
    let frame: BrowserFrame = serde_json::from_str(text).ok()?;
    if frame.event != "media" {
        return None;
    }
    frame.media.map(|m| m.payload)
}

/// Decode a browser `media` frame into PCM16 samples
pub fn decode_browser_media(text: &str) -> Option<Vec<i16>> {
    let payload = browser_media_payload(text)?;
    let bytes = base64::engine::general_purpose::STANDARD.decode(payload).ok()?;
    Some(PcmAudio::from_pcm16_le(REALTIME_SAMPLE_RATE, &bytes).samples)
}

/// Browser-facing frame for one realtime server event
pub fn browser_frame(event: &ServerEvent) -> String {
    match event {
        ServerEvent::AudioDelta(bytes) => json!({
            "event": "media",
            "media": { "payload": base64::engine::general_purpose::STANDARD.encode(bytes) },
            "speaker": "caller",
        }),
        ServerEvent::TextDelta(delta) | ServerEvent::TranscriptDelta(delta) => {
            json!({ "event": "text_delta", "delta": delta })
        }
        ServerEvent::TextDone => json!({ "event": "text_done" }),
        ServerEvent::Error(message) => json!({ "event": "error", "message": message }),
    }
    .to_string()
}

/// Serve one browser caller until either end hangs up
pub async fn relay_call(socket: WebSocket, cfg: RealtimeConfig) {
    if cfg.api_key.is_none() {
        info!(target = "relay", "No realtime API key; echoing caller audio");
        echo_media(socket).await;
        return;
    }

    let (mut ws_tx, mut ws_rx) = socket.split();
    let upstream = match realtime::connect(&cfg).await {
        Ok(upstream) => upstream,
        Err(e) => {
            warn!(target = "relay", error = %e, "Realtime connection failed");
            let _ = ws_tx
                .send(Message::Text(format!("Could not connect the call: {e}")))
                .await;
            let _ = ws_tx.send(Message::Close(None)).await;
            return;
        }
    };
    let (up_sink, up_stream) = upstream.split();

    let (frames_tx, frames_rx) = mpsc::channel::<Vec<i16>>(FRAME_QUEUE);
    let (events_tx, mut events_rx) = mpsc::channel::<ServerEvent>(FRAME_QUEUE);
    let hangup = Trigger::new();
    let upstream_done = Trigger::new();

    let duplex = tokio::spawn({
        let hangup = hangup.clone();
        let upstream_done = upstream_done.clone();
        async move {
            let outcome = realtime::run_duplex(up_sink, up_stream, frames_rx, events_tx, hangup).await;
            upstream_done.fire();
            outcome
        }
    });

    let downlink = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            if ws_tx.send(Message::Text(browser_frame(&event))).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    loop {
        tokio::select! {
            _ = upstream_done.fired() => break,
            inbound = ws_rx.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if let Some(samples) = decode_browser_media(&text) {
                        if frames_tx.send(samples).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    hangup.fire();
    drop(frames_tx);
    match duplex.await {
        Ok(Ok(end)) => info!(target = "relay", reason = ?end, "Browser call finished"),
        Ok(Err(e)) => warn!(target = "relay", error = %e, "Browser call failed"),
        Err(e) => warn!(target = "relay", error = %e, "Relay task failed"),
    }
    let _ = downlink.await;
}

/// Send every media frame straight back, tagged as the caller
async fn echo_media(mut socket: WebSocket) {
    while let Some(inbound) = socket.recv().await {
        let text = match inbound {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        let Some(payload) = browser_media_payload(&text) else {
            debug!(target = "relay", "Ignoring non-media frame");
            continue;
        };
        let echoed = json!({
            "event": "media",
            "media": { "payload": payload },
            "speaker": "caller",
        });
        if socket.send(Message::Text(echoed.to_string())).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_media_frames_are_ignored() {
        assert!(browser_media_payload(r#"{"event":"start"}"#).is_none());
        assert!(browser_media_payload("not json").is_none());
        assert!(browser_media_payload(r#"{"event":"media"}"#).is_none());
    }
}
