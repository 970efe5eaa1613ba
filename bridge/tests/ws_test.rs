use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use onair_bridge::relay::{browser_frame, decode_browser_media};
use onair_bridge::{router, BridgeState, StationController};
use onair_core::{
    BroadcastHub, ConversationSpeaker, HostAudioPacket, RealtimeConfig, RecordedClip, ServerEvent,
    SpeechLine, StationConfig, StationMode,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

struct SilentSpeaker;

#[async_trait::async_trait]
impl ConversationSpeaker for SilentSpeaker {
    async fn speak(&self, _lines: &[SpeechLine]) {}
    async fn play_recorded(&self, _clips: &[RecordedClip]) {}
}

fn realtime_config(url: String, api_key: Option<&str>) -> RealtimeConfig {
    RealtimeConfig {
        url,
        api_key: api_key.map(str::to_string),
        ..RealtimeConfig::default()
    }
}

async fn serve(realtime: RealtimeConfig) -> (SocketAddr, Arc<BroadcastHub>) {
    let hub = Arc::new(BroadcastHub::new());
    let controller = StationController::new(
        StationMode::Dummy,
        StationConfig::default(),
        Arc::new(SilentSpeaker),
    );
    let state = BridgeState::new(Arc::new(controller), Arc::clone(&hub)).with_realtime(realtime);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state, None)).await.unwrap();
    });
    (addr, hub)
}

async fn next_text<S>(ws: &mut S) -> String
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return text;
        }
    }
}

fn media_frame(samples: &[i16]) -> String {
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    json!({
        "event": "media",
        "media": { "payload": base64::engine::general_purpose::STANDARD.encode(bytes) },
    })
    .to_string()
}

#[test]
fn test_browser_media_decodes_to_samples() {
    assert_eq!(decode_browser_media(&media_frame(&[1, -2, 300])), Some(vec![1, -2, 300]));
    assert_eq!(decode_browser_media(r#"{"event":"stop"}"#), None);
}

#[test]
fn test_server_events_map_to_browser_frames() {
    let audio: Value = serde_json::from_str(&browser_frame(&ServerEvent::AudioDelta(vec![1, 0]))).unwrap();
    assert_eq!(audio["event"], "media");
    assert_eq!(audio["speaker"], "caller");
    assert_eq!(audio["media"]["payload"], "AQA=");

    let text: Value = serde_json::from_str(&browser_frame(&ServerEvent::TextDelta("hi".into()))).unwrap();
    assert_eq!(text, json!({"event": "text_delta", "delta": "hi"}));

    let done: Value = serde_json::from_str(&browser_frame(&ServerEvent::TextDone)).unwrap();
    assert_eq!(done, json!({"event": "text_done"}));
}

#[tokio::test]
async fn test_host_audio_listener_receives_packets_and_is_removed_on_close() {
    let (addr, hub) = serve(realtime_config("ws://127.0.0.1:1".into(), None)).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws/host_audio"))
        .await
        .unwrap();

    for _ in 0..100 {
        if hub.listener_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(hub.listener_count(), 1);

    let packet = HostAudioPacket::from_samples(&[1, 2], "matt");
    let report = hub.broadcast(&packet);
    assert_eq!(report.delivered, 1);

    let received: HostAudioPacket = serde_json::from_str(&next_text(&mut ws).await).unwrap();
    assert_eq!(received, packet);

    ws.close(None).await.unwrap();
    for _ in 0..100 {
        if hub.listener_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(hub.listener_count(), 0);
}

#[tokio::test]
async fn test_call_without_api_key_echoes_media() {
    let (addr, _hub) = serve(realtime_config("ws://127.0.0.1:1".into(), None)).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws/realtime-convo"))
        .await
        .unwrap();

    let frame = media_frame(&[5, 6, 7]);
    ws.send(Message::Text(frame.clone())).await.unwrap();
    let echoed: Value = serde_json::from_str(&next_text(&mut ws).await).unwrap();
    let sent: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(echoed["event"], "media");
    assert_eq!(echoed["speaker"], "caller");
    assert_eq!(echoed["media"]["payload"], sent["media"]["payload"]);
}

#[tokio::test]
async fn test_call_connection_failure_is_reported_as_text() {
    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = closed.local_addr().unwrap();
    drop(closed);

    let (addr, _hub) = serve(realtime_config(format!("ws://{dead}/v1/realtime"), Some("test-key"))).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws/realtime-convo"))
        .await
        .unwrap();

    let text = next_text(&mut ws).await;
    assert!(text.starts_with("Could not connect the call"), "{text}");
}

#[tokio::test]
async fn test_call_relays_between_browser_and_realtime_service() {
    let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = upstream.local_addr().unwrap();
    let service = tokio::spawn(async move {
        let (stream, _) = upstream.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let mut appended = Vec::new();
        while let Some(Ok(msg)) = ws.next().await {
            let Message::Text(text) = msg else { continue };
            let v: Value = serde_json::from_str(&text).unwrap();
            if v["type"] != "input_audio_buffer.append" {
                continue;
            }
            appended.push(v["audio"].as_str().unwrap().to_string());
            let reply = json!({"type": "response.audio.delta", "delta": "AQA="});
            ws.send(Message::Text(reply.to_string())).await.unwrap();
            let text = json!({"type": "response.text.delta", "delta": "hello"});
            ws.send(Message::Text(text.to_string())).await.unwrap();
        }
        appended
    });

    let (addr, _hub) = serve(realtime_config(format!("ws://{upstream_addr}/v1/realtime"), Some("test-key"))).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws/realtime-convo"))
        .await
        .unwrap();

    ws.send(Message::Text(media_frame(&[1, 2]))).await.unwrap();
    let audio: Value = serde_json::from_str(&next_text(&mut ws).await).unwrap();
    assert_eq!(audio["event"], "media");
    assert_eq!(audio["speaker"], "caller");
    assert_eq!(audio["media"]["payload"], "AQA=");
    let text: Value = serde_json::from_str(&next_text(&mut ws).await).unwrap();
    assert_eq!(text, json!({"event": "text_delta", "delta": "hello"}));

    ws.close(None).await.unwrap();
    let appended = tokio::time::timeout(Duration::from_secs(5), service)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(appended, vec!["AQACAA==".to_string()]);
}
