// OnAir bridge - HTTP control API, host audio broadcast and browser call relay
//
// Routes:
// - GET  /                    liveness
// - POST /api/start_radio     restart the station with a fresh session
// - GET  /api/queue           current queue snapshot
// - WS   /ws/host_audio       200 ms slices of host speech
// - WS   /ws/realtime-convo   browser caller relayed to the realtime service
// - GET  /static/*            optional frontend directory

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use onair_core::broadcast::DEFAULT_LISTENER_CAPACITY;
use onair_core::{BroadcastHub, RealtimeConfig, StationSnapshot};
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};
use tracing::{debug, info};

pub mod controller;
pub mod relay;

pub use controller::StationController;

#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error("invalid bind address: {0}")]
    Address(String),
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Bridge configuration
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    pub addr: String,
    /// Served under `/static` when set
    pub frontend_dir: Option<PathBuf>,
    /// Also play host speech on the server's own speakers
    pub local_playback: bool,
    /// Preferred external player name (aplay, paplay, ffplay)
    pub player: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8000".to_string(),
            frontend_dir: None,
            local_playback: false,
            player: None,
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        Self {
            addr: std::env::var("ONAIR_BRIDGE_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            frontend_dir: std::env::var("ONAIR_FRONTEND_DIR")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            local_playback: std::env::var("ONAIR_LOCAL_PLAYBACK")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            player: std::env::var("ONAIR_PLAYER").ok().filter(|s| !s.is_empty()),
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.addr
            .parse()
            .map_err(|e| BridgeError::Address(format!("{}: {e}", self.addr)))
    }
}

/// Shared handler state
#[derive(Clone)]
pub struct BridgeState {
    pub controller: Arc<StationController>,
    pub hub: Arc<BroadcastHub>,
    pub realtime: RealtimeConfig,
}

impl BridgeState {
    pub fn new(controller: Arc<StationController>, hub: Arc<BroadcastHub>) -> Self {
        Self {
            controller,
            hub,
            realtime: RealtimeConfig::default(),
        }
    }

    pub fn with_realtime(mut self, realtime: RealtimeConfig) -> Self {
        self.realtime = realtime;
        self
    }
}

pub fn router(state: BridgeState, frontend_dir: Option<PathBuf>) -> Router {
    let mut app = Router::new()
        .route("/", get(index_handler))
        .route("/api/start_radio", post(start_radio_handler))
        .route("/api/queue", get(queue_handler))
        .route("/ws/host_audio", get(host_audio_handler))
        .route("/ws/realtime-convo", get(realtime_convo_handler));
    if let Some(dir) = frontend_dir {
        app = app.nest_service("/static", ServeDir::new(dir));
    }
    app.layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
    .with_state(state)
}

pub async fn start_server(cfg: &BridgeConfig, state: BridgeState) -> Result<()> {
    let addr = cfg.socket_addr()?;
    info!(target = "bridge", %addr, "Starting OnAir bridge");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let app = router(state, cfg.frontend_dir.clone());
    info!(target = "bridge", url = %format!("http://{addr}"), "Bridge ready");
    axum::serve(listener, app).await?;
    Ok(())
}

pub async fn index_handler() -> Json<Value> {
    Json(json!({ "status": "Radio Station API running" }))
}

pub async fn start_radio_handler(State(state): State<BridgeState>) -> Json<Value> {
    let report = state.controller.start_radio().await;
    info!(
        target = "bridge",
        real_songs = report.real_songs,
        fallback_songs = report.fallback_songs,
        "Radio started"
    );
    Json(json!({ "status": "ok", "message": "Radio started. queue built." }))
}

pub async fn queue_handler(State(state): State<BridgeState>) -> Json<StationSnapshot> {
    Json(state.controller.snapshot())
}

async fn host_audio_handler(
    ws: WebSocketUpgrade,
    State(state): State<BridgeState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_host_audio(socket, state.hub))
}

/// Forward hub packets until either side goes away. Inbound messages are
/// only read to notice the close.
async fn stream_host_audio(socket: WebSocket, hub: Arc<BroadcastHub>) {
    let (id, mut packets) = hub.subscribe(DEFAULT_LISTENER_CAPACITY);
    let (mut ws_tx, mut ws_rx) = socket.split();
    info!(target = "bridge", listener = id, "Host audio listener connected");

    loop {
        tokio::select! {
            packet = packets.recv() => match packet {
                Some(packet) => {
                    if ws_tx.send(Message::Text(packet.to_json())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            inbound = ws_rx.next() => match inbound {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    hub.unsubscribe(id);
    debug!(target = "bridge", listener = id, "Host audio listener gone");
}

async fn realtime_convo_handler(
    ws: WebSocketUpgrade,
    State(state): State<BridgeState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| relay::relay_call(socket, state.realtime))
}
