use std::sync::Arc;

use clap::Parser;
use onair_audio::select_channel;
use onair_bridge::{start_server, BridgeConfig, BridgeState, StationController};
use onair_core::telemetry::{default_filter, init_tracing};
use onair_core::{
    BroadcastHub, OpenAiTts, PlaybackDriver, SpeechPipeline, SpeechSynthesizer, StationConfig,
    StationMode,
};

#[derive(Parser, Debug)]
#[command(name = "onair-bridge-server", about = "OnAir radio station HTTP/WebSocket bridge")]
struct Args {
    /// Run without Spotify, news or LLM calls
    #[arg(long)]
    dummy: bool,
    /// Bind address, overrides ONAIR_BRIDGE_ADDR
    #[arg(long)]
    addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    init_tracing(&default_filter("onair_bridge"));
    let args = Args::parse();

    let mut cfg = BridgeConfig::from_env();
    if let Some(addr) = args.addr {
        cfg.addr = addr;
    }
    let mode = if args.dummy {
        StationMode::Dummy
    } else {
        StationMode::Live
    };

    let hub = Arc::new(BroadcastHub::new());
    let channel = select_channel(cfg.player.as_deref(), cfg.local_playback);
    let driver = PlaybackDriver::new(channel).with_hub(Arc::clone(&hub));
    // Dummy sessions stay off the network, TTS included
    let synth = match mode {
        StationMode::Live => {
            OpenAiTts::from_env().map(|t| Arc::new(t) as Arc<dyn SpeechSynthesizer>)
        }
        StationMode::Dummy => None,
    };
    let speech = Arc::new(SpeechPipeline::new(driver.clone(), synth));

    let controller = Arc::new(
        StationController::new(mode, StationConfig::default(), speech).with_driver(driver),
    );
    let state = BridgeState::new(Arc::clone(&controller), hub);

    tokio::select! {
        res = start_server(&cfg, state) => res?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(target = "bridge", "Shutting down");
            controller.stop().await;
        }
    }
    Ok(())
}
