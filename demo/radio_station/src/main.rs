mod config;

use clap::{Parser, Subcommand};
use config::RadioStationConfig;
use onair_audio::{select_channel, spawn_visualiser};
use onair_core::telemetry::{default_filter, init_tracing};
use onair_core::trigger::spawn_console_monitor;
use onair_core::{
    fetch_articles, writer_from_env, CallConfig, CallHandler, CallOutcome, CannedWriter, ConversationWriter,
    LiveSession, OpenAiTts, PlaybackDriver, SpeechPipeline, SpeechSynthesizer,
    Station, StationMode, Topic, Trigger,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "radio_station", about = "OnAir console radio station")]
struct Cli {
    /// No Spotify, news, LLM or TTS calls
    #[arg(long, global = true)]
    dummy: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Run the station: songs interleaved with host conversations
    Radio,
    /// Hosts talk until you type `call`, then a live caller takes over
    Call,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    init_tracing(&default_filter("radio_station"));
    let cli = Cli::parse();

    let cfg = RadioStationConfig::load();
    let mode = if cli.dummy {
        StationMode::Dummy
    } else {
        StationMode::Live
    };
    info!(target = "radio_station", ?mode, "Starting OnAir");

    match cli.command.unwrap_or(Command::Radio) {
        Command::Radio => run_radio(cfg, mode).await,
        Command::Call => run_call(cfg, mode).await,
    }
    Ok(())
}

/// Speech driver for the hosts, with the waveform meter attached when enabled
fn speech_driver(cfg: &RadioStationConfig) -> PlaybackDriver {
    let channel = select_channel(cfg.playback.player.as_deref(), cfg.playback.local);
    let driver =
        PlaybackDriver::new(channel).with_gap(Duration::from_millis(cfg.playback.gap_ms));
    if !cfg.playback.visualiser {
        return driver;
    }
    let (tx, rx) = watch::channel(None);
    spawn_visualiser(rx);
    driver.with_monitor(tx)
}

fn synthesizer(cfg: &RadioStationConfig, mode: StationMode) -> Option<Arc<dyn SpeechSynthesizer>> {
    if mode == StationMode::Dummy || cfg.tts.api_key.is_none() {
        info!(target = "radio_station", "No TTS; host lines are printed only");
        return None;
    }
    match OpenAiTts::new(cfg.tts.clone()) {
        Ok(tts) => Some(Arc::new(tts)),
        Err(e) => {
            warn!(target = "radio_station", error = %e, "TTS unavailable");
            None
        }
    }
}

async fn run_radio(cfg: RadioStationConfig, mode: StationMode) {
    let driver = speech_driver(&cfg);
    let mut speech = SpeechPipeline::new(driver.clone(), synthesizer(&cfg, mode));
    if let Some(dir) = &cfg.playback.spool_dir {
        speech = speech.with_spool_dir(dir.clone());
    }

    let articles = match mode {
        StationMode::Live => fetch_articles(cfg.news.clone()).await,
        StationMode::Dummy => Vec::new(),
    };
    let mut station = Station::assemble(cfg.station.clone(), mode, Arc::new(speech), articles);
    station.build_initial_queue().await;

    // Typing `end` stops the station as well
    let stop = Trigger::new();
    let monitor = spawn_console_monitor(
        BufReader::new(tokio::io::stdin()),
        Trigger::new(),
        stop.clone(),
    );

    let run_stop = stop.clone();
    let mut radio = tokio::spawn(async move { station.run(run_stop).await });

    let finished = tokio::select! {
        _ = signal::ctrl_c() => {
            info!(target = "radio_station", "Shutting down...");
            stop.fire();
            false
        }
        _ = stop.fired() => false,
        _ = &mut radio => true,
    };

    if !finished && tokio::time::timeout(Duration::from_secs(5), &mut radio).await.is_err() {
        warn!(target = "radio_station", "Station still busy; aborting");
        radio.abort();
    }
    driver.stop_current().await;
    monitor.abort();
}

async fn run_call(cfg: RadioStationConfig, mode: StationMode) {
    let writer: Arc<dyn ConversationWriter> = match mode {
        StationMode::Dummy => Arc::new(CannedWriter),
        StationMode::Live => writer_from_env(),
    };
    let topic = Topic::SongDescription {
        song_name: "Midnight City".to_string(),
        artist: "M83".to_string(),
    };
    let lines = writer.render(&topic).await;

    let speech = speech_driver(&cfg);
    // Independent channel so the ring can overlap the interrupted line
    let ring = select_channel(cfg.playback.player.as_deref(), cfg.playback.local);
    let call_cfg = CallConfig {
        spool_dir: cfg.playback.spool_dir.clone(),
        ..cfg.call.clone()
    };
    let handler = CallHandler::new(speech, ring, call_cfg);

    let call = Trigger::new();
    let end = Trigger::new();
    let monitor = spawn_console_monitor(
        BufReader::new(tokio::io::stdin()),
        call.clone(),
        end.clone(),
    );
    println!("On air. Type 'call' to phone in, 'end' to hang up.");

    let mut live = live_session(&cfg);
    let outcome = handler
        .run(lines, synthesizer(&cfg, mode), &call, &end, live.as_mut())
        .await;
    match outcome {
        CallOutcome::Completed => info!(target = "radio_station", "Segment finished without a call"),
        CallOutcome::CallEnded => info!(target = "radio_station", "Caller hung up"),
        CallOutcome::CallFailed(message) => println!("{message}"),
    }
    monitor.abort();
}

#[cfg(feature = "mic")]
fn live_session(cfg: &RadioStationConfig) -> Box<dyn LiveSession> {
    Box::new(onair_audio::LocalLiveSession::new(
        cfg.realtime.clone(),
        cfg.mic.clone(),
    ))
}

#[cfg(not(feature = "mic"))]
fn live_session(_cfg: &RadioStationConfig) -> Box<dyn LiveSession> {
    Box::new(NoMicrophone)
}

/// Stand-in when the binary was built without the `mic` feature
#[cfg(not(feature = "mic"))]
struct NoMicrophone;

#[cfg(not(feature = "mic"))]
#[async_trait::async_trait]
impl LiveSession for NoMicrophone {
    async fn run(&mut self, _end: Trigger) -> onair_core::Result<()> {
        Err(onair_core::OnAirError::AudioError(
            "built without microphone support (enable the `mic` feature)".into(),
        ))
    }
}
