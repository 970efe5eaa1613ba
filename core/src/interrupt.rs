//! Call interrupt: hand the air over from scripted speech to a live session.
//!
//! ```text
//! Idle -> Speaking -> RingingOverlap -> LiveCall -> Ended
//! ```
//!
//! The ring plays on its own channel so it can overlap the line being spoken;
//! speech is force-stopped once the overlap window has passed.

use crate::playback::{
    AudioClip, DrainOutcome, PlaybackDriver, SharedChannel, SPEECH_QUEUE_CAPACITY,
};
use crate::queue::SpeechLine;
use crate::trigger::Trigger;
use crate::voice::{generate_to_queue, SpeechSynthesizer};
use crate::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Speaking,
    RingingOverlap,
    LiveCall,
    Ended,
}

#[derive(Clone, Debug)]
pub struct CallConfig {
    /// How long the interrupted line keeps playing under the ring
    pub overlap: Duration,
    pub ring_clip: Option<AudioClip>,
    pub hangup_clip: Option<AudioClip>,
    pub spool_dir: Option<PathBuf>,
}

impl Default for CallConfig {
    fn default() -> Self {
        let clip_from_env = |key: &str| {
            std::env::var(key)
                .ok()
                .map(PathBuf::from)
                .filter(|p| p.exists())
                .map(|p| AudioClip::recorded(p, None))
        };
        Self {
            overlap: Duration::from_millis(
                std::env::var("ONAIR_CALL_OVERLAP_MS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(500),
            ),
            ring_clip: clip_from_env("ONAIR_RING_SOUND"),
            hangup_clip: clip_from_env("ONAIR_HANGUP_SOUND"),
            spool_dir: None,
        }
    }
}

/// A duplex voice session that runs until `end` fires or the transport closes
#[async_trait]
pub trait LiveSession: Send {
    async fn run(&mut self, end: Trigger) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// The script finished without a call
    Completed,
    /// A call took place and has ended
    CallEnded,
    /// The live session could not run; the message is shown to the user
    CallFailed(String),
}

pub struct CallHandler {
    speech: PlaybackDriver,
    ring: PlaybackDriver,
    cfg: CallConfig,
    state_tx: watch::Sender<CallState>,
}

impl CallHandler {
    pub fn new(speech: PlaybackDriver, ring_channel: SharedChannel, cfg: CallConfig) -> Self {
        let (state_tx, _) = watch::channel(CallState::Idle);
        Self {
            speech,
            ring: PlaybackDriver::new(ring_channel).with_gap(Duration::ZERO),
            cfg,
            state_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<CallState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> CallState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: CallState) {
        info!(target = "call", state = ?state, "Call state");
        self.state_tx.send_replace(state);
    }

    /// Speak `lines` until done or until `call` fires, then run the call.
    pub async fn run<L>(
        &self,
        lines: Vec<SpeechLine>,
        synth: Option<Arc<dyn SpeechSynthesizer>>,
        call: &Trigger,
        end: &Trigger,
        live: &mut L,
    ) -> CallOutcome
    where
        L: LiveSession + ?Sized,
    {
        self.set_state(CallState::Speaking);
        let (tx, rx) = mpsc::channel(SPEECH_QUEUE_CAPACITY);
        let cancel = Trigger::new();
        let producer = tokio::spawn(generate_to_queue(
            synth,
            lines,
            tx,
            cancel.clone(),
            self.cfg.spool_dir.clone(),
        ));

        let interrupted = match self.speech.drain_until(rx, call).await {
            DrainOutcome::Completed => None,
            DrainOutcome::Interrupted { clip } => Some(clip),
        };
        cancel.fire();

        let Some(speaking) = interrupted else {
            join_producer(producer).await;
            self.set_state(CallState::Idle);
            return CallOutcome::Completed;
        };

        self.set_state(CallState::RingingOverlap);
        let ring_task = self.cfg.ring_clip.clone().map(|clip| {
            let ring = self.ring.clone();
            tokio::spawn(async move { ring.play_clip(&clip, None).await })
        });
        if let Some(clip) = speaking {
            sleep(self.cfg.overlap).await;
            self.speech.stop_current().await;
            clip.release();
        }
        join_producer(producer).await;
        if let Some(task) = ring_task {
            if let Err(e) = task.await {
                warn!(target = "call", error = %e, "Ring playback task failed");
            }
        }

        self.set_state(CallState::LiveCall);
        let outcome = match live.run(end.clone()).await {
            Ok(()) => CallOutcome::CallEnded,
            Err(e) => {
                error!(target = "call", error = %e, "Live session failed");
                CallOutcome::CallFailed(format!("Could not connect the call: {e}"))
            }
        };

        if let Some(clip) = &self.cfg.hangup_clip {
            self.ring.play_clip(clip, None).await;
        }
        self.set_state(CallState::Ended);
        outcome
    }
}

async fn join_producer(producer: tokio::task::JoinHandle<()>) {
    if let Err(e) = producer.await {
        warn!(target = "call", error = %e, "Speech generation task failed");
    }
}
