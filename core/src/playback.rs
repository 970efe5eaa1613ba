//! Ordered playback of speech clips on an exclusive output channel.
//!
//! A generator task produces `QueuedAudio` into a bounded channel; the
//! `PlaybackDriver` drains it strictly in order, one clip at a time, and
//! releases each clip once it is done with it.

use crate::broadcast::BroadcastHub;
use crate::pcm::{gen_id, PcmAudio};
use crate::queue::{RecordedClip, Speaker, SpeechLine};
use crate::trigger::Trigger;
use crate::voice::{generate_to_queue, SpeechSynthesizer};
use crate::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Capacity of the generation → playback queue
pub const SPEECH_QUEUE_CAPACITY: usize = 4;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClipSource {
    /// Audio file on disk; `transient` files are deleted on release
    File { path: PathBuf, transient: bool },
    /// WAV container held in memory
    Memory(Arc<Vec<u8>>),
    /// No audio could be produced; the text is logged instead
    TextOnly,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioClip {
    pub id: String,
    pub source: ClipSource,
    pub speaker: Option<Speaker>,
    pub text: String,
}

impl AudioClip {
    pub fn spooled(path: PathBuf, speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            id: gen_id(),
            source: ClipSource::File {
                path,
                transient: true,
            },
            speaker: Some(speaker),
            text: text.into(),
        }
    }

    /// A file that outlives playback (pre-recorded lines, ring and hang-up sounds)
    pub fn recorded(path: PathBuf, speaker: Option<Speaker>) -> Self {
        Self {
            id: gen_id(),
            source: ClipSource::File {
                path,
                transient: false,
            },
            speaker,
            text: String::new(),
        }
    }

    pub fn in_memory(wav: Vec<u8>, speaker: Option<Speaker>, text: impl Into<String>) -> Self {
        Self {
            id: gen_id(),
            source: ClipSource::Memory(Arc::new(wav)),
            speaker,
            text: text.into(),
        }
    }

    pub fn text_only(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            id: gen_id(),
            source: ClipSource::TextOnly,
            speaker: Some(speaker),
            text: text.into(),
        }
    }

    pub fn has_audio(&self) -> bool {
        !matches!(self.source, ClipSource::TextOnly)
    }

    /// Decode the clip; `None` for text-only clips
    pub fn load_pcm(&self) -> Result<Option<PcmAudio>> {
        match &self.source {
            ClipSource::File { path, .. } => PcmAudio::from_wav_file(path).map(Some),
            ClipSource::Memory(bytes) => PcmAudio::from_wav_bytes(bytes).map(Some),
            ClipSource::TextOnly => Ok(None),
        }
    }

    /// Free the clip's resources. Transient files are deleted; nothing else is touched.
    pub fn release(self) {
        if let ClipSource::File {
            path,
            transient: true,
        } = &self.source
        {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(target = "playback", path = ?path, error = %e, "Failed to delete spooled clip");
                }
            }
        }
    }
}

impl From<&RecordedClip> for AudioClip {
    fn from(rec: &RecordedClip) -> Self {
        AudioClip::recorded(rec.path.clone(), Some(rec.speaker))
    }
}

/// Item on the generation → playback queue
#[derive(Debug)]
pub enum QueuedAudio {
    Clip(AudioClip),
    EndOfStream,
}

/// An exclusive audio output. Only one clip plays on a channel at a time.
#[async_trait]
pub trait AudioChannel: Send {
    /// Begin playing `clip`, stopping anything already playing
    async fn start(&mut self, clip: &AudioClip) -> Result<()>;
    /// Resolves once the current clip completes on its own (immediately when idle).
    /// Must be cancel-safe: it is polled inside `select!`.
    async fn finished(&mut self);
    /// Force-stop the current clip; no-op when idle
    async fn stop(&mut self);
}

pub type SharedChannel = Arc<Mutex<Box<dyn AudioChannel>>>;

pub fn shared_channel<C: AudioChannel + 'static>(channel: C) -> SharedChannel {
    Arc::new(Mutex::new(Box::new(channel)))
}

/// What is playing right now, for the visualiser
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackPosition {
    pub clip_id: String,
    pub speaker: Option<Speaker>,
    pub elapsed: Duration,
    pub pcm: Option<Arc<PcmAudio>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipOutcome {
    Finished,
    /// The trigger fired while the clip was still playing; it keeps playing
    Triggered,
}

#[derive(Debug)]
pub enum DrainOutcome {
    Completed,
    /// `clip` is the one still playing on the channel when the trigger fired,
    /// `None` if it fired between clips. The caller stops and releases it.
    Interrupted { clip: Option<AudioClip> },
}

#[derive(Clone)]
pub struct PlaybackDriver {
    channel: SharedChannel,
    gap: Duration,
    tick: Duration,
    monitor: Option<watch::Sender<Option<PlaybackPosition>>>,
    hub: Option<Arc<BroadcastHub>>,
    /// Hub feed of the clip last started on this channel
    hub_feed: Arc<std::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl PlaybackDriver {
    pub fn new(channel: SharedChannel) -> Self {
        Self {
            channel,
            gap: Duration::from_millis(300),
            tick: Duration::from_millis(50),
            monitor: None,
            hub: None,
            hub_feed: Arc::new(std::sync::Mutex::new(None)),
        }
    }

    pub fn with_gap(mut self, gap: Duration) -> Self {
        self.gap = gap;
        self
    }

    /// Publish the play position every tick
    pub fn with_monitor(mut self, tx: watch::Sender<Option<PlaybackPosition>>) -> Self {
        self.monitor = Some(tx);
        self
    }

    /// Hand each clip's PCM to the broadcast hub
    pub fn with_hub(mut self, hub: Arc<BroadcastHub>) -> Self {
        self.hub = Some(hub);
        self
    }

    pub fn channel(&self) -> &SharedChannel {
        &self.channel
    }

    /// Play one clip to completion, or until `trigger` fires.
    ///
    /// The clip is not released here.
    pub async fn play_clip(&self, clip: &AudioClip, trigger: Option<&Trigger>) -> ClipOutcome {
        let label = clip.speaker.map(|s| s.tag()).unwrap_or("SFX");
        if !clip.has_audio() {
            info!(target = "playback", speaker = %label, "(no audio) {}", clip.text);
            return ClipOutcome::Finished;
        }

        let pcm = if self.monitor.is_some() || self.hub.is_some() {
            match clip.load_pcm() {
                Ok(p) => p.map(Arc::new),
                Err(e) => {
                    debug!(target = "playback", error = %e, "Could not decode clip for monitoring");
                    None
                }
            }
        } else {
            None
        };

        let mut channel = self.channel.lock().await;
        if let Err(e) = channel.start(clip).await {
            warn!(target = "playback", error = %e, "Failed to start clip; skipping");
            return ClipOutcome::Finished;
        }
        if let (Some(hub), Some(pcm), Some(speaker)) = (&self.hub, &pcm, clip.speaker) {
            let hub = Arc::clone(hub);
            let pcm = Arc::clone(pcm);
            let feed = tokio::spawn(async move {
                hub.stream_pcm(&pcm, speaker).await;
            });
            self.replace_hub_feed(Some(feed));
        }
        debug!(target = "playback", clip = %clip.id, speaker = %label, "Playing clip");

        let started = Instant::now();
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let outcome = loop {
            tokio::select! {
                _ = channel.finished() => break ClipOutcome::Finished,
                _ = wait_for(trigger) => break ClipOutcome::Triggered,
                _ = ticker.tick() => {
                    if let Some(tx) = &self.monitor {
                        tx.send_replace(Some(PlaybackPosition {
                            clip_id: clip.id.clone(),
                            speaker: clip.speaker,
                            elapsed: started.elapsed(),
                            pcm: pcm.clone(),
                        }));
                    }
                }
            }
        };
        if outcome == ClipOutcome::Finished {
            if let Some(tx) = &self.monitor {
                tx.send_replace(None);
            }
        }
        outcome
    }

    /// Force-stop whatever is playing on this driver's channel, and its broadcast
    pub async fn stop_current(&self) {
        self.replace_hub_feed(None);
        self.channel.lock().await.stop().await;
        if let Some(tx) = &self.monitor {
            tx.send_replace(None);
        }
    }

    /// Abort the previous clip's hub feed, if still running, and keep `feed`
    fn replace_hub_feed(&self, feed: Option<JoinHandle<()>>) {
        let previous = match self.hub_feed.lock() {
            Ok(mut slot) => std::mem::replace(&mut *slot, feed),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), feed),
        };
        if let Some(task) = previous {
            task.abort();
        }
    }

    /// Play everything on `rx` until the end-of-stream marker or channel close
    pub async fn drain(&self, rx: mpsc::Receiver<QueuedAudio>) {
        // A trigger that never fires keeps the single code path
        let never = Trigger::new();
        let _ = self.drain_until(rx, &never).await;
    }

    /// Like `drain`, but stop handing out clips once `trigger` fires.
    ///
    /// On interruption the queue is closed so the producer stops, and every
    /// clip still buffered is released.
    pub async fn drain_until(
        &self,
        mut rx: mpsc::Receiver<QueuedAudio>,
        trigger: &Trigger,
    ) -> DrainOutcome {
        let mut played = 0usize;
        loop {
            if trigger.is_fired() {
                close_and_release(&mut rx);
                return DrainOutcome::Interrupted { clip: None };
            }
            let next = tokio::select! {
                item = rx.recv() => item,
                _ = trigger.fired() => {
                    close_and_release(&mut rx);
                    return DrainOutcome::Interrupted { clip: None };
                }
            };
            let clip = match next {
                Some(QueuedAudio::Clip(clip)) => clip,
                Some(QueuedAudio::EndOfStream) | None => return DrainOutcome::Completed,
            };

            if played > 0 && clip.has_audio() {
                tokio::select! {
                    _ = sleep(self.gap) => {}
                    _ = trigger.fired() => {
                        clip.release();
                        close_and_release(&mut rx);
                        return DrainOutcome::Interrupted { clip: None };
                    }
                }
            }

            match self.play_clip(&clip, Some(trigger)).await {
                ClipOutcome::Finished => {
                    clip.release();
                    played += 1;
                }
                ClipOutcome::Triggered => {
                    close_and_release(&mut rx);
                    return DrainOutcome::Interrupted { clip: Some(clip) };
                }
            }
        }
    }
}

async fn wait_for(trigger: Option<&Trigger>) {
    match trigger {
        Some(t) => t.fired().await,
        None => std::future::pending::<()>().await,
    }
}

fn close_and_release(rx: &mut mpsc::Receiver<QueuedAudio>) {
    rx.close();
    while let Ok(item) = rx.try_recv() {
        if let QueuedAudio::Clip(clip) = item {
            clip.release();
        }
    }
}

/// Speaks conversations for the orchestrator
#[async_trait]
pub trait ConversationSpeaker: Send + Sync {
    async fn speak(&self, lines: &[SpeechLine]);
    async fn play_recorded(&self, clips: &[RecordedClip]);
}

/// TTS generation feeding the playback driver through a bounded queue
pub struct SpeechPipeline {
    driver: PlaybackDriver,
    synth: Option<Arc<dyn SpeechSynthesizer>>,
    spool_dir: Option<PathBuf>,
}

impl SpeechPipeline {
    pub fn new(driver: PlaybackDriver, synth: Option<Arc<dyn SpeechSynthesizer>>) -> Self {
        Self {
            driver,
            synth,
            spool_dir: None,
        }
    }

    /// Spool synthesised clips to files in `dir` instead of keeping them in memory
    pub fn with_spool_dir(mut self, dir: PathBuf) -> Self {
        self.spool_dir = Some(dir);
        self
    }

    pub fn driver(&self) -> &PlaybackDriver {
        &self.driver
    }
}

#[async_trait]
impl ConversationSpeaker for SpeechPipeline {
    async fn speak(&self, lines: &[SpeechLine]) {
        let (tx, rx) = mpsc::channel(SPEECH_QUEUE_CAPACITY);
        let cancel = Trigger::new();
        let producer = tokio::spawn(generate_to_queue(
            self.synth.clone(),
            lines.to_vec(),
            tx,
            cancel.clone(),
            self.spool_dir.clone(),
        ));
        self.driver.drain(rx).await;
        cancel.fire();
        if let Err(e) = producer.await {
            warn!(target = "playback", error = %e, "Speech generation task failed");
        }
    }

    async fn play_recorded(&self, clips: &[RecordedClip]) {
        for (i, rec) in clips.iter().enumerate() {
            if i > 0 {
                sleep(self.driver.gap).await;
            }
            let clip = AudioClip::from(rec);
            self.driver.play_clip(&clip, None).await;
            clip.release();
        }
    }
}
