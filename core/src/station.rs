//! Queue orchestrator: interleaves songs with generated conversations.
//!
//! A `Station` owns its queue and session history outright. Readers (the HTTP
//! bridge, the console) only ever see immutable `StationSnapshot`s published
//! through a watch channel after every change.

use crate::dialogue::{writer_from_env, CannedWriter, ConversationWriter};
use crate::music::{MusicControl, SpotifyClient};
use crate::playback::ConversationSpeaker;
use crate::queue::{
    append_block, pick_article, Article, BlockReport, QueueItem, RadioQueue, RecordedClip,
    SessionHistory, Song, Speaker, Topic,
};
use crate::trigger::Trigger;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

#[derive(Clone, Debug)]
pub struct StationConfig {
    pub songs_per_block: usize,
    /// Expand when fewer than this many items are left to play
    pub low_water_mark: usize,
    pub poll_interval: Duration,
    /// Render the next conversation once a song has less than this left
    pub pregen_threshold_ms: u64,
    /// Move on once a song has less than this left
    pub advance_epsilon_ms: u64,
    pub volume_percent: u8,
    /// How long a song that is not actually playing holds the air
    pub fallback_hold: Duration,
    pub playlist_id: String,
    pub prerecorded_dir: Option<PathBuf>,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            songs_per_block: 3,
            low_water_mark: 2,
            poll_interval: Duration::from_millis(500),
            pregen_threshold_ms: 10_000,
            advance_epsilon_ms: 4_000,
            volume_percent: 60,
            fallback_hold: Duration::from_millis(
                std::env::var("ONAIR_FALLBACK_HOLD_MS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(2_000),
            ),
            playlist_id: std::env::var("ONAIR_PLAYLIST_ID").unwrap_or_default(),
            prerecorded_dir: std::env::var("ONAIR_PRERECORDED_DIR")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationMode {
    /// Spotify, RSS and the LLM are used when configured
    Live,
    /// No network calls: fallback songs, dummy article, canned or pre-recorded speech
    Dummy,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationSnapshot {
    pub queue: Vec<QueueItem>,
    pub current_index: usize,
    pub running: bool,
    pub updated_at: DateTime<Utc>,
}

impl Default for StationSnapshot {
    fn default() -> Self {
        Self {
            queue: Vec::new(),
            current_index: 0,
            running: false,
            updated_at: Utc::now(),
        }
    }
}

pub fn status_channel() -> (Arc<watch::Sender<StationSnapshot>>, watch::Receiver<StationSnapshot>) {
    let (tx, rx) = watch::channel(StationSnapshot::default());
    (Arc::new(tx), rx)
}

pub struct Station {
    cfg: StationConfig,
    mode: StationMode,
    music: Option<Arc<dyn MusicControl>>,
    writer: Arc<dyn ConversationWriter>,
    speaker: Arc<dyn ConversationSpeaker>,
    articles: Vec<Article>,
    prerecorded: Vec<RecordedClip>,
    queue: RadioQueue,
    history: SessionHistory,
    running: bool,
    status_tx: Arc<watch::Sender<StationSnapshot>>,
}

impl Station {
    pub fn new(
        cfg: StationConfig,
        mode: StationMode,
        writer: Arc<dyn ConversationWriter>,
        speaker: Arc<dyn ConversationSpeaker>,
    ) -> Self {
        let prerecorded = match (&mode, &cfg.prerecorded_dir) {
            (StationMode::Dummy, Some(dir)) => load_prerecorded(dir),
            _ => Vec::new(),
        };
        let (status_tx, _) = status_channel();
        Self {
            cfg,
            mode,
            music: None,
            writer,
            speaker,
            articles: Vec::new(),
            prerecorded,
            queue: RadioQueue::new(),
            history: SessionHistory::default(),
            running: false,
            status_tx,
        }
    }

    /// Wire a station from the environment around already fetched `articles`.
    ///
    /// Live mode picks up Spotify and the LLM when they are configured and
    /// degrades to fallbacks when they are not. Dummy mode touches no network
    /// at all and ignores `articles`.
    pub fn assemble(
        cfg: StationConfig,
        mode: StationMode,
        speaker: Arc<dyn ConversationSpeaker>,
        articles: Vec<Article>,
    ) -> Self {
        if mode == StationMode::Dummy {
            return Self::new(cfg, mode, Arc::new(CannedWriter), speaker);
        }

        let writer = writer_from_env();
        let station = Self::new(cfg, mode, writer, speaker).with_articles(articles);
        match SpotifyClient::from_env() {
            Some(music) => station.with_music(Arc::new(music)),
            None => station,
        }
    }

    /// Music control is ignored in dummy mode
    pub fn with_music(mut self, music: Arc<dyn MusicControl>) -> Self {
        if self.mode == StationMode::Live {
            self.music = Some(music);
        }
        self
    }

    pub fn with_articles(mut self, articles: Vec<Article>) -> Self {
        self.articles = articles;
        self
    }

    /// Publish snapshots into an externally owned channel
    pub fn with_status_sender(mut self, tx: Arc<watch::Sender<StationSnapshot>>) -> Self {
        self.status_tx = tx;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<StationSnapshot> {
        self.status_tx.subscribe()
    }

    pub fn queue(&self) -> &RadioQueue {
        &self.queue
    }

    pub fn config(&self) -> &StationConfig {
        &self.cfg
    }

    pub fn snapshot(&self) -> StationSnapshot {
        StationSnapshot {
            queue: self.queue.items().to_vec(),
            current_index: self.queue.current_index(),
            running: self.running,
            updated_at: Utc::now(),
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.snapshot());
    }

    /// Start a fresh session: empty history and one block in the queue.
    /// Missing songs or articles become fallback entries.
    pub async fn build_initial_queue(&mut self) -> BlockReport {
        self.queue.clear();
        self.history.clear();
        let report = self.expand().await;
        info!(
            target = "station",
            items = self.queue.len(),
            real_songs = report.real_songs,
            fallback_songs = report.fallback_songs,
            "Initial queue built"
        );
        report
    }

    /// Append one block to the queue
    pub async fn expand(&mut self) -> BlockReport {
        let wanted = self.cfg.songs_per_block * 2;
        let (songs, playlist_exhausted) = self.fetch_songs(wanted).await;
        let mut songs = songs.into_iter();
        let start = self.queue.len();

        let Self {
            queue,
            history,
            articles,
            mode,
            cfg,
            ..
        } = self;
        let mut report = append_block(queue, cfg.songs_per_block, || songs.next(), |report| {
            let article = match mode {
                StationMode::Live => pick_article(articles, history, report),
                StationMode::Dummy => Article::dummy(),
            };
            QueueItem::ConversationPlaceholder(Topic::NewsDescription { article })
        });
        report.playlist_exhausted = playlist_exhausted;

        if !self.prerecorded.is_empty() {
            self.replace_placeholders_with_recordings(start);
        }
        debug!(target = "station", added = self.queue.len() - start, "Queue expanded");
        self.publish();
        report
    }

    fn replace_placeholders_with_recordings(&mut self, from: usize) {
        let mut rebuilt = RadioQueue::new();
        for (i, item) in self.queue.items().iter().enumerate() {
            if i >= from && item.is_placeholder() {
                rebuilt.push(QueueItem::PreRecorded(self.prerecorded.clone()));
            } else {
                rebuilt.push(item.clone());
            }
        }
        let index = self.queue.current_index();
        self.queue = rebuilt;
        while self.queue.current_index() < index && self.queue.advance().is_some() {}
    }

    /// Up to `wanted` unplayed songs, and whether the playlist ran out.
    /// An unreachable service leaves the rest of the block to fallbacks.
    async fn fetch_songs(&mut self, wanted: usize) -> (Vec<Song>, bool) {
        let Some(music) = self.music.clone() else {
            return (Vec::new(), false);
        };
        let mut songs = Vec::with_capacity(wanted);
        for _ in 0..wanted {
            let played = self.history.played_songs().to_vec();
            match music
                .random_unplayed_song(&self.cfg.playlist_id, &played)
                .await
            {
                Ok(Some(song)) => {
                    if let Some(uri) = &song.uri {
                        self.history.mark_played(uri);
                    }
                    songs.push(song);
                }
                Ok(None) => {
                    info!(target = "station", "No more unique songs found in the playlist");
                    return (songs, true);
                }
                Err(e) => {
                    warn!(target = "station", error = %e, "Music service unavailable; filling with fallback songs");
                    break;
                }
            }
        }
        (songs, false)
    }

    /// Render the placeholder at the play cursor, if there is one
    pub async fn pre_generate_next(&mut self) -> bool {
        let index = self.queue.current_index();
        let Some(topic) = self.queue.placeholder_topic(index) else {
            return false;
        };
        let lines = self.writer.render(&topic).await;
        let filled = self.queue.fill_placeholder(index, lines);
        if filled {
            debug!(target = "station", index, "Pre-generated conversation");
            self.publish();
        }
        filled
    }

    /// Drive the queue until `cancel` fires or the playlist is exhausted
    pub async fn run(&mut self, cancel: Trigger) {
        if self.queue.is_empty() {
            self.build_initial_queue().await;
        }
        self.running = true;
        self.publish();
        info!(target = "station", mode = ?self.mode, "Radio loop started");

        if let Some(music) = &self.music {
            music.set_volume(self.cfg.volume_percent).await;
        }

        while !cancel.is_fired() {
            if self.queue.remaining() < self.cfg.low_water_mark {
                let report = self.expand().await;
                if self.music.is_some() && report.songs_exhausted() {
                    error!(target = "station", "Playlist exhausted; stopping the session");
                    break;
                }
            }

            let Some((index, item)) = self.queue.advance() else {
                warn!(target = "station", "Queue empty after expansion; stopping");
                break;
            };
            self.publish();

            match item {
                QueueItem::Song(song) => self.play_song(&song, &cancel).await,
                QueueItem::ConversationPlaceholder(topic) => {
                    warn!(target = "station", index, "Conversation was not pre-generated; rendering now");
                    let lines = self.writer.render(&topic).await;
                    self.queue.fill_placeholder(index, lines.clone());
                    self.publish();
                    self.speaker.speak(&lines).await;
                }
                QueueItem::Conversation { lines, .. } => {
                    info!(target = "station", lines = lines.len(), "Playing conversation");
                    self.speaker.speak(&lines).await;
                }
                QueueItem::PreRecorded(clips) => {
                    info!(target = "station", clips = clips.len(), "Playing pre-recorded conversation");
                    self.speaker.play_recorded(&clips).await;
                }
            }
        }

        self.running = false;
        self.publish();
        info!(target = "station", "Radio loop finished");
    }

    async fn play_song(&mut self, song: &Song, cancel: &Trigger) {
        info!(target = "station", song = %song.name, artist = %song.artist, "Now playing");
        let music = match (&self.music, song.is_fallback()) {
            (Some(m), false) => Some(Arc::clone(m)),
            _ => None,
        };
        let playing = match music {
            Some(m) if m.play(song).await => Some(m),
            Some(_) => {
                warn!(target = "station", song = %song.name, "Song did not start; holding the slot");
                None
            }
            None => None,
        };
        let Some(music) = playing else {
            self.pre_generate_next().await;
            tokio::select! {
                _ = sleep(self.cfg.fallback_hold) => {}
                _ = cancel.fired() => {}
            }
            return;
        };

        let mut prepared = false;
        loop {
            let Some(remaining) = music.remaining_ms().await else {
                debug!(target = "station", "Song ended or no playback device; moving on");
                break;
            };
            if remaining < self.cfg.pregen_threshold_ms && !prepared {
                self.pre_generate_next().await;
                prepared = true;
            }
            if remaining < self.cfg.advance_epsilon_ms {
                break;
            }
            tokio::select! {
                _ = sleep(self.cfg.poll_interval) => {}
                _ = cancel.fired() => break,
            }
        }
    }
}

/// Audio files in `dir`, sorted by name. The speaker comes from the file
/// name, alternating Matt/Mollie when the name does not say.
pub fn load_prerecorded(dir: &Path) -> Vec<RecordedClip> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            warn!(target = "station", dir = ?dir, error = %e, "Cannot read pre-recorded clips");
            return Vec::new();
        }
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|x| x.to_str())
                .is_some_and(|x| x.eq_ignore_ascii_case("wav"))
        })
        .collect();
    paths.sort();
    paths
        .into_iter()
        .enumerate()
        .map(|(i, path)| {
            let speaker = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(Speaker::from_file_name)
                .unwrap_or_else(|| Speaker::alternating(i));
            RecordedClip { path, speaker }
        })
        .collect()
}
