use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use onair_audio::MicConfig;
use onair_core::{select_sources, AudioClip, CallConfig, NewsConfig, RealtimeConfig, StationConfig, TtsConfig};

/// High-level configuration for the radio station demo
#[derive(Clone, Debug)]
pub struct RadioStationConfig {
    pub station: StationConfig,
    pub news: NewsConfig,
    pub call: CallConfig,
    pub tts: TtsConfig,
    pub realtime: RealtimeConfig,
    pub mic: MicConfig,
    pub playback: PlaybackConfig,
}

/// Where and how host speech is played
#[derive(Clone, Debug)]
pub struct PlaybackConfig {
    /// Preferred external player (aplay, paplay, ffplay)
    pub player: Option<String>,
    /// Play through the speakers; false keeps only the timing
    pub local: bool,
    /// Pause between consecutive lines
    pub gap_ms: u64,
    /// Spool synthesised speech here instead of keeping it in memory
    pub spool_dir: Option<PathBuf>,
    /// Draw the waveform meter on stderr
    pub visualiser: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            player: std::env::var("ONAIR_PLAYER").ok().filter(|s| !s.is_empty()),
            local: std::env::var("ONAIR_LOCAL_PLAYBACK")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
            gap_ms: 300,
            spool_dir: std::env::var("ONAIR_SPOOL_DIR")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            visualiser: std::env::var("ONAIR_VISUALISER")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
        }
    }
}

impl Default for RadioStationConfig {
    fn default() -> Self {
        Self {
            station: StationConfig::default(),
            news: NewsConfig::default(),
            call: CallConfig::default(),
            tts: TtsConfig::default(),
            realtime: RealtimeConfig::default(),
            mic: MicConfig::default(),
            playback: PlaybackConfig::default(),
        }
    }
}

impl RadioStationConfig {
    /// Load configuration from a TOML file (path via ONAIR_CONFIG or ./radio_station.toml),
    /// overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let path = std::env::var("ONAIR_CONFIG").unwrap_or_else(|_| "radio_station.toml".into());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(p: &Path) -> Self {
        let default = Self::default();
        if !p.exists() {
            tracing::info!(target = "radio_station", path = %p.display(), "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => match toml::from_str::<RadioStationToml>(&s) {
                Ok(t) => t.overlay(default),
                Err(e) => {
                    tracing::warn!(target = "radio_station", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target = "radio_station", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct RadioStationToml {
    pub station: Option<StationToml>,
    pub news: Option<NewsToml>,
    pub call: Option<CallToml>,
    pub tts: Option<TtsToml>,
    pub realtime: Option<RealtimeToml>,
    pub mic: Option<MicToml>,
    pub playback: Option<PlaybackToml>,
}

impl RadioStationToml {
    fn overlay(self, mut base: RadioStationConfig) -> RadioStationConfig {
        if let Some(s) = self.station {
            s.apply(&mut base.station);
        }
        if let Some(n) = self.news {
            n.apply(&mut base.news);
        }
        if let Some(c) = self.call {
            c.apply(&mut base.call);
        }
        if let Some(t) = self.tts {
            t.apply(&mut base.tts);
        }
        if let Some(r) = self.realtime {
            r.apply(&mut base.realtime);
        }
        if let Some(m) = self.mic {
            m.apply(&mut base.mic);
        }
        if let Some(p) = self.playback {
            p.apply(&mut base.playback);
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct StationToml {
    pub songs_per_block: Option<usize>,
    pub low_water_mark: Option<usize>,
    pub poll_interval_ms: Option<u64>,
    pub pregen_threshold_ms: Option<u64>,
    pub advance_epsilon_ms: Option<u64>,
    pub volume_percent: Option<u8>,
    pub fallback_hold_ms: Option<u64>,
    pub playlist_id: Option<String>,
    pub prerecorded_dir: Option<PathBuf>,
}
impl StationToml {
    fn apply(self, s: &mut StationConfig) {
        if let Some(x) = self.songs_per_block {
            s.songs_per_block = x.max(1);
        }
        if let Some(x) = self.low_water_mark {
            s.low_water_mark = x;
        }
        if let Some(x) = self.poll_interval_ms {
            s.poll_interval = Duration::from_millis(x);
        }
        if let Some(x) = self.pregen_threshold_ms {
            s.pregen_threshold_ms = x;
        }
        if let Some(x) = self.advance_epsilon_ms {
            s.advance_epsilon_ms = x;
        }
        if let Some(x) = self.volume_percent {
            s.volume_percent = x.min(100);
        }
        if let Some(x) = self.fallback_hold_ms {
            s.fallback_hold = Duration::from_millis(x);
        }
        if let Some(x) = self.playlist_id {
            s.playlist_id = x;
        }
        if let Some(x) = self.prerecorded_dir {
            s.prerecorded_dir = Some(x);
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct NewsToml {
    /// Feed numbers or names, as accepted by `select_sources`
    pub sources: Option<Vec<String>>,
    pub max_total_articles: Option<usize>,
    pub scrape_full_text: Option<bool>,
}
impl NewsToml {
    fn apply(self, n: &mut NewsConfig) {
        if let Some(x) = self.sources {
            match select_sources(&x) {
                Ok(sources) => n.sources = sources,
                Err(e) => {
                    tracing::warn!(target = "radio_station", error = %e, "Keeping default news sources")
                }
            }
        }
        if let Some(x) = self.max_total_articles {
            n.max_total_articles = x;
        }
        if let Some(x) = self.scrape_full_text {
            n.scrape_full_text = x;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct CallToml {
    pub overlap_ms: Option<u64>,
    pub ring_sound: Option<PathBuf>,
    pub hangup_sound: Option<PathBuf>,
}
impl CallToml {
    fn apply(self, c: &mut CallConfig) {
        if let Some(x) = self.overlap_ms {
            c.overlap = Duration::from_millis(x);
        }
        if let Some(x) = self.ring_sound {
            c.ring_clip = Some(AudioClip::recorded(x, None));
        }
        if let Some(x) = self.hangup_sound {
            c.hangup_clip = Some(AudioClip::recorded(x, None));
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct TtsToml {
    pub model: Option<String>,
    pub matt_voice: Option<String>,
    pub mollie_voice: Option<String>,
    pub timeout_ms: Option<u64>,
}
impl TtsToml {
    fn apply(self, t: &mut TtsConfig) {
        if let Some(x) = self.model {
            t.model = x;
        }
        if let Some(x) = self.matt_voice {
            t.matt_voice = x;
        }
        if let Some(x) = self.mollie_voice {
            t.mollie_voice = x;
        }
        if let Some(x) = self.timeout_ms {
            t.timeout_ms = x;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct RealtimeToml {
    pub url: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub temperature: Option<f64>,
    pub vad_threshold: Option<f64>,
    pub silence_duration_ms: Option<u32>,
}
impl RealtimeToml {
    fn apply(self, r: &mut RealtimeConfig) {
        if let Some(x) = self.url {
            r.url = x;
        }
        if let Some(x) = self.model {
            r.model = x;
        }
        if let Some(x) = self.voice {
            r.voice = x;
        }
        if let Some(x) = self.temperature {
            r.temperature = x;
        }
        if let Some(x) = self.vad_threshold {
            r.vad_threshold = x.clamp(0.0, 1.0);
        }
        if let Some(x) = self.silence_duration_ms {
            r.silence_duration_ms = x;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct MicToml {
    pub chunk_ms: Option<u32>,
    pub device_name: Option<String>,
}
impl MicToml {
    fn apply(self, m: &mut MicConfig) {
        if let Some(x) = self.chunk_ms {
            m.chunk_ms = x;
        }
        if let Some(x) = self.device_name {
            m.device_name = Some(x);
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct PlaybackToml {
    pub player: Option<String>,
    pub local: Option<bool>,
    pub gap_ms: Option<u64>,
    pub spool_dir: Option<PathBuf>,
    pub visualiser: Option<bool>,
}
impl PlaybackToml {
    fn apply(self, p: &mut PlaybackConfig) {
        if let Some(x) = self.player {
            p.player = Some(x);
        }
        if let Some(x) = self.local {
            p.local = x;
        }
        if let Some(x) = self.gap_ms {
            p.gap_ms = x;
        }
        if let Some(x) = self.spool_dir {
            p.spool_dir = Some(x);
        }
        if let Some(x) = self.visualiser {
            p.visualiser = x;
        }
    }
}
