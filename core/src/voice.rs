//! Text-to-speech for the hosts.
//!
//! `OpenAiTts` calls an OpenAI-compatible `/audio/speech` endpoint and returns
//! WAV bytes. `generate_to_queue` is the producer half of the speech pipeline:
//! it synthesises lines one by one into a bounded playback queue.
//!
//! Env overrides:
//! - OPENAI_API_KEY, OPENAI_BASE_URL
//! - ONAIR_TTS_MODEL (default tts-1)
//! - ONAIR_VOICE_MATT (default echo), ONAIR_VOICE_MOLLIE (default nova)
//! - TTS_TIMEOUT_MS

use crate::pcm::gen_id;
use crate::playback::{AudioClip, QueuedAudio};
use crate::queue::{Speaker, SpeechLine};
use crate::trigger::Trigger;
use crate::{OnAirError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Turns one line of text into WAV audio
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, speaker: Speaker) -> Result<Vec<u8>>;
}

#[derive(Clone, Debug)]
pub struct TtsConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub matt_voice: String,
    pub mollie_voice: String,
    pub response_format: String,
    pub timeout_ms: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        let env_or = |key: &str, default: &str| {
            std::env::var(key)
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        Self {
            base_url: env_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            api_key: std::env::var("OPENAI_API_KEY").ok().filter(|s| !s.is_empty()),
            model: env_or("ONAIR_TTS_MODEL", "tts-1"),
            matt_voice: env_or("ONAIR_VOICE_MATT", "echo"),
            mollie_voice: env_or("ONAIR_VOICE_MOLLIE", "nova"),
            response_format: "wav".to_string(),
            timeout_ms: std::env::var("TTS_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(20_000),
        }
    }
}

impl TtsConfig {
    pub fn voice_for(&self, speaker: Speaker) -> &str {
        match speaker {
            Speaker::Matt => &self.matt_voice,
            Speaker::Mollie => &self.mollie_voice,
        }
    }
}

pub struct OpenAiTts {
    http: Client,
    cfg: TtsConfig,
}

impl OpenAiTts {
    pub fn new(cfg: TtsConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| OnAirError::TtsError(format!("Failed to build HTTP client: {e}")))?;
        info!(target = "tts", model = %cfg.model, matt = %cfg.matt_voice, mollie = %cfg.mollie_voice, "TTS configured");
        Ok(Self { http, cfg })
    }

    /// `None` when no API key is configured; callers then degrade to text-only clips
    pub fn from_env() -> Option<Self> {
        let cfg = TtsConfig::default();
        if cfg.api_key.is_none() {
            warn!(target = "tts", "OPENAI_API_KEY not set; host lines will be printed only");
            return None;
        }
        match Self::new(cfg) {
            Ok(tts) => Some(tts),
            Err(e) => {
                error!(target = "tts", error = %e, "TTS unavailable");
                None
            }
        }
    }

    pub fn config(&self) -> &TtsConfig {
        &self.cfg
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiTts {
    async fn synthesize(&self, text: &str, speaker: Speaker) -> Result<Vec<u8>> {
        let url = format!("{}/audio/speech", self.cfg.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.cfg.model,
            "voice": self.cfg.voice_for(speaker),
            "input": text,
            "response_format": self.cfg.response_format,
        });
        let mut req = self.http.post(&url).json(&body);
        if let Some(key) = &self.cfg.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| OnAirError::TtsError(format!("TTS HTTP error: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(OnAirError::TtsError(format!(
                "TTS error: status={} body={}",
                status, text
            )));
        }
        let bytes = resp.bytes().await?;
        debug!(target = "tts", speaker = %speaker, bytes = bytes.len(), "Synthesised line");
        Ok(bytes.to_vec())
    }
}

/// Synthesise `lines` in order into `tx`, ending with `EndOfStream`.
///
/// `cancel` is checked before each line. A line whose synthesis fails is
/// skipped. Without a synthesiser every line becomes a text-only clip. When
/// `spool_dir` is set clips are written to `onair_<id>_<speaker>.wav` there;
/// a clip the consumer no longer accepts is released here.
pub async fn generate_to_queue(
    synth: Option<Arc<dyn SpeechSynthesizer>>,
    lines: Vec<SpeechLine>,
    tx: mpsc::Sender<QueuedAudio>,
    cancel: Trigger,
    spool_dir: Option<PathBuf>,
) {
    for line in lines {
        if cancel.is_fired() {
            debug!(target = "tts", "Generation cancelled");
            return;
        }
        let clip = match &synth {
            None => AudioClip::text_only(line.speaker, &line.text),
            Some(synth) => match synth.synthesize(&line.text, line.speaker).await {
                Ok(wav) => match spool(&spool_dir, wav, &line).await {
                    Ok(clip) => clip,
                    Err(e) => {
                        warn!(target = "tts", error = %e, "Failed to spool clip; skipping line");
                        continue;
                    }
                },
                Err(e) => {
                    warn!(target = "tts", speaker = %line.speaker, error = %e, "Synthesis failed; skipping line");
                    continue;
                }
            },
        };
        if cancel.is_fired() {
            clip.release();
            return;
        }
        if let Err(mpsc::error::SendError(item)) = tx.send(QueuedAudio::Clip(clip)).await {
            if let QueuedAudio::Clip(clip) = item {
                clip.release();
            }
            debug!(target = "tts", "Playback queue closed; stopping generation");
            return;
        }
    }
    let _ = tx.send(QueuedAudio::EndOfStream).await;
}

async fn spool(dir: &Option<PathBuf>, wav: Vec<u8>, line: &SpeechLine) -> Result<AudioClip> {
    match dir {
        Some(dir) => {
            let path = dir.join(format!("onair_{}_{}.wav", gen_id(), line.speaker));
            tokio::fs::write(&path, &wav).await?;
            Ok(AudioClip::spooled(path, line.speaker, &line.text))
        }
        None => Ok(AudioClip::in_memory(wav, Some(line.speaker), &line.text)),
    }
}
