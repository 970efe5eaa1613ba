//! Terminal waveform meter driven by the playback position.
//!
//! Purely decorative: it only reads the latest `PlaybackPosition` from a watch
//! channel, so playback never waits on it.

use onair_core::{PlaybackPosition, Speaker};
use std::collections::VecDeque;
use std::io::Write;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const WINDOW: Duration = Duration::from_millis(100);
pub const HISTORY_LEN: usize = 20;
const BAR_LEVELS: &[char] = &[' ', '.', ':', '-', '=', '+', '*', '#', '@'];

pub struct WaveformMeter {
    history: VecDeque<f32>,
}

impl Default for WaveformMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl WaveformMeter {
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    /// RMS (0.0..=1.0) of the window ending at the current position
    pub fn level_at(pos: &PlaybackPosition) -> f32 {
        let Some(pcm) = pos.pcm.as_ref() else {
            return 0.0;
        };
        let rate = pcm.sample_rate as u128;
        let end = ((pos.elapsed.as_millis() * rate) / 1000) as usize;
        let window = ((WINDOW.as_millis() * rate) / 1000) as usize;
        let end = end.min(pcm.samples.len());
        let start = end.saturating_sub(window);
        rms(&pcm.samples[start..end])
    }

    pub fn push(&mut self, level: f32) {
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(level.clamp(0.0, 1.0));
    }

    pub fn history(&self) -> impl Iterator<Item = f32> + '_ {
        self.history.iter().copied()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    pub fn render(&self, speaker: Option<Speaker>) -> String {
        let label = speaker.map(|s| s.tag()).unwrap_or("");
        let bars: String = self
            .history
            .iter()
            .map(|l| {
                let idx = (l * (BAR_LEVELS.len() - 1) as f32).round() as usize;
                BAR_LEVELS[idx.min(BAR_LEVELS.len() - 1)]
            })
            .collect();
        format!("{label:>6} |{bars:<width$}|", width = HISTORY_LEN)
    }
}

fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|s| {
            let v = *s as f64 / i16::MAX as f64;
            v * v
        })
        .sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Redraw the meter on stderr whenever the position changes
pub fn spawn_visualiser(mut rx: watch::Receiver<Option<PlaybackPosition>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut meter = WaveformMeter::new();
        while rx.changed().await.is_ok() {
            let pos = rx.borrow_and_update().clone();
            let mut err = std::io::stderr();
            match pos {
                Some(pos) => {
                    meter.push(WaveformMeter::level_at(&pos));
                    let _ = write!(err, "\r{}", meter.render(pos.speaker));
                }
                None => {
                    meter.clear();
                    let _ = write!(err, "\r{:width$}\r", "", width = HISTORY_LEN + 10);
                }
            }
            let _ = err.flush();
        }
    })
}
