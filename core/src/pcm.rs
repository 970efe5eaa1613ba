//! PCM helpers shared by playback, broadcast and the realtime session.

use crate::{OnAirError, Result};
use std::io::Cursor;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Sample rate used by the realtime voice service (PCM16 mono)
pub const REALTIME_SAMPLE_RATE: u32 = 24_000;

/// Mono 16-bit PCM
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PcmAudio {
    pub sample_rate: u32,
    pub samples: Vec<i16>,
}

impl PcmAudio {
    pub fn new(sample_rate: u32, samples: Vec<i16>) -> Self {
        Self {
            sample_rate,
            samples,
        }
    }

    /// Decode a WAV container, downmixing to mono
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self> {
        let reader = hound::WavReader::new(Cursor::new(bytes)).map_err(wav_err)?;
        decode(reader)
    }

    pub fn from_wav_file(path: &Path) -> Result<Self> {
        let reader = hound::WavReader::open(path).map_err(wav_err)?;
        decode(reader)
    }

    /// Raw little-endian PCM16 as sent by the realtime service
    pub fn from_pcm16_le(sample_rate: u32, bytes: &[u8]) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        Self::new(sample_rate, samples)
    }

    /// The same audio at `sample_rate`
    pub fn resampled(&self, sample_rate: u32) -> PcmAudio {
        PcmAudio::new(
            sample_rate,
            resample_linear(&self.samples, self.sample_rate, sample_rate),
        )
    }

    pub fn duration(&self) -> Duration {
        duration_of(self.samples.len(), self.sample_rate)
    }

    /// Consecutive slices of `slice_ms`; the last one may be shorter
    pub fn slices(&self, slice_ms: u64) -> std::slice::Chunks<'_, i16> {
        let per_slice = ((self.sample_rate as u64 * slice_ms) / 1000).max(1) as usize;
        self.samples.chunks(per_slice)
    }

    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(wav_err)?;
            for s in &self.samples {
                writer.write_sample(*s).map_err(wav_err)?;
            }
            writer.finalize().map_err(wav_err)?;
        }
        Ok(cursor.into_inner())
    }
}

fn decode<R: std::io::Read>(reader: hound::WavReader<R>) -> Result<PcmAudio> {
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;
    let interleaved: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader
            .into_samples::<i16>()
            .collect::<std::result::Result<_, _>>()
            .map_err(wav_err)?,
        (hound::SampleFormat::Int, bits) => {
            let shift = bits.saturating_sub(16) as u32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| (v >> shift) as i16))
                .collect::<std::result::Result<_, _>>()
                .map_err(wav_err)?
        }
        (hound::SampleFormat::Float, _) => reader
            .into_samples::<f32>()
            .map(|s| s.map(f32_to_i16))
            .collect::<std::result::Result<_, _>>()
            .map_err(wav_err)?,
    };
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|s| *s as i32).sum();
                (sum / frame.len() as i32) as i16
            })
            .collect()
    };
    Ok(PcmAudio::new(spec.sample_rate, samples))
}

fn wav_err(e: hound::Error) -> OnAirError {
    OnAirError::AudioError(format!("WAV error: {e}"))
}

pub fn f32_to_i16(v: f32) -> i16 {
    (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

pub fn pcm16_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

pub fn duration_of(samples: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_micros(samples as u64 * 1_000_000 / sample_rate as u64)
}

/// Linear-interpolation resampler for mono PCM16
pub fn resample_linear(samples: &[i16], from_hz: u32, to_hz: u32) -> Vec<i16> {
    if from_hz == to_hz || samples.is_empty() || from_hz == 0 || to_hz == 0 {
        return samples.to_vec();
    }
    let out_len = (samples.len() as u64 * to_hz as u64 / from_hz as u64) as usize;
    let step = from_hz as f64 / to_hz as f64;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = pos.floor() as usize;
            let frac = pos - idx as f64;
            let a = samples[idx.min(samples.len() - 1)] as f64;
            let b = samples[(idx + 1).min(samples.len() - 1)] as f64;
            (a + (b - a) * frac).round() as i16
        })
        .collect()
}

/// Short unique id for clip and file names
#[inline]
pub(crate) fn gen_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{:x}", nanos)
}
