//! Microphone capture for the live call using cpal.
//!
//! Linux build note: you need ALSA development headers for `cpal`.
//! On Debian/Ubuntu:
//!   sudo apt-get update && sudo apt-get install -y libasound2-dev pkg-config
//!
//! The cpal stream is not `Send`, so it lives on a dedicated thread that
//! converts every callback to mono PCM16 at the target rate and forwards
//! fixed-size frames over an mpsc channel.

use crate::config::MicConfig;
use crate::utils::{downmix, resample_linear};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use onair_core::pcm::f32_to_i16;
use onair_core::{OnAirError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Stops the capture thread when stopped or dropped
pub struct MicHandle {
    stop: Arc<AtomicBool>,
}

impl MicHandle {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

impl Drop for MicHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start capturing; frames of `chunk_ms` at `target_rate_hz` arrive on the receiver.
///
/// The receiver closes when the device fails or the handle is stopped.
pub fn start_capture(cfg: MicConfig) -> Result<(mpsc::Receiver<Vec<i16>>, MicHandle)> {
    let (tx, rx) = mpsc::channel::<Vec<i16>>(64);
    let stop = Arc::new(AtomicBool::new(false));
    let stop_thread = Arc::clone(&stop);
    let (ready_tx, ready_rx) = std::sync::mpsc::channel::<std::result::Result<(), String>>();

    std::thread::spawn(move || {
        let stream = match build_stream(&cfg, tx) {
            Ok(s) => s,
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };
        if let Err(e) = stream.play() {
            let _ = ready_tx.send(Err(format!("failed to start input stream: {e}")));
            return;
        }
        let _ = ready_tx.send(Ok(()));
        while !stop_thread.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(50));
        }
        drop(stream);
        info!(target = "mic", "Microphone capture stopped");
    });

    match ready_rx.recv() {
        Ok(Ok(())) => Ok((rx, MicHandle { stop })),
        Ok(Err(e)) => Err(OnAirError::AudioError(e)),
        Err(_) => Err(OnAirError::AudioError("capture thread exited".into())),
    }
}

fn build_stream(
    cfg: &MicConfig,
    tx: mpsc::Sender<Vec<i16>>,
) -> std::result::Result<cpal::Stream, String> {
    let host = cpal::default_host();
    let device = match &cfg.device_name {
        Some(needle) => host
            .input_devices()
            .ok()
            .and_then(|mut devs| {
                devs.find(|d| {
                    d.name()
                        .map(|n| n.to_lowercase().contains(&needle.to_lowercase()))
                        .unwrap_or(false)
                })
            })
            .or_else(|| host.default_input_device()),
        None => host.default_input_device(),
    }
    .ok_or_else(|| "No input device available".to_string())?;

    let supported = device
        .default_input_config()
        .map_err(|e| format!("failed to get default input config: {e}"))?;
    let rate = supported.sample_rate().0;
    let channels = supported.channels();
    let device_name = device.name().unwrap_or_else(|_| "unknown".into());
    if rate != cfg.target_rate_hz {
        warn!(target = "mic", rate, wanted = cfg.target_rate_hz, "Resampling microphone input");
    }
    info!(target = "mic", device = %device_name, rate, channels, "Microphone configured");

    let chunk = (cfg.target_rate_hz as usize * cfg.chunk_ms as usize) / 1000;
    let target = cfg.target_rate_hz;
    let mut acc: Vec<i16> = Vec::with_capacity(chunk * 2);
    let mut emit = move |interleaved: &[i16]| {
        let mono = downmix(interleaved, channels);
        acc.extend(resample_linear(&mono, rate, target));
        while acc.len() >= chunk.max(1) {
            let frame: Vec<i16> = acc.drain(..chunk.max(1)).collect();
            // Dropping under backpressure beats blocking the audio callback
            let _ = tx.try_send(frame);
        }
    };
    let err_fn = |err: cpal::StreamError| error!(target = "mic", "cpal input stream error: {}", err);
    let stream_cfg: cpal::StreamConfig = supported.clone().into();

    match supported.sample_format() {
        cpal::SampleFormat::I16 => device.build_input_stream(
            &stream_cfg,
            move |data: &[i16], _| emit(data),
            err_fn,
            None,
        ),
        cpal::SampleFormat::F32 => device.build_input_stream(
            &stream_cfg,
            move |data: &[f32], _| {
                let converted: Vec<i16> = data.iter().map(|s| f32_to_i16(*s)).collect();
                emit(&converted)
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::U16 => device.build_input_stream(
            &stream_cfg,
            move |data: &[u16], _| {
                let converted: Vec<i16> = data.iter().map(|s| (*s as i32 - 32768) as i16).collect();
                emit(&converted)
            },
            err_fn,
            None,
        ),
        other => return Err(format!("Unsupported sample format: {other:?}")),
    }
    .map_err(|e| format!("failed to build input stream: {e}"))
}
