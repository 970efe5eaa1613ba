//! Local live call: microphone up, realtime voice down, through cpal.

use crate::config::MicConfig;
use crate::mic::start_capture;
use crate::utils::resample_linear;
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use futures::StreamExt;
use onair_core::pcm::REALTIME_SAMPLE_RATE;
use onair_core::realtime::{self, RealtimeConfig, ServerEvent};
use onair_core::{LiveSession, OnAirError, PcmAudio, Result, Trigger};
use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Speaker output fed from a shared sample buffer
pub struct SpeakerOutput {
    buffer: Arc<Mutex<VecDeque<i16>>>,
    device_rate: u32,
    stop: Arc<AtomicBool>,
}

impl SpeakerOutput {
    pub fn start() -> Result<Self> {
        let buffer = Arc::new(Mutex::new(VecDeque::<i16>::new()));
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<std::result::Result<u32, String>>();
        let thread_buf = Arc::clone(&buffer);
        let thread_stop = Arc::clone(&stop);

        std::thread::spawn(move || {
            let host = cpal::default_host();
            let Some(device) = host.default_output_device() else {
                let _ = ready_tx.send(Err("No output device available".into()));
                return;
            };
            let supported = match device.default_output_config() {
                Ok(c) => c,
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("failed to get output config: {e}")));
                    return;
                }
            };
            let rate = supported.sample_rate().0;
            let channels = supported.channels() as usize;
            let stream_cfg: cpal::StreamConfig = supported.clone().into();
            let err_fn = |err: cpal::StreamError| error!(target = "speaker", "cpal output stream error: {}", err);
            let built = match supported.sample_format() {
                cpal::SampleFormat::F32 => device.build_output_stream(
                    &stream_cfg,
                    move |out: &mut [f32], _| {
                        fill_frames(out, channels, &thread_buf, |s| s as f32 / i16::MAX as f32)
                    },
                    err_fn,
                    None,
                ),
                cpal::SampleFormat::I16 => device.build_output_stream(
                    &stream_cfg,
                    move |out: &mut [i16], _| fill_frames(out, channels, &thread_buf, |s| s),
                    err_fn,
                    None,
                ),
                other => {
                    let _ = ready_tx.send(Err(format!("Unsupported sample format: {other:?}")));
                    return;
                }
            };
            let stream = match built {
                Ok(s) => s,
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("failed to build output stream: {e}")));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(format!("failed to start output stream: {e}")));
                return;
            }
            let _ = ready_tx.send(Ok(rate));
            while !thread_stop.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(50));
            }
        });

        match ready_rx.recv() {
            Ok(Ok(device_rate)) => Ok(Self {
                buffer,
                device_rate,
                stop,
            }),
            Ok(Err(e)) => Err(OnAirError::AudioError(e)),
            Err(_) => Err(OnAirError::AudioError("speaker thread exited".into())),
        }
    }

    /// Queue mono PCM16 for playback
    pub fn push(&self, pcm: &PcmAudio) {
        let samples = resample_linear(&pcm.samples, pcm.sample_rate, self.device_rate);
        if let Ok(mut buf) = self.buffer.lock() {
            buf.extend(samples);
        }
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

impl Drop for SpeakerOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

fn fill_frames<T: Copy + Default>(
    out: &mut [T],
    channels: usize,
    buf: &Mutex<VecDeque<i16>>,
    convert: impl Fn(i16) -> T,
) {
    let Ok(mut buf) = buf.lock() else {
        out.iter_mut().for_each(|s| *s = T::default());
        return;
    };
    for frame in out.chunks_mut(channels.max(1)) {
        let v = buf.pop_front().map(&convert).unwrap_or_default();
        frame.iter_mut().for_each(|s| *s = v);
    }
}

/// Phone-in over the local microphone and speakers
pub struct LocalLiveSession {
    realtime: RealtimeConfig,
    mic: MicConfig,
}

impl LocalLiveSession {
    pub fn new(realtime: RealtimeConfig, mic: MicConfig) -> Self {
        Self { realtime, mic }
    }
}

#[async_trait]
impl LiveSession for LocalLiveSession {
    async fn run(&mut self, end: Trigger) -> Result<()> {
        let ws = realtime::connect(&self.realtime).await?;
        let (sink, stream) = ws.split();
        let (mic_rx, mic) = start_capture(self.mic.clone())?;
        let speaker = match SpeakerOutput::start() {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(target = "call", error = %e, "No speaker output; printing text only");
                None
            }
        };
        info!(target = "call", "You're live! Speak into the microphone; type 'end' to hang up.");

        let (events_tx, mut events_rx) = mpsc::channel::<ServerEvent>(64);
        let output = tokio::spawn(async move {
            let mut stdout = std::io::stdout();
            while let Some(event) = events_rx.recv().await {
                match event {
                    ServerEvent::AudioDelta(bytes) => {
                        if let Some(sp) = &speaker {
                            sp.push(&PcmAudio::from_pcm16_le(REALTIME_SAMPLE_RATE, &bytes));
                        }
                    }
                    ServerEvent::TextDelta(t) | ServerEvent::TranscriptDelta(t) => {
                        let _ = write!(stdout, "{t}");
                        let _ = stdout.flush();
                    }
                    ServerEvent::TextDone => {
                        let _ = writeln!(stdout);
                    }
                    ServerEvent::Error(m) => {
                        let _ = writeln!(stdout, "\n[call error] {m}");
                    }
                }
            }
        });

        let result = realtime::run_duplex(sink, stream, mic_rx, events_tx, end).await;
        mic.stop();
        if let Err(e) = output.await {
            warn!(target = "call", error = %e, "Call output task failed");
        }
        result.map(|_| ())
    }
}
