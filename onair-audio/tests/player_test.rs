use onair_audio::{HeadlessChannel, PlayerKind};
use onair_core::{AudioChannel, AudioClip, PcmAudio, Speaker};
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;

fn one_second_clip() -> AudioClip {
    let wav = PcmAudio::new(8_000, vec![0; 8_000]).to_wav_bytes().unwrap();
    AudioClip::in_memory(wav, Some(Speaker::Matt), "hello")
}

#[tokio::test(start_paused = true)]
async fn headless_channel_finishes_after_clip_duration() {
    let mut ch = HeadlessChannel::new();
    let t0 = Instant::now();
    ch.start(&one_second_clip()).await.unwrap();
    ch.finished().await;
    assert_eq!(t0.elapsed(), Duration::from_secs(1));

    // Idle: resolves immediately
    let t1 = Instant::now();
    ch.finished().await;
    assert_eq!(t1.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn headless_channel_stop_cuts_clip_short() {
    let mut ch = HeadlessChannel::new();
    ch.start(&one_second_clip()).await.unwrap();
    ch.stop().await;
    let t0 = Instant::now();
    ch.finished().await;
    assert_eq!(t0.elapsed(), Duration::ZERO);
}

fn args(kind: PlayerKind, input: Option<&Path>) -> Vec<String> {
    kind.args(input)
        .into_iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect()
}

#[test]
fn player_args_for_files_and_stdin() {
    let file = Path::new("/tmp/x.wav");
    assert_eq!(PlayerKind::from_bin(Path::new("/usr/bin/aplay")), PlayerKind::Aplay);
    assert_eq!(args(PlayerKind::Aplay, Some(file)), vec!["-q", "/tmp/x.wav"]);
    assert_eq!(args(PlayerKind::Aplay, None), vec!["-q", "-"]);
    assert!(args(PlayerKind::Paplay, None).is_empty());
    let ff = args(PlayerKind::Ffplay, None);
    assert_eq!(ff.first().map(String::as_str), Some("-autoexit"));
    assert_eq!(ff.last().map(String::as_str), Some("pipe:0"));
}

#[tokio::test(start_paused = true)]
async fn headless_channel_times_recorded_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("intro.wav");
    let wav = PcmAudio::new(8_000, vec![0; 4_000]).to_wav_bytes().unwrap();
    std::fs::write(&path, wav).unwrap();

    let clip = AudioClip::recorded(path.clone(), Some(Speaker::Mollie));
    let mut ch = HeadlessChannel::new();
    let t0 = Instant::now();
    ch.start(&clip).await.unwrap();
    ch.finished().await;
    assert_eq!(t0.elapsed(), Duration::from_millis(500));

    // Recorded files survive release
    clip.release();
    assert!(path.exists());
}

#[tokio::test(start_paused = true)]
async fn headless_channel_treats_undecodable_files_as_silent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.wav");
    std::fs::write(&path, b"not a wav").unwrap();

    let mut ch = HeadlessChannel::new();
    ch.start(&AudioClip::recorded(path, None)).await.unwrap();
    let t0 = Instant::now();
    ch.finished().await;
    assert_eq!(t0.elapsed(), Duration::ZERO);
}

#[test]
#[serial_test::serial]
fn mic_config_reads_chunk_and_device() {
    std::env::set_var("MIC_CHUNK_MS", "20");
    std::env::set_var("MIC_DEVICE", "USB");
    let cfg = onair_audio::MicConfig::default();
    assert_eq!(cfg.chunk_ms, 20);
    assert_eq!(cfg.device_name.as_deref(), Some("USB"));
    assert_eq!(cfg.target_rate_hz, onair_core::pcm::REALTIME_SAMPLE_RATE);

    std::env::remove_var("MIC_CHUNK_MS");
    std::env::remove_var("MIC_DEVICE");
    assert_eq!(onair_audio::MicConfig::default().chunk_ms, 40);
}
