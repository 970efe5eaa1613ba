use onair_audio::utils::{downmix, resample_linear};
use onair_audio::visualiser::HISTORY_LEN;
use onair_audio::WaveformMeter;
use onair_core::{PcmAudio, PlaybackPosition, Speaker};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn meter_keeps_a_bounded_history() {
    let mut meter = WaveformMeter::new();
    for _ in 0..(HISTORY_LEN + 5) {
        meter.push(0.5);
    }
    assert_eq!(meter.history().count(), HISTORY_LEN);
    let line = meter.render(Some(Speaker::Mollie));
    assert!(line.starts_with("MOLLIE |"));
}

#[test]
fn level_reads_the_window_before_the_position() {
    // First half silent, second half full scale
    let mut samples = vec![0i16; 1_000];
    samples.extend(vec![i16::MAX; 1_000]);
    let pcm = Arc::new(PcmAudio::new(1_000, samples));
    let at = |ms| PlaybackPosition {
        clip_id: "c".into(),
        speaker: Some(Speaker::Matt),
        elapsed: Duration::from_millis(ms),
        pcm: Some(Arc::clone(&pcm)),
    };
    assert_eq!(WaveformMeter::level_at(&at(500)), 0.0);
    assert!(WaveformMeter::level_at(&at(1_900)) > 0.99);

    let silent = PlaybackPosition {
        pcm: None,
        ..at(100)
    };
    assert_eq!(WaveformMeter::level_at(&silent), 0.0);
}

#[test]
fn downmix_and_resample() {
    assert_eq!(downmix(&[100, 300, -100, -300], 2), vec![200, -200]);
    let up = resample_linear(&[0, 100], 1, 2);
    assert_eq!(up, vec![0, 50, 100, 100]);
    assert_eq!(resample_linear(&[1, 2, 3], 24_000, 24_000), vec![1, 2, 3]);
}
