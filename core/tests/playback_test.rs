use async_trait::async_trait;
use onair_core::{
    shared_channel, AudioChannel, AudioClip, BroadcastHub, ClipOutcome, HostAudioPacket,
    OnAirError, PcmAudio, PlaybackDriver, Speaker, Trigger,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Instant};

/// Output that plays a clip for its decoded duration, or refuses to start
struct FakeChannel {
    refuse: bool,
    ends_at: Option<Instant>,
}

#[async_trait]
impl AudioChannel for FakeChannel {
    async fn start(&mut self, clip: &AudioClip) -> onair_core::Result<()> {
        if self.refuse {
            return Err(OnAirError::AudioError("device busy".into()));
        }
        let length = clip.load_pcm()?.map(|p| p.duration()).unwrap_or_default();
        self.ends_at = Some(Instant::now() + length);
        Ok(())
    }

    async fn finished(&mut self) {
        if let Some(end) = self.ends_at {
            sleep_until(end).await;
            self.ends_at = None;
        }
    }

    async fn stop(&mut self) {
        self.ends_at = None;
    }
}

/// A one second clip: five 200 ms broadcast slices
fn one_second_clip() -> AudioClip {
    let wav = PcmAudio::new(8_000, vec![0; 8_000]).to_wav_bytes().unwrap();
    AudioClip::in_memory(wav, Some(Speaker::Matt), "hello")
}

fn driver_with_listener(refuse: bool) -> (PlaybackDriver, mpsc::Receiver<HostAudioPacket>) {
    let hub = Arc::new(BroadcastHub::new());
    let (_id, rx) = hub.subscribe(16);
    let driver = PlaybackDriver::new(shared_channel(FakeChannel {
        refuse,
        ends_at: None,
    }))
    .with_hub(hub);
    (driver, rx)
}

fn count(rx: &mut mpsc::Receiver<HostAudioPacket>) -> usize {
    let mut n = 0;
    while rx.try_recv().is_ok() {
        n += 1;
    }
    n
}

#[tokio::test(start_paused = true)]
async fn test_finished_clip_is_broadcast_in_full() {
    let (driver, mut rx) = driver_with_listener(false);
    let clip = one_second_clip();

    assert_eq!(driver.play_clip(&clip, None).await, ClipOutcome::Finished);
    sleep(Duration::from_millis(100)).await;
    assert_eq!(count(&mut rx), 5);
}

#[tokio::test(start_paused = true)]
async fn test_stopping_a_clip_stops_its_broadcast() {
    let (driver, mut rx) = driver_with_listener(false);
    let clip = one_second_clip();
    let trigger = Trigger::new();
    tokio::spawn({
        let trigger = trigger.clone();
        async move {
            sleep(Duration::from_millis(300)).await;
            trigger.fire();
        }
    });

    let outcome = driver.play_clip(&clip, Some(&trigger)).await;
    assert_eq!(outcome, ClipOutcome::Triggered);
    driver.stop_current().await;

    sleep(Duration::from_secs(2)).await;
    // Slices at 0 and 200 ms went out; nothing after the stop
    assert_eq!(count(&mut rx), 2);
}

#[tokio::test(start_paused = true)]
async fn test_clip_that_fails_to_start_is_not_broadcast() {
    let (driver, mut rx) = driver_with_listener(true);
    let clip = one_second_clip();

    assert_eq!(driver.play_clip(&clip, None).await, ClipOutcome::Finished);
    sleep(Duration::from_secs(2)).await;
    assert_eq!(count(&mut rx), 0);
}
