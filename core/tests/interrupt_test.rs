use async_trait::async_trait;
use onair_core::{
    shared_channel, AudioChannel, AudioClip, CallConfig, CallHandler, CallOutcome, CallState,
    LiveSession, OnAirError, PcmAudio, PlaybackDriver, Speaker, SpeechLine, SpeechSynthesizer,
    Trigger,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};

type EventLog = Arc<Mutex<Vec<(String, Instant)>>>;

const RATE: u32 = 8_000;

fn wav_of(length: Duration) -> Vec<u8> {
    let samples = (RATE as u128 * length.as_millis() / 1000) as usize;
    PcmAudio::new(RATE, vec![0; samples]).to_wav_bytes().unwrap()
}

/// Output that "plays" a clip for exactly its decoded duration
struct FakeChannel {
    name: &'static str,
    log: EventLog,
    ends_at: Option<Instant>,
}

impl FakeChannel {
    fn record(&self, event: String) {
        self.log.lock().unwrap().push((event, Instant::now()));
    }
}

#[async_trait]
impl AudioChannel for FakeChannel {
    async fn start(&mut self, clip: &AudioClip) -> onair_core::Result<()> {
        let length = clip.load_pcm()?.map(|p| p.duration()).unwrap_or_default();
        self.record(format!("{} start {}", self.name, clip.text));
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
        if self.ends_at.take().is_some() {
            self.record(format!("{} stop", self.name));
        }
    }
}

/// Lines containing "long" last ten seconds, everything else one second
struct ToneSynth;

#[async_trait]
impl SpeechSynthesizer for ToneSynth {
    async fn synthesize(&self, text: &str, _speaker: Speaker) -> onair_core::Result<Vec<u8>> {
        let secs = if text.contains("long") { 10 } else { 1 };
        Ok(wav_of(Duration::from_secs(secs)))
    }
}

struct FakeLive {
    log: EventLog,
    failure: Option<String>,
}

#[async_trait]
impl LiveSession for FakeLive {
    async fn run(&mut self, _end: Trigger) -> onair_core::Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(("live".to_string(), Instant::now()));
        match &self.failure {
            Some(message) => Err(OnAirError::RealtimeError(message.clone())),
            None => Ok(()),
        }
    }
}

fn handler(log: &EventLog, cfg: CallConfig) -> CallHandler {
    let speech = shared_channel(FakeChannel {
        name: "speech",
        log: Arc::clone(log),
        ends_at: None,
    });
    let ring = shared_channel(FakeChannel {
        name: "ring",
        log: Arc::clone(log),
        ends_at: None,
    });
    CallHandler::new(
        PlaybackDriver::new(speech).with_gap(Duration::ZERO),
        ring,
        cfg,
    )
}

fn call_config(ring: Option<Duration>, hangup: Option<Duration>) -> CallConfig {
    CallConfig {
        overlap: Duration::from_millis(500),
        ring_clip: ring.map(|d| AudioClip::in_memory(wav_of(d), None, "ring")),
        hangup_clip: hangup.map(|d| AudioClip::in_memory(wav_of(d), None, "hangup")),
        spool_dir: None,
    }
}

fn at(log: &EventLog, event: &str) -> Option<Duration> {
    let log = log.lock().unwrap();
    let origin = log.first()?.1;
    log.iter()
        .find(|(e, _)| e == event)
        .map(|(_, t)| t.duration_since(origin))
}

fn assert_near(actual: Option<Duration>, expected_ms: u64) {
    let actual = actual.expect("event missing").as_millis() as i128;
    let expected = expected_ms as i128;
    assert!(
        (actual - expected).abs() <= 50,
        "expected ~{expected} ms, got {actual} ms"
    );
}

#[tokio::test(start_paused = true)]
async fn test_call_overlaps_ring_then_stops_speech_and_goes_live() {
    let log: EventLog = Arc::default();
    let handler = handler(
        &log,
        call_config(Some(Duration::from_secs(1)), Some(Duration::from_millis(300))),
    );
    let states = handler.subscribe();

    let call = Trigger::new();
    let end = Trigger::new();
    tokio::spawn({
        let call = call.clone();
        async move {
            sleep(Duration::from_secs(2)).await;
            call.fire();
        }
    });

    let lines = vec![
        SpeechLine::new(Speaker::Matt, "a long opening line"),
        SpeechLine::new(Speaker::Mollie, "a reply"),
    ];
    let mut live = FakeLive {
        log: Arc::clone(&log),
        failure: None,
    };
    let outcome = handler
        .run(lines, Some(Arc::new(ToneSynth)), &call, &end, &mut live)
        .await;

    assert_eq!(outcome, CallOutcome::CallEnded);
    assert_eq!(*states.borrow(), CallState::Ended);

    assert_near(at(&log, "speech start a long opening line"), 0);
    assert_near(at(&log, "ring start ring"), 2_000);
    assert_near(at(&log, "speech stop"), 2_500);
    // The live session waits for the ring to finish
    assert_near(at(&log, "live"), 3_000);
    assert_near(at(&log, "ring start hangup"), 3_000);
    assert!(at(&log, "speech start a reply").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_script_without_call_completes() {
    let log: EventLog = Arc::default();
    let handler = handler(&log, call_config(Some(Duration::from_secs(1)), None));
    let mut live = FakeLive {
        log: Arc::clone(&log),
        failure: None,
    };

    let lines = vec![
        SpeechLine::new(Speaker::Matt, "one"),
        SpeechLine::new(Speaker::Mollie, "two"),
    ];
    let outcome = handler
        .run(lines, Some(Arc::new(ToneSynth)), &Trigger::new(), &Trigger::new(), &mut live)
        .await;

    assert_eq!(outcome, CallOutcome::Completed);
    assert_eq!(handler.state(), CallState::Idle);
    assert_near(at(&log, "speech start one"), 0);
    assert_near(at(&log, "speech start two"), 1_000);
    assert!(at(&log, "ring start ring").is_none());
    assert!(at(&log, "live").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_failed_live_session_is_reported_to_the_user() {
    let log: EventLog = Arc::default();
    let handler = handler(&log, call_config(None, None));
    let mut live = FakeLive {
        log: Arc::clone(&log),
        failure: Some("connection refused".into()),
    };

    // Fired before any line plays: no overlap, straight to the call
    let call = Trigger::new();
    call.fire();
    let lines = vec![SpeechLine::new(Speaker::Matt, "never heard")];
    let outcome = handler
        .run(lines, None, &call, &Trigger::new(), &mut live)
        .await;

    match outcome {
        CallOutcome::CallFailed(message) => {
            assert!(message.starts_with("Could not connect the call"), "{message}");
            assert!(message.contains("connection refused"), "{message}");
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(handler.state(), CallState::Ended);
    assert!(at(&log, "speech stop").is_none());
}
