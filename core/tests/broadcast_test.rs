use base64::Engine as _;
use onair_core::{BroadcastHub, HostAudioPacket, PcmAudio, Speaker};

#[tokio::test(start_paused = true)]
async fn test_closed_listener_is_pruned_and_the_other_gets_every_slice() {
    let hub = BroadcastHub::new();
    let (_open_id, mut open) = hub.subscribe(16);
    let (_closed_id, closed) = hub.subscribe(16);
    drop(closed);

    // One second at 24 kHz: five 200 ms slices of 4800 samples
    let pcm = PcmAudio::new(24_000, (0..24_000).map(|i| i as i16).collect());
    let report = hub.stream_pcm(&pcm, Speaker::Mollie).await;

    assert_eq!(report.delivered, 5);
    assert_eq!(report.pruned, 1);
    assert_eq!(report.dropped, 0);
    assert_eq!(hub.listener_count(), 1);

    let mut received = Vec::new();
    while let Ok(packet) = open.try_recv() {
        received.push(packet);
    }
    assert_eq!(received.len(), 5);
    assert!(received.iter().all(|p| p.event == "media" && p.speaker == "mollie"));
    let first: Vec<i16> = (0..4_800).collect();
    assert_eq!(received[0], HostAudioPacket::from_samples(&first, "mollie"));
}

#[tokio::test(start_paused = true)]
async fn test_clips_are_sent_at_24khz_whatever_their_rate() {
    let hub = BroadcastHub::new();
    let (_id, mut rx) = hub.subscribe(16);

    // A pre-recorded clip at 44.1 kHz
    let pcm = PcmAudio::new(44_100, vec![7; 44_100]);
    let report = hub.stream_pcm(&pcm, Speaker::Matt).await;
    assert_eq!(report.delivered, 5);

    let mut total = 0;
    while let Ok(packet) = rx.try_recv() {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&packet.media.payload)
            .unwrap();
        assert_eq!(bytes.len(), 4_800 * 2);
        total += bytes.len() / 2;
    }
    assert_eq!(total, 24_000);
}

#[test]
fn test_full_listener_drops_without_blocking_others() {
    let hub = BroadcastHub::new();
    let (_slow_id, _slow) = hub.subscribe(1);
    let (_fast_id, mut fast) = hub.subscribe(8);
    let packet = HostAudioPacket::from_samples(&[1, 2, 3], "matt");

    let first = hub.broadcast(&packet);
    assert_eq!(first.delivered, 2);
    let second = hub.broadcast(&packet);
    assert_eq!(second.delivered, 1);
    assert_eq!(second.dropped, 1);
    assert_eq!(second.pruned, 0);

    assert_eq!(hub.listener_count(), 2);
    assert!(fast.try_recv().is_ok());
    assert!(fast.try_recv().is_ok());
}

#[test]
fn test_unsubscribe_removes_listener() {
    let hub = BroadcastHub::new();
    let (id, _rx) = hub.subscribe(4);
    assert_eq!(hub.listener_count(), 1);
    hub.unsubscribe(id);
    assert_eq!(hub.listener_count(), 0);
    let report = hub.broadcast(&HostAudioPacket::from_samples(&[0], "matt"));
    assert_eq!(report.delivered, 0);
}
