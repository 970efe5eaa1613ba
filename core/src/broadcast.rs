//! Fan-out of host speech to WebSocket listeners.
//!
//! Each listener owns a bounded outbound queue. Delivery is at-most-once: a
//! full queue drops the slice for that listener only, and a closed listener is
//! pruned after the pass that observed it.

use crate::pcm::{pcm16_to_le_bytes, PcmAudio, REALTIME_SAMPLE_RATE};
use crate::queue::Speaker;
use base64::Engine as _;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

pub type ListenerId = u64;

pub const DEFAULT_SLICE_MS: u64 = 200;
pub const DEFAULT_LISTENER_CAPACITY: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPayload {
    pub payload: String,
}

/// One 200 ms slice of host speech as sent on `/ws/host_audio`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostAudioPacket {
    pub event: String,
    pub media: MediaPayload,
    pub speaker: String,
}

impl HostAudioPacket {
    pub fn from_samples(samples: &[i16], speaker: &str) -> Self {
        Self {
            event: "media".to_string(),
            media: MediaPayload {
                payload: base64::engine::general_purpose::STANDARD
                    .encode(pcm16_to_le_bytes(samples)),
            },
            speaker: speaker.to_string(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Outcome of one fan-out pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
    pub pruned: usize,
}

pub struct BroadcastHub {
    listeners: DashMap<ListenerId, mpsc::Sender<HostAudioPacket>>,
    next_id: AtomicU64,
    slice_ms: u64,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::with_slice_ms(DEFAULT_SLICE_MS)
    }

    pub fn with_slice_ms(slice_ms: u64) -> Self {
        Self {
            listeners: DashMap::new(),
            next_id: AtomicU64::new(1),
            slice_ms: slice_ms.max(1),
        }
    }

    pub fn subscribe(&self, capacity: usize) -> (ListenerId, mpsc::Receiver<HostAudioPacket>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.insert(id, tx);
        debug!(target = "broadcast", listener = id, "Listener subscribed");
        (id, rx)
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        if self.listeners.remove(&id).is_some() {
            debug!(target = "broadcast", listener = id, "Listener unsubscribed");
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Push one packet to every listener without waiting on any of them
    pub fn broadcast(&self, packet: &HostAudioPacket) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut closed = Vec::new();
        for entry in self.listeners.iter() {
            match entry.value().try_send(packet.clone()) {
                Ok(()) => report.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    trace!(target = "broadcast", listener = *entry.key(), "Listener queue full; dropping slice");
                    report.dropped += 1;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*entry.key()),
            }
        }
        // Removal happens after the iteration so no shard lock is held twice
        for id in closed {
            self.listeners.remove(&id);
            report.pruned += 1;
            debug!(target = "broadcast", listener = id, "Pruned closed listener");
        }
        report
    }

    /// Cut `pcm` into slices and broadcast them, one slice per slice period.
    ///
    /// Listeners always receive 24 kHz mono PCM16, whatever the clip's rate.
    pub async fn stream_pcm(&self, pcm: &PcmAudio, speaker: Speaker) -> BroadcastReport {
        let pcm = pcm.resampled(REALTIME_SAMPLE_RATE);
        let mut total = BroadcastReport::default();
        let period = Duration::from_millis(self.slice_ms);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        for slice in pcm.slices(self.slice_ms) {
            ticker.tick().await;
            if self.listeners.is_empty() {
                continue;
            }
            let r = self.broadcast(&HostAudioPacket::from_samples(slice, speaker.as_str()));
            total.delivered += r.delivered;
            total.dropped += r.dropped;
            total.pruned += r.pruned;
        }
        total
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}
