// Audio output channels, visualiser and the local live call

pub mod config;
pub use config::MicConfig;

pub mod utils;

pub mod player;
pub use player::{select_channel, HeadlessChannel, PlayerKind, ProcessChannel};

pub mod visualiser;
pub use visualiser::{spawn_visualiser, WaveformMeter};

#[cfg(feature = "mic")]
pub mod mic;

#[cfg(feature = "mic")]
pub use mic::{start_capture, MicHandle};

#[cfg(feature = "mic")]
pub mod live;

#[cfg(feature = "mic")]
pub use live::{LocalLiveSession, SpeakerOutput};
