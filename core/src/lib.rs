// OnAir Core Library
// AI radio station runtime: queue orchestration, generated dialogue, playback and call handoff

pub mod broadcast;
pub mod dialogue;
pub mod interrupt;
pub mod llm;
pub mod music;
pub mod news;
pub mod pcm;
pub mod playback;
pub mod prompts;
pub mod queue;
pub mod realtime;
pub mod station;
pub mod telemetry;
pub mod trigger;
pub mod voice;

// Export core types
pub use broadcast::{BroadcastHub, BroadcastReport, HostAudioPacket, ListenerId};
pub use dialogue::{
    parse_dialogue, writer_from_env, CannedWriter, ConversationWriter, DialogueGenerator,
};
pub use interrupt::{CallConfig, CallHandler, CallOutcome, CallState, LiveSession};
pub use llm::{ChatModel, LlmClient, LlmClientConfig};
pub use music::{MusicControl, SpotifyClient, SpotifyConfig};
pub use news::{fetch_articles, select_sources, FeedSource, NewsConfig, NewsFetcher};
pub use pcm::PcmAudio;
pub use playback::{
    shared_channel, AudioChannel, AudioClip, ClipOutcome, ClipSource, ConversationSpeaker,
    DrainOutcome, PlaybackDriver, PlaybackPosition, QueuedAudio, SharedChannel, SpeechPipeline,
};
pub use queue::{Article, QueueItem, RadioQueue, RecordedClip, Song, Speaker, SpeechLine, Topic};
pub use realtime::{RealtimeConfig, ServerEvent, SessionEnd};
pub use station::{Station, StationConfig, StationMode, StationSnapshot};
pub use trigger::Trigger;
pub use voice::{OpenAiTts, SpeechSynthesizer, TtsConfig};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OnAirError {
    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("TTS error: {0}")]
    TtsError(String),

    #[error("Music control error: {0}")]
    MusicError(String),

    #[error("News error: {0}")]
    NewsError(String),

    #[error("Audio error: {0}")]
    AudioError(String),

    #[error("Realtime session error: {0}")]
    RealtimeError(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
pub type Result<T> = std::result::Result<T, OnAirError>;
