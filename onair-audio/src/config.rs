//! Capture settings, available with or without the `mic` feature.

use onair_core::pcm::REALTIME_SAMPLE_RATE;

#[derive(Clone, Debug)]
pub struct MicConfig {
    /// Rate of the frames handed to the caller
    pub target_rate_hz: u32,
    /// Frame size in milliseconds
    pub chunk_ms: u32,
    /// Optional input device name substring to match
    pub device_name: Option<String>,
}

impl Default for MicConfig {
    fn default() -> Self {
        Self {
            target_rate_hz: REALTIME_SAMPLE_RATE,
            chunk_ms: std::env::var("MIC_CHUNK_MS")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(40),
            device_name: std::env::var("MIC_DEVICE").ok(),
        }
    }
}
