//! Music control through the Spotify Web API.
//!
//! Playback operations degrade gracefully: failures are logged and reported
//! as "not playing" or `false`. Song selection keeps an unreachable service
//! apart from a used-up playlist, since only the latter ends a session.

use crate::queue::Song;
use crate::{OnAirError, Result};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[async_trait]
pub trait MusicControl: Send + Sync {
    /// A random track from `playlist_id` whose URI is not in `played`.
    ///
    /// `Ok(None)` means every track has been played; `Err` means the service
    /// could not be asked.
    async fn random_unplayed_song(
        &self,
        playlist_id: &str,
        played: &[String],
    ) -> Result<Option<Song>>;
    /// Start playing `song`; false if it could not be started
    async fn play(&self, song: &Song) -> bool;
    async fn set_volume(&self, percent: u8);
    /// Milliseconds left in the current track, `None` when nothing is playing
    async fn remaining_ms(&self) -> Option<u64>;
}

#[derive(Clone, Debug)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub api_base: String,
    pub accounts_url: String,
    pub timeout_ms: u64,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        let env = |key: &str| std::env::var(key).unwrap_or_default();
        Self {
            client_id: env("SPOTIFY_CLIENT_ID"),
            client_secret: env("SPOTIFY_CLIENT_SECRET"),
            refresh_token: env("SPOTIFY_REFRESH_TOKEN"),
            api_base: "https://api.spotify.com/v1".to_string(),
            accounts_url: "https://accounts.spotify.com/api/token".to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl SpotifyConfig {
    pub fn is_complete(&self) -> bool {
        !self.client_id.is_empty()
            && !self.client_secret.is_empty()
            && !self.refresh_token.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expiry")]
    expires_in: u64,
}

fn default_expiry() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
struct TracksPage {
    #[serde(default)]
    items: Vec<PlaylistItem>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<Track>,
}

#[derive(Debug, Deserialize)]
struct Track {
    name: String,
    uri: Option<String>,
    #[serde(default)]
    artists: Vec<ArtistRef>,
}

#[derive(Debug, Deserialize)]
struct ArtistRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PlayerState {
    #[serde(default)]
    is_playing: bool,
    progress_ms: Option<u64>,
    item: Option<PlayerItem>,
}

#[derive(Debug, Deserialize)]
struct PlayerItem {
    duration_ms: u64,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct SpotifyClient {
    http: Client,
    cfg: SpotifyConfig,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyClient {
    pub fn new(cfg: SpotifyConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| OnAirError::MusicError(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            cfg,
            token: Mutex::new(None),
        })
    }

    /// `None` unless all three Spotify credentials are present
    pub fn from_env() -> Option<Self> {
        let cfg = SpotifyConfig::default();
        if !cfg.is_complete() {
            info!(target = "music", "Spotify credentials not set; music control disabled");
            return None;
        }
        match Self::new(cfg) {
            Ok(c) => Some(c),
            Err(e) => {
                warn!(target = "music", error = %e, "Music control unavailable");
                None
            }
        }
    }

    async fn access_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(tok) = guard.as_ref() {
            if Instant::now() < tok.expires_at {
                return Ok(tok.value.clone());
            }
        }
        let resp = self
            .http
            .post(&self.cfg.accounts_url)
            .basic_auth(&self.cfg.client_id, Some(&self.cfg.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.cfg.refresh_token.as_str()),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(OnAirError::MusicError(format!(
                "Token refresh failed: status={}",
                resp.status()
            )));
        }
        let tok: TokenResponse = resp.json().await?;
        // Refresh a minute early
        let ttl = Duration::from_secs(tok.expires_in.saturating_sub(60).max(1));
        let value = tok.access_token.clone();
        *guard = Some(CachedToken {
            value: tok.access_token,
            expires_at: Instant::now() + ttl,
        });
        debug!(target = "music", "Refreshed Spotify access token");
        Ok(value)
    }

    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Song>> {
        let token = self.access_token().await?;
        let mut url = Some(format!(
            "{}/playlists/{}/tracks?limit=100",
            self.cfg.api_base, playlist_id
        ));
        let mut songs = Vec::new();
        while let Some(page_url) = url.take() {
            let resp = self.http.get(&page_url).bearer_auth(&token).send().await?;
            if !resp.status().is_success() {
                return Err(OnAirError::MusicError(format!(
                    "Playlist fetch failed: status={}",
                    resp.status()
                )));
            }
            let page: TracksPage = resp.json().await?;
            songs.extend(page.items.into_iter().filter_map(|i| i.track).map(|t| Song {
                name: t.name,
                artist: t
                    .artists
                    .iter()
                    .map(|a| a.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                uri: t.uri,
            }));
            url = page.next;
        }
        Ok(songs)
    }

    async fn try_play(&self, uri: &str) -> Result<()> {
        let token = self.access_token().await?;
        let resp = self
            .http
            .put(format!("{}/me/player/play", self.cfg.api_base))
            .bearer_auth(&token)
            .json(&json!({ "uris": [uri] }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(OnAirError::MusicError(format!(
                "Play failed: status={}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn try_set_volume(&self, percent: u8) -> Result<()> {
        let token = self.access_token().await?;
        let resp = self
            .http
            .put(format!(
                "{}/me/player/volume?volume_percent={}",
                self.cfg.api_base,
                percent.min(100)
            ))
            .bearer_auth(&token)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(OnAirError::MusicError(format!(
                "Volume change failed: status={}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn try_remaining_ms(&self) -> Result<Option<u64>> {
        let token = self.access_token().await?;
        let resp = self
            .http
            .get(format!("{}/me/player", self.cfg.api_base))
            .bearer_auth(&token)
            .send()
            .await?;
        if resp.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(OnAirError::MusicError(format!(
                "Player state failed: status={}",
                resp.status()
            )));
        }
        let state: PlayerState = resp.json().await?;
        Ok(remaining_from_state(&state))
    }
}

fn remaining_from_state(state: &PlayerState) -> Option<u64> {
    if !state.is_playing {
        return None;
    }
    let duration = state.item.as_ref()?.duration_ms;
    Some(duration.saturating_sub(state.progress_ms.unwrap_or(0)))
}

#[async_trait]
impl MusicControl for SpotifyClient {
    async fn random_unplayed_song(
        &self,
        playlist_id: &str,
        played: &[String],
    ) -> Result<Option<Song>> {
        let tracks = self.playlist_tracks(playlist_id).await?;
        let unplayed: Vec<&Song> = tracks
            .iter()
            .filter(|s| s.uri.as_ref().is_some_and(|u| !played.contains(u)))
            .collect();
        let picked = unplayed.choose(&mut rand::thread_rng()).map(|s| (*s).clone());
        if picked.is_none() {
            info!(target = "music", total = tracks.len(), "No unplayed tracks left in playlist");
        }
        Ok(picked)
    }

    async fn play(&self, song: &Song) -> bool {
        let Some(uri) = song.uri.as_deref() else {
            return false;
        };
        match self.try_play(uri).await {
            Ok(()) => {
                info!(target = "music", song = %song.name, artist = %song.artist, "Playing track");
                true
            }
            Err(e) => {
                warn!(target = "music", error = %e, "Could not start playback");
                false
            }
        }
    }

    async fn set_volume(&self, percent: u8) {
        if let Err(e) = self.try_set_volume(percent).await {
            warn!(target = "music", error = %e, "Could not set volume");
        }
    }

    async fn remaining_ms(&self) -> Option<u64> {
        match self.try_remaining_ms().await {
            Ok(r) => r,
            Err(e) => {
                warn!(target = "music", error = %e, "Could not read player state");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_time_requires_active_playback() {
        let playing: PlayerState = serde_json::from_value(json!({
            "is_playing": true,
            "progress_ms": 1000,
            "item": {"duration_ms": 5000}
        }))
        .unwrap();
        assert_eq!(remaining_from_state(&playing), Some(4000));

        let paused: PlayerState = serde_json::from_value(json!({
            "is_playing": false,
            "progress_ms": 1000,
            "item": {"duration_ms": 5000}
        }))
        .unwrap();
        assert_eq!(remaining_from_state(&paused), None);
    }

    #[test]
    fn playlist_page_tolerates_missing_tracks() {
        let page: TracksPage = serde_json::from_value(json!({
            "items": [
                {"track": null},
                {"track": {"name": "A", "uri": "spotify:track:a", "artists": [{"name": "X"}, {"name": "Y"}]}}
            ],
            "next": null
        }))
        .unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.items[0].track.is_none());
        assert_eq!(page.items[1].track.as_ref().unwrap().artists.len(), 2);
    }
}
