//! Concrete audio output channels.
//!
//! - `ProcessChannel` plays each clip through an external player process
//!   (aplay, paplay or ffplay). In-memory clips are piped to its stdin.
//! - `HeadlessChannel` plays nothing and completes after the clip's duration,
//!   which keeps timing realistic on machines without audio output.
//!
//! Env overrides:
//! - ONAIR_PLAYER (preferred player name), ONAIR_PLAYER_BIN (explicit binary)

use crate::utils::{get_from_env_or_path, get_from_path};
use async_trait::async_trait;
use onair_core::playback::shared_channel;
use onair_core::{AudioChannel, AudioClip, ClipSource, Result, SharedChannel};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerKind {
    Aplay,
    Paplay,
    Ffplay,
    Other,
}

impl PlayerKind {
    pub fn from_bin(bin: &Path) -> Self {
        match bin.file_name().and_then(|s| s.to_str()).unwrap_or("") {
            "aplay" => PlayerKind::Aplay,
            "paplay" => PlayerKind::Paplay,
            "ffplay" => PlayerKind::Ffplay,
            _ => PlayerKind::Other,
        }
    }

    /// Arguments for playing `input`, or stdin when `None`
    pub fn args(&self, input: Option<&Path>) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        match self {
            PlayerKind::Aplay => args.push("-q".into()),
            PlayerKind::Ffplay => {
                for a in ["-autoexit", "-nodisp", "-loglevel", "quiet"] {
                    args.push(a.into());
                }
            }
            PlayerKind::Paplay | PlayerKind::Other => {}
        }
        match (input, self) {
            (Some(p), _) => args.push(p.as_os_str().to_owned()),
            (None, PlayerKind::Ffplay) => args.push("pipe:0".into()),
            (None, PlayerKind::Aplay) => args.push("-".into()),
            (None, _) => {}
        }
        args
    }
}

/// Pick a player binary: explicit binary, then preference, then aplay/paplay/ffplay
pub fn select_player(pref: Option<&str>) -> Option<PathBuf> {
    if let Some(bin) = get_from_env_or_path("ONAIR_PLAYER_BIN", pref.unwrap_or("aplay")) {
        return Some(bin);
    }
    get_from_path("aplay")
        .or_else(|| get_from_path("paplay"))
        .or_else(|| get_from_path("ffplay"))
}

pub struct ProcessChannel {
    bin: PathBuf,
    kind: PlayerKind,
    child: Option<Child>,
}

impl ProcessChannel {
    pub fn new(bin: PathBuf) -> Self {
        let kind = PlayerKind::from_bin(&bin);
        Self {
            bin,
            kind,
            child: None,
        }
    }

    pub fn detect(pref: Option<&str>) -> Option<Self> {
        select_player(pref).map(Self::new)
    }

    pub fn kind(&self) -> PlayerKind {
        self.kind
    }
}

#[async_trait]
impl AudioChannel for ProcessChannel {
    async fn start(&mut self, clip: &AudioClip) -> Result<()> {
        self.stop().await;
        let mut cmd = Command::new(&self.bin);
        cmd.stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        match &clip.source {
            ClipSource::File { path, .. } => {
                cmd.args(self.kind.args(Some(path))).stdin(Stdio::null());
                self.child = Some(cmd.spawn()?);
            }
            ClipSource::Memory(bytes) => {
                cmd.args(self.kind.args(None)).stdin(Stdio::piped());
                let mut child = cmd.spawn()?;
                if let Some(mut stdin) = child.stdin.take() {
                    let bytes = Arc::clone(bytes);
                    tokio::spawn(async move {
                        // The player closing early (forced stop) surfaces as a broken pipe
                        if let Err(e) = stdin.write_all(&bytes).await {
                            debug!(target = "player", error = %e, "Player stdin closed early");
                        }
                    });
                }
                self.child = Some(child);
            }
            ClipSource::TextOnly => {}
        }
        Ok(())
    }

    async fn finished(&mut self) {
        if let Some(child) = self.child.as_mut() {
            match child.wait().await {
                Ok(status) if !status.success() => {
                    warn!(target = "player", %status, "Player exited with failure")
                }
                Ok(_) => {}
                Err(e) => warn!(target = "player", error = %e, "Failed to wait on player"),
            }
            self.child = None;
        }
    }

    async fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                debug!(target = "player", error = %e, "Player already gone");
            }
        }
    }
}

/// Completes each clip after its decoded duration without producing sound
#[derive(Default)]
pub struct HeadlessChannel {
    deadline: Option<Instant>,
}

impl HeadlessChannel {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AudioChannel for HeadlessChannel {
    async fn start(&mut self, clip: &AudioClip) -> Result<()> {
        let duration = match clip.load_pcm() {
            Ok(pcm) => pcm.map(|p| p.duration()).unwrap_or(Duration::ZERO),
            Err(e) => {
                warn!(target = "player", error = %e, "Cannot decode clip; treating as silent");
                Duration::ZERO
            }
        };
        self.deadline = Some(Instant::now() + duration);
        Ok(())
    }

    async fn finished(&mut self) {
        if let Some(deadline) = self.deadline {
            sleep_until(deadline).await;
            self.deadline = None;
        }
    }

    async fn stop(&mut self) {
        self.deadline = None;
    }
}

/// External player when one is installed and `local_playback` is on, headless otherwise
pub fn select_channel(pref: Option<&str>, local_playback: bool) -> SharedChannel {
    if local_playback {
        if let Some(ch) = ProcessChannel::detect(pref) {
            info!(target = "player", bin = ?ch.bin, "Using external audio player");
            return shared_channel(ch);
        }
        info!(target = "player", "No audio player found; using headless playback");
    }
    shared_channel(HeadlessChannel::new())
}
