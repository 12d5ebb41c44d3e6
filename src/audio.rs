use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::{debug, warn};
use tokio::process::{Child, Command};

/// One slot per proximity bucket, plus a spare kept for parity with the
/// presentation table indices.
pub const CUE_SLOTS: usize = 4;

/// mpg123 -f interprets 32768 as unity gain.
const UNITY_GAIN_SCALE: f32 = 32768.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    Infinite,
    Once,
}

/// A warning cue: which file to play, into which slot, and how.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CueSpec {
    pub file: &'static str,
    pub slot: usize,
    pub loops: LoopMode,
    pub volume: f32,
}

#[allow(async_fn_in_trait)]
pub trait CuePlayer {
    type Cue;

    /// Resolve a sound file into a reusable playback handle. An unavailable
    /// asset is an error here and the cue is skipped, never fatal.
    fn load(&mut self, path: &Path) -> anyhow::Result<Self::Cue>;

    async fn play(&mut self, cue: &mut Self::Cue, loops: LoopMode, volume: f32);

    async fn stop(&mut self, cue: &mut Self::Cue);
}

/// Fixed table of lazily created playback handles.
///
/// A handle is created on first use, reused afterwards, and kept for the
/// lifetime of the table. At most one slot is playing at any time.
pub struct CueTable<P: CuePlayer> {
    player: P,
    sounds_dir: PathBuf,
    slots: [Option<P::Cue>; CUE_SLOTS],
}

impl<P: CuePlayer> CueTable<P> {
    pub fn new(player: P, sounds_dir: PathBuf) -> Self {
        CueTable {
            player,
            sounds_dir,
            slots: [None, None, None, None],
        }
    }

    /// Start the requested cue and silence every other slot.
    pub async fn trigger(&mut self, cue: &CueSpec) {
        if self.slots[cue.slot].is_none() {
            let path = self.sounds_dir.join(cue.file);
            match self.player.load(&path) {
                Ok(handle) => self.slots[cue.slot] = Some(handle),
                Err(err) => warn!("Cue {} unavailable, skipping: {err:#}", cue.file),
            }
        }

        if let Some(handle) = self.slots[cue.slot].as_mut() {
            debug!("Starting cue {} in slot {}", cue.file, cue.slot);
            self.player.play(handle, cue.loops, cue.volume).await;
        }

        for (slot, handle) in self.slots.iter_mut().enumerate() {
            if slot != cue.slot {
                if let Some(handle) = handle {
                    self.player.stop(handle).await;
                }
            }
        }
    }
}

/// Plays cues by handing the file to an external decoder process.
pub struct ProcessCuePlayer {
    command: String,
}

impl ProcessCuePlayer {
    pub fn new(command: impl Into<String>) -> Self {
        ProcessCuePlayer {
            command: command.into(),
        }
    }
}

pub struct ProcessCue {
    path: PathBuf,
    child: Option<Child>,
}

impl CuePlayer for ProcessCuePlayer {
    type Cue = ProcessCue;

    fn load(&mut self, path: &Path) -> anyhow::Result<ProcessCue> {
        if !path.is_file() {
            anyhow::bail!("no such sound file: {}", path.display());
        }
        Ok(ProcessCue {
            path: path.to_path_buf(),
            child: None,
        })
    }

    async fn play(&mut self, cue: &mut ProcessCue, loops: LoopMode, volume: f32) {
        // Restart the cue from the top if it is already running
        self.stop(cue).await;

        let mut command = Command::new(&self.command);
        command.arg("-q");
        if loops == LoopMode::Infinite {
            command.args(["--loop", "-1"]);
        }
        let scale = (volume * UNITY_GAIN_SCALE).round() as i64;
        command.args(["-f", &scale.to_string()]);
        command.arg(&cue.path);
        command.stdout(Stdio::null()).stderr(Stdio::null());

        match command.spawn() {
            Ok(child) => cue.child = Some(child),
            Err(err) => warn!("Failed to start player for {}: {err}", cue.path.display()),
        }
    }

    async fn stop(&mut self, cue: &mut ProcessCue) {
        if let Some(mut child) = cue.child.take() {
            if let Err(err) = child.kill().await {
                debug!("Failed to stop player for {}: {err}", cue.path.display());
            }
        }
    }
}
