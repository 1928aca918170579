//! Discovery of the external ffmpeg/ffprobe binaries and the duration probe.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::debug;

use crate::error::GuardError;

/// Resolved paths to the external tools every pass shells out to.
#[derive(Debug, Clone)]
pub struct Tools {
    pub ffmpeg: String,
    pub ffprobe: String,
}

impl Default for Tools {
    fn default() -> Self {
        Self::locate()
    }
}

impl Tools {
    /// Resolves both binaries: Flatpak's `/app/bin` first, then alongside
    /// the current executable, then the bare name on PATH.
    pub fn locate() -> Self {
        Self {
            ffmpeg: find_binary("ffmpeg"),
            ffprobe: find_binary("ffprobe"),
        }
    }

    /// Verifies both tools can actually be launched.
    ///
    /// Callers should run this once before starting work so a missing
    /// installation surfaces as [`GuardError::MissingTool`] up front rather
    /// than mid-pipeline.
    pub fn check(&self) -> Result<(), GuardError> {
        for (name, program) in [("ffmpeg", &self.ffmpeg), ("ffprobe", &self.ffprobe)] {
            Command::new(program)
                .arg("-version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map_err(|e| GuardError::from_spawn(name, e))?;
        }
        Ok(())
    }

    /// Queries the media duration in seconds.
    ///
    /// Returns `0.0` whenever the probe fails (missing tool, non-zero exit,
    /// no parseable duration). Downstream, a zero duration turns progress
    /// reporting into a no-op instead of failing the whole operation.
    pub fn probe_duration(&self, input: &Path) -> f64 {
        match self.try_probe_duration(input) {
            Some(secs) => secs,
            None => {
                debug!(
                    "could not probe duration of {}; progress reporting disabled",
                    input.display()
                );
                0.0
            }
        }
    }

    fn try_probe_duration(&self, input: &Path) -> Option<f64> {
        let out = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=nw=1:nk=1",
            ])
            .arg(input)
            .stdin(Stdio::null())
            .output()
            .ok()?;
        if !out.status.success() {
            return None;
        }
        let text = String::from_utf8_lossy(&out.stdout);
        text.trim().parse::<f64>().ok().filter(|d| *d > 0.0)
    }
}

fn find_binary(name: &str) -> String {
    let flatpak = PathBuf::from("/app/bin").join(name);
    if flatpak.exists() {
        return flatpak.to_string_lossy().into_owned();
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let local = dir.join(name);
            if local.exists() {
                return local.to_string_lossy().into_owned();
            }
        }
    }
    name.to_owned()
}
