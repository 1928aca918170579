//! Progress-tracking process runner.
//!
//! Runs one external command to completion while streaming its stderr,
//! which is where ffmpeg writes both its log and its periodic stats lines.
//! Progress callbacks fire synchronously from the read loop; callers that
//! need the updates on another thread marshal them themselves.

use std::io::{self, BufRead, BufReader};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;

use crate::error::GuardError;
use crate::progress::PercentTracker;

/// Cooperative cancellation for a running pass.
///
/// The token is checked before every read iteration; cancelling kills the
/// child process and the run returns [`GuardError::Cancelled`]. Clone the
/// token and hand a copy to whatever owns the "stop" action.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Everything a pass leaves behind: the accumulated diagnostic text and the
/// child's exit status. Interpreting a non-zero status is the caller's job.
#[derive(Debug)]
pub struct RunOutput {
    pub log: String,
    pub status: ExitStatus,
}

/// Launches `cmd`, streams its stderr line by line, and reports progress.
///
/// Each line carrying a `time=HH:MM:SS.cc` marker is converted to a percent
/// of `duration_secs` and handed to `on_progress`; with an unknown duration
/// (`<= 0`) the callback is never invoked. The full stderr text is
/// accumulated and returned so downstream parsers can scan it for embedded
/// payloads. Blocks until the child exits.
pub fn run_with_progress(
    cmd: &mut Command,
    duration_secs: f64,
    cancel: &CancelToken,
    mut on_progress: impl FnMut(u8),
) -> Result<RunOutput, GuardError> {
    let tool = cmd.get_program().to_string_lossy().into_owned();
    debug!("spawning `{tool}` (duration {duration_secs:.2}s)");

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| GuardError::from_spawn(&tool, e))?;

    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("child stderr was not captured"))?;
    let mut reader = BufReader::new(stderr);

    let mut log = String::new();
    let mut tracker = PercentTracker::new(duration_secs);
    let mut buf = Vec::new();

    loop {
        if cancel.is_cancelled() {
            let _ = child.kill();
            let _ = child.wait();
            return Err(GuardError::Cancelled);
        }

        buf.clear();
        // ffmpeg ends stats lines with '\r' and log lines with '\n';
        // reading up to the next '\r' keeps stats updates timely while the
        // inner split handles any newline-terminated lines in between.
        let read = reader.read_until(b'\r', &mut buf)?;
        if read == 0 {
            break;
        }
        let chunk = String::from_utf8_lossy(&buf);
        for line in chunk.split('\n') {
            let line = line.trim_end_matches('\r');
            if let Some(percent) = tracker.observe(line) {
                on_progress(percent);
            }
        }
        log.push_str(&chunk);
    }

    let status = child.wait()?;
    debug!("`{tool}` exited with {status}");
    Ok(RunOutput { log, status })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_round_trip() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
