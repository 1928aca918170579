//! Line-oriented parsing of ffmpeg's diagnostic stream.
//!
//! ffmpeg interleaves free-form log lines with periodic stats lines carrying
//! a `time=HH:MM:SS.cc` marker. The runner classifies every line through
//! [`parse_line`] and turns timecodes into percentages with
//! [`PercentTracker`] instead of pattern-matching at each call site.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TIMECODE_REGEX: Regex =
        Regex::new(r"time=(\d+):(\d{2}):(\d{2})\.(\d{2})").unwrap();
}

/// One classified line of diagnostic output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineEvent {
    /// A stats line carrying the processed-media timestamp, in seconds.
    Timecode(f64),
    /// Anything else (log noise, embedded payload fragments).
    Other,
}

/// Classifies a single diagnostic line.
pub fn parse_line(line: &str) -> LineEvent {
    match timecode_seconds(line) {
        Some(secs) => LineEvent::Timecode(secs),
        None => LineEvent::Other,
    }
}

fn timecode_seconds(line: &str) -> Option<f64> {
    let caps = TIMECODE_REGEX.captures(line)?;
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    let hundredths: f64 = caps[4].parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds + hundredths / 100.0)
}

/// Converts a stream of timecodes into a monotonic percentage in `[0, 100]`.
///
/// With an unknown duration (`<= 0`) nothing is ever emitted; progress
/// reporting degrades to a no-op rather than failing the run.
#[derive(Debug)]
pub struct PercentTracker {
    duration_secs: f64,
    last: Option<u8>,
}

impl PercentTracker {
    pub fn new(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            last: None,
        }
    }

    /// Feeds one line; returns a percentage only when it advances.
    ///
    /// Values are clamped to 100 and never fall below the last emitted
    /// value, even if the underlying timecodes go backwards.
    pub fn observe(&mut self, line: &str) -> Option<u8> {
        if self.duration_secs <= 0.0 {
            return None;
        }
        let LineEvent::Timecode(secs) = parse_line(line) else {
            return None;
        };
        let percent = (secs / self.duration_secs * 100.0).min(100.0).floor() as u8;
        if self.last.is_some_and(|last| percent <= last) {
            return None;
        }
        self.last = Some(percent);
        Some(percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_timecode_from_stats_line() {
        let line = "frame=  241 fps= 48 q=-1.0 size=    2048KiB time=00:01:30.55 bitrate= 185.3kbits/s speed=1.2x";
        assert_eq!(parse_line(line), LineEvent::Timecode(90.55));
    }

    #[test]
    fn classifies_log_noise_as_other() {
        assert_eq!(parse_line("Stream mapping:"), LineEvent::Other);
        assert_eq!(parse_line("  \"input_i\" : \"-20.00\","), LineEvent::Other);
        assert_eq!(parse_line(""), LineEvent::Other);
    }

    #[test]
    fn hours_roll_into_seconds() {
        assert_eq!(parse_line("time=02:00:00.00"), LineEvent::Timecode(7200.0));
    }

    #[test]
    fn percent_sequence_is_monotonic_and_bounded() {
        let mut tracker = PercentTracker::new(100.0);
        let lines = [
            "time=00:00:10.00",
            "time=00:00:25.00",
            "time=00:00:25.00", // repeat, must not re-emit
            "time=00:00:20.00", // goes backwards, must be dropped
            "time=00:01:15.00",
            "time=00:01:40.00",
        ];
        let emitted: Vec<u8> = lines.iter().filter_map(|l| tracker.observe(l)).collect();
        assert_eq!(emitted, vec![10, 25, 75, 100]);
        assert!(emitted.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn overshoot_clamps_to_exactly_100() {
        let mut tracker = PercentTracker::new(3600.0);
        assert_eq!(tracker.observe("time=02:00:00.00"), Some(100));
        assert_eq!(tracker.observe("time=03:00:00.00"), None);
    }

    #[test]
    fn unknown_duration_emits_nothing() {
        let mut tracker = PercentTracker::new(0.0);
        assert_eq!(tracker.observe("time=00:00:10.00"), None);
        let mut tracker = PercentTracker::new(-1.0);
        assert_eq!(tracker.observe("time=00:00:10.00"), None);
    }

    #[test]
    fn fractional_position_floors() {
        // 59.99 / 60 = 99.98% -> 99, never rounds up to 100 early
        let mut tracker = PercentTracker::new(60.0);
        assert_eq!(tracker.observe("time=00:00:59.99"), Some(99));
    }
}
