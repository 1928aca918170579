//! Loudness measurement pass.
//!
//! The analysis run executes ffmpeg's `loudnorm` filter in measurement-only
//! mode against the broadcast reference profile (-14 LKFS integrated,
//! -1.0 dBTP ceiling, 11 LU range). The filter mixes its machine-readable
//! statistics into the free-form log stream as a single JSON object, so the
//! parser has to locate that block rather than assume it owns the stream.

use std::path::Path;
use std::process::Command;

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use serde_json::Value;

use crate::error::GuardError;
use crate::ffmpeg::Tools;
use crate::runner::{CancelToken, run_with_progress};

/// Reference loudness profile targeted by both passes.
pub const REFERENCE_LUFS: f64 = -14.0;
pub const TRUE_PEAK_CEILING: f64 = -1.0;
pub const LOUDNESS_RANGE_TARGET: f64 = 11.0;

const MEASUREMENT_FILTER: &str = "loudnorm=I=-14:TP=-1.0:LRA=11:print_format=json";

/// Statistics produced by one measurement pass.
///
/// Produced once, consumed by exactly one correction pass, then discarded.
/// Construction goes through [`LoudnessStats::from_json`], so a record with
/// a missing field cannot exist; non-finite values (a silent input measures
/// `-inf`) are rejected later by [`Tools::normalize`](crate::Tools::normalize).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoudnessStats {
    /// Measured overall loudness, LKFS.
    pub integrated_loudness: f64,
    /// Measured peak level, dBFS.
    pub true_peak: f64,
    /// Loudness range, LU.
    pub loudness_range: f64,
    /// Gating threshold used by the measurement, LKFS.
    pub threshold: f64,
    /// Gain correction recommended to reach the target, dB.
    pub target_offset: f64,
}

impl LoudnessStats {
    /// Maps the loudnorm wire names onto the statistics record.
    ///
    /// ffmpeg emits the numeric values as JSON strings, so both encodings
    /// are accepted.
    pub fn from_json(payload: &Value) -> Result<Self, GuardError> {
        Ok(Self {
            integrated_loudness: numeric_field(payload, "input_i")?,
            true_peak: numeric_field(payload, "input_tp")?,
            loudness_range: numeric_field(payload, "input_lra")?,
            threshold: numeric_field(payload, "input_thresh")?,
            target_offset: numeric_field(payload, "target_offset")?,
        })
    }

    /// Checks every field is usable as a correction-filter parameter.
    pub fn validate(&self) -> Result<(), GuardError> {
        for (name, value) in [
            ("input_i", self.integrated_loudness),
            ("input_tp", self.true_peak),
            ("input_lra", self.loudness_range),
            ("input_thresh", self.threshold),
            ("target_offset", self.target_offset),
        ] {
            if !value.is_finite() {
                return Err(GuardError::InvalidStats(name));
            }
        }
        Ok(())
    }
}

fn numeric_field(payload: &Value, name: &'static str) -> Result<f64, GuardError> {
    let field = payload.get(name);
    match field {
        Some(Value::Number(n)) => n.as_f64().ok_or(GuardError::StatsFieldMissing(name)),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| GuardError::StatsFieldMissing(name)),
        _ => Err(GuardError::StatsFieldMissing(name)),
    }
}

/// Locates the first top-level balanced JSON object embedded in diagnostic
/// text. Log noise before and after is ignored; a brace run that does not
/// parse as JSON is skipped in favor of the next candidate.
pub fn extract_stats_payload(log: &str) -> Option<Value> {
    for (start, _) in log.match_indices('{') {
        let Some(block) = balanced_block(&log[start..]) else {
            continue;
        };
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(block) {
            return Some(value);
        }
    }
    None
}

/// Returns the prefix of `text` covering one balanced `{…}` run, tracking
/// string literals so braces inside quoted values do not skew the depth.
fn balanced_block(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

impl Tools {
    /// Runs the measurement pass and parses its statistics.
    ///
    /// Progress is reported against the probed duration; an unknown duration
    /// silently disables it. No retry is attempted; callers may re-invoke.
    pub fn measure(
        &self,
        input: &Path,
        cancel: &CancelToken,
        on_progress: impl FnMut(u8),
    ) -> Result<LoudnessStats, GuardError> {
        let duration = self.probe_duration(input);
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.arg("-hide_banner")
            .arg("-i")
            .arg(input)
            .args(["-af", MEASUREMENT_FILTER])
            .args(["-f", "null", "-"]);

        let output = run_with_progress(&mut cmd, duration, cancel, on_progress)?;
        if !output.status.success() {
            return Err(GuardError::MeasurementFailed(output.status));
        }

        let payload = extract_stats_payload(&output.log).ok_or(GuardError::StatsNotFound)?;
        let stats = LoudnessStats::from_json(&payload)?;
        debug!(
            "measured {}: I={:.2} LKFS, TP={:.2} dBFS, offset={:.2} dB",
            input.display(),
            stats.integrated_loudness,
            stats.true_peak,
            stats.target_offset
        );
        Ok(stats)
    }

    /// Quick EBU R128 readout for human feedback, without the full
    /// measurement profile. Scrapes the `ebur128` summary instead of a JSON
    /// payload, so it is cheaper to interpret but not usable for correction.
    pub fn analyze(
        &self,
        input: &Path,
        cancel: &CancelToken,
        on_progress: impl FnMut(u8),
    ) -> Result<QuickAnalysis, GuardError> {
        let duration = self.probe_duration(input);
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.arg("-hide_banner")
            .arg("-i")
            .arg(input)
            .args(["-af", "ebur128=peak=true"])
            .args(["-f", "null", "-"]);

        let output = run_with_progress(&mut cmd, duration, cancel, on_progress)?;
        if !output.status.success() {
            return Err(GuardError::MeasurementFailed(output.status));
        }
        QuickAnalysis::from_summary(&output.log).ok_or(GuardError::StatsNotFound)
    }
}

/// Human-feedback readout from the `ebur128` summary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuickAnalysis {
    pub integrated_lufs: f64,
    pub true_peak_db: f64,
}

lazy_static! {
    static ref SUMMARY_I_REGEX: Regex =
        Regex::new(r"(?m)^\s*I:\s*([0-9.+-]+)\s*LUFS\s*$").unwrap();
    static ref SUMMARY_PEAK_REGEX: Regex =
        Regex::new(r"(?m)^\s*Peak:\s*([0-9.+-]+)\s*dBFS\s*$").unwrap();
}

impl QuickAnalysis {
    fn from_summary(log: &str) -> Option<Self> {
        let integrated_lufs = SUMMARY_I_REGEX
            .captures(log)
            .and_then(|c| c[1].parse::<f64>().ok())?;
        let true_peak_db = SUMMARY_PEAK_REGEX
            .captures(log)
            .and_then(|c| c[1].parse::<f64>().ok())
            .unwrap_or(0.0);
        Some(Self {
            integrated_lufs,
            true_peak_db,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const LOUDNORM_LOG: &str = r#"Stream mapping:
  Stream #0:1 -> #0:0 (aac (native) -> pcm_s16le (native))
size=N/A time=00:03:20.00 bitrate=N/A speed=61.1x
[Parsed_loudnorm_0 @ 0x55d1f2]
{
	"input_i" : "-20.00",
	"input_tp" : "-3.00",
	"input_lra" : "7.00",
	"input_thresh" : "-30.00",
	"output_i" : "-14.10",
	"output_tp" : "-1.00",
	"output_lra" : "6.80",
	"output_thresh" : "-24.20",
	"normalization_type" : "dynamic",
	"target_offset" : "6.00"
}
[out#0/null @ 0x55d1f3] video:0KiB audio:37500KiB
"#;

    #[test]
    fn extracts_payload_surrounded_by_log_noise() {
        let payload = extract_stats_payload(LOUDNORM_LOG).unwrap();
        let stats = LoudnessStats::from_json(&payload).unwrap();
        assert_eq!(stats.integrated_loudness, -20.0);
        assert_eq!(stats.true_peak, -3.0);
        assert_eq!(stats.loudness_range, 7.0);
        assert_eq!(stats.threshold, -30.0);
        assert_eq!(stats.target_offset, 6.0);
    }

    #[test]
    fn no_payload_in_plain_log_text() {
        let log = "Stream mapping:\nsize=N/A time=00:00:01.00 bitrate=N/A\n";
        assert!(extract_stats_payload(log).is_none());
    }

    #[test]
    fn unbalanced_braces_are_not_a_payload() {
        assert!(extract_stats_payload("oops { \"input_i\" : \"-20.0\"").is_none());
    }

    #[test]
    fn non_json_brace_runs_are_skipped_for_a_later_candidate() {
        let log = "filter {not json} noise\n{\"input_i\": -20.0}\n";
        let payload = extract_stats_payload(log).unwrap();
        assert_eq!(payload["input_i"], json!(-20.0));
    }

    #[test]
    fn nested_objects_resolve_to_the_top_level_block() {
        let log = "x\n{\"input_i\": \"-20.0\", \"extra\": {\"a\": 1}}\ny";
        let payload = extract_stats_payload(log).unwrap();
        assert!(payload.get("extra").is_some());
    }

    #[test]
    fn braces_inside_string_values_do_not_break_balancing() {
        let log = "{\"note\": \"weird } value\", \"input_i\": \"-20.0\"}";
        assert!(extract_stats_payload(log).is_some());
    }

    #[test]
    fn each_field_is_required() {
        let full = json!({
            "input_i": "-20.0",
            "input_tp": "-3.0",
            "input_lra": "7.0",
            "input_thresh": "-30.0",
            "target_offset": "6.0",
        });
        assert!(LoudnessStats::from_json(&full).is_ok());

        for field in [
            "input_i",
            "input_tp",
            "input_lra",
            "input_thresh",
            "target_offset",
        ] {
            let mut payload = full.clone();
            payload.as_object_mut().unwrap().remove(field);
            match LoudnessStats::from_json(&payload) {
                Err(GuardError::StatsFieldMissing(missing)) => assert_eq!(missing, field),
                other => panic!("expected missing-field error for {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn accepts_numeric_and_string_encodings() {
        let payload = json!({
            "input_i": -20.0,
            "input_tp": "-3.00",
            "input_lra": 7,
            "input_thresh": "-30.00",
            "target_offset": 6.0,
        });
        let stats = LoudnessStats::from_json(&payload).unwrap();
        assert_eq!(stats.true_peak, -3.0);
        assert_eq!(stats.loudness_range, 7.0);
    }

    #[test]
    fn non_finite_measurement_fails_validation() {
        let stats = LoudnessStats {
            integrated_loudness: f64::NEG_INFINITY,
            true_peak: -3.0,
            loudness_range: 7.0,
            threshold: -30.0,
            target_offset: 6.0,
        };
        assert!(matches!(
            stats.validate(),
            Err(GuardError::InvalidStats("input_i"))
        ));
    }

    #[test]
    fn quick_analysis_reads_the_ebur128_summary() {
        let log = "\
[Parsed_ebur128_0 @ 0x5] Summary:

  Integrated loudness:
    I:         -19.8 LUFS
    Threshold: -30.6 LUFS

  Loudness range:
    LRA:         6.4 LU

  True peak:
    Peak:       -2.8 dBFS
";
        let quick = QuickAnalysis::from_summary(log).unwrap();
        assert_eq!(quick.integrated_lufs, -19.8);
        assert_eq!(quick.true_peak_db, -2.8);
    }

    #[test]
    fn quick_analysis_defaults_missing_peak_to_zero() {
        let log = "  I:   -19.8 LUFS\n";
        let quick = QuickAnalysis::from_summary(log).unwrap();
        assert_eq!(quick.true_peak_db, 0.0);
    }
}
