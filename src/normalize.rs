//! Correction pass.
//!
//! Applies the gain recommended by a prior measurement pass. Feeding the
//! measured values back with `linear=true` makes this a deterministic,
//! single-gain correction instead of a second adaptive analysis — the whole
//! point of the two-pass workflow. Audio always comes out as 192 kb/s AAC
//! for downstream-platform compatibility; the video pipeline is selected by
//! [`EncodeMode`].

use std::path::Path;
use std::process::Command;

use log::debug;

use crate::error::GuardError;
use crate::ffmpeg::Tools;
use crate::loudness::{LoudnessStats, REFERENCE_LUFS};
use crate::runner::{CancelToken, run_with_progress};

const AUDIO_ARGS: [&str; 4] = ["-c:a", "aac", "-b:a", "192k"];

/// Video pipeline used by the correction pass.
///
/// Only the video side varies; the audio correction filter is identical
/// across modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodeMode {
    /// Copy the video stream bit-for-bit; no re-encode.
    #[default]
    StreamCopy,
    /// Software H.264 at a fixed quality/speed tradeoff.
    SoftwareH264,
    /// VA-API hardware encode; requires the nv12 upload step.
    HardwareVaapi,
    /// NVENC hardware encode at a fast preset.
    HardwareNvenc,
}

impl EncodeMode {
    /// Arguments that must precede `-i` (device setup).
    pub fn input_args(self) -> &'static [&'static str] {
        match self {
            EncodeMode::HardwareVaapi => &["-vaapi_device", "/dev/dri/renderD128"],
            _ => &[],
        }
    }

    /// Output-side video arguments.
    pub fn output_args(self) -> &'static [&'static str] {
        match self {
            EncodeMode::StreamCopy => &["-c:v", "copy"],
            EncodeMode::SoftwareH264 => &["-c:v", "libx264", "-preset", "veryfast", "-crf", "18"],
            // hwupload needs frames in a surface-compatible format first
            EncodeMode::HardwareVaapi => &["-vf", "format=nv12,hwupload", "-c:v", "h264_vaapi"],
            EncodeMode::HardwareNvenc => &["-c:v", "h264_nvenc", "-preset", "fast"],
        }
    }
}

/// Builds the linear `loudnorm` correction filter from measured statistics.
///
/// Measured values are formatted with two decimals, matching the precision
/// ffmpeg itself reports them with.
pub fn correction_filter(stats: &LoudnessStats, target_lufs: f64) -> String {
    format!(
        "loudnorm=I={target_lufs}:TP=-1.0:LRA=11:\
         measured_I={:.2}:measured_TP={:.2}:measured_LRA={:.2}:\
         measured_thresh={:.2}:offset={:.2}:linear=true",
        stats.integrated_loudness,
        stats.true_peak,
        stats.loudness_range,
        stats.threshold,
        stats.target_offset,
    )
}

impl Tools {
    /// Runs the correction pass, overwriting `output` if it exists.
    ///
    /// Fails fast with [`GuardError::InvalidStats`] before spawning anything
    /// when a measured value is unusable, and with
    /// [`GuardError::NormalizationFailed`] when ffmpeg exits non-zero — in
    /// which case any partially written output must be discarded.
    #[allow(clippy::too_many_arguments)]
    pub fn normalize(
        &self,
        input: &Path,
        output: &Path,
        stats: &LoudnessStats,
        mode: EncodeMode,
        target_lufs: f64,
        cancel: &CancelToken,
        on_progress: impl FnMut(u8),
    ) -> Result<(), GuardError> {
        stats.validate()?;

        let duration = self.probe_duration(input);
        let filter = correction_filter(stats, target_lufs);
        debug!("correction filter: {filter}");

        let mut cmd = Command::new(&self.ffmpeg);
        cmd.arg("-hide_banner")
            .args(mode.input_args())
            .arg("-i")
            .arg(input)
            .args(["-af", filter.as_str()])
            .args(mode.output_args())
            .args(AUDIO_ARGS)
            .arg("-y")
            .arg(output);

        let result = run_with_progress(&mut cmd, duration, cancel, on_progress)?;
        if !result.status.success() {
            return Err(GuardError::NormalizationFailed(result.status));
        }
        Ok(())
    }

    /// Convenience default: stream-copied video, -14 LKFS target.
    pub fn normalize_default(
        &self,
        input: &Path,
        output: &Path,
        stats: &LoudnessStats,
        cancel: &CancelToken,
        on_progress: impl FnMut(u8),
    ) -> Result<(), GuardError> {
        self.normalize(
            input,
            output,
            stats,
            EncodeMode::default(),
            REFERENCE_LUFS,
            cancel,
            on_progress,
        )
    }
}
