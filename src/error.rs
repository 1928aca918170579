use std::io;
use std::process::ExitStatus;

use thiserror::Error;

/// Errors surfaced by the loudness pipeline.
///
/// Duration-probe failures are deliberately absent: an unknown duration
/// degrades to skipped progress reporting instead of failing the operation.
#[derive(Debug, Error)]
pub enum GuardError {
    /// An external tool could not be launched at all.
    #[error("`{tool}` could not be launched; install FFmpeg and make sure it is on PATH")]
    MissingTool {
        tool: String,
        #[source]
        source: io::Error,
    },

    /// The analysis pass finished without emitting a statistics payload.
    #[error("no loudness statistics block found in the analysis output")]
    StatsNotFound,

    /// The statistics payload was located but lacks a required field.
    #[error("loudness statistics are missing the `{0}` field")]
    StatsFieldMissing(&'static str),

    /// The measurement pass exited with a failure status.
    #[error("loudness measurement pass failed ({0})")]
    MeasurementFailed(ExitStatus),

    /// A measured value cannot parameterize the correction filter.
    #[error("measured `{0}` is not a finite number; re-run the measurement pass")]
    InvalidStats(&'static str),

    /// The correction pass exited with a failure status. The output file,
    /// if present, must be treated as truncated.
    #[error("normalization pass failed ({0})")]
    NormalizationFailed(ExitStatus),

    /// The run was cancelled through its [`CancelToken`](crate::CancelToken).
    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl GuardError {
    /// Wraps a spawn error, distinguishing a missing binary from other
    /// launch failures.
    pub(crate) fn from_spawn(tool: &str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            GuardError::MissingTool {
                tool: tool.to_owned(),
                source,
            }
        } else {
            GuardError::Io(source)
        }
    }
}
