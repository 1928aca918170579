//! Two-pass EBU R128 loudness normalization driven through an external
//! ffmpeg installation.
//!
//! Pass 1 ([`Tools::measure`]) runs the `loudnorm` filter in
//! measurement-only mode and scrapes the statistics block it embeds in the
//! diagnostic stream. Pass 2 ([`Tools::normalize`]) feeds those statistics
//! back as a linear gain correction, with the video pipeline selected by
//! [`EncodeMode`]. Both passes stream ffmpeg's stderr line by line, turning
//! `time=` markers into monotonic percentages for a caller-supplied sink.
//!
//! Every operation blocks the calling thread for the lifetime of the child
//! process; progress callbacks fire from that same thread. Callers wanting a
//! responsive front-end run each pass on a worker and pass a clone of the
//! [`CancelToken`] to their stop action.
//!
//! ```no_run
//! use std::path::Path;
//! use audioguard::{CancelToken, EncodeMode, Tools};
//!
//! # fn main() -> Result<(), audioguard::GuardError> {
//! let tools = Tools::locate();
//! tools.check()?;
//!
//! let cancel = CancelToken::new();
//! let stats = tools.measure(Path::new("in.mp4"), &cancel, |pct| {
//!     eprintln!("measuring: {pct}%");
//! })?;
//! tools.normalize(
//!     Path::new("in.mp4"),
//!     Path::new("out.mp4"),
//!     &stats,
//!     EncodeMode::StreamCopy,
//!     -14.0,
//!     &cancel,
//!     |pct| eprintln!("normalizing: {pct}%"),
//! )?;
//! # Ok(())
//! # }
//! ```

mod error;
mod ffmpeg;
mod loudness;
mod normalize;
mod progress;
mod runner;

pub use error::GuardError;
pub use ffmpeg::Tools;
pub use loudness::{
    LOUDNESS_RANGE_TARGET, LoudnessStats, QuickAnalysis, REFERENCE_LUFS, TRUE_PEAK_CEILING,
    extract_stats_payload,
};
pub use normalize::{EncodeMode, correction_filter};
pub use progress::{LineEvent, PercentTracker, parse_line};
pub use runner::{CancelToken, RunOutput, run_with_progress};
