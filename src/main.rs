use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use audioguard::{CancelToken, EncodeMode, REFERENCE_LUFS, Tools};

#[derive(Parser)]
#[command(
    name = "audioguard",
    version,
    about = "Bring a media file's loudness to a broadcast target with two-pass ffmpeg loudnorm"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Quick EBU R128 readout (integrated loudness and true peak)
    Analyze { input: PathBuf },
    /// Run the measurement pass and print the statistics
    Measure {
        input: PathBuf,
        /// Print the statistics as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Measure, then write a loudness-corrected copy
    Normalize {
        input: PathBuf,
        output: PathBuf,
        /// Video pipeline for the correction pass
        #[arg(long, value_enum, default_value_t = ModeArg::Copy)]
        mode: ModeArg,
        /// Target integrated loudness, LKFS
        #[arg(long, default_value_t = REFERENCE_LUFS, allow_hyphen_values = true)]
        target: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    /// Copy the video stream as-is
    Copy,
    /// Re-encode with software H.264
    X264,
    /// Re-encode via VA-API
    Vaapi,
    /// Re-encode via NVENC
    Nvenc,
}

impl From<ModeArg> for EncodeMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Copy => EncodeMode::StreamCopy,
            ModeArg::X264 => EncodeMode::SoftwareH264,
            ModeArg::Vaapi => EncodeMode::HardwareVaapi,
            ModeArg::Nvenc => EncodeMode::HardwareNvenc,
        }
    }
}

fn percent_bar(message: &'static str) -> ProgressBar {
    let bar = ProgressBar::new(100);
    bar.set_draw_target(ProgressDrawTarget::stderr());
    bar.set_style(
        ProgressStyle::with_template("{msg:12} [{bar:40.cyan/blue}] {pos:>3}%")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.set_message(message);
    bar
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let tools = Tools::locate();
    tools
        .check()
        .context("ffmpeg/ffprobe are required but could not be launched")?;
    let cancel = CancelToken::new();

    match cli.command {
        Command::Analyze { input } => {
            let bar = percent_bar("analyzing");
            let readout = tools
                .analyze(&input, &cancel, |pct| bar.set_position(u64::from(pct)))
                .with_context(|| format!("failed to analyze '{}'", input.display()))?;
            bar.finish_and_clear();
            println!("Integrated: {:.1} LUFS", readout.integrated_lufs);
            println!("True peak:  {:.1} dBFS", readout.true_peak_db);
        }
        Command::Measure { input, json } => {
            let bar = percent_bar("measuring");
            let stats = tools
                .measure(&input, &cancel, |pct| bar.set_position(u64::from(pct)))
                .with_context(|| format!("failed to measure '{}'", input.display()))?;
            bar.finish_and_clear();
            if json {
                let payload = serde_json::json!({
                    "input_i": stats.integrated_loudness,
                    "input_tp": stats.true_peak,
                    "input_lra": stats.loudness_range,
                    "input_thresh": stats.threshold,
                    "target_offset": stats.target_offset,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("Integrated: {:.2} LKFS", stats.integrated_loudness);
                println!("True peak:  {:.2} dBFS", stats.true_peak);
                println!("Range:      {:.2} LU", stats.loudness_range);
                println!("Threshold:  {:.2} LKFS", stats.threshold);
                println!("Offset:     {:.2} dB", stats.target_offset);
            }
        }
        Command::Normalize {
            input,
            output,
            mode,
            target,
        } => {
            let bar = percent_bar("measuring");
            let stats = tools
                .measure(&input, &cancel, |pct| bar.set_position(u64::from(pct)))
                .with_context(|| format!("failed to measure '{}'", input.display()))?;
            bar.finish_and_clear();

            let bar = percent_bar("normalizing");
            tools
                .normalize(
                    &input,
                    &output,
                    &stats,
                    mode.into(),
                    target,
                    &cancel,
                    |pct| bar.set_position(u64::from(pct)),
                )
                .with_context(|| format!("failed to normalize into '{}'", output.display()))?;
            bar.finish_and_clear();
            println!(
                "Normalized to {target} LKFS (was {:.2}): {}",
                stats.integrated_loudness,
                output.display()
            );
        }
    }

    Ok(())
}
