use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use rescue_ffile_core::{
    init_run_log, Verifier, VerifyOptions, DEFAULT_BLOCK_SIZE, DEFAULT_MARKER_BYTE,
    DEFAULT_PROGRESS_EVERY,
};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    name = "rescue-ffile",
    version,
    about = "Check whether the bad sectors of a ddrescue image fall inside real files.",
    override_usage = "rescue-ffile [OPTIONS] <IMAGE> <MAPFILE>"
)]
struct Cli {
    /// Rescued image file followed by its ddrescue mapfile.
    #[arg(value_name = "IMAGE MAPFILE", num_args = 0..)]
    inputs: Vec<PathBuf>,

    /// Non-zero byte written over bad sectors before the second scan (decimal or 0x hex).
    #[arg(long, default_value_t = DEFAULT_MARKER_BYTE, value_parser = parse_marker_byte)]
    marker_byte: u8,

    /// Mount the whole image instead of each partition at its offset.
    #[arg(long)]
    whole_image: bool,

    /// Read block size used while checksumming files.
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE, value_name = "BYTES")]
    block_size: usize,

    /// Log scan progress every N files (0 disables).
    #[arg(long, default_value_t = DEFAULT_PROGRESS_EVERY, value_name = "FILES")]
    progress_every: usize,

    /// Directory for the timestamped run log.
    #[arg(long, default_value = ".", value_name = "DIR")]
    log_dir: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let Ok([image, mapfile]) = <[PathBuf; 2]>::try_from(cli.inputs.clone()) else {
        Cli::command()
            .print_help()
            .context("failed to print usage")?;
        return Ok(());
    };

    run_verify_command(cli, image, mapfile)
}

fn run_verify_command(cli: Cli, image: PathBuf, mapfile: PathBuf) -> Result<()> {
    let log_path = init_run_log(&cli.log_dir)
        .with_context(|| format!("failed to open run log in {}", cli.log_dir.display()))?;
    info!("Run log: {}", log_path.display());

    let cancel_flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&cancel_flag);
    ctrlc::set_handler(move || {
        warn!("interrupt received; stopping after the current step");
        handler_flag.store(true, Ordering::SeqCst);
    })
    .context("failed to set Ctrl+C handler")?;

    let mut options = VerifyOptions::new(image, mapfile);
    options.marker_byte = cli.marker_byte;
    options.use_offsets = !cli.whole_image;
    options.scan.block_size = cli.block_size;
    options.scan.progress_every = cli.progress_every;
    options.scan.cancel_flag = Some(cancel_flag);

    let mut verifier = Verifier::with_system_tools(options);
    let report = verifier.run().context("verification failed")?;

    info!(
        "Checked {} partition(s); {} file(s) touch bad sectors.",
        report.partitions.len(),
        report.total_corrupted()
    );
    Ok(())
}

fn parse_marker_byte(raw: &str) -> Result<u8, String> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => raw.parse::<u8>(),
    }
    .map_err(|err| format!("invalid byte value `{raw}`: {err}"))?;

    if parsed == 0 {
        return Err("marker byte must be non-zero".to_string());
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use clap::error::ErrorKind;
    use clap::Parser;

    use super::{parse_marker_byte, Cli};

    #[test]
    fn marker_byte_accepts_hex_and_decimal() {
        assert_eq!(parse_marker_byte("0x31"), Ok(0x31));
        assert_eq!(parse_marker_byte("255"), Ok(255));
        assert!(parse_marker_byte("0").is_err());
        assert!(parse_marker_byte("0x100").is_err());
    }

    #[test]
    fn positionals_are_collected_without_count_check() {
        let cli = Cli::try_parse_from(["rescue-ffile", "disk.img"]).expect("parses");
        assert_eq!(cli.inputs.len(), 1);

        let cli = Cli::try_parse_from(["rescue-ffile", "disk.img", "disk.map", "--whole-image"])
            .expect("parses");
        assert_eq!(cli.inputs.len(), 2);
        assert!(cli.whole_image);
    }

    #[test]
    fn unknown_flag_is_a_usage_error() {
        let err = Cli::try_parse_from(["rescue-ffile", "--frobnicate"]).expect_err("rejected");
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn help_flag_exits_cleanly() {
        let err = Cli::try_parse_from(["rescue-ffile", "-h"]).expect_err("help short-circuits");
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        assert_eq!(err.exit_code(), 0);
    }
}
