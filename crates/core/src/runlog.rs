use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{VerifyError, VerifyResult};

pub fn run_log_file_name(started: DateTime<Utc>) -> String {
    format!(
        "ddrescue-ffile-{}.log",
        started.format("%Y-%m-%d_%H:%M:%S")
    )
}

/// Installs the global subscriber: every event goes to stdout and to a
/// timestamped run log in `dir`, in emission order. Returns the log path.
pub fn init_run_log(dir: &Path) -> VerifyResult<PathBuf> {
    let path = dir.join(run_log_file_name(Utc::now()));
    let file = File::create(&path).map_err(|err| {
        VerifyError::io(format!("failed to create run log {}", path.display()), err)
    })?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).without_time())
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .map_err(|err| VerifyError::Logging(err.to_string()))?;

    Ok(path)
}
