use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type VerifyResult<T> = std::result::Result<T, VerifyError>;

/// Failures that abort a verification run.
///
/// Per-file read failures during a scan are not represented here; they are
/// recorded in the checksum index instead.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("partition table error for {}: {reason}", image.display())]
    PartitionTable { image: PathBuf, reason: String },

    #[error("mounting {identifier} at {} failed: {reason}", target.display())]
    Mount {
        identifier: String,
        target: PathBuf,
        reason: String,
    },

    #[error("unmounting {identifier} from {} failed: {reason}", target.display())]
    Unmount {
        identifier: String,
        target: PathBuf,
        reason: String,
    },

    #[error("ddrescue failed on {}: {reason}", image.display())]
    RescueTool { image: PathBuf, reason: String },

    #[error("failed to initialize run log: {0}")]
    Logging(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("run interrupted by user")]
    Interrupted,

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl VerifyError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
