use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::error::{VerifyError, VerifyResult};

/// ASCII `1`; any non-zero byte makes zero-filled bad regions detectable.
pub const DEFAULT_MARKER_BYTE: u8 = b'1';
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;
pub const DEFAULT_PROGRESS_EVERY: usize = 1000;

#[derive(Debug, Clone)]
pub struct VerifyOptions {
    pub image: PathBuf,
    pub mapfile: PathBuf,
    pub marker_byte: u8,
    /// Mount each partition at its byte offset inside the image.
    pub use_offsets: bool,
    pub scan: ScanOptions,
}

impl VerifyOptions {
    pub fn new(image: impl Into<PathBuf>, mapfile: impl Into<PathBuf>) -> Self {
        Self {
            image: image.into(),
            mapfile: mapfile.into(),
            marker_byte: DEFAULT_MARKER_BYTE,
            use_offsets: true,
            scan: ScanOptions::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub block_size: usize,
    /// Log a progress line every N files; 0 disables.
    pub progress_every: usize,
    pub cancel_flag: Option<Arc<AtomicBool>>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            progress_every: DEFAULT_PROGRESS_EVERY,
            cancel_flag: None,
        }
    }
}

impl ScanOptions {
    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

pub fn validate_options(options: &VerifyOptions) -> VerifyResult<()> {
    if options.marker_byte == 0 {
        return Err(VerifyError::Precondition(
            "marker byte must be non-zero".to_string(),
        ));
    }
    if options.scan.block_size == 0 {
        return Err(VerifyError::Precondition(
            "checksum block size must be greater than zero".to_string(),
        ));
    }
    if !options.mapfile.is_file() {
        return Err(VerifyError::Precondition(format!(
            "ddrescue log file {} not found",
            options.mapfile.display()
        )));
    }
    if !options.image.is_file() {
        return Err(VerifyError::Precondition(format!(
            "ddrescue filesystem file {} not found",
            options.image.display()
        )));
    }
    Ok(())
}
