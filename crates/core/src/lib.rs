pub mod command;
pub mod diff;
pub mod error;
pub mod mapfile;
pub mod model;
pub mod mount;
pub mod options;
pub mod partition;
pub mod rescue;
pub mod runlog;
pub mod scan;
pub mod verify;

pub use command::{CapturedOutput, CommandRunner, SystemRunner, ToolCommand, ToolStatus};
pub use diff::{diff_indices, log_partition_diff, ALL_OK_MESSAGE};
pub use error::{VerifyError, VerifyResult};
pub use mapfile::{BlockStatus, MapBlock, RescueMap, RescueMapSummary};
pub use model::{
    ChecksumEntry, ChecksumIndex, CorruptedFile, DiffReport, FillPattern, MountRecord,
    PartitionDescriptor, PartitionDiff, PartitionTable, ScanProgress,
};
pub use mount::MountManager;
pub use options::{
    validate_options, ScanOptions, VerifyOptions, DEFAULT_BLOCK_SIZE, DEFAULT_MARKER_BYTE,
    DEFAULT_PROGRESS_EVERY,
};
pub use partition::{inspect_image, mount_records, parse_partition_table};
pub use rescue::RescueInvoker;
pub use runlog::{init_run_log, run_log_file_name};
pub use scan::{hash_file, relative_key, scan_tree};
pub use verify::{Phase, Verifier};
