use tracing::{info, warn};

use crate::model::{ChecksumEntry, ChecksumIndex, CorruptedFile, PartitionDiff};

pub const ALL_OK_MESSAGE: &str = "All files are OK!";

/// Compares the scans taken before and after the marker fill.
///
/// Paths unreadable in both scans are inconclusive and listed separately;
/// they do not count as corrupted.
pub fn diff_indices(
    identifier: &str,
    original: &ChecksumIndex,
    modified: &ChecksumIndex,
) -> PartitionDiff {
    let mut diff = PartitionDiff {
        identifier: identifier.to_string(),
        ..PartitionDiff::default()
    };

    for (path, before) in original {
        let after = modified.get(path);
        let corrupted = match (before, after) {
            (_, None) => true,
            (ChecksumEntry::Failed(_), Some(ChecksumEntry::Failed(_))) => {
                diff.unreadable.push(path.clone());
                false
            }
            (ChecksumEntry::Digest(a), Some(ChecksumEntry::Digest(b))) => a != b,
            _ => true,
        };

        if corrupted {
            diff.corrupted.push(CorruptedFile {
                path: path.clone(),
                before: before.clone(),
                after: after.cloned(),
            });
        }
    }

    diff
}

pub fn log_partition_diff(diff: &PartitionDiff) {
    info!("=================================");
    info!("==== Diff for partition \"{}\" ====", diff.identifier);
    info!("=================================");

    for file in &diff.corrupted {
        let after = file
            .after
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "<missing>".to_string());
        warn!(
            "File {} seems corrupted, {} != {}",
            file.path, file.before, after
        );
    }
    for path in &diff.unreadable {
        info!("Failed to create checksum for {path}");
    }

    if diff.is_clean() {
        info!("{ALL_OK_MESSAGE}");
    } else {
        warn!(
            "{} corrupted files have been found :-(",
            diff.corrupted_count()
        );
    }
    info!("");
    info!("---------------------------------------");
    info!("");
}
