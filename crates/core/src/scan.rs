use std::fs::{File, FileType};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::{VerifyError, VerifyResult};
use crate::model::{ChecksumEntry, ChecksumIndex, ScanProgress};
use crate::options::ScanOptions;

enum ScanTarget {
    Entry { path: PathBuf, file_type: FileType },
    Unreadable { path: PathBuf, reason: String },
}

/// Checksums every non-directory entry below `root`.
///
/// Regular files get a BLAKE3 digest; anything else, and any file that cannot
/// be read, gets a failure marker. Only cancellation aborts the scan.
pub fn scan_tree<F>(
    root: &Path,
    options: &ScanOptions,
    mut on_progress: F,
) -> VerifyResult<ChecksumIndex>
where
    F: FnMut(&ScanProgress),
{
    info!("Scanning filesystem...");
    let targets = collect_targets(root, options)?;
    info!("Done.");

    info!("Building checksum list...");
    let total = targets.len();
    let mut index = ChecksumIndex::new();

    for (position, target) in targets.into_iter().enumerate() {
        if options.is_cancelled() {
            return Err(VerifyError::Interrupted);
        }

        let (path, entry) = match target {
            ScanTarget::Entry { path, file_type } => {
                let entry = checksum_entry(&path, file_type, options.block_size);
                (path, entry)
            }
            ScanTarget::Unreadable { path, reason } => (path, ChecksumEntry::Failed(reason)),
        };

        let key = relative_key(root, &path);
        let progress = ScanProgress {
            done: position + 1,
            total,
            path: key.clone(),
        };
        index.insert(key, entry);

        on_progress(&progress);
        if options.progress_every > 0
            && (progress.done % options.progress_every == 0 || progress.done == total)
        {
            info!("checksummed {}/{} entries", progress.done, total);
        }
    }

    info!("Done.");
    Ok(index)
}

fn collect_targets(root: &Path, options: &ScanOptions) -> VerifyResult<Vec<ScanTarget>> {
    let mut targets = Vec::new();
    for item in WalkDir::new(root).follow_links(false) {
        if options.is_cancelled() {
            return Err(VerifyError::Interrupted);
        }

        let entry = match item {
            Ok(entry) => entry,
            Err(err) => {
                match err.path() {
                    Some(path) if path != root => targets.push(ScanTarget::Unreadable {
                        path: path.to_path_buf(),
                        reason: err.to_string(),
                    }),
                    _ => warn!("walk error under {}: {}", root.display(), err),
                }
                continue;
            }
        };
        if entry.depth() == 0 || entry.file_type().is_dir() {
            continue;
        }
        targets.push(ScanTarget::Entry {
            file_type: entry.file_type(),
            path: entry.into_path(),
        });
    }
    Ok(targets)
}

fn checksum_entry(path: &Path, file_type: FileType, block_size: usize) -> ChecksumEntry {
    if !file_type.is_file() {
        return ChecksumEntry::Failed(format!(
            "not a regular file ({})",
            describe_file_type(file_type)
        ));
    }
    match hash_file(path, block_size) {
        Ok(digest) => ChecksumEntry::Digest(digest),
        Err(err) => {
            warn!("checksum failed for {}: {}", path.display(), err);
            ChecksumEntry::Failed(err.to_string())
        }
    }
}

/// Index key for `path`: relative to `root`, `/`-separated, with a leading `/`.
pub fn relative_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut key = String::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            key.push('/');
            key.push_str(&part.to_string_lossy());
        }
    }
    if key.is_empty() {
        key.push('/');
    }
    key
}

pub fn hash_file(path: &Path, block_size: usize) -> io::Result<String> {
    let block_size = block_size.max(1);
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(block_size, file);
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0_u8; block_size];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

fn describe_file_type(file_type: FileType) -> &'static str {
    if file_type.is_symlink() {
        return "symlink";
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        if file_type.is_block_device() {
            return "block device";
        }
        if file_type.is_char_device() {
            return "character device";
        }
        if file_type.is_fifo() {
            return "fifo";
        }
        if file_type.is_socket() {
            return "socket";
        }
    }
    "special file"
}
