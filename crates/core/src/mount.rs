use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::command::{CommandRunner, ToolCommand};
use crate::error::{VerifyError, VerifyResult};
use crate::model::MountRecord;

pub const MOUNT: &str = "mount";
pub const UMOUNT: &str = "umount";

const MOUNT_DIR_PREFIX: &str = "rescue-ffile-";

struct MountedEntry {
    record: MountRecord,
    target: PathBuf,
    /// Owned scratch directory, removed once the entry is unmounted.
    scratch: Option<TempDir>,
}

/// Owns the registry of active mounts, keyed by partition identifier.
///
/// At most one mount exists per identifier. Anything still registered when
/// the manager is dropped is unmounted on a best-effort basis.
pub struct MountManager {
    runner: Rc<dyn CommandRunner>,
    registry: BTreeMap<String, MountedEntry>,
}

impl MountManager {
    pub fn new(runner: Rc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            registry: BTreeMap::new(),
        }
    }

    pub fn is_mounted(&self, identifier: &str) -> bool {
        self.registry.contains_key(identifier)
    }

    pub fn active_count(&self) -> usize {
        self.registry.len()
    }

    pub fn target(&self, identifier: &str) -> Option<&Path> {
        self.registry
            .get(identifier)
            .map(|entry| entry.target.as_path())
    }

    pub fn active_records(&self) -> impl Iterator<Item = &MountRecord> {
        self.registry.values().map(|entry| &entry.record)
    }

    /// Mounts `record` read-only and returns the mount target. Mounting an
    /// identifier that is already registered returns its existing target.
    pub fn mount(&mut self, record: &MountRecord) -> VerifyResult<PathBuf> {
        if let Some(entry) = self.registry.get(&record.identifier) {
            debug!("{} already mounted at {}", record.identifier, entry.target.display());
            return Ok(entry.target.clone());
        }

        let (target, scratch) = match &record.target {
            Some(target) => (target.clone(), None),
            None => {
                let dir = tempfile::Builder::new()
                    .prefix(MOUNT_DIR_PREFIX)
                    .tempdir()
                    .map_err(|err| VerifyError::io("failed to create mount directory", err))?;
                (dir.path().to_path_buf(), Some(dir))
            }
        };

        info!(
            "Mounting filesystem {} to {}",
            record.identifier,
            target.display()
        );
        let command = mount_command(record, &target);
        let failure = |reason: String| VerifyError::Mount {
            identifier: record.identifier.clone(),
            target: target.clone(),
            reason,
        };

        let status = match self.runner.run(&command) {
            Ok(status) => status,
            Err(err) => {
                warn!("Mounting filesystem failed");
                return Err(failure(format!("failed to run `{command}`: {err}")));
            }
        };
        if !status.success() {
            warn!("Mounting filesystem failed");
            return Err(failure(format!("`{command}` {}", status.describe())));
        }
        info!("Done.");

        let mut mounted = record.clone();
        mounted.target = Some(target.clone());
        self.registry.insert(
            record.identifier.clone(),
            MountedEntry {
                record: mounted,
                target: target.clone(),
                scratch,
            },
        );
        Ok(target)
    }

    /// Unmounts `identifier` if registered. On failure the entry stays
    /// registered so a later sweep can retry.
    pub fn unmount(&mut self, identifier: &str) -> VerifyResult<()> {
        let Some(entry) = self.registry.get(identifier) else {
            debug!("{identifier} is not mounted");
            return Ok(());
        };

        info!(
            "Unmounting filesystem {} mounted in {}",
            identifier,
            entry.target.display()
        );
        let command = ToolCommand::new(UMOUNT).arg(&entry.target);
        let reason = match self.runner.run(&command) {
            Ok(status) if status.success() => None,
            Ok(status) => Some(format!("`{command}` {}", status.describe())),
            Err(err) => Some(format!("failed to run `{command}`: {err}")),
        };

        if let Some(reason) = reason {
            warn!("Unmounting filesystem failed");
            return Err(VerifyError::Unmount {
                identifier: identifier.to_string(),
                target: entry.target.clone(),
                reason,
            });
        }

        self.registry.remove(identifier);
        info!("Done.");
        Ok(())
    }

    /// Best-effort sweep over every registered mount, in identifier order.
    pub fn unmount_all(&mut self) -> Vec<VerifyError> {
        let identifiers = self.registry.keys().cloned().collect::<Vec<_>>();
        let mut failures = Vec::new();
        for identifier in identifiers {
            if let Err(err) = self.unmount(&identifier) {
                warn!("cleanup: {err}");
                failures.push(err);
            }
        }
        failures
    }
}

impl Drop for MountManager {
    fn drop(&mut self) {
        if self.registry.is_empty() {
            return;
        }
        warn!(
            "{} mount(s) still active at shutdown; unmounting",
            self.registry.len()
        );
        self.unmount_all();
        for entry in self.registry.values_mut() {
            // Still a mount point: leave the directory instead of recursing into it.
            if let Some(dir) = entry.scratch.take() {
                warn!("leaving mounted directory {} in place", dir.path().display());
                std::mem::forget(dir);
            }
        }
    }
}

fn mount_command(record: &MountRecord, target: &Path) -> ToolCommand {
    let mut options = String::from("ro");
    if let Some(offset) = record.offset {
        options.push_str(&format!(",loop,offset={offset}"));
        if let Some(size) = record.size {
            options.push_str(&format!(",sizelimit={size}"));
        }
    }

    ToolCommand::new(MOUNT)
        .arg("-o")
        .arg(options)
        .arg("-t")
        .arg("auto")
        .arg(&record.source)
        .arg(target)
}
