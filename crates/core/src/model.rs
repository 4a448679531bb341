use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_SECTOR_SIZE: u64 = 512;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartitionDescriptor {
    pub identifier: String,
    /// Start in sectors.
    pub start: u64,
    /// Size in sectors.
    pub size: u64,
    pub part_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartitionTable {
    pub label: String,
    pub device: String,
    pub unit: String,
    pub sector_size: u64,
    pub partitions: Vec<PartitionDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRecord {
    pub identifier: String,
    pub source: PathBuf,
    /// Assigned mount directory; when `None` a fresh temporary one is created.
    pub target: Option<PathBuf>,
    /// Byte offset of the partition inside `source`.
    pub offset: Option<u64>,
    /// Byte length of the partition.
    pub size: Option<u64>,
}

impl MountRecord {
    pub fn new(identifier: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            identifier: identifier.into(),
            source: source.into(),
            target: None,
            offset: None,
            size: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumEntry {
    Digest(String),
    Failed(String),
}

impl ChecksumEntry {
    pub fn is_failed(&self) -> bool {
        matches!(self, ChecksumEntry::Failed(_))
    }
}

impl fmt::Display for ChecksumEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumEntry::Digest(hex) => f.write_str(hex),
            ChecksumEntry::Failed(reason) => write!(f, "<failed: {reason}>"),
        }
    }
}

/// Checksums keyed by `/`-prefixed path relative to the mount root.
pub type ChecksumIndex = BTreeMap<String, ChecksumEntry>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillPattern {
    Marker(u8),
    Zero,
}

impl FillPattern {
    pub fn byte(&self) -> u8 {
        match self {
            FillPattern::Marker(value) => *value,
            FillPattern::Zero => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanProgress {
    pub done: usize,
    pub total: usize,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CorruptedFile {
    pub path: String,
    pub before: ChecksumEntry,
    /// `None` when the path vanished from the second scan.
    pub after: Option<ChecksumEntry>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
pub struct PartitionDiff {
    pub identifier: String,
    pub corrupted: Vec<CorruptedFile>,
    pub unreadable: Vec<String>,
}

impl PartitionDiff {
    pub fn corrupted_count(&self) -> usize {
        self.corrupted.len()
    }

    pub fn is_clean(&self) -> bool {
        self.corrupted.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
pub struct DiffReport {
    pub run_id: String,
    pub partitions: Vec<PartitionDiff>,
}

impl DiffReport {
    pub fn total_corrupted(&self) -> usize {
        self.partitions
            .iter()
            .map(PartitionDiff::corrupted_count)
            .sum()
    }
}
