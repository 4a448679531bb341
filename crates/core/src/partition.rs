use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::command::{CommandRunner, ToolCommand};
use crate::error::{VerifyError, VerifyResult};
use crate::model::{MountRecord, PartitionDescriptor, PartitionTable, DEFAULT_SECTOR_SIZE};

pub const SFDISK: &str = "sfdisk";

#[derive(Debug, Deserialize)]
struct SfdiskDump {
    partitiontable: Option<SfdiskTable>,
}

#[derive(Debug, Deserialize)]
struct SfdiskTable {
    label: Option<String>,
    device: Option<String>,
    unit: Option<String>,
    sectorsize: Option<u64>,
    #[serde(default)]
    partitions: Vec<SfdiskPartition>,
}

#[derive(Debug, Deserialize)]
struct SfdiskPartition {
    node: String,
    start: u64,
    size: u64,
    #[serde(rename = "type")]
    part_type: Option<String>,
}

/// Reads the partition table of `image` with `sfdisk --json` and logs it.
pub fn inspect_image(runner: &dyn CommandRunner, image: &Path) -> VerifyResult<PartitionTable> {
    let command = ToolCommand::new(SFDISK).arg("--json").arg(image);
    let output = runner
        .capture(&command)
        .map_err(|err| VerifyError::PartitionTable {
            image: image.to_path_buf(),
            reason: format!("failed to run `{command}`: {err}"),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(VerifyError::PartitionTable {
            image: image.to_path_buf(),
            reason: format!("`{command}` {}: {}", output.status.describe(), stderr.trim()),
        });
    }

    let table = parse_partition_table(image, &output.stdout)?;
    log_partition_table(&table);
    Ok(table)
}

pub fn parse_partition_table(image: &Path, json: &[u8]) -> VerifyResult<PartitionTable> {
    let dump: SfdiskDump =
        serde_json::from_slice(json).map_err(|err| VerifyError::PartitionTable {
            image: image.to_path_buf(),
            reason: format!("unreadable sfdisk output: {err}"),
        })?;

    let raw = dump.partitiontable.ok_or_else(|| VerifyError::PartitionTable {
        image: image.to_path_buf(),
        reason: "no partition table found".to_string(),
    })?;

    Ok(PartitionTable {
        label: raw.label.unwrap_or_else(|| "unknown".to_string()),
        device: raw
            .device
            .unwrap_or_else(|| image.to_string_lossy().to_string()),
        unit: raw.unit.unwrap_or_else(|| "sectors".to_string()),
        sector_size: raw.sectorsize.unwrap_or(DEFAULT_SECTOR_SIZE),
        partitions: raw
            .partitions
            .into_iter()
            .map(|partition| PartitionDescriptor {
                identifier: partition.node,
                start: partition.start,
                size: partition.size,
                part_type: partition.part_type,
            })
            .collect(),
    })
}

fn log_partition_table(table: &PartitionTable) {
    info!(
        "Partition table \"{}\" was found in \"{}\"",
        table.label, table.device
    );
    info!("{} partition(s) found:", table.partitions.len());
    for (index, partition) in table.partitions.iter().enumerate() {
        info!(
            "{}: \"{}\" of type \"{}\" (start {} size {} {})",
            index,
            partition.identifier,
            partition.part_type.as_deref().unwrap_or("unknown"),
            partition.start,
            partition.size,
            table.unit
        );
    }
}

/// Builds one mount record per partition. With `use_offsets` each record
/// addresses its partition by byte range inside the image.
pub fn mount_records(table: &PartitionTable, image: &Path, use_offsets: bool) -> Vec<MountRecord> {
    table
        .partitions
        .iter()
        .map(|partition| {
            let mut record = MountRecord::new(partition.identifier.clone(), image);
            if use_offsets {
                record.offset = Some(partition.start.saturating_mul(table.sector_size));
                record.size = Some(partition.size.saturating_mul(table.sector_size));
            }
            record
        })
        .collect()
}
