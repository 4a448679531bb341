use std::fs;
use std::path::Path;

use crate::error::{VerifyError, VerifyResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    Untried,
    NonTrimmed,
    NonScraped,
    BadSector,
    Finished,
}

impl BlockStatus {
    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "?" => Some(Self::Untried),
            "*" => Some(Self::NonTrimmed),
            "/" => Some(Self::NonScraped),
            "-" => Some(Self::BadSector),
            "+" => Some(Self::Finished),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapBlock {
    pub pos: u64,
    pub size: u64,
    pub status: BlockStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RescueMapSummary {
    pub bad_regions: u64,
    pub bad_bytes: u64,
    pub unfinished_bytes: u64,
    pub rescued_bytes: u64,
}

/// Block list of a ddrescue mapfile. ddrescue fills the `-` blocks.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RescueMap {
    pub current_pos: u64,
    pub blocks: Vec<MapBlock>,
}

impl RescueMap {
    pub fn load(path: &Path) -> VerifyResult<Self> {
        let text = fs::read_to_string(path).map_err(|err| {
            VerifyError::io(format!("failed to read mapfile {}", path.display()), err)
        })?;
        Self::parse(&text).map_err(|reason| {
            VerifyError::Precondition(format!(
                "invalid ddrescue mapfile {}: {reason}",
                path.display()
            ))
        })
    }

    pub fn parse(text: &str) -> Result<Self, String> {
        let mut map = RescueMap::default();
        let mut seen_status_line = false;

        for (line_no, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields = line.split_whitespace().collect::<Vec<_>>();
            let at = |reason: String| format!("line {}: {reason}", line_no + 1);

            if !seen_status_line {
                // current_pos current_status [current_pass]
                let pos = fields
                    .first()
                    .ok_or_else(|| at("empty status line".to_string()))?;
                map.current_pos = parse_number(pos).map_err(at)?;
                seen_status_line = true;
                continue;
            }

            let [pos, size, status] = fields[..] else {
                return Err(at(format!("expected `pos size status`, got `{line}`")));
            };
            let status = BlockStatus::from_symbol(status)
                .ok_or_else(|| at(format!("unknown block status `{status}`")))?;
            map.blocks.push(MapBlock {
                pos: parse_number(pos).map_err(at)?,
                size: parse_number(size).map_err(at)?,
                status,
            });
        }

        if !seen_status_line {
            return Err("missing status line".to_string());
        }
        Ok(map)
    }

    pub fn summary(&self) -> RescueMapSummary {
        let mut summary = RescueMapSummary::default();
        for block in &self.blocks {
            match block.status {
                BlockStatus::BadSector => {
                    summary.bad_regions += 1;
                    summary.bad_bytes = summary.bad_bytes.saturating_add(block.size);
                }
                BlockStatus::Finished => {
                    summary.rescued_bytes = summary.rescued_bytes.saturating_add(block.size);
                }
                _ => {
                    summary.unfinished_bytes = summary.unfinished_bytes.saturating_add(block.size);
                }
            }
        }
        summary
    }
}

fn parse_number(value: &str) -> Result<u64, String> {
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse::<u64>(),
    };
    parsed.map_err(|err| format!("invalid number `{value}`: {err}"))
}
