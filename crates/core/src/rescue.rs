use std::io::Write;
use std::path::Path;
use std::rc::Rc;

use tracing::{info, warn};

use crate::command::{CommandRunner, ToolCommand};
use crate::error::{VerifyError, VerifyResult};
use crate::model::FillPattern;

pub const DDRESCUE: &str = "ddrescue";

/// Drives ddrescue in fill mode over the bad-sector (`-`) regions listed in
/// its mapfile.
pub struct RescueInvoker {
    runner: Rc<dyn CommandRunner>,
}

impl RescueInvoker {
    pub fn new(runner: Rc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub fn apply_fill(
        &self,
        image: &Path,
        mapfile: &Path,
        pattern: FillPattern,
    ) -> VerifyResult<()> {
        match pattern {
            FillPattern::Marker(_) => info!("Filling bad-sector blocks with non-zero bytevalue..."),
            FillPattern::Zero => info!("Restoring bad-sector blocks to zero bytevalue..."),
        }

        let result = self.run_fill(image, mapfile, pattern);
        match &result {
            Ok(()) => info!("Done."),
            Err(_) => warn!("ddrescue command failed"),
        }
        result
    }

    fn run_fill(&self, image: &Path, mapfile: &Path, pattern: FillPattern) -> VerifyResult<()> {
        // Removed on drop, whichever way ddrescue exits.
        let mut fill_file = tempfile::Builder::new()
            .prefix("rescue-ffile-fill-")
            .tempfile()
            .map_err(|err| VerifyError::io("failed to create fill pattern file", err))?;
        fill_file
            .write_all(&[pattern.byte()])
            .and_then(|()| fill_file.flush())
            .map_err(|err| VerifyError::io("failed to write fill pattern file", err))?;

        let command = ToolCommand::new(DDRESCUE)
            .arg("--fill-mode=-")
            .arg(fill_file.path())
            .arg(image)
            .arg(mapfile);

        let status = self
            .runner
            .run(&command)
            .map_err(|err| VerifyError::RescueTool {
                image: image.to_path_buf(),
                reason: format!("failed to run `{command}`: {err}"),
            })?;
        if !status.success() {
            return Err(VerifyError::RescueTool {
                image: image.to_path_buf(),
                reason: format!("`{command}` {}", status.describe()),
            });
        }
        Ok(())
    }
}
