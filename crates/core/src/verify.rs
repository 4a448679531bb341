use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::command::{CommandRunner, SystemRunner};
use crate::diff::{diff_indices, log_partition_diff};
use crate::error::{VerifyError, VerifyResult};
use crate::mapfile::RescueMap;
use crate::model::{ChecksumIndex, DiffReport, FillPattern, MountRecord};
use crate::mount::MountManager;
use crate::options::{validate_options, VerifyOptions};
use crate::partition::{inspect_image, mount_records};
use crate::rescue::RescueInvoker;
use crate::scan::scan_tree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Discover,
    BeforeScan,
    Corrupt,
    AfterScan,
    Restore,
    Diff,
    Cleanup,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Discover => "discover",
            Phase::BeforeScan => "before-scan",
            Phase::Corrupt => "corrupt",
            Phase::AfterScan => "after-scan",
            Phase::Restore => "restore",
            Phase::Diff => "diff",
            Phase::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// Runs the before/after checksum comparison over every partition of a
/// rescued image.
pub struct Verifier {
    options: VerifyOptions,
    runner: Rc<dyn CommandRunner>,
    mounts: MountManager,
    rescue: RescueInvoker,
    run_id: String,
    phase: Option<Phase>,
    restore_pending: bool,
}

impl Verifier {
    pub fn new(options: VerifyOptions, runner: Rc<dyn CommandRunner>) -> Self {
        Self {
            options,
            mounts: MountManager::new(Rc::clone(&runner)),
            rescue: RescueInvoker::new(Rc::clone(&runner)),
            runner,
            run_id: Uuid::new_v4().to_string(),
            phase: None,
            restore_pending: false,
        }
    }

    pub fn with_system_tools(options: VerifyOptions) -> Self {
        Self::new(options, Rc::new(SystemRunner))
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn mounts(&self) -> &MountManager {
        &self.mounts
    }

    /// Last phase entered; `Cleanup` once `run` has returned.
    pub fn phase(&self) -> Option<Phase> {
        self.phase
    }

    /// Runs every phase, then cleanup. A phase error is returned only after
    /// cleanup has unmounted everything still registered.
    pub fn run(&mut self) -> VerifyResult<DiffReport> {
        info!(
            "run {}: verifying {} against mapfile {}",
            self.run_id,
            self.options.image.display(),
            self.options.mapfile.display()
        );

        let outcome = self.run_phases();
        if let Err(err) = &outcome {
            error!("run aborted during {}: {err}", self.phase_name());
        }
        self.cleanup();
        outcome
    }

    fn run_phases(&mut self) -> VerifyResult<DiffReport> {
        validate_options(&self.options)?;

        self.enter(Phase::Discover)?;
        let table = inspect_image(self.runner.as_ref(), &self.options.image)?;
        let summary = RescueMap::load(&self.options.mapfile)?.summary();
        info!(
            "mapfile lists {} bad-sector region(s) totalling {} bytes ({} bytes not yet tried or trimmed)",
            summary.bad_regions, summary.bad_bytes, summary.unfinished_bytes
        );
        if summary.bad_bytes == 0 {
            warn!("mapfile has no bad-sector regions; the fill will not change the image");
        }

        let records = mount_records(&table, &self.options.image, self.options.use_offsets);
        let mut report = DiffReport {
            run_id: self.run_id.clone(),
            partitions: Vec::new(),
        };
        if records.is_empty() {
            warn!("no partitions found; nothing to verify");
            return Ok(report);
        }

        self.enter(Phase::BeforeScan)?;
        let original = self.scan_partitions(&records)?;

        self.enter(Phase::Corrupt)?;
        let marker = self.rescue.apply_fill(
            &self.options.image,
            &self.options.mapfile,
            FillPattern::Marker(self.options.marker_byte),
        );
        // An interrupted fill may have written part of the marker.
        if marker.is_ok() || self.options.scan.is_cancelled() {
            self.restore_pending = true;
        }
        marker?;

        self.enter(Phase::AfterScan)?;
        let modified = self.scan_partitions(&records)?;

        self.enter(Phase::Restore)?;
        self.rescue.apply_fill(
            &self.options.image,
            &self.options.mapfile,
            FillPattern::Zero,
        )?;
        self.restore_pending = false;

        self.enter(Phase::Diff)?;
        for record in &records {
            let identifier = &record.identifier;
            let missing = |scan: &str| {
                VerifyError::Internal(format!("no {scan} scan recorded for {identifier}"))
            };
            let before = original.get(identifier).ok_or_else(|| missing("first"))?;
            let after = modified.get(identifier).ok_or_else(|| missing("second"))?;
            let diff = diff_indices(identifier, before, after);
            log_partition_diff(&diff);
            report.partitions.push(diff);
        }

        info!(
            "run {} finished: {} corrupted file(s) across {} partition(s)",
            self.run_id,
            report.total_corrupted(),
            report.partitions.len()
        );
        Ok(report)
    }

    fn scan_partitions(
        &mut self,
        records: &[MountRecord],
    ) -> VerifyResult<BTreeMap<String, ChecksumIndex>> {
        let mut indices = BTreeMap::new();
        for record in records {
            self.check_cancelled()?;
            let target = self.mounts.mount(record)?;
            let index = scan_tree(&target, &self.options.scan, |_| {})?;
            info!("{} entries indexed on {}", index.len(), record.identifier);
            self.mounts.unmount(&record.identifier)?;
            info!("");
            indices.insert(record.identifier.clone(), index);
        }
        Ok(indices)
    }

    fn cleanup(&mut self) {
        self.phase = Some(Phase::Cleanup);
        debug!("entering {} phase", Phase::Cleanup);

        let failures = self.mounts.unmount_all();
        for err in &failures {
            error!("cleanup could not unmount: {err}");
        }

        if !self.restore_pending {
            return;
        }
        if !failures.is_empty() {
            error!(
                "image {} still carries the marker fill; unmount it and re-run the zero fill manually",
                self.options.image.display()
            );
            return;
        }

        warn!("run stopped after the marker fill started; restoring zero fill");
        match self.rescue.apply_fill(
            &self.options.image,
            &self.options.mapfile,
            FillPattern::Zero,
        ) {
            Ok(()) => self.restore_pending = false,
            Err(err) => error!(
                "restoring {} failed: {err}",
                self.options.image.display()
            ),
        }
    }

    fn enter(&mut self, phase: Phase) -> VerifyResult<()> {
        self.check_cancelled()?;
        debug!("entering {phase} phase");
        self.phase = Some(phase);
        Ok(())
    }

    fn check_cancelled(&self) -> VerifyResult<()> {
        if self.options.scan.is_cancelled() {
            return Err(VerifyError::Interrupted);
        }
        Ok(())
    }

    fn phase_name(&self) -> String {
        self.phase
            .map(|phase| phase.to_string())
            .unwrap_or_else(|| "startup".to_string())
    }
}
