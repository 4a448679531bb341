#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use rescue_ffile_core::{CapturedOutput, CommandRunner, ToolCommand, ToolStatus};
use serde_json::json;
use tracing_subscriber::fmt::MakeWriter;
use walkdir::WalkDir;

pub const SECTOR: u64 = 512;

pub const MAPFILE: &str = "\
# Mapfile. Created by GNU ddrescue version 1.27
# current_pos  current_status  current_pass
0x00200000     +               5
#      pos        size  status
0x00000000  0x00100000  +
0x00100000  0x00000200  -
0x00100200  0x00FFFE00  +
";

pub struct FakePartition {
    pub identifier: String,
    pub start: u64,
    pub size: u64,
    /// Files the fake `mount` exposes for this partition.
    pub content: PathBuf,
}

/// Stands in for sfdisk, mount, umount and ddrescue.
///
/// `mount` copies a partition's content tree into the target, `umount`
/// empties it, and a non-zero ddrescue fill overwrites the damaged files
/// until a zero fill restores them.
#[derive(Default)]
pub struct FakeTools {
    pub partitions: Vec<FakePartition>,
    pub damaged: Vec<(usize, String)>,
    pub fail_marker_fill: Cell<bool>,
    pub failing_umounts: Cell<usize>,
    pub cancel_after_marker: Option<Arc<AtomicBool>>,
    /// Raised while the marker fill runs; ddrescue then exits with 130.
    pub interrupt_marker_fill: Option<Arc<AtomicBool>>,
    pub calls: RefCell<Vec<ToolCommand>>,
    pub originals: RefCell<HashMap<PathBuf, Vec<u8>>>,
}

impl FakeTools {
    pub fn count(&self, program: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| call.program == program)
            .count()
    }

    fn partition_for(&self, command: &ToolCommand) -> Option<&FakePartition> {
        let options = command.args.get(1)?.to_string_lossy().to_string();
        let offset = options
            .split(',')
            .find_map(|option| option.strip_prefix("offset="))
            .and_then(|value| value.parse::<u64>().ok());
        match offset {
            Some(offset) => self
                .partitions
                .iter()
                .find(|partition| partition.start * SECTOR == offset),
            None => self.partitions.first(),
        }
    }

    fn fill(&self, byte: u8) -> io::Result<()> {
        let mut originals = self.originals.borrow_mut();
        for (index, relative) in &self.damaged {
            let path = self.partitions[*index].content.join(relative);
            if byte == 0 {
                if let Some(original) = originals.get(&path) {
                    fs::write(&path, original)?;
                }
                continue;
            }
            let original = originals
                .entry(path.clone())
                .or_insert(fs::read(&path)?)
                .clone();
            let mut damaged = original;
            let span = damaged.len().min(8);
            damaged[..span].fill(byte);
            fs::write(&path, damaged)?;
        }
        Ok(())
    }
}

impl CommandRunner for FakeTools {
    fn run(&self, command: &ToolCommand) -> io::Result<ToolStatus> {
        self.calls.borrow_mut().push(command.clone());
        match command.program.as_str() {
            "mount" => {
                let Some(partition) = self.partition_for(command) else {
                    return Ok(ToolStatus::exited(32));
                };
                let target = PathBuf::from(command.last_arg().unwrap_or_default());
                copy_tree(&partition.content, &target)?;
                Ok(ToolStatus::SUCCESS)
            }
            "umount" => {
                if self.failing_umounts.get() > 0 {
                    self.failing_umounts.set(self.failing_umounts.get() - 1);
                    return Ok(ToolStatus::exited(32));
                }
                let target = PathBuf::from(command.last_arg().unwrap_or_default());
                clear_dir(&target)?;
                Ok(ToolStatus::SUCCESS)
            }
            "ddrescue" => {
                let pattern = fs::read(&command.args[1])?;
                let byte = pattern.first().copied().unwrap_or_default();
                if byte != 0 && self.fail_marker_fill.get() {
                    return Ok(ToolStatus::exited(1));
                }
                self.fill(byte)?;
                if let (true, Some(flag)) = (byte != 0, &self.interrupt_marker_fill) {
                    flag.store(true, Ordering::Relaxed);
                    return Ok(ToolStatus::exited(130));
                }
                if byte != 0 {
                    if let Some(flag) = &self.cancel_after_marker {
                        flag.store(true, Ordering::Relaxed);
                    }
                }
                Ok(ToolStatus::SUCCESS)
            }
            other => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("unexpected tool {other}"),
            )),
        }
    }

    fn capture(&self, command: &ToolCommand) -> io::Result<CapturedOutput> {
        self.calls.borrow_mut().push(command.clone());
        assert_eq!(command.program, "sfdisk");
        let partitions = self
            .partitions
            .iter()
            .map(|partition| {
                json!({
                    "node": partition.identifier,
                    "start": partition.start,
                    "size": partition.size,
                    "type": "83",
                })
            })
            .collect::<Vec<_>>();
        let dump = json!({
            "partitiontable": {
                "label": "dos",
                "device": "disk.img",
                "unit": "sectors",
                "sectorsize": SECTOR,
                "partitions": partitions,
            }
        });
        Ok(CapturedOutput {
            status: ToolStatus::SUCCESS,
            stdout: serde_json::to_vec(&dump).expect("serialize sfdisk dump"),
            stderr: Vec::new(),
        })
    }
}

/// Image and mapfile on disk, plus a content tree per partition.
pub struct Workspace {
    pub root: tempfile::TempDir,
    pub image: PathBuf,
    pub mapfile: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let root = tempfile::TempDir::new().expect("tempdir");
        let image = root.path().join("disk.img");
        let mapfile = root.path().join("disk.map");
        fs::write(&image, vec![0_u8; 4096]).expect("write image");
        fs::write(&mapfile, MAPFILE).expect("write mapfile");
        Self {
            root,
            image,
            mapfile,
        }
    }

    pub fn partition(&self, identifier: &str, start: u64, files: &[(&str, &str)]) -> FakePartition {
        let content = self.root.path().join(format!("content-{identifier}"));
        for (relative, data) in files {
            let path = content.join(relative);
            fs::create_dir_all(path.parent().expect("file has parent")).expect("mkdir");
            fs::write(path, data).expect("write content file");
        }
        fs::create_dir_all(&content).expect("mkdir content");
        FakePartition {
            identifier: identifier.to_string(),
            start,
            size: 2048,
            content,
        }
    }
}

fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry.path().strip_prefix(from).map_err(io::Error::other)?;
        let destination = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&destination)?;
        } else {
            fs::copy(entry.path(), &destination)?;
        }
    }
    Ok(())
}

fn clear_dir(dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[derive(Clone, Default)]
pub struct SharedLogBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedLogBuffer {
    pub fn as_string(&self) -> String {
        let bytes = self.bytes.lock().expect("log buffer lock poisoned").clone();
        String::from_utf8(bytes).expect("log buffer must be utf-8")
    }
}

pub struct SharedLogWriter {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl Write for SharedLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .expect("log buffer lock poisoned")
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'writer> MakeWriter<'writer> for SharedLogBuffer {
    type Writer = SharedLogWriter;

    fn make_writer(&'writer self) -> Self::Writer {
        SharedLogWriter {
            bytes: Arc::clone(&self.bytes),
        }
    }
}

/// Runs `f` with every tracing event captured into the returned buffer.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = SharedLogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .with_writer(buffer.clone())
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, buffer.as_string())
}
