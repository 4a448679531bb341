use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io;
use std::process::{Command, Stdio};

use tracing::debug;

/// One invocation of an external tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<OsString>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, value: impl AsRef<OsStr>) -> Self {
        self.args.push(value.as_ref().to_os_string());
        self
    }

    /// Last argument, which for mount/umount/ddrescue is the object acted on.
    pub fn last_arg(&self) -> Option<&OsStr> {
        self.args.last().map(OsString::as_os_str)
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ToolStatus {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ToolStatus {
    pub const SUCCESS: ToolStatus = ToolStatus { code: Some(0) };

    pub fn exited(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn describe(&self) -> String {
        match self.code {
            Some(code) => format!("exited with status {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    pub status: ToolStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Seam through which every external tool is invoked.
///
/// `run` inherits stdio so tool output reaches the operator directly;
/// `capture` collects stdout for parsing.
pub trait CommandRunner {
    fn run(&self, command: &ToolCommand) -> io::Result<ToolStatus>;

    fn capture(&self, command: &ToolCommand) -> io::Result<CapturedOutput>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &ToolCommand) -> io::Result<ToolStatus> {
        debug!("running `{command}`");
        let status = Command::new(&command.program)
            .args(&command.args)
            .status()?;
        Ok(ToolStatus {
            code: status.code(),
        })
    }

    fn capture(&self, command: &ToolCommand) -> io::Result<CapturedOutput> {
        debug!("capturing `{command}`");
        let output = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .output()?;
        Ok(CapturedOutput {
            status: ToolStatus {
                code: output.status.code(),
            },
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ToolCommand, ToolStatus};

    #[test]
    fn renders_command_line_for_logs() {
        let command = ToolCommand::new("mount")
            .arg("-o")
            .arg("ro")
            .arg("/tmp/disk.img");
        assert_eq!(command.to_string(), "mount -o ro /tmp/disk.img");
        assert_eq!(
            command.last_arg().map(|arg| arg.to_string_lossy().to_string()),
            Some("/tmp/disk.img".to_string())
        );
    }

    #[test]
    fn describes_signal_termination() {
        assert!(ToolStatus::SUCCESS.success());
        assert!(!ToolStatus::exited(32).success());
        assert_eq!(ToolStatus::exited(32).describe(), "exited with status 32");
        assert_eq!(ToolStatus { code: None }.describe(), "terminated by signal");
    }
}
