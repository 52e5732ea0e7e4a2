//! Centralized command execution with consistent error handling.
//!
//! Every external tool laminate drives (umoci, rsync, btrfs, mount and
//! friends) goes through the [`Cmd`] builder. Non-zero exits become
//! [`ToolError::Failed`] carrying the full command line and the captured
//! stderr, so the offending step is always identifiable in the surfaced
//! error.

use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

use crate::error::{Result, ToolError};

/// Result of a command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit status of the command.
    pub status: ExitStatus,
    /// Captured stdout as a string.
    pub stdout: String,
    /// Captured stderr as a string.
    pub stderr: String,
}

impl CommandResult {
    /// Returns true if the command exited successfully.
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Get the exit code, or -1 if terminated by signal.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    /// Get stdout, trimmed of whitespace.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Get stderr, trimmed of whitespace.
    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}

/// Builder for configuring command execution.
pub struct Cmd {
    program: String,
    args: Vec<String>,
    current_dir: Option<std::path::PathBuf>,
    /// If true, don't fail on non-zero exit.
    allow_fail: bool,
    /// Custom step identity used in error messages.
    identity: Option<String>,
}

impl Cmd {
    /// Create a new command builder.
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            current_dir: None,
            allow_fail: false,
            identity: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    /// Add a path as an argument.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Set the working directory.
    pub fn dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Allow non-zero exit codes without failing.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Override the step identity used in error messages.
    pub fn error_msg(mut self, msg: impl AsRef<str>) -> Self {
        self.identity = Some(msg.as_ref().to_string());
        self
    }

    /// The full command line, quoted for error messages.
    fn rendered(&self) -> String {
        if self.args.is_empty() {
            format!("'{}'", self.program)
        } else {
            format!("'{} {}'", self.program, self.args.join(" "))
        }
    }

    fn step_identity(&self) -> String {
        self.identity.clone().unwrap_or_else(|| self.rendered())
    }

    /// Run the command and capture output.
    pub fn run(self) -> Result<CommandResult> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }

        let output = cmd.output().map_err(|e| ToolError::Spawn {
            program: self.program.clone(),
            source: e,
        })?;

        let result = CommandResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !self.allow_fail && !result.success() {
            return Err(ToolError::Failed {
                identity: self.step_identity(),
                code: result.code(),
                stderr: result.stderr_trimmed().to_string(),
            }
            .into());
        }

        Ok(result)
    }

    /// Run the command with inherited stdio (interactive/streaming).
    ///
    /// Output goes directly to the terminal. Use for commands where the
    /// operator should see progress as it happens (e.g. recipe run steps).
    pub fn run_interactive(self) -> Result<ExitStatus> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stdin(Stdio::inherit());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());

        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }

        let status = cmd.status().map_err(|e| ToolError::Spawn {
            program: self.program.clone(),
            source: e,
        })?;

        if !self.allow_fail && !status.success() {
            return Err(ToolError::Failed {
                identity: self.step_identity(),
                code: status.code().unwrap_or(-1),
                stderr: String::new(),
            }
            .into());
        }

        Ok(status)
    }
}

/// Check if a program exists in PATH.
///
/// Returns the full path if found, None otherwise.
pub fn which(program: &str) -> Option<String> {
    which::which(program)
        .ok()
        .map(|p| p.to_string_lossy().into_owned())
}

/// Check if a program exists in PATH (bool version).
pub fn exists(program: &str) -> bool {
    which(program).is_some()
}
