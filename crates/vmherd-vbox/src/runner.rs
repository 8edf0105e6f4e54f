//! VBoxManage command runner
//!
//! Renders an [`Invocation`] into a shell command line, runs it through a
//! [`CommandExecutor`] and classifies the outcome.

use async_trait::async_trait;
use regex::Regex;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, LazyLock};
use tokio::process::Command;
use tracing::{debug, info, warn};
use vmherd_host_api::{HostError, HostResult, InvocationFailure};
use vmherd_util::HostPlatform;

use crate::escape::EscapeMode;
use crate::invocation::Invocation;

/// Failure signature of a transient state conflict reported by the tool
const INVALID_OBJECT_STATE: &str = "VBOX_E_INVALID_OBJECT_STATE";

/// Commands expected to print nothing on stderr when they succeed
const SILENT_COMMANDS: [&str; 3] = ["pause", "savestate", "poweroff"];

/// Progress meter VBoxManage prints on stderr, e.g. `0%...10%...100%`
static PROGRESS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+%(\.\.\.\d+%)*\.*$").expect("progress regex must compile")
});

/// stderr without blank lines and progress meters
fn stderr_messages(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !PROGRESS_LINE.is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// What a finished process printed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutput {
    /// `None` if the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RawOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs a rendered command line on the host
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command_line: &str) -> std::io::Result<RawOutput>;
}

/// Executor backed by the host shell (`sh -c` or `cmd /C`)
#[derive(Debug, Clone, Copy)]
pub struct ShellExecutor {
    platform: HostPlatform,
}

impl ShellExecutor {
    pub fn new(platform: HostPlatform) -> Self {
        Self { platform }
    }

    fn shell_command(&self, command_line: &str) -> Command {
        match self.platform {
            HostPlatform::Windows => {
                let mut cmd = Command::new("cmd");
                cmd.arg("/C");
                push_raw_arg(&mut cmd, command_line);
                cmd
            }
            HostPlatform::Unix => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(command_line);
                cmd
            }
        }
    }
}

#[cfg(windows)]
fn push_raw_arg(cmd: &mut Command, arg: &str) {
    cmd.raw_arg(arg);
}

#[cfg(not(windows))]
fn push_raw_arg(cmd: &mut Command, arg: &str) {
    cmd.arg(arg);
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn execute(&self, command_line: &str) -> std::io::Result<RawOutput> {
        let output = self
            .shell_command(command_line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(RawOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Decide whether a finished invocation succeeded.
///
/// - a non-zero exit mentioning `VBOX_E_INVALID_OBJECT_STATE` counts as success
/// - a zero exit with stderr output other than the progress meter fails for
///   `pause`, `savestate` and `poweroff`
pub fn classify(
    invocation: &Invocation,
    command_line: &str,
    output: RawOutput,
) -> Result<String, InvocationFailure> {
    if !output.is_success() {
        if output.stderr.contains(INVALID_OBJECT_STATE) || output.stdout.contains(INVALID_OBJECT_STATE)
        {
            debug!(command = %command_line, "Ignoring invalid object state failure");
            return Ok(output.stdout);
        }

        let message = match (output.exit_code, output.stderr.trim()) {
            (_, stderr) if !stderr.is_empty() => stderr.to_string(),
            (Some(code), _) => format!("exited with code {}", code),
            (None, _) => "terminated by signal".to_string(),
        };

        return Err(InvocationFailure {
            command_line: command_line.to_string(),
            exit_code: output.exit_code,
            message,
            stdout: output.stdout,
            stderr: output.stderr,
        });
    }

    if SILENT_COMMANDS.iter().any(|t| invocation.has_token(t)) {
        let message = stderr_messages(&output.stderr);
        if message.is_empty() {
            return Ok(output.stdout);
        }
        return Err(InvocationFailure {
            command_line: command_line.to_string(),
            exit_code: output.exit_code,
            message,
            stdout: output.stdout,
            stderr: output.stderr,
        });
    }

    Ok(output.stdout)
}

/// Version reported by `VBoxManage --version`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolVersion {
    pub raw: String,
    /// Text before the first `.`, if numeric
    pub major: Option<u32>,
}

impl ToolVersion {
    pub fn parse(output: &str) -> Self {
        let raw = output.trim().to_string();
        let major = raw.split('.').next().and_then(|m| m.trim().parse().ok());
        Self { raw, major }
    }

    /// Whether guest commands use `guestcontrol run` (5.0 and later)
    /// rather than the older `guestcontrol execute`
    pub fn has_guest_run(&self) -> bool {
        self.major.is_none_or(|major| major >= 5)
    }
}

/// Settings the runner is built from
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub executable: PathBuf,
    pub escape_mode: EscapeMode,
    /// Log each command line at info level instead of debug
    pub debug: bool,
}

impl RunnerConfig {
    pub fn new(executable: impl Into<PathBuf>, escape_mode: EscapeMode) -> Self {
        Self {
            executable: executable.into(),
            escape_mode,
            debug: false,
        }
    }
}

/// Shared handle to the VBoxManage executable
#[derive(Clone)]
pub struct VBoxManage {
    config: Arc<RunnerConfig>,
    version: ToolVersion,
    executor: Arc<dyn CommandExecutor>,
}

impl VBoxManage {
    pub fn new(config: RunnerConfig, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            config: Arc::new(config),
            version: ToolVersion::default(),
            executor,
        }
    }

    /// Runner using the host shell of `platform`
    pub fn with_shell(config: RunnerConfig, platform: HostPlatform) -> Self {
        Self::new(config, Arc::new(ShellExecutor::new(platform)))
    }

    /// Use a version obtained from [`VBoxManage::detect_version`]
    pub fn with_version(mut self, version: ToolVersion) -> Self {
        self.version = version;
        self
    }

    pub fn version(&self) -> &ToolVersion {
        &self.version
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run `--version` and parse the result
    pub async fn detect_version(&self) -> HostResult<ToolVersion> {
        let stdout = self.run(&Invocation::new("--version")).await?;
        let version = ToolVersion::parse(&stdout);
        info!(version = %version.raw, major = ?version.major, "Detected VirtualBox version");
        Ok(version)
    }

    /// Run one invocation and return its stdout
    pub async fn run(&self, invocation: &Invocation) -> HostResult<String> {
        let command_line = invocation.command_line(
            &self.config.executable.to_string_lossy(),
            self.config.escape_mode,
        );

        if self.config.debug {
            info!(command = %command_line, "$ VBoxManage");
        } else {
            debug!(command = %command_line, "$ VBoxManage");
        }

        let output = self.executor.execute(&command_line).await?;

        classify(invocation, &command_line, output).map_err(|failure| {
            warn!(
                command = %failure.command_line,
                exit_code = ?failure.exit_code,
                stdout = %failure.stdout.trim(),
                stderr = %failure.stderr.trim(),
                "VBoxManage command failed"
            );
            HostError::Invocation(failure)
        })
    }
}
