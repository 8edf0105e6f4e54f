//! Hypervisor traits

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use vmherd_api::{InventoryEntry, MachineInfo, StartMode};
use vmherd_util::MachineName;

/// A failed external tool invocation, with everything it printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationFailure {
    /// Rendered command line, for logs
    pub command_line: String,
    /// Exit code, if the process exited normally
    pub exit_code: Option<i32>,
    pub message: String,
    pub stdout: String,
    pub stderr: String,
}

impl fmt::Display for InvocationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exit_code {
            Some(code) => write!(f, "exit code {}: {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Errors from hypervisor operations
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Command failed: {0}")]
    Invocation(InvocationFailure),

    #[error("Failed to run hypervisor tool: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Unknown key: {0}")]
    UnknownKey(String),

    #[error("Could not determine guest OS of {0}")]
    GuestOsUnknown(MachineName),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HostError {
    /// The invocation failure behind this error, if it came from the tool
    pub fn invocation(&self) -> Option<&InvocationFailure> {
        match self {
            HostError::Invocation(failure) => Some(failure),
            _ => None,
        }
    }

    /// Whether the error text or the captured output mentions `needle`
    pub fn mentions(&self, needle: &str) -> bool {
        match self {
            HostError::Invocation(failure) => {
                failure.message.contains(needle)
                    || failure.stderr.contains(needle)
                    || failure.stdout.contains(needle)
            }
            other => other.to_string().contains(needle),
        }
    }
}

pub type HostResult<T> = Result<T, HostError>;

/// Per-machine controller.
///
/// Controllers are cheap and may be recreated by name at any time. Each one
/// caches the info from its last `info()` call; nothing refreshes it in the
/// background.
#[async_trait]
pub trait MachineControl: Send + Sync {
    fn name(&self) -> &MachineName;

    /// Query the hypervisor and replace the cached info
    async fn info(&mut self) -> HostResult<MachineInfo>;

    /// Info as of the last `info()` call (empty before the first)
    fn cached_info(&self) -> &MachineInfo;

    /// Flat value from the cached info
    fn get(&self, key: &str) -> Option<&str> {
        self.cached_info().get(key)
    }

    /// Start the machine; resolves with the tool's output
    async fn start(&self, mode: StartMode) -> HostResult<String>;

    /// Save the machine state and stop it
    async fn stop(&self) -> HostResult<String>;

    /// Hard power-off
    async fn poweroff(&self) -> HostResult<String>;

    async fn is_running(&self) -> HostResult<bool>;
}

/// Hypervisor backend - implemented per virtualization product
#[async_trait]
pub trait Hypervisor: Send + Sync {
    /// All registered machines with their running flag
    async fn list_inventory(&self) -> HostResult<Vec<InventoryEntry>>;

    /// Controller for one machine
    fn controller_for(&self, name: &MachineName) -> Box<dyn MachineControl>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure() -> HostError {
        HostError::Invocation(InvocationFailure {
            command_line: "vboxmanage startvm \"a\" --type headless".into(),
            exit_code: Some(1),
            message: "VBoxManage: error: The machine 'a' is already locked by a session".into(),
            stdout: String::new(),
            stderr: "VBoxManage: error: The machine 'a' is already locked by a session".into(),
        })
    }

    #[test]
    fn invocation_error_display() {
        let err = failure();
        assert!(err.to_string().starts_with("Command failed: exit code 1"));
    }

    #[test]
    fn mentions_checks_output() {
        let err = failure();
        assert!(err.mentions("is already locked"));
        assert!(!err.mentions("is not currently running"));
        assert!(err.invocation().is_some());
    }

    #[test]
    fn mentions_on_other_errors() {
        let err = HostError::UnknownKey("F13".into());
        assert!(err.mentions("F13"));
        assert!(err.invocation().is_none());
    }
}
