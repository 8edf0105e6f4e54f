//! Shared types for machines and their lifecycle

use serde::{Deserialize, Serialize};
use std::fmt;
use vmherd_util::{MachineId, MachineName, SnapshotId};

/// Machine lifecycle state as reported in `VMState`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineState {
    Running,
    PowerOff,
    Saved,
    Paused,
    Aborted,
    Starting,
    Stopping,
    Saving,
    Restoring,
    /// Any state this crate does not know by name
    Other(String),
}

impl MachineState {
    pub fn parse(value: &str) -> Self {
        match value {
            "running" => MachineState::Running,
            "poweroff" => MachineState::PowerOff,
            "saved" => MachineState::Saved,
            "paused" => MachineState::Paused,
            "aborted" => MachineState::Aborted,
            "starting" => MachineState::Starting,
            "stopping" => MachineState::Stopping,
            "saving" => MachineState::Saving,
            "restoring" => MachineState::Restoring,
            other => MachineState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MachineState::Running => "running",
            MachineState::PowerOff => "poweroff",
            MachineState::Saved => "saved",
            MachineState::Paused => "paused",
            MachineState::Aborted => "aborted",
            MachineState::Starting => "starting",
            MachineState::Stopping => "stopping",
            MachineState::Saving => "saving",
            MachineState::Restoring => "restoring",
            MachineState::Other(s) => s,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, MachineState::Running)
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guest operating system family, derived from `ostype`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuestOs {
    Windows,
    Mac,
    Linux,
}

impl GuestOs {
    /// Classify an `ostype` string such as `Windows 10 (64-bit)` or `Ubuntu (64-bit)`.
    ///
    /// Anything that is neither Windows nor macOS is treated as Linux.
    pub fn classify(os_type: &str) -> Self {
        if os_type.contains("Windows") {
            GuestOs::Windows
        } else if os_type.contains("MacOS") {
            GuestOs::Mac
        } else {
            GuestOs::Linux
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GuestOs::Windows => "windows",
            GuestOs::Mac => "mac",
            GuestOs::Linux => "linux",
        }
    }
}

impl fmt::Display for GuestOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frontend used when starting a machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartMode {
    #[default]
    Headless,
    Gui,
}

impl StartMode {
    pub fn from_gui(use_gui: bool) -> Self {
        if use_gui { StartMode::Gui } else { StartMode::Headless }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StartMode::Headless => "headless",
            StartMode::Gui => "gui",
        }
    }
}

/// One machine in the hypervisor inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub id: MachineId,
    pub name: MachineName,
    pub running: bool,
}

/// A snapshot of a machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub name: String,
    /// Missing when the listing ended before the snapshot's UUID line
    pub uuid: Option<SnapshotId>,
}

/// All snapshots of a machine, in listing order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotList {
    pub snapshots: Vec<Snapshot>,
    pub current: Option<SnapshotId>,
}

impl SnapshotList {
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_parse_round_trips_known_names() {
        for name in ["running", "poweroff", "saved", "paused", "aborted"] {
            assert_eq!(MachineState::parse(name).as_str(), name);
        }
        assert_eq!(
            MachineState::parse("teleporting"),
            MachineState::Other("teleporting".into())
        );
        assert!(MachineState::parse("running").is_running());
        assert!(!MachineState::parse("paused").is_running());
    }

    #[test]
    fn guest_os_classification() {
        assert_eq!(GuestOs::classify("Windows 10 (64-bit)"), GuestOs::Windows);
        assert_eq!(GuestOs::classify("Windows7_64"), GuestOs::Windows);
        assert_eq!(GuestOs::classify("MacOS 10.13 High Sierra"), GuestOs::Mac);
        assert_eq!(GuestOs::classify("Ubuntu (64-bit)"), GuestOs::Linux);
        assert_eq!(GuestOs::classify(""), GuestOs::Linux);
    }

    #[test]
    fn start_mode_names() {
        assert_eq!(StartMode::from_gui(false).as_str(), "headless");
        assert_eq!(StartMode::from_gui(true).as_str(), "gui");
        assert_eq!(StartMode::default(), StartMode::Headless);
    }

    #[test]
    fn inventory_entry_serialization() {
        let entry = InventoryEntry {
            id: MachineId::new("0c4e5a1e-6a8f-4f0e-9d59-0b9d2f2d8a11"),
            name: MachineName::new("win10-a"),
            running: true,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["name"], "win10-a");
        assert_eq!(json["running"], true);
    }
}
