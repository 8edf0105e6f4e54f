//! One-shot machine commands and their output rendering

use anyhow::Result;
use std::fmt::Write;
use vmherd_api::{InfoValue, InventoryEntry, MachineInfo, SnapshotList, StartMode};
use vmherd_host_api::{HostError, HostResult, Hypervisor};
use vmherd_util::MachineName;

/// Tool output when starting a machine that already has a session
const ALREADY_LOCKED: &str = "is already locked";

/// Tool output when stopping a machine that is off
const NOT_RUNNING: &str = "is not currently running";

/// What a start or stop request ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Done,
    /// The machine was already in the requested state
    Unchanged,
}

/// Map an error whose output mentions `needle` to [`CommandOutcome::Unchanged`]
pub fn tolerate(result: HostResult<String>, needle: &str) -> HostResult<CommandOutcome> {
    match result {
        Ok(_) => Ok(CommandOutcome::Done),
        Err(e) if e.mentions(needle) => Ok(CommandOutcome::Unchanged),
        Err(e) => Err(e),
    }
}

pub async fn start_machine(
    host: &dyn Hypervisor,
    name: &MachineName,
    mode: StartMode,
) -> HostResult<CommandOutcome> {
    let controller = host.controller_for(name);
    tolerate(controller.start(mode).await, ALREADY_LOCKED)
}

pub async fn stop_machine(host: &dyn Hypervisor, name: &MachineName) -> HostResult<CommandOutcome> {
    let controller = host.controller_for(name);
    tolerate(controller.stop().await, NOT_RUNNING)
}

pub async fn poweroff_machine(
    host: &dyn Hypervisor,
    name: &MachineName,
) -> HostResult<CommandOutcome> {
    let controller = host.controller_for(name);
    tolerate(controller.poweroff().await, NOT_RUNNING)
}

pub async fn machine_info(host: &dyn Hypervisor, name: &MachineName) -> HostResult<MachineInfo> {
    let mut controller = host.controller_for(name);
    controller.info().await
}

/// Error for an empty machine name argument
pub fn require_name(name: &str) -> HostResult<MachineName> {
    if name.trim().is_empty() {
        return Err(HostError::InvalidArgument("machine name cannot be empty".into()));
    }
    Ok(MachineName::new(name))
}

pub fn render_inventory(entries: &[InventoryEntry], json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(entries)?);
    }

    let mut out = String::new();
    for entry in entries {
        let state = if entry.running { "running" } else { "off" };
        writeln!(out, "{:<8} {} {{{}}}", state, entry.name, entry.id)?;
    }
    Ok(out)
}

pub fn render_info(info: &MachineInfo, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(info)?);
    }

    let mut out = String::new();
    for (key, value) in info.iter() {
        match value {
            InfoValue::Value(v) => writeln!(out, "{}={}", key, v.as_deref().unwrap_or("<not set>"))?,
            InfoValue::Group(children) => {
                for (child, v) in children {
                    writeln!(out, "{}[{}]={}", key, child, v.as_deref().unwrap_or("<not set>"))?;
                }
            }
        }
    }
    Ok(out)
}

pub fn render_snapshots(list: &SnapshotList, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(list)?);
    }

    let mut out = String::new();
    for snapshot in &list.snapshots {
        let marker = match (&snapshot.uuid, &list.current) {
            (Some(uuid), Some(current)) if uuid == current => "*",
            _ => " ",
        };
        let uuid = snapshot.uuid.as_ref().map(|u| u.as_str()).unwrap_or("?");
        writeln!(out, "{} {} {{{}}}", marker, snapshot.name, uuid)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmherd_host_api::InvocationFailure;
    use vmherd_util::{MachineId, SnapshotId};

    fn tool_error(stderr: &str) -> HostError {
        HostError::Invocation(InvocationFailure {
            command_line: "vboxmanage".into(),
            exit_code: Some(1),
            message: stderr.into(),
            stdout: String::new(),
            stderr: stderr.into(),
        })
    }

    #[test]
    fn known_conflicts_are_unchanged() {
        let locked = tool_error("VBoxManage: error: The machine 'a' is already locked by a session");
        assert_eq!(
            tolerate(Err(locked), ALREADY_LOCKED).unwrap(),
            CommandOutcome::Unchanged
        );
        assert_eq!(tolerate(Ok(String::new()), ALREADY_LOCKED).unwrap(), CommandOutcome::Done);

        let other = tool_error("VBoxManage: error: Could not find a registered machine");
        assert!(tolerate(Err(other), NOT_RUNNING).is_err());
    }

    #[test]
    fn empty_names_are_rejected() {
        assert!(matches!(require_name("  "), Err(HostError::InvalidArgument(_))));
        assert_eq!(require_name("win10").unwrap(), MachineName::new("win10"));
    }

    #[test]
    fn inventory_text() {
        let entries = vec![
            InventoryEntry {
                id: MachineId::new("1"),
                name: MachineName::new("a"),
                running: true,
            },
            InventoryEntry {
                id: MachineId::new("2"),
                name: MachineName::new("b c"),
                running: false,
            },
        ];

        let text = render_inventory(&entries, false).unwrap();
        assert_eq!(text, "running  a {1}\noff      b c {2}\n");

        let json: serde_json::Value =
            serde_json::from_str(&render_inventory(&entries, true).unwrap()).unwrap();
        assert_eq!(json[1]["name"], "b c");
    }

    #[test]
    fn info_text_flattens_groups() {
        let mut info = MachineInfo::new();
        info.insert_value("VMState", Some("running".into()));
        info.insert_value("description", None);
        info.insert_child("nic", "1", Some("nat".into()));

        let text = render_info(&info, false).unwrap();
        assert!(text.contains("VMState=running\n"));
        assert!(text.contains("description=<not set>\n"));
        assert!(text.contains("nic[1]=nat\n"));
    }

    #[test]
    fn snapshot_text_marks_current() {
        let list = SnapshotList {
            snapshots: vec![
                vmherd_api::Snapshot {
                    name: "base".into(),
                    uuid: Some(SnapshotId::new("1111")),
                },
                vmherd_api::Snapshot {
                    name: "updated".into(),
                    uuid: Some(SnapshotId::new("2222")),
                },
            ],
            current: Some(SnapshotId::new("2222")),
        };

        let text = render_snapshots(&list, false).unwrap();
        assert_eq!(text, "  base {1111}\n* updated {2222}\n");
    }
}
