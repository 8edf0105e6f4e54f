//! Parsers for VBoxManage's machine-readable output
//!
//! Every parser is a pure function of the text it is given. Lines that do
//! not match the expected shape are skipped, so banners and fields added by
//! newer tool versions do not break parsing.

use regex::{Captures, Regex};
use std::sync::LazyLock;
use vmherd_api::{MachineInfo, Snapshot, SnapshotList};
use vmherd_util::{MachineId, MachineName, SnapshotId};

static LIST_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^"(.+)" \{(.+)\}$"#).expect("list regex must compile"));

static INFO_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?mR)^"?([^="\r\n]+)"?="?([^="\r\n]+)"?$"#).expect("info regex must compile")
});

static NESTED_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^\[]+)\[([^\]]+)").expect("nested key regex must compile"));

static SNAPSHOT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(CurrentSnapshotUUID|SnapshotName|SnapshotUUID).*="(.*)"$"#)
        .expect("snapshot regex must compile")
});

static TAKEN_UUID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"UUID: ([a-f0-9\-]+)$").expect("uuid regex must compile"));

/// Sentinel for an unset info value
const NOT_SET: &str = "<not set>";

/// `guestproperty get` output for a missing property
const NO_VALUE_SET: &str = "No value set!";

/// Failure text of `snapshot list` on a machine without snapshots
pub const NO_SNAPSHOTS: &str = "does not have any snapshots";

/// Every match of `pattern` in `text`, in order
pub fn find_all_matches<'t>(pattern: &Regex, text: &'t str) -> Vec<Captures<'t>> {
    pattern.captures_iter(text).collect()
}

/// One `"name" {id}` line of `list vms` / `list runningvms`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub id: MachineId,
    pub name: MachineName,
}

/// Parsed `list` output, keyed by machine id, in tool order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListData {
    entries: Vec<ListEntry>,
}

impl ListData {
    fn insert(&mut self, entry: ListEntry) {
        match self.entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn get(&self, id: &MachineId) -> Option<&MachineName> {
        self.entries.iter().find(|e| &e.id == id).map(|e| &e.name)
    }

    pub fn contains_id(&self, id: &MachineId) -> bool {
        self.get(id).is_some()
    }

    pub fn contains_name(&self, name: &MachineName) -> bool {
        self.entries.iter().any(|e| &e.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ListEntry> {
        self.entries.iter()
    }
}

impl IntoIterator for ListData {
    type Item = ListEntry;
    type IntoIter = std::vec::IntoIter<ListEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Parse `list vms` style output
pub fn parse_list(stdout: &str) -> ListData {
    let mut data = ListData::default();
    for line in stdout.lines() {
        if let Some(caps) = LIST_LINE.captures(line) {
            data.insert(ListEntry {
                id: MachineId::new(&caps[2]),
                name: MachineName::new(&caps[1]),
            });
        }
    }
    data
}

/// Parse `showvminfo --machinereadable` output
pub fn parse_info(stdout: &str) -> MachineInfo {
    let mut info = MachineInfo::new();

    for caps in find_all_matches(&INFO_PAIR, stdout) {
        let key = &caps[1];
        let value = caps[2].trim();
        let value = (value != NOT_SET).then(|| value.to_string());

        match NESTED_KEY.captures(key).filter(|_| key.contains('[')) {
            Some(nested) => info.insert_child(&nested[1], &nested[2], value),
            None => info.insert_value(key, value),
        }
    }

    info
}

/// Parse `snapshot list --machinereadable` output.
///
/// `SnapshotName` opens a record and `SnapshotUUID` completes the open one.
pub fn parse_snapshots(stdout: &str) -> SnapshotList {
    let mut list = SnapshotList::default();
    let mut open = false;

    for line in stdout.lines() {
        let Some(caps) = SNAPSHOT_LINE.captures(line) else {
            continue;
        };
        let value = caps[2].to_string();

        match &caps[1] {
            "CurrentSnapshotUUID" => list.current = Some(SnapshotId::new(value)),
            "SnapshotName" => {
                list.snapshots.push(Snapshot {
                    name: value,
                    uuid: None,
                });
                open = true;
            }
            _ => {
                if open && let Some(last) = list.snapshots.last_mut() {
                    last.uuid = Some(SnapshotId::new(value));
                    open = false;
                }
            }
        }
    }

    list
}

/// UUID from the confirmation line of `snapshot take`
pub fn parse_taken_snapshot(stdout: &str) -> Option<SnapshotId> {
    TAKEN_UUID
        .captures(stdout.trim())
        .map(|caps| SnapshotId::new(&caps[1]))
}

/// Value from `guestproperty get` output (`Value: <v>`)
pub fn parse_property_value(stdout: &str) -> Option<String> {
    let value = match stdout.find(':') {
        Some(idx) => &stdout[idx + 1..],
        None => stdout,
    };
    let value = value.trim();
    (value != NO_VALUE_SET).then(|| value.to_string())
}
