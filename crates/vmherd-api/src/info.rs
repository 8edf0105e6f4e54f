//! Machine info as reported by `showvminfo --machinereadable`

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use vmherd_util::parse_state_change_time;

use crate::{GuestOs, MachineState};

/// Sub-keys of a grouped attribute, e.g. `storagecontrollername[0]`
pub type InfoGroup = BTreeMap<String, Option<String>>;

/// Value of a single info attribute.
///
/// `None` values come from the tool's `<not set>` sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InfoValue {
    Value(Option<String>),
    Group(InfoGroup),
}

/// Snapshot of a machine's attributes at the moment `info()` resolved.
///
/// Attributes nest at most one level. A fresh query always produces a new
/// `MachineInfo`; values are never merged across queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineInfo {
    fields: BTreeMap<String, InfoValue>,
}

impl MachineInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a flat attribute, replacing whatever was stored under `key`.
    pub fn insert_value(&mut self, key: impl Into<String>, value: Option<String>) {
        self.fields.insert(key.into(), InfoValue::Value(value));
    }

    /// Set `parent[child]`. A flat value stored under `parent` is replaced by a group.
    pub fn insert_child(
        &mut self,
        parent: impl Into<String>,
        child: impl Into<String>,
        value: Option<String>,
    ) {
        let slot = self
            .fields
            .entry(parent.into())
            .or_insert_with(|| InfoValue::Group(InfoGroup::new()));

        if matches!(*slot, InfoValue::Value(_)) {
            *slot = InfoValue::Group(InfoGroup::new());
        }

        if let InfoValue::Group(group) = slot {
            group.insert(child.into(), value);
        }
    }

    pub fn raw(&self, key: &str) -> Option<&InfoValue> {
        self.fields.get(key)
    }

    /// Flat string value of `key`; `None` if absent, unset, or a group.
    pub fn get(&self, key: &str) -> Option<&str> {
        match self.fields.get(key)? {
            InfoValue::Value(value) => value.as_deref(),
            InfoValue::Group(_) => None,
        }
    }

    pub fn group(&self, parent: &str) -> Option<&InfoGroup> {
        match self.fields.get(parent)? {
            InfoValue::Group(group) => Some(group),
            InfoValue::Value(_) => None,
        }
    }

    pub fn child(&self, parent: &str, child: &str) -> Option<&str> {
        self.group(parent)?.get(child)?.as_deref()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &InfoValue)> {
        self.fields.iter()
    }

    /// `VMState`
    pub fn state(&self) -> Option<MachineState> {
        self.get("VMState").map(MachineState::parse)
    }

    pub fn is_running(&self) -> bool {
        self.state().is_some_and(|s| s.is_running())
    }

    /// `VMStateChangeTime`, parsed
    pub fn state_change_time(&self) -> Option<NaiveDateTime> {
        self.get("VMStateChangeTime").and_then(parse_state_change_time)
    }

    /// `groups`: the machine's group path, `/` when ungrouped
    pub fn groups(&self) -> Option<&str> {
        self.get("groups")
    }

    /// `ostype`
    pub fn os_type(&self) -> Option<&str> {
        self.get("ostype")
    }

    pub fn guest_os(&self) -> Option<GuestOs> {
        self.os_type().map(GuestOs::classify)
    }
}

impl FromIterator<(String, InfoValue)> for MachineInfo {
    fn from_iter<T: IntoIterator<Item = (String, InfoValue)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
