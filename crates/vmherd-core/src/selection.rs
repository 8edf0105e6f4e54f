//! Cycle planning: which machines to start and when
//!
//! Pure functions of the refreshed inventory, so the policy can be tested
//! without timers or a hypervisor.

use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;
use vmherd_api::MachineInfo;
use vmherd_config::RotationSettings;
use vmherd_util::MachineName;

/// Where a machine is in its rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachinePhase {
    /// A start job is queued
    ScheduledStart,
    /// The start command is in flight
    Starting,
    /// Started; the stop job is queued
    ScheduledStop,
    /// The power-off command is in flight
    Stopping,
}

impl MachinePhase {
    /// Phases that will bring the machine up and so count against the limit
    pub fn is_reserved(&self) -> bool {
        matches!(self, MachinePhase::ScheduledStart | MachinePhase::Starting)
    }
}

/// The fields of a refreshed machine that the policy looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineStatus {
    pub name: MachineName,
    pub group: Option<String>,
    pub running: bool,
    /// `None` when missing or unparseable; sorts as oldest
    pub changed_at: Option<NaiveDateTime>,
}

impl MachineStatus {
    pub fn from_info(name: MachineName, info: &MachineInfo) -> Self {
        Self {
            name,
            group: info.groups().map(str::to_string),
            running: info.is_running(),
            changed_at: info.state_change_time(),
        }
    }
}

/// A start the cycle wants, `offset` after the cycle begins
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStart {
    pub name: MachineName,
    pub offset: Duration,
}

/// Result of planning one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CyclePlan {
    /// Machines in the rotation group
    pub in_scope: usize,
    pub running: usize,
    /// Machines not yet running but already on their way up
    pub reserved: usize,
    pub starts: Vec<PlannedStart>,
}

/// Plan a cycle.
///
/// Machines outside `settings.group` are ignored. Running and reserved
/// machines fill the limit first; the remaining slots go to idle machines
/// whose state changed longest ago, staggered `start_stagger` apart.
pub fn plan_cycle(
    machines: &[MachineStatus],
    phases: &HashMap<MachineName, MachinePhase>,
    settings: &RotationSettings,
) -> CyclePlan {
    let mut in_scope: Vec<&MachineStatus> = machines
        .iter()
        .filter(|m| m.group.as_deref() == Some(settings.group.as_str()))
        .collect();

    let running = in_scope.iter().filter(|m| m.running).count();
    let reserved = in_scope
        .iter()
        .filter(|m| !m.running && phases.get(&m.name).is_some_and(|p| p.is_reserved()))
        .count();

    // Stable: equal timestamps keep inventory order
    in_scope.sort_by_key(|m| m.changed_at);

    let free = settings.running_limit.saturating_sub(running + reserved);

    let starts = in_scope
        .iter()
        .filter(|m| !m.running && !phases.contains_key(&m.name))
        .take(free)
        .enumerate()
        .filter_map(|(i, m)| {
            let offset = u32::try_from(i)
                .ok()
                .and_then(|i| settings.start_stagger.checked_mul(i));
            if offset.is_none() {
                warn!(machine = %m.name, "Start stagger out of range, machine skipped");
            }
            offset.map(|offset| PlannedStart {
                name: m.name.clone(),
                offset,
            })
        })
        .collect();

    CyclePlan {
        in_scope: in_scope.len(),
        running,
        reserved,
        starts,
    }
}
