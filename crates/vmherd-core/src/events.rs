//! Events emitted by the rotation engine

use chrono::{DateTime, Local};
use std::time::Duration;
use vmherd_util::{JobId, MachineName};

use crate::job::JobAction;

/// Events emitted by the rotation engine
#[derive(Debug, Clone, PartialEq)]
pub enum RotationEvent {
    /// A job was queued
    JobScheduled {
        job_id: JobId,
        action: JobAction,
        fire_at: DateTime<Local>,
        label: String,
    },

    /// A job came due and was handed out for execution
    JobFired {
        job_id: JobId,
        action: JobAction,
        label: String,
    },

    /// A due rescan was folded into the refresh already in flight
    RescanCoalesced,

    /// Inventory refreshed and starts chosen
    CyclePlanned {
        in_scope: usize,
        running: usize,
        reserved: usize,
        selected: Vec<MachineName>,
    },

    /// Inventory refresh failed; nothing was started
    CycleAbandoned {
        error: String,
        retry_in: Duration,
    },

    MachineStarted {
        name: MachineName,
        stop_in: Duration,
    },

    StartFailed {
        name: MachineName,
        error: String,
    },

    MachineStopped {
        name: MachineName,
    },

    StopFailed {
        name: MachineName,
        error: String,
    },

    /// Queued jobs for a machine were removed on request
    JobsCancelled {
        name: MachineName,
        count: usize,
    },
}
