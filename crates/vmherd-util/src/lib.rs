//! Shared utilities for vmherd
//!
//! This crate provides:
//! - ID types (MachineName, MachineId, SnapshotId, JobId)
//! - Time utilities (monotonic time on the runtime clock, state-change timestamps)
//! - Host platform detection and default paths (config file, VBoxManage executable)

mod ids;
mod paths;
mod time;

pub use ids::*;
pub use paths::*;
pub use time::*;
