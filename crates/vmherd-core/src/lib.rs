//! Rotation scheduler for vmherd
//!
//! This crate contains:
//! - Cycle planning (capacity, ordering by state-change time, staggering)
//! - The job queue and the per-machine rotation state machine
//!   (Idle -> ScheduledStart -> Starting -> ScheduledStop -> Stopping -> Idle)
//! - The async [`Rotator`] that fires jobs against a [`vmherd_host_api::Hypervisor`]

mod engine;
mod events;
mod job;
mod queue;
mod rotator;
mod selection;

pub use engine::*;
pub use events::*;
pub use job::*;
pub use queue::*;
pub use rotator::*;
pub use selection::*;
