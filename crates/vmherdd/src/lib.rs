//! vmherdd service wiring
//!
//! - Building the VirtualBox backend from validated settings
//! - One-shot machine commands, with the tool's benign conflicts treated as success
//! - Spawning the rotation scheduler

mod commands;
mod service;

pub use commands::*;
pub use service::*;
