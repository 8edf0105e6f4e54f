//! Shared machine data model for vmherd
//!
//! This crate defines the types exchanged between the hypervisor layer,
//! the rotation scheduler and the command-line surface:
//! - Machine info (flat and grouped attributes)
//! - Machine state, guest OS classification, start mode
//! - Inventory entries and snapshots

mod info;
mod types;

pub use info::*;
pub use types::*;

/// Group path of machines that are not in any group
pub const TOP_LEVEL_GROUP: &str = "/";
