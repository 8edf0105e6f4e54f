//! Hypervisor trait interfaces for vmherd
//!
//! This crate defines the contract between the rotation scheduler (and any
//! command-line or API glue) and a concrete hypervisor backend. It contains
//! no backend code itself.

mod mock;
mod traits;

pub use mock::*;
pub use traits::*;
