//! VirtualBox backend for vmherd
//!
//! This crate provides:
//! - The command runner: invocation building, platform escaping, execution
//!   and failure classification
//! - Parsers for the list, info and snapshot output formats
//! - [`VBoxMachine`], the per-machine controller
//! - [`VBoxHost`], the [`vmherd_host_api::Hypervisor`] implementation

mod escape;
mod guest;
mod host;
mod invocation;
mod machine;
mod parse;
mod runner;
mod scancodes;

#[cfg(test)]
mod testing;

pub use escape::*;
pub use guest::*;
pub use host::*;
pub use invocation::*;
pub use machine::*;
pub use parse::*;
pub use runner::*;
pub use scancodes::*;
