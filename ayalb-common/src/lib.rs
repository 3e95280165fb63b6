#![cfg_attr(not(test), no_std)]

//! Data-plane core shared by the XDP program and the userspace agent.
//!
//! Everything here is allocation free and bounded so it can be compiled into
//! the eBPF object; the agent pulls in the same types (with `aya::Pod`
//! implementations under the `user` feature) to read and write the maps.

pub mod checksum;
pub mod engine;
pub mod packet;
pub mod probe;
pub mod table;
pub mod types;

pub use engine::{decide, process, Decision, PassReason, Verdict};
pub use packet::PacketView;
pub use probe::{EventSink, ProbeError};
pub use table::{FlowLookup, FlowTable, TableError};
pub use types::*;

#[cfg(test)]
pub(crate) mod testing;
