//! Entry/return timing of a probed user-space function.
//!
//! The start table is keyed by pid only.  A function that re-enters itself
//! on the same pid overwrites the outer call's slot, so the outer call is
//! either timed from the inner start or reported as missing.

use crate::table::{FlowTable, TableError};
use crate::types::ProbeEvent;

/// Append-only channel towards userspace.
pub trait EventSink<T> {
    /// Publish one record; the error is the helper's errno.
    fn emit(&self, event: &T) -> Result<(), i64>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeError {
    /// The return fired without a recorded start for this pid.
    MissingStart,
    /// The channel rejected the record (usually full).
    Emit(i64),
}

/// Record the start of a call.
#[inline(always)]
pub fn on_entry<T>(starts: &T, event: &ProbeEvent) -> Result<(), TableError>
where
    T: FlowTable<u32, ProbeEvent>,
{
    starts.upsert(&event.pid, event)
}

/// Complete the call started by `pid`: stamp the end time, emit the record
/// and free the slot.  The slot is freed even when emission fails.
#[inline(always)]
pub fn on_return<T, S>(starts: &T, sink: &S, pid: u32, now_ns: u64) -> Result<(), ProbeError>
where
    T: FlowTable<u32, ProbeEvent>,
    S: EventSink<ProbeEvent>,
{
    let mut event = match starts.lookup(&pid) {
        Some(event) => event,
        None => return Err(ProbeError::MissingStart),
    };
    event.end_ns = now_ns;
    let emitted = sink.emit(&event);
    let _ = starts.remove(&pid);
    emitted.map_err(ProbeError::Emit)
}
