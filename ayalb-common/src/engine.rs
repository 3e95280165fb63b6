//! Per-packet decision: reverse restoration first, then forward selection.

use crate::packet::PacketView;
use crate::table::{FlowLookup, FlowTable};
use crate::types::{BackendInfo, ForwardKey, LbSettings, ReverseKey, Stat};

/// What the hook does with the packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Continue up the stack unmodified.
    Pass,
    /// Send the rewritten packet back out of the receiving interface.
    Transmit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassReason {
    /// Truncated, not IPv4, not TCP, or IPv4 with options.
    Unparsed,
    /// No backend configured for the destination port.
    NoBackend,
}

/// Terminal state reached for one packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Pass(PassReason),
    /// Matched a reverse binding; destination restored to the recorded
    /// endpoint.
    Restored(BackendInfo),
    /// First packet of a flow sent to `backend`.  `recorded` is false when
    /// the reverse binding could not be stored.
    Selected { backend: BackendInfo, recorded: bool },
}

impl Decision {
    pub fn verdict(&self) -> Verdict {
        match self {
            Decision::Pass(_) => Verdict::Pass,
            Decision::Restored(_) | Decision::Selected { .. } => Verdict::Transmit,
        }
    }

    pub fn stat(&self) -> Stat {
        match self {
            Decision::Pass(PassReason::Unparsed) => Stat::Unparsed,
            Decision::Pass(PassReason::NoBackend) => Stat::NoBackend,
            Decision::Restored(_) => Stat::Restored,
            Decision::Selected { .. } => Stat::Selected,
        }
    }
}

/// Run the lookups for an already validated packet and rewrite it in place.
///
/// A packet matching a reverse binding never reaches backend selection, so
/// a bound flow keeps its endpoint.  The reverse miss and the later upsert
/// are separate table operations: two contexts racing on the first packet
/// of a flow both select and both write the binding, last writer wins.
#[inline(always)]
pub fn decide<B, R>(
    pkt: &mut PacketView<'_>,
    backends: &B,
    reverse: &R,
    settings: &LbSettings,
) -> Decision
where
    B: FlowLookup<ForwardKey, BackendInfo>,
    R: FlowTable<ReverseKey, BackendInfo>,
{
    let dst_addr = pkt.dst_addr();
    let dst_port = pkt.dst_port();

    let reverse_key = ReverseKey::from_wire(dst_addr, pkt.src_port());
    if let Some(original) = reverse.lookup(&reverse_key) {
        rewrite(pkt, &original, settings);
        return Decision::Restored(original);
    }

    let backend = match backends.lookup(&ForwardKey::from_wire(dst_port)) {
        Some(backend) => backend,
        None => return Decision::Pass(PassReason::NoBackend),
    };

    let binding = ReverseKey::from_wire(dst_addr, backend.port);
    let original = BackendInfo::from_wire(dst_addr, dst_port);
    let recorded = reverse.upsert(&binding, &original).is_ok();

    rewrite(pkt, &backend, settings);
    Decision::Selected { backend, recorded }
}

#[inline(always)]
fn rewrite(pkt: &mut PacketView<'_>, target: &BackendInfo, settings: &LbSettings) {
    pkt.set_destination(target, settings.fix_tcp_checksum());
    pkt.refresh_ip_checksum();
}

/// Parse `buf` and decide.  Unparseable packets are left untouched.
pub fn process<B, R>(buf: &mut [u8], backends: &B, reverse: &R, settings: &LbSettings) -> Decision
where
    B: FlowLookup<ForwardKey, BackendInfo>,
    R: FlowTable<ReverseKey, BackendInfo>,
{
    match PacketView::parse(buf) {
        Some(mut pkt) => decide(&mut pkt, backends, reverse, settings),
        None => Decision::Pass(PassReason::Unparsed),
    }
}
