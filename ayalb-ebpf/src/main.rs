#![no_std]
#![no_main]

use aya_ebpf::{
    bindings::xdp_action,
    helpers::{bpf_get_current_pid_tgid, bpf_ktime_get_ns, bpf_probe_read_user_buf},
    macros::{map, uprobe, uretprobe, xdp},
    maps::{Array, HashMap, LruHashMap, PerCpuArray, RingBuf},
    programs::{ProbeContext, RetProbeContext, XdpContext},
};
use aya_log_ebpf::{debug, warn};
use ayalb_common::{
    decide,
    probe::{on_entry, on_return},
    BackendInfo, Decision, EventSink, FlowLookup, FlowTable, ForwardKey, LbSettings, PacketView, PassReason,
    ProbeError, ProbeEvent, ReverseKey, Stat, TableError, Verdict, MAX_BACKENDS,
    MAX_CONCURRENT_PROBES, MAX_REVERSE_ENTRIES, STAT_COUNT,
};

#[no_mangle]
#[link_section = "license"]
pub static _license: [u8; 4] = *b"GPL\0";

/// Service port -> backend.  Written only by the agent.
#[map]
static BACKENDS: HashMap<ForwardKey, BackendInfo> =
    HashMap::with_max_entries(MAX_BACKENDS, 0);

/// Bind point -> endpoint to restore.  Written only by the XDP program; the
/// LRU variant gives the table a defined eviction order when full.
#[map]
static REVERSE_NAT: LruHashMap<ReverseKey, BackendInfo> =
    LruHashMap::with_max_entries(MAX_REVERSE_ENTRIES, 0);

#[map]
static SETTINGS: Array<LbSettings> = Array::with_max_entries(1, 0);

#[map]
static STATS: PerCpuArray<u64> = PerCpuArray::with_max_entries(STAT_COUNT, 0);

#[map]
static PROBE_STARTS: HashMap<u32, ProbeEvent> =
    HashMap::with_max_entries(MAX_CONCURRENT_PROBES, 0);

#[map]
static PROBE_EVENTS: RingBuf = RingBuf::with_byte_size(64 * 1024, 0);

// Table handles for the shared engine.

struct Backends;

// Read only here; the agent owns every write.
impl FlowLookup<ForwardKey, BackendInfo> for Backends {
    #[inline(always)]
    fn lookup(&self, key: &ForwardKey) -> Option<BackendInfo> {
        unsafe { BACKENDS.get(key).copied() }
    }
}

struct ReverseNat;

impl FlowLookup<ReverseKey, BackendInfo> for ReverseNat {
    #[inline(always)]
    fn lookup(&self, key: &ReverseKey) -> Option<BackendInfo> {
        unsafe { REVERSE_NAT.get(key).copied() }
    }
}

impl FlowTable<ReverseKey, BackendInfo> for ReverseNat {
    #[inline(always)]
    fn upsert(&self, key: &ReverseKey, value: &BackendInfo) -> Result<(), TableError> {
        REVERSE_NAT
            .insert(key, value, 0)
            .map_err(|e| TableError::from_errno(e as i64))
    }

    #[inline(always)]
    fn remove(&self, key: &ReverseKey) -> Result<(), TableError> {
        REVERSE_NAT
            .remove(key)
            .map_err(|e| TableError::from_errno(e as i64))
    }
}

struct ProbeStarts;

impl FlowLookup<u32, ProbeEvent> for ProbeStarts {
    #[inline(always)]
    fn lookup(&self, key: &u32) -> Option<ProbeEvent> {
        unsafe { PROBE_STARTS.get(key).copied() }
    }
}

impl FlowTable<u32, ProbeEvent> for ProbeStarts {
    #[inline(always)]
    fn upsert(&self, key: &u32, value: &ProbeEvent) -> Result<(), TableError> {
        PROBE_STARTS
            .insert(key, value, 0)
            .map_err(|e| TableError::from_errno(e as i64))
    }

    #[inline(always)]
    fn remove(&self, key: &u32) -> Result<(), TableError> {
        PROBE_STARTS
            .remove(key)
            .map_err(|e| TableError::from_errno(e as i64))
    }
}

struct ProbeEvents;

impl EventSink<ProbeEvent> for ProbeEvents {
    #[inline(always)]
    fn emit(&self, event: &ProbeEvent) -> Result<(), i64> {
        PROBE_EVENTS.output(event, 0)
    }
}

#[inline(always)]
fn count(stat: Stat) {
    if let Some(slot) = STATS.get_ptr_mut(stat as u32) {
        // Per-CPU slot, no other writer.
        unsafe { *slot += 1 };
    }
}

#[inline(always)]
fn current_pid() -> u32 {
    (bpf_get_current_pid_tgid() >> 32) as u32
}

/// XDP entry point.
///
/// Every path ends in a verdict: unknown or malformed traffic is passed
/// unmodified, rewritten traffic is bounced back out with `XDP_TX`.
#[xdp]
pub fn ayalb(ctx: XdpContext) -> u32 {
    let settings = match SETTINGS.get(0) {
        Some(settings) => *settings,
        None => LbSettings::default(),
    };

    // SAFETY: data/data_end delimit the packet owned by this invocation.
    let decision = match unsafe { PacketView::from_raw(ctx.data(), ctx.data_end()) } {
        Some(mut pkt) => decide(&mut pkt, &Backends, &ReverseNat, &settings),
        None => Decision::Pass(PassReason::Unparsed),
    };

    count(decision.stat());
    if let Decision::Selected {
        recorded: false, ..
    } = decision
    {
        count(Stat::ReverseRecordFailed);
        warn!(&ctx, "reverse binding not recorded, return leg will not be restored");
    }

    match decision.verdict() {
        Verdict::Pass => xdp_action::XDP_PASS,
        Verdict::Transmit => xdp_action::XDP_TX,
    }
}

/// Entry of the probed function: remember when it started and what its
/// first argument pointed at.
#[uprobe]
pub fn probe_entry(ctx: ProbeContext) -> u32 {
    let pid = current_pid();
    let mut event = ProbeEvent::started(pid, unsafe { bpf_ktime_get_ns() });
    if let Some(arg) = ctx.arg::<*const u8>(0) {
        // Unreadable memory leaves the payload zeroed.
        let _ = unsafe { bpf_probe_read_user_buf(arg, &mut event.payload) };
    }

    match on_entry(&ProbeStarts, &event) {
        Ok(()) => 0,
        Err(_) => {
            warn!(&ctx, "probe start table full, dropping pid {}", pid);
            1
        }
    }
}

/// Return of the probed function: emit the timing record.
#[uretprobe]
pub fn probe_return(ctx: RetProbeContext) -> u32 {
    let pid = current_pid();
    let now = unsafe { bpf_ktime_get_ns() };

    match on_return(&ProbeStarts, &ProbeEvents, pid, now) {
        Ok(()) => 0,
        Err(ProbeError::MissingStart) => {
            count(Stat::ProbeMissingStart);
            debug!(&ctx, "no start record for pid {}", pid);
            1
        }
        Err(ProbeError::Emit(_)) => {
            count(Stat::ProbeEmitFailed);
            1
        }
    }
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
