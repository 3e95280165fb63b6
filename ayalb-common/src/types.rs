use core::net::Ipv4Addr;

/// Default capacity of the service-port -> backend table.
pub const MAX_BACKENDS: u32 = 10;
/// Default capacity of the reverse NAT table.
pub const MAX_REVERSE_ENTRIES: u32 = 10;
/// Capacity of the pid-keyed probe start table.
pub const MAX_CONCURRENT_PROBES: u32 = 50;
/// Bytes captured from the probed function's first argument.
pub const PROBE_PAYLOAD_LEN: usize = 80;

// Map names, shared so the agent looks up exactly what the eBPF object
// declares.
pub const BACKENDS_MAP: &str = "BACKENDS";
pub const REVERSE_NAT_MAP: &str = "REVERSE_NAT";
pub const SETTINGS_MAP: &str = "SETTINGS";
pub const STATS_MAP: &str = "STATS";
pub const PROBE_STARTS_MAP: &str = "PROBE_STARTS";
pub const PROBE_EVENTS_MAP: &str = "PROBE_EVENTS";

/// Backend endpoint, the value type of both load-balancing tables.
///
/// Both fields hold the bytes exactly as they appear on the wire (network
/// byte order) so that data-path reads and writes never convert.  Use
/// [`BackendInfo::new`] and the accessors when working with host values.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "user", derive(serde::Serialize, serde::Deserialize))]
pub struct BackendInfo {
    pub address: u32,
    pub port: u16,
    pub _pad: u16,
}

impl BackendInfo {
    /// Build from raw wire-order values.
    #[inline(always)]
    pub const fn from_wire(address: u32, port: u16) -> Self {
        Self {
            address,
            port,
            _pad: 0,
        }
    }

    /// Build from an address and a host-order port.
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self::from_wire(u32::from_ne_bytes(ip.octets()), port.to_be())
    }

    pub fn ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.address.to_ne_bytes())
    }

    /// Port in host byte order.
    pub fn host_port(&self) -> u16 {
        u16::from_be(self.port)
    }
}

/// Key of the backend table: the TCP destination port, network byte order.
///
/// The key never includes the destination address, so one entry serves a
/// service port on every local address.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "user", derive(serde::Serialize, serde::Deserialize))]
pub struct ForwardKey {
    pub port: u16,
}

impl ForwardKey {
    #[inline(always)]
    pub const fn from_wire(port: u16) -> Self {
        Self { port }
    }

    pub fn new(host_port: u16) -> Self {
        Self::from_wire(host_port.to_be())
    }

    pub fn host_port(&self) -> u16 {
        u16::from_be(self.port)
    }
}

/// Key of the reverse NAT table, network byte order.
///
/// Built from a packet's destination address and *source* port.  The client
/// address and port are deliberately absent: a binding belongs to a bind
/// point, not to an individual client.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "user", derive(serde::Serialize, serde::Deserialize))]
pub struct ReverseKey {
    pub bind_addr: u32,
    pub bind_port: u16,
    /// Hashed as part of the key, must stay zero.
    pub _pad: u16,
}

impl ReverseKey {
    #[inline(always)]
    pub const fn from_wire(bind_addr: u32, bind_port: u16) -> Self {
        Self {
            bind_addr,
            bind_port,
            _pad: 0,
        }
    }

    pub fn new(ip: Ipv4Addr, host_port: u16) -> Self {
        Self::from_wire(u32::from_ne_bytes(ip.octets()), host_port.to_be())
    }
}

/// Timing record for one probed call.  Stored in the start table by the
/// entry probe and emitted, with `end_ns` filled in, by the return probe.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProbeEvent {
    pub start_ns: u64,
    pub end_ns: u64,
    pub pid: u32,
    pub _pad: u32,
    /// Leading bytes of the first pointer argument, zero filled.
    pub payload: [u8; PROBE_PAYLOAD_LEN],
}

impl ProbeEvent {
    #[inline(always)]
    pub const fn started(pid: u32, start_ns: u64) -> Self {
        Self {
            start_ns,
            end_ns: 0,
            pid,
            _pad: 0,
            payload: [0; PROBE_PAYLOAD_LEN],
        }
    }

    pub fn elapsed_ns(&self) -> u64 {
        self.end_ns.saturating_sub(self.start_ns)
    }
}

/// Repair the TCP checksum after a destination rewrite.
pub const SETTINGS_FIX_TCP_CSUM: u32 = 1 << 0;

/// Runtime switches, single slot written by the agent at load time.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LbSettings {
    pub flags: u32,
}

impl LbSettings {
    pub const fn new(flags: u32) -> Self {
        Self { flags }
    }

    #[inline(always)]
    pub const fn fix_tcp_checksum(&self) -> bool {
        self.flags & SETTINGS_FIX_TCP_CSUM != 0
    }
}

/// Slots of the per-CPU statistics array.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stat {
    Unparsed = 0,
    NoBackend = 1,
    Restored = 2,
    Selected = 3,
    ReverseRecordFailed = 4,
    ProbeMissingStart = 5,
    ProbeEmitFailed = 6,
}

pub const STAT_COUNT: u32 = 7;

impl Stat {
    pub const ALL: [Stat; STAT_COUNT as usize] = [
        Stat::Unparsed,
        Stat::NoBackend,
        Stat::Restored,
        Stat::Selected,
        Stat::ReverseRecordFailed,
        Stat::ProbeMissingStart,
        Stat::ProbeEmitFailed,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Stat::Unparsed => "unparsed",
            Stat::NoBackend => "no_backend",
            Stat::Restored => "restored",
            Stat::Selected => "selected",
            Stat::ReverseRecordFailed => "reverse_record_failed",
            Stat::ProbeMissingStart => "probe_missing_start",
            Stat::ProbeEmitFailed => "probe_emit_failed",
        }
    }
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for BackendInfo {}
#[cfg(feature = "user")]
unsafe impl aya::Pod for ForwardKey {}
#[cfg(feature = "user")]
unsafe impl aya::Pod for ReverseKey {}
#[cfg(feature = "user")]
unsafe impl aya::Pod for ProbeEvent {}
#[cfg(feature = "user")]
unsafe impl aya::Pod for LbSettings {}
