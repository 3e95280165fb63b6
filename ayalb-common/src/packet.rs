use core::marker::PhantomData;
use core::ptr;

use network_types::{
    eth::{EthHdr, EtherType},
    ip::{IpProto, Ipv4Hdr},
    tcp::TcpHdr,
};

use crate::checksum;
use crate::types::BackendInfo;

pub const ETH_HDR_LEN: usize = EthHdr::LEN;
/// IPv4 header without options.
pub const IPV4_HDR_LEN: usize = Ipv4Hdr::LEN;
pub const TCP_HDR_LEN: usize = TcpHdr::LEN;
/// Bytes covered by a validated view.
pub const HEADERS_LEN: usize = ETH_HDR_LEN + IPV4_HDR_LEN + TCP_HDR_LEN;

const IP_FRAG_OFFSET_MASK: u16 = 0x1fff;

/// Bounds-checked view over the IPv4 and TCP headers of one packet.
///
/// Address and port accessors return raw wire-order values, the same
/// representation the tables store.
pub struct PacketView<'a> {
    ip: *mut Ipv4Hdr,
    tcp: *mut TcpHdr,
    _packet: PhantomData<&'a mut [u8]>,
}

impl<'a> PacketView<'a> {
    /// Validate a packet held in a byte slice.
    pub fn parse(buf: &'a mut [u8]) -> Option<Self> {
        let start = buf.as_mut_ptr() as usize;
        // SAFETY: [start, start + len) is exactly the exclusively borrowed slice.
        unsafe { Self::from_raw(start, start + buf.len()) }
    }

    /// Validate the packet in `[data, data_end)`.
    ///
    /// Every length check happens before the first read of the field it
    /// guards.  The comparisons are against `data_end` directly so the
    /// kernel verifier can track them.
    ///
    /// # Safety
    ///
    /// `[data, data_end)` must be valid for reads and writes for `'a` and not
    /// aliased by any other live reference.
    #[inline(always)]
    pub unsafe fn from_raw(data: usize, data_end: usize) -> Option<Self> {
        if data + EthHdr::LEN > data_end {
            return None;
        }
        let eth = data as *const EthHdr;
        // Compared as the raw repr: not every wire value is an enum variant.
        let ether_type = ptr::read_unaligned(ptr::addr_of!((*eth).ether_type) as *const u16);
        if ether_type != EtherType::Ipv4 as u16 {
            return None;
        }

        let ip_start = data + EthHdr::LEN;
        if ip_start + Ipv4Hdr::LEN > data_end {
            return None;
        }
        let ip = ip_start as *mut Ipv4Hdr;
        let proto = ptr::read_unaligned(ptr::addr_of!((*ip).proto) as *const u8);
        if proto != IpProto::Tcp as u8 {
            return None;
        }

        let tcp_start = ip_start + Ipv4Hdr::LEN;
        if tcp_start + TcpHdr::LEN > data_end {
            return None;
        }
        // Version and IHL share the first header byte.  Options would move
        // the TCP header and widen the checksum span.
        if ptr::read_unaligned(ip as *const u8) & 0x0f != 5 {
            return None;
        }
        // Later fragments carry payload where the TCP header would be.
        let frag_off = u16::from_be(ptr::read_unaligned(ptr::addr_of!((*ip).frag_off)));
        if frag_off & IP_FRAG_OFFSET_MASK != 0 {
            return None;
        }

        Some(Self {
            ip,
            tcp: tcp_start as *mut TcpHdr,
            _packet: PhantomData,
        })
    }

    pub fn src_addr(&self) -> u32 {
        unsafe { ptr::read_unaligned(ptr::addr_of!((*self.ip).src_addr)) }
    }

    pub fn dst_addr(&self) -> u32 {
        unsafe { ptr::read_unaligned(ptr::addr_of!((*self.ip).dst_addr)) }
    }

    pub fn src_port(&self) -> u16 {
        unsafe { ptr::read_unaligned(ptr::addr_of!((*self.tcp).source)) }
    }

    pub fn dst_port(&self) -> u16 {
        unsafe { ptr::read_unaligned(ptr::addr_of!((*self.tcp).dest)) }
    }

    /// IPv4 header checksum in host byte order.
    pub fn ip_checksum(&self) -> u16 {
        u16::from_be(unsafe { ptr::read_unaligned(ptr::addr_of!((*self.ip).check)) })
    }

    /// TCP checksum in host byte order.
    pub fn tcp_checksum(&self) -> u16 {
        u16::from_be(unsafe { ptr::read_unaligned(ptr::addr_of!((*self.tcp).check)) })
    }

    /// Point the packet at `target`.
    ///
    /// With `repair_tcp` the TCP checksum is patched for the changed address
    /// and port words.  The IPv4 header checksum is left stale; call
    /// [`PacketView::refresh_ip_checksum`] once all edits are done.
    #[inline(always)]
    pub fn set_destination(&mut self, target: &BackendInfo, repair_tcp: bool) {
        let old_addr = self.dst_addr();
        let old_port = self.dst_port();

        unsafe {
            ptr::write_unaligned(ptr::addr_of_mut!((*self.ip).dst_addr), target.address);
            ptr::write_unaligned(ptr::addr_of_mut!((*self.tcp).dest), target.port);
        }

        if repair_tcp {
            let check = checksum::replace_u32(
                self.tcp_checksum(),
                u32::from_be(old_addr),
                u32::from_be(target.address),
            );
            let check =
                checksum::replace_u16(check, u16::from_be(old_port), u16::from_be(target.port));
            unsafe { ptr::write_unaligned(ptr::addr_of_mut!((*self.tcp).check), check.to_be()) };
        }
    }

    /// Recompute the IPv4 header checksum from scratch.
    #[inline(always)]
    pub fn refresh_ip_checksum(&mut self) {
        unsafe {
            ptr::write_unaligned(ptr::addr_of_mut!((*self.ip).check), 0);
            // SAFETY: the header was bounds checked in `from_raw`; a byte
            // array has no alignment requirement.
            let words = &*(self.ip as *const [u8; IPV4_HDR_LEN]);
            let check = checksum::ipv4_header_checksum(words);
            ptr::write_unaligned(ptr::addr_of_mut!((*self.ip).check), check.to_be());
        }
    }
}
