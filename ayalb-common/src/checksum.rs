//! Ones'-complement checksum helpers for rewritten headers.

use crate::packet::IPV4_HDR_LEN;

/// Fold carries back into the low 16 bits and complement.
///
/// Four rounds cover any sum of up to 2^48 words, far more than a
/// 20-byte header can produce.
#[inline(always)]
pub fn fold(mut csum: u64) -> u16 {
    for _ in 0..4 {
        if csum >> 16 != 0 {
            csum = (csum & 0xffff) + (csum >> 16);
        }
    }
    !(csum as u16)
}

/// Checksum of an IPv4 header whose checksum field is already zero.
#[inline(always)]
pub fn ipv4_header_checksum(ip: &[u8; IPV4_HDR_LEN]) -> u16 {
    let mut sum: u64 = 0;
    for i in 0..IPV4_HDR_LEN / 2 {
        sum += u16::from_be_bytes([ip[2 * i], ip[2 * i + 1]]) as u64;
    }
    fold(sum)
}

/// RFC 1624 incremental update for one changed 16-bit word:
/// `HC' = ~(~HC + ~m + m')`.
#[inline(always)]
pub fn replace_u16(check: u16, old: u16, new: u16) -> u16 {
    fold(!check as u64 + !old as u64 + new as u64)
}

/// Same as [`replace_u16`] for a changed 32-bit field.
#[inline(always)]
pub fn replace_u32(check: u16, old: u32, new: u32) -> u16 {
    let sum = !check as u64
        + !(old >> 16) as u16 as u64
        + !(old as u16) as u64
        + (new >> 16) as u64
        + (new & 0xffff) as u64;
    fold(sum)
}
