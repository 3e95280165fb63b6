//! Host-side fixtures: packet builder and in-memory tables.

use std::cell::RefCell;
use std::sync::Mutex;

use crate::probe::EventSink;
use crate::table::{FlowLookup, FlowTable, TableError};

#[derive(Clone, Debug)]
pub struct PacketSpec {
    pub src: [u8; 4],
    pub dst: [u8; 4],
    pub src_port: u16,
    pub dst_port: u16,
    pub ttl: u8,
    pub payload: Vec<u8>,
}

impl Default for PacketSpec {
    fn default() -> Self {
        Self {
            src: [172, 16, 0, 2],
            dst: [192, 168, 1, 10],
            src_port: 40000,
            dst_port: 8080,
            ttl: 64,
            payload: b"GET / HTTP/1.1\r\n\r\n".to_vec(),
        }
    }
}

pub fn ones_complement_sum(bytes: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    for chunk in bytes.chunks(2) {
        let word = match chunk {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [hi] => u16::from_be_bytes([*hi, 0]),
            _ => unreachable!(),
        };
        sum += word as u32;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    sum as u16
}

fn pseudo_header(ip: &[u8], tcp_len: usize) -> Vec<u8> {
    let mut pseudo = Vec::with_capacity(12);
    pseudo.extend_from_slice(&ip[12..20]);
    pseudo.push(0);
    pseudo.push(6);
    pseudo.extend_from_slice(&(tcp_len as u16).to_be_bytes());
    pseudo
}

/// True when the TCP checksum of a full Ethernet frame verifies.
pub fn tcp_checksum_valid(frame: &[u8]) -> bool {
    let ip = &frame[14..34];
    let segment = &frame[34..];
    let mut data = pseudo_header(ip, segment.len());
    data.extend_from_slice(segment);
    ones_complement_sum(&data) == 0xffff
}

/// Ethernet + IPv4 + TCP frame with valid IPv4 and TCP checksums.
pub fn tcp_packet(spec: &PacketSpec) -> Vec<u8> {
    let tcp_len = 20 + spec.payload.len();
    let total_len = (20 + tcp_len) as u16;

    let mut frame = Vec::new();
    // Ethernet
    frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 0x01]);
    frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 0x02]);
    frame.extend_from_slice(&0x0800u16.to_be_bytes());

    // IPv4
    let mut ip = vec![0x45, 0x00];
    ip.extend_from_slice(&total_len.to_be_bytes());
    ip.extend_from_slice(&[0x12, 0x34, 0x40, 0x00, spec.ttl, 6, 0, 0]);
    ip.extend_from_slice(&spec.src);
    ip.extend_from_slice(&spec.dst);
    let check = !ones_complement_sum(&ip);
    ip[10..12].copy_from_slice(&check.to_be_bytes());
    frame.extend_from_slice(&ip);

    // TCP
    let mut tcp = Vec::new();
    tcp.extend_from_slice(&spec.src_port.to_be_bytes());
    tcp.extend_from_slice(&spec.dst_port.to_be_bytes());
    tcp.extend_from_slice(&1u32.to_be_bytes());
    tcp.extend_from_slice(&0u32.to_be_bytes());
    tcp.extend_from_slice(&[0x50, 0x18, 0xff, 0xff, 0, 0, 0, 0]);
    tcp.extend_from_slice(&spec.payload);
    let mut data = pseudo_header(&ip, tcp.len());
    data.extend_from_slice(&tcp);
    let check = !ones_complement_sum(&data);
    tcp[16..18].copy_from_slice(&check.to_be_bytes());
    frame.extend_from_slice(&tcp);

    frame
}

/// Fixed-capacity table with optional least-recently-used eviction, the two
/// behaviours of the BPF hash and LRU hash maps.
pub struct BoundedTable<K, V> {
    capacity: usize,
    evict_lru: bool,
    // Most recently used last.
    entries: Mutex<Vec<(K, V)>>,
}

impl<K: PartialEq + Copy, V: Copy> BoundedTable<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            evict_lru: false,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn lru(capacity: usize) -> Self {
        Self {
            evict_lru: true,
            ..Self::new(capacity)
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| *v)
    }
}

impl<K: PartialEq + Copy, V: Copy> FlowLookup<K, V> for BoundedTable<K, V> {
    fn lookup(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().unwrap();
        let pos = entries.iter().position(|(k, _)| k == key)?;
        let entry = entries.remove(pos);
        entries.push(entry);
        Some(entry.1)
    }
}

impl<K: PartialEq + Copy, V: Copy> FlowTable<K, V> for BoundedTable<K, V> {
    fn upsert(&self, key: &K, value: &V) -> Result<(), TableError> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(pos) = entries.iter().position(|(k, _)| k == key) {
            entries.remove(pos);
        } else if entries.len() >= self.capacity {
            if !self.evict_lru {
                return Err(TableError::Full);
            }
            entries.remove(0);
        }
        entries.push((*key, *value));
        Ok(())
    }

    fn remove(&self, key: &K) -> Result<(), TableError> {
        let mut entries = self.entries.lock().unwrap();
        let pos = entries
            .iter()
            .position(|(k, _)| k == key)
            .ok_or(TableError::NotFound)?;
        entries.remove(pos);
        Ok(())
    }
}

/// Event channel that records everything it is given.
pub struct VecSink<T> {
    pub events: RefCell<Vec<T>>,
    pub fail: bool,
}

impl<T> VecSink<T> {
    pub fn new() -> Self {
        Self {
            events: RefCell::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }
}

impl<T: Copy> EventSink<T> for VecSink<T> {
    fn emit(&self, event: &T) -> Result<(), i64> {
        if self.fail {
            return Err(-28);
        }
        self.events.borrow_mut().push(*event);
        Ok(())
    }
}
