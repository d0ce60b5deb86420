//! Header structs for the wire envelope.
//!
//! All multi-byte fields are stored big-endian; the accessor methods do the
//! byte-order conversion so callers never touch raw fields of a packed
//! struct.

use bytemuck::{Pod, Zeroable};

pub type MacAddr = [u8; 6];

pub const ETHER_HEADER_LEN: usize = 14;
pub const IPV4_HEADER_LEN: usize = 20;
pub const TCP_HEADER_LEN: usize = 20;
pub const UDP_HEADER_LEN: usize = 8;

pub const ETHER_TYPE_IPV4: u16 = 0x0800;
pub const PROTO_TCP: u8 = 6;
pub const PROTO_UDP: u8 = 17;
pub const TCP_ACK_FLAG: u8 = 0x10;

/// Ethernet II header.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct EtherHeader {
    pub dst_mac: MacAddr,
    pub src_mac: MacAddr,
    pub ethertype: u16,
}

impl EtherHeader {
    pub const SIZE: usize = ETHER_HEADER_LEN;

    pub fn new(src_mac: MacAddr, dst_mac: MacAddr) -> Self {
        Self {
            dst_mac,
            src_mac,
            ethertype: ETHER_TYPE_IPV4.to_be(),
        }
    }

    pub fn is_ipv4(&self) -> bool {
        u16::from_be(self.ethertype) == ETHER_TYPE_IPV4
    }
}

/// IPv4 header, version/IHL fixed at the standard minimum, checksum never
/// computed.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Ipv4Header {
    pub version_ihl: u8,
    pub tos: u8,
    pub total_length: u16,
    pub packet_id: u16,
    pub fragment_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub src_addr: [u8; 4],
    pub dst_addr: [u8; 4],
}

impl Ipv4Header {
    pub const SIZE: usize = IPV4_HEADER_LEN;

    pub fn new(src_addr: [u8; 4], dst_addr: [u8; 4], protocol: u8, total_length: u16) -> Self {
        Self {
            version_ihl: 0x45,
            tos: 0,
            total_length: total_length.to_be(),
            packet_id: 0,
            fragment_offset: 0,
            ttl: 0x0f,
            protocol,
            checksum: 0,
            src_addr,
            dst_addr,
        }
    }

    pub fn total_length(&self) -> u16 {
        u16::from_be(self.total_length)
    }

    pub fn set_total_length(&mut self, len: u16) {
        self.total_length = len.to_be();
    }
}

/// TCP-like header. The sequence field is repurposed as the application
/// sequence id; nothing else is honored.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct TcpLikeHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub sequence: u32,
    pub ack_number: u32,
    pub data_off: u8,
    pub flags: u8,
    pub window: u16,
    pub checksum: u16,
    pub urgent: u16,
}

impl TcpLikeHeader {
    pub const SIZE: usize = TCP_HEADER_LEN;

    pub fn new(src_port: u16, dst_port: u16, sequence: u32) -> Self {
        Self {
            src_port: src_port.to_be(),
            dst_port: dst_port.to_be(),
            sequence: sequence.to_be(),
            ack_number: 0,
            data_off: 0x50,
            flags: 0,
            window: 0xffffu16.to_be(),
            checksum: 0,
            urgent: 0,
        }
    }

    pub fn sequence(&self) -> u32 {
        u32::from_be(self.sequence)
    }

    pub fn is_ack(&self) -> bool {
        self.flags & TCP_ACK_FLAG != 0
    }
}

/// UDP-like header; only the length field is meaningful.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct UdpLikeHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub length: u16,
    pub checksum: u16,
}

impl UdpLikeHeader {
    pub const SIZE: usize = UDP_HEADER_LEN;

    pub fn new(src_port: u16, dst_port: u16, payload_len: u16) -> Self {
        Self {
            src_port: src_port.to_be(),
            dst_port: dst_port.to_be(),
            length: payload_len.to_be(),
            checksum: 0,
        }
    }

    pub fn length(&self) -> u16 {
        u16::from_be(self.length)
    }
}

/// Transport header parsed once per frame into a tagged variant.
#[derive(Debug, Clone, Copy)]
pub enum TransportHeader {
    Tcp(TcpLikeHeader),
    Udp(UdpLikeHeader),
}

impl TransportHeader {
    /// Application sequence id, if this kind carries one.
    pub fn sequence(&self) -> Option<u32> {
        match self {
            TransportHeader::Tcp(tcp) => Some(tcp.sequence()),
            TransportHeader::Udp(_) => None,
        }
    }

    pub fn header_len(&self) -> usize {
        match self {
            TransportHeader::Tcp(_) => TCP_HEADER_LEN,
            TransportHeader::Udp(_) => UDP_HEADER_LEN,
        }
    }
}
