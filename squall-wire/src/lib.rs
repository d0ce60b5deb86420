//! # squall-wire
//!
//! The wire envelope for squall traffic: a fixed-order
//! Ethernet + IPv4 + TCP-like-or-UDP-like header stack.
//!
//! This is not a real TCP/UDP implementation. The TCP-like header's
//! sequence field carries the application sequence id, flags and window
//! are set but never interpreted beyond "is this an ack", and no checksum
//! is ever computed. The IPv4 protocol field is the only discriminator
//! between the two transport kinds.
//!
//! ```rust
//! use squall_wire::{encode_data, parse, TransportHeader, WireAddr, WireProto};
//!
//! let addr = WireAddr::default();
//! let mut buf = Vec::new();
//! encode_data(&addr, WireProto::Tcp, 7, b"payload", &mut buf);
//!
//! let frame = parse(&buf).unwrap();
//! match frame.transport {
//!     TransportHeader::Tcp(tcp) => assert_eq!(tcp.sequence(), 7),
//!     TransportHeader::Udp(_) => unreachable!(),
//! }
//! ```

mod frame;
mod headers;

pub use frame::{encode_data, encode_probe, parse, payload_capacity, reflect_ack, ParsedFrame};
pub use headers::{
    EtherHeader, Ipv4Header, MacAddr, TcpLikeHeader, TransportHeader, UdpLikeHeader,
    ETHER_HEADER_LEN, ETHER_TYPE_IPV4, IPV4_HEADER_LEN, PROTO_TCP, PROTO_UDP, TCP_ACK_FLAG,
    TCP_HEADER_LEN, UDP_HEADER_LEN,
};

use std::net::Ipv4Addr;

/// The transport kind discriminator carried in the IPv4 protocol field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireProto {
    Tcp,
    Udp,
}

impl WireProto {
    pub fn protocol_id(self) -> u8 {
        match self {
            WireProto::Tcp => PROTO_TCP,
            WireProto::Udp => PROTO_UDP,
        }
    }

    /// Transport header length for this kind.
    pub fn header_len(self) -> usize {
        match self {
            WireProto::Tcp => TCP_HEADER_LEN,
            WireProto::Udp => UDP_HEADER_LEN,
        }
    }
}

/// L2/L3/L4 addressing for one endpoint pair. Immutable once built from
/// configuration; every frame a worker emits uses the same addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireAddr {
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
}

impl Default for WireAddr {
    fn default() -> Self {
        Self {
            src_mac: [0; 6],
            dst_mac: [0; 6],
            src_ip: Ipv4Addr::UNSPECIFIED,
            dst_ip: Ipv4Addr::UNSPECIFIED,
            src_port: 0,
            dst_port: 0,
        }
    }
}
