//! Frame building and parsing.
//!
//! Payload slices are copied verbatim from the task buffer with
//! bounds-checked slicing; there is no framing beyond the IPv4 total
//! length.

use bytemuck::{bytes_of, pod_read_unaligned};

use crate::headers::*;
use crate::{WireAddr, WireProto};

/// Bytes of payload that fit in one packet of `pkt_size` on-wire bytes.
pub fn payload_capacity(pkt_size: u16, proto: WireProto) -> usize {
    (pkt_size as usize)
        .saturating_sub(ETHER_HEADER_LEN + IPV4_HEADER_LEN + proto.header_len())
}

/// Encode a data frame carrying `payload` with the given sequence id.
/// The buffer is cleared first and holds the complete frame afterwards.
pub fn encode_data(addr: &WireAddr, proto: WireProto, seq: u32, payload: &[u8], buf: &mut Vec<u8>) {
    let total = IPV4_HEADER_LEN + proto.header_len() + payload.len();

    buf.clear();
    buf.extend_from_slice(bytes_of(&EtherHeader::new(addr.src_mac, addr.dst_mac)));
    buf.extend_from_slice(bytes_of(&Ipv4Header::new(
        addr.src_ip.octets(),
        addr.dst_ip.octets(),
        proto.protocol_id(),
        total as u16,
    )));
    match proto {
        WireProto::Tcp => {
            buf.extend_from_slice(bytes_of(&TcpLikeHeader::new(
                addr.src_port,
                addr.dst_port,
                seq,
            )));
        }
        WireProto::Udp => {
            buf.extend_from_slice(bytes_of(&UdpLikeHeader::new(
                addr.src_port,
                addr.dst_port,
                payload.len() as u16,
            )));
        }
    }
    buf.extend_from_slice(payload);
}

/// Encode a header-only probe frame; the sequence field carries the probe
/// loop index.
pub fn encode_probe(addr: &WireAddr, seq: u32, buf: &mut Vec<u8>) {
    encode_data(addr, WireProto::Tcp, seq, &[], buf);
}

/// One parsed frame: the full header stack plus the payload offset.
#[derive(Debug, Clone, Copy)]
pub struct ParsedFrame {
    pub ether: EtherHeader,
    pub ipv4: Ipv4Header,
    pub transport: TransportHeader,
    pub payload_offset: usize,
}

/// Parse the header stack. `None` for anything that is not a well-formed
/// IPv4 frame of a known transport kind; such frames are silently dropped
/// by every consumer.
pub fn parse(frame: &[u8]) -> Option<ParsedFrame> {
    if frame.len() < ETHER_HEADER_LEN + IPV4_HEADER_LEN {
        return None;
    }
    let ether: EtherHeader = pod_read_unaligned(&frame[..ETHER_HEADER_LEN]);
    if !ether.is_ipv4() {
        return None;
    }
    let ipv4: Ipv4Header =
        pod_read_unaligned(&frame[ETHER_HEADER_LEN..ETHER_HEADER_LEN + IPV4_HEADER_LEN]);

    let transport_off = ETHER_HEADER_LEN + IPV4_HEADER_LEN;
    let (transport, payload_offset) = match ipv4.protocol {
        PROTO_TCP => {
            if frame.len() < transport_off + TCP_HEADER_LEN {
                return None;
            }
            let tcp: TcpLikeHeader =
                pod_read_unaligned(&frame[transport_off..transport_off + TCP_HEADER_LEN]);
            (TransportHeader::Tcp(tcp), transport_off + TCP_HEADER_LEN)
        }
        PROTO_UDP => {
            if frame.len() < transport_off + UDP_HEADER_LEN {
                return None;
            }
            let udp: UdpLikeHeader =
                pod_read_unaligned(&frame[transport_off..transport_off + UDP_HEADER_LEN]);
            (TransportHeader::Udp(udp), transport_off + UDP_HEADER_LEN)
        }
        _ => return None,
    };

    Some(ParsedFrame {
        ether,
        ipv4,
        transport,
        payload_offset,
    })
}

/// Reflect a TCP-like frame back at its sender as a header-only ack:
/// L2/L3 addresses and L4 ports swapped, ACK flag set, total length
/// recomputed for the header-only size. Writes the response into `out`
/// and returns `true`, or returns `false` for frames of any other kind.
pub fn reflect_ack(frame: &[u8], out: &mut Vec<u8>) -> bool {
    let parsed = match parse(frame) {
        Some(p) => p,
        None => return false,
    };
    let tcp = match parsed.transport {
        TransportHeader::Tcp(tcp) => tcp,
        TransportHeader::Udp(_) => return false,
    };

    let mut ether = parsed.ether;
    ether.dst_mac = parsed.ether.src_mac;
    ether.src_mac = parsed.ether.dst_mac;

    let mut ipv4 = parsed.ipv4;
    ipv4.dst_addr = parsed.ipv4.src_addr;
    ipv4.src_addr = parsed.ipv4.dst_addr;
    ipv4.set_total_length((IPV4_HEADER_LEN + TCP_HEADER_LEN) as u16);

    let mut ack = tcp;
    ack.dst_port = tcp.src_port;
    ack.src_port = tcp.dst_port;
    ack.flags = TCP_ACK_FLAG;

    out.clear();
    out.extend_from_slice(bytes_of(&ether));
    out.extend_from_slice(bytes_of(&ipv4));
    out.extend_from_slice(bytes_of(&ack));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn addr() -> WireAddr {
        WireAddr {
            src_mac: [0x02, 0, 0, 0, 0, 1],
            dst_mac: [0x02, 0, 0, 0, 0, 2],
            src_ip: Ipv4Addr::new(10, 0, 0, 1),
            dst_ip: Ipv4Addr::new(10, 0, 0, 2),
            src_port: 5000,
            dst_port: 5001,
        }
    }

    #[test]
    fn data_frame_round_trip() {
        let mut buf = Vec::new();
        encode_data(&addr(), WireProto::Tcp, 42, b"hello", &mut buf);
        assert_eq!(
            buf.len(),
            ETHER_HEADER_LEN + IPV4_HEADER_LEN + TCP_HEADER_LEN + 5
        );

        let frame = parse(&buf).unwrap();
        assert_eq!(frame.transport.sequence(), Some(42));
        assert_eq!(&buf[frame.payload_offset..], b"hello");
        assert_eq!(
            frame.ipv4.total_length() as usize,
            IPV4_HEADER_LEN + TCP_HEADER_LEN + 5
        );
    }

    #[test]
    fn udp_frame_has_no_sequence() {
        let mut buf = Vec::new();
        encode_data(&addr(), WireProto::Udp, 0, b"xyz", &mut buf);
        let frame = parse(&buf).unwrap();
        assert_eq!(frame.transport.sequence(), None);
        match frame.transport {
            TransportHeader::Udp(udp) => assert_eq!(udp.length(), 3),
            TransportHeader::Tcp(_) => panic!("wrong transport kind"),
        }
    }

    #[test]
    fn short_and_foreign_frames_drop() {
        assert!(parse(&[0u8; 10]).is_none());

        let mut buf = Vec::new();
        encode_data(&addr(), WireProto::Tcp, 1, b"x", &mut buf);
        // Corrupt the ethertype.
        buf[12] = 0x86;
        buf[13] = 0xdd;
        assert!(parse(&buf).is_none());

        // Unknown IP protocol.
        encode_data(&addr(), WireProto::Tcp, 1, b"x", &mut buf);
        buf[ETHER_HEADER_LEN + 9] = 47;
        assert!(parse(&buf).is_none());
    }

    #[test]
    fn reflected_ack_swaps_addressing() {
        let mut buf = Vec::new();
        encode_data(&addr(), WireProto::Tcp, 7, b"payload", &mut buf);

        let mut ack = Vec::new();
        assert!(reflect_ack(&buf, &mut ack));
        assert_eq!(ack.len(), ETHER_HEADER_LEN + IPV4_HEADER_LEN + TCP_HEADER_LEN);

        let parsed = parse(&ack).unwrap();
        assert_eq!(parsed.ether.dst_mac, addr().src_mac);
        assert_eq!(parsed.ether.src_mac, addr().dst_mac);
        assert_eq!(parsed.ipv4.dst_addr, addr().src_ip.octets());
        match parsed.transport {
            TransportHeader::Tcp(tcp) => {
                assert_eq!(tcp.sequence(), 7);
                assert!(tcp.is_ack());
                assert_eq!(u16::from_be(tcp.dst_port), 5000);
            }
            TransportHeader::Udp(_) => panic!("ack must be TCP-like"),
        }
    }

    #[test]
    fn udp_frames_are_not_reflected() {
        let mut buf = Vec::new();
        encode_data(&addr(), WireProto::Udp, 0, b"payload", &mut buf);
        let mut ack = Vec::new();
        assert!(!reflect_ack(&buf, &mut ack));
    }

    #[test]
    fn payload_capacity_accounts_for_headers() {
        assert_eq!(payload_capacity(1500, WireProto::Tcp), 1500 - 14 - 20 - 20);
        assert_eq!(payload_capacity(1500, WireProto::Udp), 1500 - 14 - 20 - 8);
        assert_eq!(payload_capacity(40, WireProto::Tcp), 0);
    }
}
