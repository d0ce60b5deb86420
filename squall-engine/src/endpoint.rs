//! Per-worker connection endpoint description.

use squall_wire::{WireAddr, WireProto};

/// What a worker does with the tasks it receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Sustained transfer, windowed (TCP-like) or open-loop (UDP-like).
    Bandwidth,
    /// Stop-and-wait RTT probing.
    Latency,
}

/// One worker's view of the wire: addressing, framing protocol and role.
/// Workers get distinct source ports so return traffic demuxes by flow.
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// Worker index, zero-based. Latency mode only runs on worker 0.
    pub id: u32,
    pub addr: WireAddr,
    pub proto: WireProto,
    /// Full frame size on the wire, headers included.
    pub pkt_size: u16,
    pub mode: Mode,
}

impl Endpoint {
    pub fn new(id: u32, addr: WireAddr, proto: WireProto, pkt_size: u16, mode: Mode) -> Self {
        Self {
            id,
            addr,
            proto,
            pkt_size,
            mode,
        }
    }

    /// Payload bytes carried per frame at this endpoint's packet size.
    pub fn payload_len(&self) -> usize {
        squall_wire::payload_capacity(self.pkt_size, self.proto)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            id: 0,
            addr: WireAddr::default(),
            proto: WireProto::Tcp,
            pkt_size: 1500,
            mode: Mode::Bandwidth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_len_subtracts_headers() {
        let ep = Endpoint::default();
        // 1500 - 14 (ether) - 20 (ipv4) - 20 (tcp)
        assert_eq!(ep.payload_len(), 1446);

        let udp = Endpoint {
            proto: WireProto::Udp,
            ..Endpoint::default()
        };
        assert_eq!(udp.payload_len(), 1458);
    }
}
