//! Reflector (server) mode.
//!
//! Frames arrive UDP-encapsulated from any number of client flows. Each
//! reflectable frame gets an acknowledgment built into a scratch buffer and
//! sent straight back to the datagram's source, so no per-flow state is
//! kept. Open-loop traffic is received and dropped.

use std::io;
use std::net::{SocketAddr, UdpSocket};

use socket2::{Domain, Socket, Type};
use squall::affinity;
use squall_engine::Shutdown;
use squall_wire as wire;
use tracing::{debug, info, warn};

const SOCKET_BUFFER_SIZE: usize = 8 * 1024 * 1024;
const RECV_BUFFER_SIZE: usize = 2048;
const SHUTDOWN_POLL_INTERVAL: u32 = 4096;

pub fn run(
    bind: &str,
    port: u16,
    core: Option<usize>,
    shutdown: &Shutdown,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(core) = core {
        if let Err(e) = affinity::pin_to_core(core) {
            warn!(core, error = %e, "core pinning failed");
        }
    }

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, None)?;
    socket.set_reuse_address(true)?;
    socket.set_send_buffer_size(SOCKET_BUFFER_SIZE)?;
    socket.set_recv_buffer_size(SOCKET_BUFFER_SIZE)?;
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;
    let socket: UdpSocket = socket.into();
    info!(%addr, "reflector listening");

    let mut rx = [0u8; RECV_BUFFER_SIZE];
    let mut ack = Vec::with_capacity(64);
    let mut iterations = 0u32;
    let mut reflected = 0u64;

    loop {
        match socket.recv_from(&mut rx) {
            Ok((n, peer)) => {
                squall::record_receive(n as u64);
                if wire::reflect_ack(&rx[..n], &mut ack) {
                    match socket.send_to(&ack, peer) {
                        Ok(sent) => {
                            squall::record_send(sent as u64);
                            reflected += 1;
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                            squall::record_backpressure();
                        }
                        Err(e) => debug!(error = %e, "reflect send failed"),
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => debug!(error = %e, "recv failed"),
        }

        iterations += 1;
        if iterations >= SHUTDOWN_POLL_INTERVAL {
            iterations = 0;
            if shutdown.is_requested() {
                info!(reflected, "reflector stopping");
                return Ok(());
            }
        }
    }
}
