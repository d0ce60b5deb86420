//! UDP-encapsulated packet substrate.
//!
//! Frames (ethernet header included) travel as UDP datagram payloads
//! between generator and responder hosts. On Linux the send path batches
//! with sendmmsg for a large syscall reduction; elsewhere it falls back to
//! one send per frame.

use std::io;
use std::net::{SocketAddr, UdpSocket};

use socket2::{Domain, Socket, Type};
use squall::clock;
use tracing::debug;

use crate::io::{PacketIo, BURST_RX, BURST_TX};

/// Socket buffer size (8MB for high throughput).
const SOCKET_BUFFER_SIZE: usize = 8 * 1024 * 1024;
/// Frames preallocated per substrate instance.
const FRAME_POOL_SIZE: usize = 8192;

#[cfg(target_os = "linux")]
struct BatchSender {
    msgvec: Vec<libc::mmsghdr>,
    iovecs: Vec<libc::iovec>,
}

#[cfg(target_os = "linux")]
impl BatchSender {
    fn new(batch_size: usize) -> Self {
        // Safety: libc mmsghdr and iovec are valid when zeroed
        Self {
            msgvec: vec![unsafe { std::mem::zeroed() }; batch_size],
            iovecs: vec![unsafe { std::mem::zeroed() }; batch_size],
        }
    }

    /// Transmit a prefix of `frames` over a connected socket. Returns the
    /// number of datagrams the kernel accepted.
    unsafe fn send_batch(&mut self, fd: i32, frames: &[Vec<u8>]) -> io::Result<usize> {
        if frames.is_empty() {
            return Ok(0);
        }
        let count = frames.len().min(self.msgvec.len());
        for i in 0..count {
            self.iovecs[i].iov_base = frames[i].as_ptr() as *mut _;
            self.iovecs[i].iov_len = frames[i].len();
            self.msgvec[i].msg_hdr.msg_name = std::ptr::null_mut();
            self.msgvec[i].msg_hdr.msg_namelen = 0;
            self.msgvec[i].msg_hdr.msg_iov = &mut self.iovecs[i] as *mut _;
            self.msgvec[i].msg_hdr.msg_iovlen = 1;
            self.msgvec[i].msg_len = 0;
        }
        let r = libc::sendmmsg(fd, self.msgvec.as_mut_ptr(), count as u32, 0);
        if r < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(r as usize)
        }
    }
}

#[cfg(target_os = "linux")]
struct BatchReceiver {
    msgvec: Vec<libc::mmsghdr>,
    iovecs: Vec<libc::iovec>,
}

#[cfg(target_os = "linux")]
impl BatchReceiver {
    fn new(batch_size: usize) -> Self {
        // Safety: libc mmsghdr and iovec are valid when zeroed
        Self {
            msgvec: vec![unsafe { std::mem::zeroed() }; batch_size],
            iovecs: vec![unsafe { std::mem::zeroed() }; batch_size],
        }
    }

    /// Receive into the caller's buffers, which must already be sized to
    /// their capacity. Returns per-datagram lengths for the filled prefix.
    unsafe fn recv_batch(&mut self, fd: i32, bufs: &mut [Vec<u8>]) -> io::Result<usize> {
        let count = bufs.len().min(self.msgvec.len());
        for i in 0..count {
            self.iovecs[i].iov_base = bufs[i].as_mut_ptr() as *mut _;
            self.iovecs[i].iov_len = bufs[i].len();
            self.msgvec[i].msg_hdr.msg_name = std::ptr::null_mut();
            self.msgvec[i].msg_hdr.msg_namelen = 0;
            self.msgvec[i].msg_hdr.msg_iov = &mut self.iovecs[i] as *mut _;
            self.msgvec[i].msg_hdr.msg_iovlen = 1;
            self.msgvec[i].msg_len = 0;
        }
        let r = libc::recvmmsg(
            fd,
            self.msgvec.as_mut_ptr(),
            count as u32,
            libc::MSG_DONTWAIT,
            std::ptr::null_mut(),
        );
        if r < 0 {
            Err(io::Error::last_os_error())
        } else {
            let r = r as usize;
            for i in 0..r {
                bufs[i].truncate(self.msgvec[i].msg_len as usize);
            }
            Ok(r)
        }
    }
}

/// [`PacketIo`] over a connected, nonblocking UDP socket with a fixed
/// frame pool.
pub struct UdpEncapIo {
    socket: UdpSocket,
    pool: Vec<Vec<u8>>,
    frame_size: usize,
    #[cfg(target_os = "linux")]
    batch: BatchSender,
    #[cfg(target_os = "linux")]
    rx_batch: BatchReceiver,
}

impl UdpEncapIo {
    /// Bind to `local`, connect to `peer` and preallocate the frame pool.
    /// `frame_size` caps both outgoing frames and receive buffers.
    pub fn connect(local: SocketAddr, peer: SocketAddr, frame_size: usize) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, None)?;
        socket.set_reuse_address(true)?;
        socket.set_send_buffer_size(SOCKET_BUFFER_SIZE)?;
        socket.set_recv_buffer_size(SOCKET_BUFFER_SIZE)?;
        socket.bind(&local.into())?;
        socket.connect(&peer.into())?;
        socket.set_nonblocking(true)?;
        let socket: UdpSocket = socket.into();
        debug!(%local, %peer, frame_size, "udp substrate up");

        Ok(Self {
            socket,
            pool: (0..FRAME_POOL_SIZE)
                .map(|_| Vec::with_capacity(frame_size))
                .collect(),
            frame_size,
            #[cfg(target_os = "linux")]
            batch: BatchSender::new(BURST_TX),
            #[cfg(target_os = "linux")]
            rx_batch: BatchReceiver::new(BURST_RX),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl PacketIo for UdpEncapIo {
    fn alloc(&mut self) -> Option<Vec<u8>> {
        let mut buf = self.pool.pop()?;
        buf.clear();
        Some(buf)
    }

    #[cfg(target_os = "linux")]
    fn send_burst(&mut self, frames: &mut Vec<Vec<u8>>) -> usize {
        use std::os::unix::io::AsRawFd;
        // Safety: frames outlive the syscall; the socket fd is owned
        let sent = match unsafe { self.batch.send_batch(self.socket.as_raw_fd(), frames) } {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => 0,
            Err(_) => 0,
        };
        for frame in frames.drain(..sent) {
            self.pool.push(frame);
        }
        sent
    }

    #[cfg(not(target_os = "linux"))]
    fn send_burst(&mut self, frames: &mut Vec<Vec<u8>>) -> usize {
        let mut sent = 0;
        while sent < frames.len() {
            match self.socket.send(&frames[sent]) {
                Ok(_) => sent += 1,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(_) => break,
            }
        }
        for frame in frames.drain(..sent) {
            self.pool.push(frame);
        }
        sent
    }

    #[cfg(target_os = "linux")]
    fn recv_burst(&mut self, max: usize, out: &mut Vec<Vec<u8>>) -> usize {
        use std::os::unix::io::AsRawFd;
        let want = max.min(BURST_RX);
        let mut bufs: Vec<Vec<u8>> = Vec::with_capacity(want);
        while bufs.len() < want {
            let Some(mut buf) = self.alloc() else {
                break;
            };
            buf.resize(self.frame_size, 0);
            bufs.push(buf);
        }
        if bufs.is_empty() {
            return 0;
        }
        // Safety: bufs outlive the syscall; the socket fd is owned
        let got = match unsafe {
            self.rx_batch.recv_batch(self.socket.as_raw_fd(), &mut bufs)
        } {
            Ok(n) => n,
            Err(_) => 0,
        };
        let mut it = bufs.into_iter();
        for buf in it.by_ref().take(got) {
            out.push(buf);
        }
        for buf in it {
            self.pool.push(buf);
        }
        got
    }

    #[cfg(not(target_os = "linux"))]
    fn recv_burst(&mut self, max: usize, out: &mut Vec<Vec<u8>>) -> usize {
        let mut count = 0;
        while count < max {
            let Some(mut buf) = self.alloc() else {
                break;
            };
            buf.resize(self.frame_size, 0);
            match self.socket.recv(&mut buf) {
                Ok(n) => {
                    buf.truncate(n);
                    out.push(buf);
                    count += 1;
                }
                Err(_) => {
                    self.pool.push(buf);
                    break;
                }
            }
        }
        count
    }

    fn free_burst(&mut self, frames: &mut Vec<Vec<u8>>) {
        self.pool.append(frames);
    }

    fn now(&self) -> u64 {
        clock::now()
    }
}
