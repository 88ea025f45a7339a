//! Low-level async netlink socket operations.

use std::future::Future;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicU32, Ordering};

use bytes::BytesMut;
use netlink_sys::{Socket, SocketAddr, protocols};
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;

use super::error::Result;

/// A datagram endpoint carrying raw netlink frames.
///
/// Implemented by the kernel-backed [`NetlinkSocket`] and by the in-process
/// [`LoopbackSocket`](super::loopback::LoopbackSocket).
pub trait Transport: Send + Sync {
    /// Local port id.
    fn pid(&self) -> u32;

    /// Next request sequence number.
    fn next_seq(&self) -> u32;

    /// Join a multicast group by numeric id.
    fn add_membership(&mut self, group: u32) -> Result<()>;

    /// Send one or more complete netlink messages.
    fn send(&self, msg: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Receive the next datagram.
    fn recv_msg(&self) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// Async `NETLINK_GENERIC` socket.
pub struct NetlinkSocket {
    /// The underlying async file descriptor.
    fd: AsyncFd<Socket>,
    /// Sequence number counter.
    seq: AtomicU32,
    /// Local port ID (assigned by kernel).
    pid: u32,
}

impl NetlinkSocket {
    /// Open and bind a Generic Netlink socket.
    pub fn new() -> Result<Self> {
        let mut socket = Socket::new(protocols::NETLINK_GENERIC)?;
        socket.set_non_blocking(true)?;

        // Bind to get a port ID
        let mut addr = SocketAddr::new(0, 0);
        socket.bind(&addr)?;
        socket.get_address(&mut addr)?;
        let pid = addr.port_number();

        // Extended ACKs carry better error text; older kernels lack them.
        socket.set_ext_ack(true).ok();

        Ok(Self {
            fd: AsyncFd::new(socket)?,
            seq: AtomicU32::new(1),
            pid,
        })
    }
}

impl Transport for NetlinkSocket {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn next_seq(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn add_membership(&mut self, group: u32) -> Result<()> {
        self.fd.get_mut().add_membership(group)?;
        Ok(())
    }

    async fn send(&self, msg: &[u8]) -> Result<()> {
        loop {
            let mut guard = self.fd.ready(Interest::WRITABLE).await?;

            match guard.try_io(|inner| inner.get_ref().send(msg, 0)) {
                Ok(result) => {
                    result?;
                    return Ok(());
                }
                Err(_would_block) => continue,
            }
        }
    }

    async fn recv_msg(&self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(32768);

        loop {
            let mut guard = self.fd.ready(Interest::READABLE).await?;

            match guard.try_io(|inner| inner.get_ref().recv(&mut buf, 0)) {
                Ok(result) => {
                    result?;
                    return Ok(buf.to_vec());
                }
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsRawFd for NetlinkSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.get_ref().as_raw_fd()
    }
}
