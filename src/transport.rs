//! Datagram transport abstraction.
//!
//! Both engines speak to the network through [`Transport`] instead of a
//! concrete socket. The production implementation wraps a blocking
//! [`UdpSocket`]; tests substitute a scripted in-memory transport so loss,
//! duplication and reordering are deterministic.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

/// A connectionless datagram endpoint with a bounded blocking receive.
pub trait Transport {
    /// Send one datagram to `peer`.
    fn send_to(&mut self, data: &[u8], peer: SocketAddr) -> io::Result<()>;

    /// Block up to `timeout` for one datagram. Returns `Ok(None)` when the
    /// timeout elapses without traffic.
    fn recv_from(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> io::Result<Option<(usize, SocketAddr)>>;

    /// The local address this endpoint is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Blocking UDP socket transport.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    read_timeout: Option<Duration>,
}

impl UdpTransport {
    /// Bind a socket to `addr`. Port 0 requests an ephemeral port.
    pub fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        Ok(UdpTransport {
            socket,
            read_timeout: None,
        })
    }

    /// Bind an ephemeral local socket, the shape a client uses.
    pub fn ephemeral() -> io::Result<Self> {
        Self::bind(("0.0.0.0", 0))
    }
}

impl Transport for UdpTransport {
    fn send_to(&mut self, data: &[u8], peer: SocketAddr) -> io::Result<()> {
        self.socket.send_to(data, peer)?;
        Ok(())
    }

    fn recv_from(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> io::Result<Option<(usize, SocketAddr)>> {
        // Only touch the socket option when the deadline actually changes.
        if self.read_timeout != Some(timeout) {
            self.socket.set_read_timeout(Some(timeout))?;
            self.read_timeout = Some(timeout);
        }

        match self.socket.recv_from(buf) {
            Ok((len, peer)) => Ok(Some((len, peer))),
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}
