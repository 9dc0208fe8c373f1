//! Non-blocking UDP socket wrapper.
//!
//! `NetChannel` drives its own state machine on a plain tick; it never
//! suspends waiting for I/O. This wraps `std::net::UdpSocket` in
//! non-blocking mode and turns `WouldBlock` into a first-class `Wait`
//! result rather than an error, so callers can poll it from a synchronous
//! loop (itself invoked from inside a tokio task, see `engine_server`/
//! `engine_client`) without ever `.await`-ing a socket read.

use std::io;
use std::net::UdpSocket;

use super::endpoint::IpEndpoint;

/// Outcome of a single non-blocking socket operation.
#[derive(Debug)]
pub enum SocketEvent<T> {
    /// The operation completed.
    Ready(T),
    /// Nothing was available (read) or the send buffer is full (write);
    /// not an error, just "try again next tick".
    Wait,
    /// The OS rejected the call outright.
    Failed(io::Error),
}

/// A bound, non-blocking UDP socket.
pub struct Socket {
    inner: UdpSocket,
    local_endpoint: IpEndpoint,
}

impl Socket {
    /// Binds to `endpoint` (port 0 picks an ephemeral port) and switches
    /// the socket into non-blocking mode.
    pub fn bind(endpoint: IpEndpoint) -> io::Result<Self> {
        let inner = UdpSocket::bind(std::net::SocketAddr::from(endpoint))?;
        inner.set_nonblocking(true)?;
        let local_endpoint = IpEndpoint::from(inner.local_addr()?);
        Ok(Self { inner, local_endpoint })
    }

    pub fn local_endpoint(&self) -> IpEndpoint {
        self.local_endpoint
    }

    /// Attempts to receive one datagram without blocking.
    pub fn receive_from(&self, buf: &mut [u8]) -> SocketEvent<(usize, IpEndpoint)> {
        match self.inner.recv_from(buf) {
            Ok((len, addr)) => SocketEvent::Ready((len, IpEndpoint::from(addr))),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => SocketEvent::Wait,
            Err(e) => SocketEvent::Failed(e),
        }
    }

    /// Attempts to send one datagram without blocking. A partial write
    /// (shouldn't happen for UDP but is defensively checked) is reported as
    /// `Wait` rather than silently dropping the remainder.
    pub fn send_to(&self, buf: &[u8], endpoint: IpEndpoint) -> SocketEvent<()> {
        match self.inner.send_to(buf, std::net::SocketAddr::from(endpoint)) {
            Ok(sent) if sent == buf.len() => SocketEvent::Ready(()),
            Ok(_) => SocketEvent::Wait,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => SocketEvent::Wait,
            Err(e) => SocketEvent::Failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_roundtrip() {
        let a = Socket::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let b = Socket::bind("127.0.0.1:0".parse().unwrap()).unwrap();

        match a.send_to(b"ping", b.local_endpoint()) {
            SocketEvent::Ready(()) => {}
            other => panic!("send failed: {other:?}"),
        }

        // Non-blocking recv may need a moment for loopback delivery on some
        // platforms; retry briefly instead of flaking.
        let mut buf = [0u8; 16];
        for _ in 0..1000 {
            if let SocketEvent::Ready((len, from)) = b.receive_from(&mut buf) {
                assert_eq!(&buf[..len], b"ping");
                assert_eq!(from, a.local_endpoint());
                return;
            }
            std::thread::yield_now();
        }
        panic!("never received datagram");
    }

    #[test]
    fn receive_without_data_waits_instead_of_blocking() {
        let socket = Socket::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let mut buf = [0u8; 16];
        assert!(matches!(socket.receive_from(&mut buf), SocketEvent::Wait));
    }
}
