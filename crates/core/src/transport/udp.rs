use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};

use crate::error::{Result, StreamError};

/// UDP transport for outbound RTP packet delivery.
///
/// Binds an ephemeral socket of the destination's address family and
/// `connect`s it to the peer, so every send goes to one endpoint and
/// ICMP errors surface on later sends. The socket is non-blocking: a full
/// send buffer yields `WouldBlock` instead of stalling the caller.
///
/// Name resolution is separate ([`resolve`](Self::resolve)) and happens
/// once per stream. Reconnecting drops this value and calls
/// [`connect`](Self::connect) again with the stored address, which never
/// waits on the network.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl UdpTransport {
    /// Resolve `host:port` to the first address the system returns.
    ///
    /// May block on DNS; call it at setup, not per packet.
    pub fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
        let mut addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| StreamError::AddressResolution(format!("{host}:{port}: {e}")))?;
        addrs
            .next()
            .ok_or_else(|| StreamError::AddressResolution(format!("{host}:{port}")))
    }

    /// Open a socket towards an already resolved `peer`.
    pub fn connect(peer: SocketAddr) -> Result<Self> {
        let local: SocketAddr = if peer.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(local)?;
        socket.connect(peer)?;
        socket.set_nonblocking(true)?;

        tracing::debug!(
            %peer,
            local = %socket.local_addr()?,
            "UDP socket connected"
        );

        Ok(Self { socket, peer })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Send one datagram to the peer.
    pub fn send(&self, datagram: &[u8]) -> Result<usize> {
        Ok(self.socket.send(datagram)?)
    }
}
