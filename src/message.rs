use std::{fmt, net::SocketAddr, os::fd::RawFd};

use bytes::BytesMut;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tcp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Udp => f.write_str("udp"),
            Transport::Tcp => f.write_str("tcp"),
        }
    }
}

/// Raw wire bytes together with where they came from or where they should go. Messages move
/// between threads through the queues and are never shared.
#[derive(Debug)]
pub struct Message {
    pub data: BytesMut,
    pub peer: SocketAddr,
    pub transport: Transport,
    /// The descriptor of the socket the message arrived on.
    pub source: RawFd,
}

impl Message {
    pub fn new(
        data: impl Into<BytesMut>,
        peer: SocketAddr,
        transport: Transport,
        source: RawFd,
    ) -> Self {
        Self {
            data: data.into(),
            peer,
            transport,
            source,
        }
    }

    pub fn udp(data: &[u8], peer: SocketAddr, source: RawFd) -> Self {
        Self::new(BytesMut::from(data), peer, Transport::Udp, source)
    }
}
