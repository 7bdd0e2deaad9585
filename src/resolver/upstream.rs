use std::{
    io,
    net::{Ipv4Addr, SocketAddr, UdpSocket},
    time::{Duration, Instant},
};

use thiserror::Error;

use crate::proto::MAX_UDP_MESSAGE_SIZE;

/// The IPv4 addresses of the thirteen root servers, a.root-servers.net through
/// m.root-servers.net.
pub const ROOT_SERVERS: [Ipv4Addr; 13] = [
    Ipv4Addr::new(198, 41, 0, 4),
    Ipv4Addr::new(170, 247, 170, 2),
    Ipv4Addr::new(192, 33, 4, 12),
    Ipv4Addr::new(199, 7, 91, 13),
    Ipv4Addr::new(192, 203, 230, 10),
    Ipv4Addr::new(192, 5, 5, 241),
    Ipv4Addr::new(192, 112, 36, 4),
    Ipv4Addr::new(198, 97, 190, 53),
    Ipv4Addr::new(192, 36, 148, 17),
    Ipv4Addr::new(192, 58, 128, 30),
    Ipv4Addr::new(193, 0, 14, 129),
    Ipv4Addr::new(199, 7, 83, 42),
    Ipv4Addr::new(202, 12, 27, 33),
];

pub const DNS_PORT: u16 = 53;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("No reply from {0} in time")]
    Timeout(SocketAddr),
    #[error("Failed to exchange a message with {server}: {source}")]
    Io {
        server: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Sends one query to a name server and waits for its reply.
pub trait Upstream {
    fn exchange(&mut self, server: SocketAddr, query: &[u8]) -> Result<Vec<u8>, UpstreamError>;
}

/// A blocking UDP socket with a read timeout. Datagrams from other addresses than the server
/// asked, and late replies carrying the id of an earlier query, are discarded. The timeout
/// bounds the whole exchange no matter how many datagrams are discarded.
pub struct UdpUpstream {
    socket: UdpSocket,
    timeout: Duration,
    buffer: [u8; MAX_UDP_MESSAGE_SIZE],
}

impl UdpUpstream {
    pub fn bind(timeout: Duration) -> io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        Ok(Self {
            socket,
            timeout,
            buffer: [0; MAX_UDP_MESSAGE_SIZE],
        })
    }
}

impl Upstream for UdpUpstream {
    fn exchange(&mut self, server: SocketAddr, query: &[u8]) -> Result<Vec<u8>, UpstreamError> {
        let io_error = |source| UpstreamError::Io { server, source };
        let deadline = Instant::now() + self.timeout;
        self.socket.send_to(query, server).map_err(io_error)?;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(UpstreamError::Timeout(server));
            }
            self.socket
                .set_read_timeout(Some(remaining))
                .map_err(io_error)?;
            match self.socket.recv_from(&mut self.buffer) {
                Ok((size, from)) if from != server => {
                    tracing::debug!("Ignoring {size} byte datagram from {from}")
                }
                Ok((size, _)) if size >= 2 && !query.starts_with(&self.buffer[..2]) => {
                    tracing::debug!(
                        "Ignoring stale reply {:#06x} from {server}",
                        u16::from_be_bytes([self.buffer[0], self.buffer[1]])
                    )
                }
                Ok((size, _)) => return Ok(self.buffer[..size].to_vec()),
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    return Err(UpstreamError::Timeout(server))
                }
                Err(err) => return Err(io_error(err)),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn exchanges_with_local_server() {
        let server = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let server_addr = server.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let mut buffer = [0; 64];
            let (size, from) = server.recv_from(&mut buffer).unwrap();
            buffer[2..size].reverse();
            server.send_to(&buffer[..size], from).unwrap();
        });

        let mut upstream = UdpUpstream::bind(Duration::from_secs(2)).unwrap();
        let reply = upstream.exchange(server_addr, &[1, 2, 3, 4]).unwrap();
        assert_eq!(reply, [1, 2, 4, 3]);
        handle.join().unwrap();
    }

    #[test]
    fn silent_server_times_out() {
        let server = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let server_addr = server.local_addr().unwrap();
        let mut upstream = UdpUpstream::bind(Duration::from_millis(50)).unwrap();
        assert!(matches!(
            upstream.exchange(server_addr, &[0; 12]),
            Err(UpstreamError::Timeout(addr)) if addr == server_addr
        ));
    }

    #[test]
    fn late_reply_to_earlier_query_is_skipped() {
        let server = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let server_addr = server.local_addr().unwrap();
        let mut upstream = UdpUpstream::bind(Duration::from_millis(100)).unwrap();
        assert!(matches!(
            upstream.exchange(server_addr, &[1, 1, 0, 0]),
            Err(UpstreamError::Timeout(_))
        ));

        // The first query is answered only after the client gave up on it.
        let mut buffer = [0; 64];
        let (size, client) = server.recv_from(&mut buffer).unwrap();
        server.send_to(&buffer[..size], client).unwrap();
        let handle = std::thread::spawn(move || {
            let (size, from) = server.recv_from(&mut buffer).unwrap();
            server.send_to(&buffer[..size], from).unwrap();
        });

        let reply = upstream.exchange(server_addr, &[2, 2, 0, 0]).unwrap();
        assert_eq!(reply, [2, 2, 0, 0]);
        handle.join().unwrap();
    }

    #[test]
    fn foreign_traffic_does_not_extend_timeout() {
        let server = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let server_addr = server.local_addr().unwrap();
        let mut upstream = UdpUpstream::bind(Duration::from_millis(200)).unwrap();
        let port = upstream.socket.local_addr().unwrap().port();

        let noise = std::thread::spawn(move || {
            let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
            for _ in 0..40 {
                let _ = socket.send_to(&[0; 12], (Ipv4Addr::LOCALHOST, port));
                std::thread::sleep(Duration::from_millis(25));
            }
        });

        let started = Instant::now();
        assert!(matches!(
            upstream.exchange(server_addr, &[0; 12]),
            Err(UpstreamError::Timeout(_))
        ));
        assert!(started.elapsed() < Duration::from_millis(700));
        noise.join().unwrap();
    }
}
