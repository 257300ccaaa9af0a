use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use crate::constants::MAX_PACKET_SIZE;

/// Unreliable datagram delivery. Receives never block.
pub trait Transport {
    fn local_addr(&self) -> SocketAddr;

    fn send_datagram(&mut self, addr: SocketAddr, bytes: &[u8]) -> io::Result<()>;

    /// Next pending datagram, or `None` when nothing is waiting.
    fn poll_datagram(&mut self) -> io::Result<Option<(SocketAddr, Vec<u8>)>>;
}

pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    recv_buffer: [u8; MAX_PACKET_SIZE],
}

impl UdpTransport {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;

        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            recv_buffer: [0u8; MAX_PACKET_SIZE],
        })
    }
}

impl Transport for UdpTransport {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn send_datagram(&mut self, addr: SocketAddr, bytes: &[u8]) -> io::Result<()> {
        if bytes.len() > MAX_PACKET_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Packet exceeds MTU",
            ));
        }
        self.socket.send_to(bytes, addr)?;
        Ok(())
    }

    fn poll_datagram(&mut self) -> io::Result<Option<(SocketAddr, Vec<u8>)>> {
        loop {
            match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((0, _)) => continue,
                Ok((size, addr)) => return Ok(Some((addr, self.recv_buffer[..size].to_vec()))),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                // ICMP port unreachable surfaces here on some platforms
                Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_udp_loopback() {
        let mut a = UdpTransport::bind("127.0.0.1:0").unwrap();
        let mut b = UdpTransport::bind("127.0.0.1:0").unwrap();
        assert!(a.poll_datagram().unwrap().is_none());

        a.send_datagram(b.local_addr(), &[1, 2, 3]).unwrap();
        let mut received = None;
        for _ in 0..100 {
            received = b.poll_datagram().unwrap();
            if received.is_some() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(received, Some((a.local_addr(), vec![1, 2, 3])));
    }

    #[test]
    fn test_oversized_rejected() {
        let mut a = UdpTransport::bind("127.0.0.1:0").unwrap();
        let target = a.local_addr();
        let err = a
            .send_datagram(target, &vec![0; MAX_PACKET_SIZE + 1])
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
