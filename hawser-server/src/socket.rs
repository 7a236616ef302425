//! The socket-option surface applied to listening and accepted
//! sockets by the development binaries.

use std::{io, net::SocketAddr, time::Duration};

use tokio::net::{TcpListener, TcpSocket, TcpStream};

/// The recognized socket options and their defaults.
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Enable TCP keep-alive probes.
    pub keepalive: bool,

    /// Linger duration applied to accepted sockets.
    pub linger: Option<Duration>,

    /// Receive buffer size, in bytes.
    pub recv_buffer: Option<u32>,

    /// Send buffer size, in bytes.
    pub send_buffer: Option<u32>,

    /// Allow rebinding the listening address right away.
    pub reuseaddr: bool,

    /// Disable Nagle's algorithm on accepted sockets.
    pub nodelay: bool,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            keepalive: false,
            linger: None,
            recv_buffer: None,
            send_buffer: None,
            reuseaddr: true,
            nodelay: true,
        }
    }
}

impl SocketOptions {
    /// Bind a listener on `addr` with the options applied.
    pub fn bind(&self, addr: SocketAddr) -> io::Result<TcpListener> {
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };

        socket.set_reuseaddr(self.reuseaddr)?;
        socket.set_keepalive(self.keepalive)?;

        if let Some(size) = self.recv_buffer {
            socket.set_recv_buffer_size(size)?;
        }
        if let Some(size) = self.send_buffer {
            socket.set_send_buffer_size(size)?;
        }

        socket.bind(addr)?;
        socket.listen(1024)
    }

    /// Apply the per-connection options to an accepted `stream`.
    pub fn apply(&self, stream: &TcpStream) -> io::Result<()> {
        stream.set_nodelay(self.nodelay)?;
        stream.set_linger(self.linger)?;

        Ok(())
    }
}
