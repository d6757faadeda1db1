//! TCP endpoints for network links.

use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use crate::channel::ByteChannel;
use crate::config::ChannelConfig;
use crate::error::Result;

/// Connect to `addr` with Nagle disabled; frames are written whole.
pub fn connect_tcp(addr: impl ToSocketAddrs) -> Result<ByteChannel<TcpStream>> {
    connect_tcp_with_config(addr, &ChannelConfig::default())
}

pub fn connect_tcp_with_config(
    addr: impl ToSocketAddrs,
    config: &ChannelConfig,
) -> Result<ByteChannel<TcpStream>> {
    let stream = TcpStream::connect(addr)?;
    stream.set_nodelay(true)?;
    Ok(ByteChannel::with_config(stream, config))
}

/// Listening TCP socket producing [`ByteChannel`]s.
#[derive(Debug)]
pub struct TcpEndpoint {
    listener: TcpListener,
    config: ChannelConfig,
}

impl TcpEndpoint {
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        Self::bind_with_config(addr, ChannelConfig::default())
    }

    pub fn bind_with_config(addr: impl ToSocketAddrs, config: ChannelConfig) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        tracing::debug!("listening on {}", listener.local_addr()?);
        Ok(Self { listener, config })
    }

    /// Block until a peer connects.
    pub fn accept(&self) -> Result<(ByteChannel<TcpStream>, SocketAddr)> {
        let (stream, peer) = self.listener.accept()?;
        stream.set_nodelay(true)?;
        tracing::trace!("accepted connection from {}", peer);
        Ok((ByteChannel::with_config(stream, &self.config), peer))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_connect_accept() {
        let endpoint = TcpEndpoint::bind("127.0.0.1:0").unwrap();
        let addr = endpoint.local_addr().unwrap();

        let client = thread::spawn(move || {
            let mut channel = connect_tcp(addr).unwrap();
            channel.write(b"hello").unwrap();
            channel
        });

        let (mut server, peer) = endpoint.accept().unwrap();
        assert!(peer.ip().is_loopback());
        let bytes = server.read(5, Duration::from_secs(2)).unwrap().unwrap();
        assert_eq!(&bytes[..], b"hello");
        let _client = client.join().unwrap();
    }
}
