//! Plain TCP transport for hosted targets (Linux gateways, Raspberry Pi, CI).

use super::error::Error;
use super::{Close, Connect, Connection, Read, Write};
use std::io::{ErrorKind, Read as StdRead, Write as StdWrite};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Opens non-blocking [`TcpConnection`]s.
#[derive(Debug, Clone)]
pub struct TcpNetwork {
    /// Upper bound for establishing the TCP connection itself.
    pub connect_timeout: Duration,
}

impl Default for TcpNetwork {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// A TCP stream switched to non-blocking mode after the connect completes.
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
}

impl Connect for TcpNetwork {
    type Connection = TcpConnection;
    type Error = Error;

    fn connect(&mut self, host: &str, port: u16) -> Result<Self::Connection, Self::Error> {
        let address = (host, port)
            .to_socket_addrs()
            .map_err(|_| Error::InvalidAddress)?
            .next()
            .ok_or(Error::InvalidAddress)?;
        let stream = TcpStream::connect_timeout(&address, self.connect_timeout).map_err(|e| {
            match e.kind() {
                ErrorKind::TimedOut => Error::Timeout,
                _ => Error::ConnectionRefused,
            }
        })?;
        stream.set_nodelay(true).map_err(|_| Error::ConnectionRefused)?;
        stream
            .set_nonblocking(true)
            .map_err(|_| Error::ConnectionRefused)?;
        Ok(TcpConnection { stream })
    }
}

impl Read for TcpConnection {
    type Error = Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        match self.stream.read(buf) {
            // A zero-length read on a socket is end-of-stream, not "no data".
            Ok(0) if !buf.is_empty() => Err(Error::ConnectionClosed),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(0),
            Err(_) => Err(Error::ReadError),
        }
    }
}

impl Write for TcpConnection {
    type Error = Error;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        match self.stream.write(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(_) => Err(Error::WriteError),
        }
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.stream.flush().map_err(|_| Error::WriteError)
    }
}

impl Close for TcpConnection {
    type Error = Error;

    fn close(self) -> Result<(), Self::Error> {
        self.stream
            .shutdown(Shutdown::Both)
            .map_err(|_| Error::NotOpen)
    }
}

impl Connection for TcpConnection {}
