//! Blocking TCP on top of `std::net`, for hosted gateways and integration runs
//! against a real broker.

use std::io::{self, Read as _, Write as _};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use crate::network::error::Error;
use crate::network::{Close, Connect, Connection, Read, Write};

/// Read timeout used by [`TcpConnector::default`].
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 50;

/// A connected TCP stream.
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
}

impl Read for TcpConnection {
    type Error = Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        match self.stream.read(buf) {
            Ok(0) if !buf.is_empty() => Err(Error::ConnectionClosed),
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(0)
            }
            Err(_) => Err(Error::ReadError),
        }
    }
}

impl Write for TcpConnection {
    type Error = Error;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.stream.write(buf).map_err(|_| Error::WriteError)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.stream.flush().map_err(|_| Error::WriteError)
    }
}

impl Close for TcpConnection {
    type Error = Error;

    fn close(self) -> Result<(), Self::Error> {
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(_) => Err(Error::ConnectionClosed),
        }
    }
}

impl Connection for TcpConnection {}

/// Opens [`TcpConnection`]s.
///
/// Reads time out after `read_timeout` and report "no data" so the MQTT
/// client can poll without blocking the tick.
#[derive(Debug, Clone, Copy)]
pub struct TcpConnector {
    read_timeout: Duration,
}

impl TcpConnector {
    /// Connector with a custom read timeout.
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_READ_TIMEOUT_MS))
    }
}

impl Connect for TcpConnector {
    type Connection = TcpConnection;
    type Error = Error;

    fn connect(&mut self, remote: &str) -> Result<Self::Connection, Self::Error> {
        let stream = TcpStream::connect(remote).map_err(|e| match e.kind() {
            io::ErrorKind::InvalidInput => Error::InvalidAddress,
            io::ErrorKind::TimedOut => Error::Timeout,
            _ => Error::ConnectionRefused,
        })?;
        stream
            .set_read_timeout(Some(self.read_timeout))
            .map_err(|_| Error::NotOpen)?;
        stream.set_nodelay(true).map_err(|_| Error::NotOpen)?;
        debug!("TCP connected to {}", remote);
        Ok(TcpConnection { stream })
    }
}
