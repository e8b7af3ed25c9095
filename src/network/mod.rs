//! A network abstraction layer for embedded systems
//!
//! The traits here are the only contact points between the telemetry core and
//! the platform: a byte-stream [`Connection`] opened by a [`Connect`]or, and a
//! [`Station`] that associates the device with an access point. Protocol code
//! (MQTT) and supervision code (the link supervisor) are written against these
//! traits so they run unchanged on a microcontroller, on a host, or against
//! the scripted mocks in the test suite.

#![deny(unsafe_code)]

/// Common error types for network operations
pub mod error;

/// Station-mode link supervision
pub mod link;

/// Application layer protocols
pub mod application;

/// Blocking TCP transport for hosted builds
#[cfg(feature = "std")]
pub mod tcp;

/// Re-exports of common traits
pub mod prelude {
    pub use super::{Close, Connect, Connection, Read, Station, Write};
}

/// Byte source half of a connection.
pub trait Read {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Read data from the connection.
    ///
    /// Returns `Ok(0)` when no data is currently available.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

/// Byte sink half of a connection.
pub trait Write {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Write data to the connection
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;
    /// Flush the write buffer
    fn flush(&mut self) -> Result<(), Self::Error>;
}

/// Consuming close of a connection.
pub trait Close {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Close the connection
    fn close(self) -> Result<(), Self::Error>;
}

/// A synchronous connection
pub trait Connection: Read + Write + Close {}

/// A synchronous connector (client)
pub trait Connect {
    /// Associated connection type
    type Connection: Connection;
    /// Associated error type
    type Error: core::fmt::Debug;

    /// Open a connection to `remote`, given as `host:port`.
    fn connect(&mut self, remote: &str) -> Result<Self::Connection, Self::Error>;

    /// Whether the transport underneath can currently open connections.
    ///
    /// Checked before any handshake so a missing link is reported as such
    /// rather than as a protocol failure. Transports without a notion of
    /// readiness keep the default.
    fn is_ready(&self) -> bool {
        true
    }
}

/// A station-mode network interface (Wi-Fi client or equivalent).
pub trait Station {
    /// Associated error type
    type Error: core::fmt::Debug;

    /// Whether the interface is currently associated and has an address.
    fn is_connected(&mut self) -> bool;

    /// Start associating with the given network. Returns once the request is
    /// issued; progress is observed through [`Station::is_connected`].
    fn begin(&mut self, ssid: &str, secret: &str) -> Result<(), Self::Error>;

    /// Drop any association or pending association.
    fn disconnect(&mut self);
}
