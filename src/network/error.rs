//! Common error types for network operations

use core::fmt;

/// A common error type for network operations.
///
/// This enum defines a set of common errors that can occur when working with
/// network devices. It is designed to be simple and portable for `no_std`
/// environments.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// An operation was attempted on a connection that is not open.
    NotOpen,
    /// An error occurred during a write operation.
    WriteError,
    /// An error occurred during a read operation.
    ReadError,
    /// A connection attempt was refused.
    ConnectionRefused,
    /// A timeout occurred.
    Timeout,
    /// The connection was closed.
    ConnectionClosed,
    /// An invalid address was provided.
    InvalidAddress,
    /// A protocol-specific error occurred.
    ProtocolError,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Error::NotOpen => "connection not open",
            Error::WriteError => "write failed",
            Error::ReadError => "read failed",
            Error::ConnectionRefused => "connection refused",
            Error::Timeout => "timed out",
            Error::ConnectionClosed => "connection closed",
            Error::InvalidAddress => "invalid address",
            Error::ProtocolError => "protocol error",
        };
        f.write_str(text)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::NotOpen => defmt::write!(f, "NotOpen"),
            Error::WriteError => defmt::write!(f, "WriteError"),
            Error::ReadError => defmt::write!(f, "ReadError"),
            Error::ConnectionRefused => defmt::write!(f, "ConnectionRefused"),
            Error::Timeout => defmt::write!(f, "Timeout"),
            Error::ConnectionClosed => defmt::write!(f, "ConnectionClosed"),
            Error::InvalidAddress => defmt::write!(f, "InvalidAddress"),
            Error::ProtocolError => defmt::write!(f, "ProtocolError"),
        }
    }
}

/// Non-zero CONNACK return codes defined by MQTT 3.1.1.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ReturnCode {
    /// 0x01: the broker does not support the requested protocol level.
    UnacceptableProtocolVersion,
    /// 0x02: the client identifier is not allowed.
    IdentifierRejected,
    /// 0x03: the MQTT service is unavailable.
    ServerUnavailable,
    /// 0x04: the username or password is malformed or wrong.
    BadCredentials,
    /// 0x05: the client is not authorized to connect.
    NotAuthorized,
}

impl ReturnCode {
    /// Maps a raw CONNACK return code. `0` (accepted) and reserved values
    /// yield `None`.
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            1 => Some(ReturnCode::UnacceptableProtocolVersion),
            2 => Some(ReturnCode::IdentifierRejected),
            3 => Some(ReturnCode::ServerUnavailable),
            4 => Some(ReturnCode::BadCredentials),
            5 => Some(ReturnCode::NotAuthorized),
            _ => None,
        }
    }

    /// The raw code as carried on the wire.
    pub fn code(self) -> u8 {
        match self {
            ReturnCode::UnacceptableProtocolVersion => 1,
            ReturnCode::IdentifierRejected => 2,
            ReturnCode::ServerUnavailable => 3,
            ReturnCode::BadCredentials => 4,
            ReturnCode::NotAuthorized => 5,
        }
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rc={}", self.code())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ReturnCode {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "rc={}", self.code())
    }
}

/// Why a broker session could not be established.
///
/// The reason is always the one reported by the transport or by the broker's
/// CONNACK; nothing here is synthesized after the fact.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ConnectError {
    /// `connect` was called before the broker coordinates were configured.
    NotConfigured,
    /// The underlying link was down; no handshake was attempted.
    LinkDown,
    /// The transport failed while opening the socket or exchanging
    /// CONNECT/CONNACK.
    Transport(Error),
    /// The broker answered the handshake with a refusal.
    Refused(ReturnCode),
}

impl From<Error> for ConnectError {
    fn from(error: Error) -> Self {
        ConnectError::Transport(error)
    }
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectError::NotConfigured => f.write_str("broker not configured"),
            ConnectError::LinkDown => f.write_str("link down"),
            ConnectError::Transport(e) => write!(f, "transport: {}", e),
            ConnectError::Refused(rc) => write!(f, "refused: {}", rc),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ConnectError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ConnectError::NotConfigured => defmt::write!(f, "NotConfigured"),
            ConnectError::LinkDown => defmt::write!(f, "LinkDown"),
            ConnectError::Transport(e) => defmt::write!(f, "Transport({})", e),
            ConnectError::Refused(rc) => defmt::write!(f, "Refused({})", rc),
        }
    }
}

/// Outcome of a single bounded link attempt.
///
/// Never fatal: the link supervisor keeps retrying on both variants.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LinkError {
    /// The station did not report a connection within the attempt window.
    Timeout,
    /// The station driver refused to start an association.
    Station,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::Timeout => f.write_str("attempt window expired"),
            LinkError::Station => f.write_str("station refused to start"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for LinkError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            LinkError::Timeout => defmt::write!(f, "Timeout"),
            LinkError::Station => defmt::write!(f, "Station"),
        }
    }
}

/// A value did not fit the fixed-capacity buffer reserved for it.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct CapacityError;

impl fmt::Display for CapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("value exceeds buffer capacity")
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for CapacityError {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "CapacityError")
    }
}
