//! Caller-facing errors of the session manager

use core::fmt;

use crate::network::error::Error;

/// Why a last will was not registered.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum WillError {
    /// A will is already registered; it cannot be replaced.
    AlreadySet,
    /// A connection attempt already happened. The broker only learns the
    /// will during the handshake, so a later will could never take effect.
    SessionStarted,
    /// Topic or payload exceed their fixed capacities.
    TooLarge,
}

impl fmt::Display for WillError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WillError::AlreadySet => f.write_str("last will already set"),
            WillError::SessionStarted => f.write_str("last will set after first connect"),
            WillError::TooLarge => f.write_str("last will too large"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for WillError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            WillError::AlreadySet => defmt::write!(f, "AlreadySet"),
            WillError::SessionStarted => defmt::write!(f, "SessionStarted"),
            WillError::TooLarge => defmt::write!(f, "TooLarge"),
        }
    }
}

/// Why a publish or subscribe did not go out.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PublishError {
    /// No session is open; nothing was sent.
    NotConnected,
    /// The transport or broker rejected the single attempt.
    Rejected(Error),
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishError::NotConnected => f.write_str("not connected"),
            PublishError::Rejected(e) => write!(f, "rejected: {}", e),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PublishError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            PublishError::NotConnected => defmt::write!(f, "NotConnected"),
            PublishError::Rejected(e) => defmt::write!(f, "Rejected({})", e),
        }
    }
}
