//! # Application Layer Network Protocols
//!
//! Protocol clients written against the core network traits. Each client
//! wraps a [`Connection`](crate::network::Connection) and uses fixed-size
//! buffers only.

/// MQTT client implementation.
///
/// Provides an MQTT 3.1.1 client for lightweight publish-subscribe messaging.
pub mod mqtt;
