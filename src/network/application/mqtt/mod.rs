//! MQTT 3.1.1 protocol implementation for embedded systems.
//!
//! The [`client::Client`] speaks the wire protocol over any
//! [`Connection`](crate::network::Connection). Deciding when to connect and
//! with which will and credentials is left to [`crate::session`].

/// MQTT client implementation and supporting types.
pub mod client;

pub use client::{Client, Options, PublishPacket, QoS, Will};
