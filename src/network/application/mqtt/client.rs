//! MQTT 3.1.1 client implementation for embedded systems.
//!
//! A blocking, allocation-free client over any [`Connection`]. It covers the
//! subset a telemetry device needs: CONNECT with optional last will and
//! optional credentials, PUBLISH, SUBSCRIBE, keep-alive pings, inbound PUBLISH
//! delivery and a clean DISCONNECT.
//!
//! # Examples
//!
//! ```rust,no_run
//! use sensornode::network::application::mqtt::{Client, Options, QoS, Will};
//! # use sensornode::network::Connection;
//! # struct TcpConnection;
//! # impl Connection for TcpConnection {}
//! # impl sensornode::network::Read for TcpConnection {
//! #     type Error = ();
//! #     fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> { Ok(0) }
//! # }
//! # impl sensornode::network::Write for TcpConnection {
//! #     type Error = ();
//! #     fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> { Ok(buf.len()) }
//! #     fn flush(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # impl sensornode::network::Close for TcpConnection {
//! #     type Error = ();
//! #     fn close(self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//!
//! let will = Will {
//!     topic: "sensors/porch",
//!     payload: br#"{"alive":false}"#,
//!     qos: QoS::AtMostOnce,
//!     retain: true,
//! };
//! let options = Options::new("porch")
//!     .keep_alive(15)
//!     .will(Some(will))
//!     .credentials(Some("user"), Some("pass"));
//!
//! // let mut client = Client::connect(TcpConnection, options)?;
//! // client.publish("sensors/porch", b"1", QoS::AtMostOnce, false)?;
//! ```

use crate::network::error::{ConnectError, Error, ReturnCode};
use crate::network::{Connection, Read, Write};
use heapless::{Deque, String, Vec};

// MQTT Control Packet types - these are the fixed header packet type values
const CONNECT: u8 = 0x10;
const CONNACK: u8 = 0x20;
const PUBLISH: u8 = 0x30;
const PUBACK: u8 = 0x40;
const SUBSCRIBE: u8 = 0x82;
const SUBACK: u8 = 0x90;
const PINGREQ: u8 = 0xC0;
const PINGRESP: u8 = 0xD0;
const DISCONNECT: u8 = 0xE0;

// CONNECT flag bits
const FLAG_CLEAN_SESSION: u8 = 0x02;
const FLAG_WILL: u8 = 0x04;
const FLAG_WILL_RETAIN: u8 = 0x20;
const FLAG_PASSWORD: u8 = 0x40;
const FLAG_USERNAME: u8 = 0x80;

// PUBLISH fixed header flag bits
const FLAG_RETAIN: u8 = 0x01;

/// SUBACK return code signalling a rejected subscription.
const SUBACK_FAILURE: u8 = 0x80;

const PROTOCOL_NAME: &[u8] = b"MQTT";
const PROTOCOL_LEVEL: u8 = 4; // MQTT 3.1.1

/// Maximum topic length accepted for inbound messages.
pub const MAX_TOPIC_LEN: usize = 256;
/// Maximum payload length accepted for inbound messages.
pub const MAX_PAYLOAD_LEN: usize = 1024;
/// Largest packet body (everything after the fixed header) this client will
/// build or accept.
pub const MAX_PACKET_LEN: usize = 1280;
/// Keep-alive used by [`Options::new`], in seconds.
pub const DEFAULT_KEEP_ALIVE_SECONDS: u16 = 15;

/// Consecutive empty reads tolerated while a packet is incomplete. Transports
/// with a read timeout report a timeout as an empty read.
const MAX_IDLE_READS: u32 = 100;

/// Inbound messages that can be held back while a SUBACK is awaited.
const MAX_HELD_MESSAGES: usize = 4;

/// An incoming MQTT publish message.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PublishPacket {
    /// The topic on which the message was published.
    pub topic: String<MAX_TOPIC_LEN>,

    /// The message payload data.
    pub payload: Vec<u8, MAX_PAYLOAD_LEN>,
}

/// Quality of Service levels for MQTT messages.
///
/// ```rust
/// use sensornode::network::application::mqtt::QoS;
///
/// assert_eq!(QoS::AtMostOnce as u8, 0);
/// assert_eq!(QoS::from_u8(1), Some(QoS::AtLeastOnce));
/// assert_eq!(QoS::from_u8(3), None);
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QoS {
    /// **QoS 0**: fire and forget.
    AtMostOnce = 0,
    /// **QoS 1**: acknowledged delivery, duplicates possible.
    AtLeastOnce = 1,
    /// **QoS 2**: assured single delivery.
    ExactlyOnce = 2,
}

impl QoS {
    /// Decodes the two QoS bits used on the wire.
    pub fn from_u8(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for QoS {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "QoS{}", *self as u8)
    }
}

impl core::fmt::Display for QoS {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "QoS{}", *self as u8)
    }
}

/// A last-will message registered with the broker in the CONNECT packet.
///
/// The broker publishes it on the client's behalf if the session ends without
/// a DISCONNECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Will<'a> {
    /// Topic the will is published to.
    pub topic: &'a str,
    /// Will payload.
    pub payload: &'a [u8],
    /// Delivery guarantee for the will.
    pub qos: QoS,
    /// Whether the broker retains the will once published.
    pub retain: bool,
}

/// Configuration options for MQTT client connection.
///
/// Optional parts of the CONNECT packet are selected purely by presence: a
/// `Some` will adds the will flags and fields, a `Some` username and password
/// add the credential flags and fields.
#[derive(Debug, Clone)]
pub struct Options<'a> {
    /// The client identifier, must be unique within the broker.
    pub client_id: &'a str,

    /// The keep-alive time interval in seconds; `0` disables keep-alive.
    pub keep_alive_seconds: u16,

    /// Whether to start a clean session.
    pub clean_session: bool,

    /// Optional last will.
    pub will: Option<Will<'a>>,

    /// Optional user name.
    pub username: Option<&'a str>,

    /// Optional password. Only sent together with a user name.
    pub password: Option<&'a str>,
}

impl<'a> Options<'a> {
    /// Clean session, default keep-alive, no will, no credentials.
    pub fn new(client_id: &'a str) -> Self {
        Self {
            client_id,
            keep_alive_seconds: DEFAULT_KEEP_ALIVE_SECONDS,
            clean_session: true,
            will: None,
            username: None,
            password: None,
        }
    }

    /// Sets the keep-alive interval in seconds.
    pub fn keep_alive(mut self, seconds: u16) -> Self {
        self.keep_alive_seconds = seconds;
        self
    }

    /// Selects clean or persistent session.
    pub fn clean_session(mut self, clean: bool) -> Self {
        self.clean_session = clean;
        self
    }

    /// Attaches (or clears) the last will.
    pub fn will(mut self, will: Option<Will<'a>>) -> Self {
        self.will = will;
        self
    }

    /// Attaches (or clears) credentials.
    pub fn credentials(mut self, username: Option<&'a str>, password: Option<&'a str>) -> Self {
        self.username = username;
        self.password = password;
        self
    }

    /// Serializes the complete CONNECT packet into `out`.
    pub fn encode(&self, out: &mut Vec<u8, MAX_PACKET_LEN>) -> Result<(), Error> {
        let mut body: Vec<u8, MAX_PACKET_LEN> = Vec::new();

        // --- Variable Header ---
        put_bytes(&mut body, PROTOCOL_NAME)?;
        push(&mut body, PROTOCOL_LEVEL)?;

        let mut connect_flags = 0;
        if self.clean_session {
            connect_flags |= FLAG_CLEAN_SESSION;
        }
        if let Some(will) = &self.will {
            connect_flags |= FLAG_WILL | ((will.qos as u8) << 3);
            if will.retain {
                connect_flags |= FLAG_WILL_RETAIN;
            }
        }
        // MQTT 3.1.1 forbids a password without a user name.
        let password = self.password.filter(|_| self.username.is_some());
        if self.username.is_some() {
            connect_flags |= FLAG_USERNAME;
        }
        if password.is_some() {
            connect_flags |= FLAG_PASSWORD;
        }
        push(&mut body, connect_flags)?;
        extend(&mut body, &self.keep_alive_seconds.to_be_bytes())?;

        // --- Payload ---
        put_bytes(&mut body, self.client_id.as_bytes())?;
        if let Some(will) = &self.will {
            put_bytes(&mut body, will.topic.as_bytes())?;
            put_bytes(&mut body, will.payload)?;
        }
        if let Some(username) = self.username {
            put_bytes(&mut body, username.as_bytes())?;
        }
        if let Some(password) = password {
            put_bytes(&mut body, password.as_bytes())?;
        }

        frame(out, CONNECT, &body)
    }
}

/// An MQTT 3.1.1 client for publish-subscribe messaging.
///
/// A `Client` only exists while its session is open: [`Client::connect`]
/// returns one after a successful handshake and [`Client::disconnect`]
/// consumes it.
#[derive(Debug)]
pub struct Client<C: Connection> {
    connection: C,
    keep_alive_ms: u64,
    last_outbound_ms: Option<u64>,
    last_inbound_ms: Option<u64>,
    sent_since_check: bool,
    received_since_check: bool,
    ping_outstanding: bool,
    next_packet_id: u16,
    held: Deque<PublishPacket, MAX_HELD_MESSAGES>,
}

impl<C: Connection> Client<C> {
    /// Establish an MQTT connection with the broker.
    ///
    /// Sends CONNECT and waits for CONNACK. A refusal carries the broker's
    /// return code; transport failures carry the transport error.
    pub fn connect(mut connection: C, options: Options) -> Result<Self, ConnectError> {
        let mut packet: Vec<u8, MAX_PACKET_LEN> = Vec::new();
        options.encode(&mut packet)?;

        if let Err(e) = write_all(&mut connection, &packet) {
            let _ = connection.close();
            return Err(e.into());
        }

        let mut connack = [0u8; 4];
        if let Err(e) = read_exact(&mut connection, &mut connack) {
            let _ = connection.close();
            return Err(e.into());
        }

        if connack[0] != CONNACK || connack[1] != 2 {
            let _ = connection.close();
            return Err(ConnectError::Transport(Error::ProtocolError));
        }

        match connack[3] {
            0 => Ok(Self {
                connection,
                keep_alive_ms: u64::from(options.keep_alive_seconds) * 1000,
                last_outbound_ms: None,
                last_inbound_ms: None,
                sent_since_check: false,
                received_since_check: false,
                ping_outstanding: false,
                next_packet_id: 1,
                held: Deque::new(),
            }),
            code => {
                let _ = connection.close();
                Err(match ReturnCode::from_u8(code) {
                    Some(rc) => ConnectError::Refused(rc),
                    None => ConnectError::Transport(Error::ProtocolError),
                })
            }
        }
    }

    /// Publish a message to a specific topic.
    ///
    /// Exactly one write of one PUBLISH packet; no acknowledgement is awaited
    /// and nothing is retried.
    pub fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), Error> {
        let mut body: Vec<u8, MAX_PACKET_LEN> = Vec::new();

        // --- Variable Header ---
        put_bytes(&mut body, topic.as_bytes())?;
        if qos != QoS::AtMostOnce {
            let packet_id = self.take_packet_id();
            extend(&mut body, &packet_id.to_be_bytes())?;
        }

        // --- Payload ---
        extend(&mut body, payload)?;

        let mut flags = PUBLISH | ((qos as u8) << 1);
        if retain {
            flags |= FLAG_RETAIN;
        }

        let mut packet: Vec<u8, MAX_PACKET_LEN> = Vec::new();
        frame(&mut packet, flags, &body)?;
        self.send(&packet)
    }

    /// Subscribe to a topic filter and wait for the SUBACK.
    ///
    /// Packets that arrive ahead of the SUBACK are handled as [`Client::poll`]
    /// would: a PINGRESP settles the outstanding ping and an inbound PUBLISH
    /// is held back and returned by the next `poll`. A rejected subscription
    /// is [`Error::ConnectionRefused`]; no SUBACK within the idle limit is
    /// [`Error::Timeout`].
    pub fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Error> {
        let packet_id = self.take_packet_id();

        let mut body: Vec<u8, MAX_PACKET_LEN> = Vec::new();
        extend(&mut body, &packet_id.to_be_bytes())?;
        put_bytes(&mut body, topic.as_bytes())?;
        push(&mut body, qos as u8)?;

        let mut packet: Vec<u8, MAX_PACKET_LEN> = Vec::new();
        frame(&mut packet, SUBSCRIBE, &body)?;
        self.send(&packet)?;

        let mut idle = 0;
        loop {
            let Some((header, body)) = self.read_packet()? else {
                idle += 1;
                if idle >= MAX_IDLE_READS {
                    return Err(Error::Timeout);
                }
                continue;
            };
            idle = 0;

            match header & 0xF0 {
                SUBACK => {
                    if header != SUBACK || body.len() != 3 {
                        return Err(Error::ProtocolError);
                    }
                    if u16::from_be_bytes([body[0], body[1]]) != packet_id {
                        return Err(Error::ProtocolError);
                    }
                    if body[2] == SUBACK_FAILURE {
                        return Err(Error::ConnectionRefused);
                    }
                    return Ok(());
                }
                PUBLISH => {
                    let message = self.accept_publish(header, &body)?;
                    self.held
                        .push_back(message)
                        .map_err(|_| Error::ProtocolError)?;
                }
                PINGRESP => self.ping_outstanding = false,
                _ => {}
            }
        }
    }

    /// Read at most one packet from the connection.
    ///
    /// Returns `Ok(None)` when nothing is waiting or when the packet was
    /// protocol maintenance (PINGRESP, PUBACK, ...). Inbound QoS 1 messages
    /// are acknowledged before they are returned. Messages held back by
    /// [`Client::subscribe`] come first.
    pub fn poll(&mut self) -> Result<Option<PublishPacket>, Error> {
        if let Some(message) = self.held.pop_front() {
            return Ok(Some(message));
        }

        let Some((header, body)) = self.read_packet()? else {
            return Ok(None);
        };

        match header & 0xF0 {
            PUBLISH => self.accept_publish(header, &body).map(Some),
            PINGRESP => {
                self.ping_outstanding = false;
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    /// Keep-alive bookkeeping; call regularly with the current time.
    ///
    /// Sends PINGREQ once either direction has been idle for the keep-alive
    /// interval. If the previous ping is still unanswered by then the session
    /// is considered dead and [`Error::Timeout`] is returned.
    pub fn keep_alive(&mut self, now_ms: u64) -> Result<(), Error> {
        if self.sent_since_check || self.last_outbound_ms.is_none() {
            self.last_outbound_ms = Some(now_ms);
            self.sent_since_check = false;
        }
        if self.received_since_check || self.last_inbound_ms.is_none() {
            self.last_inbound_ms = Some(now_ms);
            self.received_since_check = false;
        }
        if self.keep_alive_ms == 0 {
            return Ok(());
        }

        let idle_out = now_ms.saturating_sub(self.last_outbound_ms.unwrap_or(now_ms));
        let idle_in = now_ms.saturating_sub(self.last_inbound_ms.unwrap_or(now_ms));
        if idle_out < self.keep_alive_ms && idle_in < self.keep_alive_ms {
            return Ok(());
        }
        if self.ping_outstanding {
            return Err(Error::Timeout);
        }

        self.ping()?;
        self.sent_since_check = false;
        self.last_outbound_ms = Some(now_ms);
        self.last_inbound_ms = Some(now_ms);
        self.ping_outstanding = true;
        Ok(())
    }

    /// Send a PINGREQ immediately.
    pub fn ping(&mut self) -> Result<(), Error> {
        self.send(&[PINGREQ, 0x00])
    }

    /// Borrow the underlying connection.
    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Mutably borrow the underlying connection.
    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    /// Whether a PINGREQ is still waiting for its PINGRESP.
    pub fn ping_outstanding(&self) -> bool {
        self.ping_outstanding
    }

    /// Send DISCONNECT and close the connection. The broker discards the
    /// will of a session that ends this way.
    pub fn disconnect(mut self) -> Result<(), Error> {
        let sent = self.send(&[DISCONNECT, 0x00]);
        let closed = self.connection.close().map_err(|_| Error::NotOpen);
        sent.and(closed)
    }

    /// Drop the session without DISCONNECT, as a lost link would.
    pub fn abandon(self) {
        let _ = self.connection.close();
    }

    fn accept_publish(&mut self, header: u8, body: &[u8]) -> Result<PublishPacket, Error> {
        if body.len() < 2 {
            return Err(Error::ProtocolError);
        }
        let topic_len = u16::from_be_bytes([body[0], body[1]]) as usize;
        let topic_end = 2 + topic_len;
        if body.len() < topic_end {
            return Err(Error::ProtocolError);
        }
        let topic_bytes = Vec::from_slice(&body[2..topic_end]).map_err(|_| Error::ProtocolError)?;
        let topic = String::from_utf8(topic_bytes).map_err(|_| Error::ProtocolError)?;

        let mut payload_start = topic_end;
        let qos = QoS::from_u8((header >> 1) & 0x03).ok_or(Error::ProtocolError)?;
        if qos != QoS::AtMostOnce {
            if body.len() < topic_end + 2 {
                return Err(Error::ProtocolError);
            }
            let packet_id = [body[topic_end], body[topic_end + 1]];
            payload_start += 2;
            if qos == QoS::AtLeastOnce {
                self.send(&[PUBACK, 0x02, packet_id[0], packet_id[1]])?;
            }
        }

        let payload = Vec::from_slice(&body[payload_start..]).map_err(|_| Error::ProtocolError)?;
        Ok(PublishPacket { topic, payload })
    }

    /// One whole packet as its first header byte and body, or `None` when
    /// no packet has started arriving.
    fn read_packet(&mut self) -> Result<Option<(u8, Vec<u8, MAX_PACKET_LEN>)>, Error> {
        let mut header = [0u8; 1];
        match self.connection.read(&mut header) {
            Ok(0) => return Ok(None),
            Ok(_) => {}
            Err(_) => return Err(Error::ReadError),
        }

        let remaining_len = self.read_remaining_length()?;
        if remaining_len > MAX_PACKET_LEN {
            return Err(Error::ProtocolError);
        }
        let mut body: Vec<u8, MAX_PACKET_LEN> = Vec::new();
        body.resize(remaining_len, 0)
            .map_err(|_| Error::ProtocolError)?;
        read_exact(&mut self.connection, &mut body)?;
        self.received_since_check = true;
        Ok(Some((header[0], body)))
    }

    fn read_remaining_length(&mut self) -> Result<usize, Error> {
        let mut value = 0usize;
        let mut multiplier = 1usize;
        for _ in 0..4 {
            let mut byte = [0u8; 1];
            read_exact(&mut self.connection, &mut byte)?;
            value += (byte[0] as usize & 0x7F) * multiplier;
            if byte[0] & 0x80 == 0 {
                return Ok(value);
            }
            multiplier *= 128;
        }
        Err(Error::ProtocolError)
    }

    fn send(&mut self, packet: &[u8]) -> Result<(), Error> {
        write_all(&mut self.connection, packet)?;
        self.sent_since_check = true;
        Ok(())
    }

    fn take_packet_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.checked_add(1).unwrap_or(1);
        id
    }
}

fn write_all<C: Write>(connection: &mut C, mut data: &[u8]) -> Result<(), Error> {
    while !data.is_empty() {
        match connection.write(data) {
            Ok(0) | Err(_) => return Err(Error::WriteError),
            Ok(n) => data = &data[n..],
        }
    }
    connection.flush().map_err(|_| Error::WriteError)
}

fn read_exact<C: Read>(connection: &mut C, buf: &mut [u8]) -> Result<(), Error> {
    let mut total_read = 0;
    let mut idle = 0;
    while total_read < buf.len() {
        match connection.read(&mut buf[total_read..]) {
            Ok(0) => {
                idle += 1;
                if idle >= MAX_IDLE_READS {
                    return Err(Error::ConnectionClosed);
                }
            }
            Ok(n) => {
                total_read += n;
                idle = 0;
            }
            Err(_) => return Err(Error::ReadError),
        }
    }
    Ok(())
}

fn push(buf: &mut Vec<u8, MAX_PACKET_LEN>, byte: u8) -> Result<(), Error> {
    buf.push(byte).map_err(|_| Error::ProtocolError)
}

fn extend(buf: &mut Vec<u8, MAX_PACKET_LEN>, data: &[u8]) -> Result<(), Error> {
    buf.extend_from_slice(data).map_err(|_| Error::ProtocolError)
}

/// Writes a length-prefixed MQTT string or binary field.
fn put_bytes(buf: &mut Vec<u8, MAX_PACKET_LEN>, data: &[u8]) -> Result<(), Error> {
    let len = u16::try_from(data.len()).map_err(|_| Error::ProtocolError)?;
    extend(buf, &len.to_be_bytes())?;
    extend(buf, data)
}

/// Prepends the fixed header to `body`.
fn frame(out: &mut Vec<u8, MAX_PACKET_LEN>, packet_type: u8, body: &[u8]) -> Result<(), Error> {
    let mut fixed_header: Vec<u8, 5> = Vec::new();
    fixed_header
        .push(packet_type)
        .map_err(|_| Error::ProtocolError)?;
    encode_remaining_length(&mut fixed_header, body.len()).map_err(|_| Error::ProtocolError)?;
    out.clear();
    extend(out, &fixed_header)?;
    extend(out, body)
}

/// Encode the remaining length field for an MQTT packet.
///
/// Each byte carries 7 bits of the length; the high bit flags a continuation.
/// Four bytes cover lengths up to 268,435,455.
fn encode_remaining_length(buf: &mut Vec<u8, 5>, mut len: usize) -> Result<(), ()> {
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        buf.push(byte).map_err(|_| ())?;
        if len == 0 {
            break;
        }
    }
    Ok(())
}

