//! Broker session management.
//!
//! [`SessionManager`] owns exactly one MQTT session and everything needed to
//! (re)establish it: broker coordinates, the last will and remembered
//! credentials. It never decides *when* to reconnect. `pump` is a no-op while
//! disconnected and failures are reported upwards, so the telemetry scheduler
//! alone decides when another handshake is worth the airtime.
//!
//! ```rust,no_run
//! use sensornode::network::application::mqtt::QoS;
//! use sensornode::session::{BrokerConfig, LastWill, SessionManager};
//! # use sensornode::network::{Close, Connect, Connection, Read, Write};
//! # use sensornode::network::error::Error;
//! # struct Socket;
//! # impl Connection for Socket {}
//! # impl Read for Socket {
//! #     type Error = Error;
//! #     fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Error> { Ok(0) }
//! # }
//! # impl Write for Socket {
//! #     type Error = Error;
//! #     fn write(&mut self, buf: &[u8]) -> Result<usize, Error> { Ok(buf.len()) }
//! #     fn flush(&mut self) -> Result<(), Error> { Ok(()) }
//! # }
//! # impl Close for Socket {
//! #     type Error = Error;
//! #     fn close(self) -> Result<(), Error> { Ok(()) }
//! # }
//! # struct Tcp;
//! # impl Connect for Tcp {
//! #     type Connection = Socket;
//! #     type Error = Error;
//! #     fn connect(&mut self, _remote: &str) -> Result<Socket, Error> { Ok(Socket) }
//! # }
//!
//! let mut session = SessionManager::new(Tcp);
//! session.configure(BrokerConfig::new("192.168.1.10", 1883, "porch").unwrap());
//! session
//!     .set_last_will(LastWill::new("sensors/porch", b"{}", QoS::AtMostOnce, true).unwrap())
//!     .unwrap();
//!
//! if session.connect(None).is_ok() {
//!     session.publish("sensors/porch", b"1", QoS::AtMostOnce, false);
//! }
//! ```

use core::fmt::{self, Write as _};

use heapless::{String, Vec};
use serde::Deserialize;

use crate::network::Connect;
use crate::network::application::mqtt::{Client, Options, QoS, Will};
use crate::network::error::{CapacityError, ConnectError, Error};

pub mod error;

pub use error::{PublishError, WillError};

/// Maximum broker host name length.
pub const MAX_HOST_LEN: usize = 64;
/// Maximum client identifier length.
pub const MAX_CLIENT_ID_LEN: usize = 32;
/// Maximum user name and password length.
pub const MAX_CREDENTIAL_LEN: usize = 64;
/// Maximum topic length for the last will.
pub const MAX_TOPIC_LEN: usize = 64;
/// Maximum last-will payload length.
pub const MAX_WILL_PAYLOAD_LEN: usize = 256;
/// Standard unencrypted MQTT port.
pub const DEFAULT_BROKER_PORT: u16 = 1883;

/// Inbound packets handled per `pump` before yielding back to the tick.
const MAX_PACKETS_PER_PUMP: usize = 8;

/// `host:port` with room for the longest host and a five digit port.
type RemoteAddress = String<{ MAX_HOST_LEN + 6 }>;

fn default_port() -> u16 {
    DEFAULT_BROKER_PORT
}

fn default_keep_alive() -> u16 {
    crate::network::application::mqtt::client::DEFAULT_KEEP_ALIVE_SECONDS
}

/// Broker user name and password, passed through verbatim.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    /// User name.
    pub username: String<MAX_CREDENTIAL_LEN>,
    /// Password.
    pub password: String<MAX_CREDENTIAL_LEN>,
}

impl Credentials {
    /// Copies both values into fixed-capacity storage.
    pub fn new(username: &str, password: &str) -> Result<Self, CapacityError> {
        Ok(Self {
            username: String::try_from(username).map_err(|_| CapacityError)?,
            password: String::try_from(password).map_err(|_| CapacityError)?,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where and as whom to connect.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BrokerConfig {
    /// Broker host name or address.
    pub host: String<MAX_HOST_LEN>,
    /// Broker port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Client identifier; must be unique among clients of the broker.
    #[serde(default)]
    pub client_id: String<MAX_CLIENT_ID_LEN>,
    /// Keep-alive interval in seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_seconds: u16,
    /// Credentials presented when `connect` is called without any.
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

impl BrokerConfig {
    /// Anonymous session with the default keep-alive.
    pub fn new(host: &str, port: u16, client_id: &str) -> Result<Self, CapacityError> {
        Ok(Self {
            host: String::try_from(host).map_err(|_| CapacityError)?,
            port,
            client_id: String::try_from(client_id).map_err(|_| CapacityError)?,
            keep_alive_seconds: default_keep_alive(),
            credentials: None,
        })
    }

    /// Sets the credentials used until `connect` supplies others.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Overrides the keep-alive interval.
    pub fn with_keep_alive(mut self, seconds: u16) -> Self {
        self.keep_alive_seconds = seconds;
        self
    }
}

/// Message the broker publishes for us if the session dies uncleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    topic: String<MAX_TOPIC_LEN>,
    payload: Vec<u8, MAX_WILL_PAYLOAD_LEN>,
    qos: QoS,
    retain: bool,
}

impl LastWill {
    /// Fails with [`WillError::TooLarge`] if topic or payload do not fit.
    pub fn new(topic: &str, payload: &[u8], qos: QoS, retain: bool) -> Result<Self, WillError> {
        Ok(Self {
            topic: String::try_from(topic).map_err(|_| WillError::TooLarge)?,
            payload: Vec::from_slice(payload).map_err(|_| WillError::TooLarge)?,
            qos,
            retain,
        })
    }

    /// Will topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Will payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Will delivery guarantee.
    pub fn qos(&self) -> QoS {
        self.qos
    }

    /// Whether the broker retains the will.
    pub fn retain(&self) -> bool {
        self.retain
    }

    fn as_will(&self) -> Will<'_> {
        Will {
            topic: &self.topic,
            payload: &self.payload,
            qos: self.qos,
            retain: self.retain,
        }
    }
}

/// Last known state of the broker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session; nothing attempted yet or the session was lost.
    Disconnected,
    /// A handshake is in progress.
    Connecting,
    /// CONNACK accepted; publishes may be attempted.
    Connected,
    /// The last attempt failed for the given reason.
    ConnectFailed(ConnectError),
}

/// Handler for messages arriving on subscribed topics.
pub type MessageHandler = fn(&str, &[u8]);

/// Owner of the single broker session.
pub struct SessionManager<N: Connect> {
    network: N,
    broker: Option<BrokerConfig>,
    will: Option<LastWill>,
    credentials: Option<Credentials>,
    client: Option<Client<N::Connection>>,
    state: SessionState,
    handler: Option<MessageHandler>,
    attempted: bool,
}

impl<N> SessionManager<N>
where
    N: Connect,
    N::Error: Into<Error>,
{
    /// A manager with no broker configured and no session.
    pub fn new(network: N) -> Self {
        Self {
            network,
            broker: None,
            will: None,
            credentials: None,
            client: None,
            state: SessionState::Disconnected,
            handler: None,
            attempted: false,
        }
    }

    /// Stores the broker coordinates. Does not connect.
    pub fn configure(&mut self, broker: BrokerConfig) {
        info!(
            "MQTT manager initialized, broker {}:{}, client id {}",
            broker.host.as_str(),
            broker.port,
            broker.client_id.as_str()
        );
        if broker.credentials.is_some() {
            self.credentials = broker.credentials.clone();
        }
        self.broker = Some(broker);
    }

    /// Registers the last will presented at every handshake.
    ///
    /// Only accepted once and only before the first connection attempt;
    /// anything else is a caller error and leaves the registered will as is.
    pub fn set_last_will(&mut self, will: LastWill) -> Result<(), WillError> {
        if self.attempted {
            error!(
                "last will for {} rejected: a session was already attempted",
                will.topic()
            );
            return Err(WillError::SessionStarted);
        }
        if self.will.is_some() {
            error!("last will for {} rejected: already set", will.topic());
            return Err(WillError::AlreadySet);
        }
        info!("last will set: topic={}", will.topic());
        self.will = Some(will);
        Ok(())
    }

    /// Opens the session.
    ///
    /// The link must already be up; otherwise this fails with
    /// [`ConnectError::LinkDown`] before a single handshake byte is sent.
    /// Supplied credentials are remembered, omitted ones fall back to the
    /// remembered set. A no-op if the session is already open.
    pub fn connect(&mut self, credentials: Option<Credentials>) -> Result<(), ConnectError> {
        if let Some(credentials) = credentials {
            self.credentials = Some(credentials);
        }
        if self.state == SessionState::Connected && self.client.is_some() {
            debug!("MQTT session already open");
            return Ok(());
        }

        self.attempted = true;
        match self.open() {
            Ok(()) => {
                info!("MQTT connected");
                self.state = SessionState::Connected;
                Ok(())
            }
            Err(e) => {
                warn!("MQTT connection failed, {}", e);
                self.state = SessionState::ConnectFailed(e);
                Err(e)
            }
        }
    }

    /// Same as [`connect`](Self::connect); named for call sites that recover
    /// a lost session.
    pub fn reconnect(&mut self, credentials: Option<Credentials>) -> Result<(), ConnectError> {
        self.connect(credentials)
    }

    /// Last known session state; no round trip.
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Full session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The registered last will, if any.
    pub fn last_will(&self) -> Option<&LastWill> {
        self.will.as_ref()
    }

    /// Flushes protocol maintenance: keep-alive pings and inbound messages.
    ///
    /// Does nothing while disconnected. A dead session is dropped and left
    /// for the caller to re-establish.
    pub fn pump(&mut self, now_ms: u64) {
        if self.state != SessionState::Connected {
            return;
        }
        let Some(client) = self.client.as_mut() else {
            return;
        };

        let mut result = client.keep_alive(now_ms);
        let mut handled = 0;
        while result.is_ok() && handled < MAX_PACKETS_PER_PUMP {
            match client.poll() {
                Ok(Some(packet)) => {
                    handled += 1;
                    debug!(
                        "message on {} ({} bytes)",
                        packet.topic.as_str(),
                        packet.payload.len()
                    );
                    if let Some(handler) = self.handler {
                        handler(packet.topic.as_str(), &packet.payload);
                    }
                }
                Ok(None) => break,
                Err(e) => result = Err(e),
            }
        }

        if let Err(e) = result {
            self.drop_session(e);
        }
    }

    /// One publish attempt; `false` if not connected or rejected.
    pub fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> bool {
        self.try_publish(topic, payload, qos, retain).is_ok()
    }

    /// One publish attempt, reporting why it did not go out.
    pub fn try_publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), PublishError> {
        let client = match (self.state, self.client.as_mut()) {
            (SessionState::Connected, Some(client)) => client,
            _ => {
                warn!("MQTT not connected, cannot publish to {}", topic);
                return Err(PublishError::NotConnected);
            }
        };

        match client.publish(topic, payload, qos, retain) {
            Ok(()) => {
                info!(
                    "published to {}: {}",
                    topic,
                    core::str::from_utf8(payload).unwrap_or("<binary>")
                );
                Ok(())
            }
            Err(e) => {
                warn!("failed to publish to {} ({})", topic, e);
                if e != Error::ProtocolError {
                    self.drop_session(e);
                }
                Err(PublishError::Rejected(e))
            }
        }
    }

    /// Subscribes at QoS 0; `false` if not connected or rejected.
    pub fn subscribe(&mut self, topic: &str) -> bool {
        self.try_subscribe(topic, QoS::AtMostOnce).is_ok()
    }

    /// Subscribes and reports why it failed.
    pub fn try_subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), PublishError> {
        let client = match (self.state, self.client.as_mut()) {
            (SessionState::Connected, Some(client)) => client,
            _ => {
                warn!("MQTT not connected, cannot subscribe to {}", topic);
                return Err(PublishError::NotConnected);
            }
        };

        match client.subscribe(topic, qos) {
            Ok(()) => {
                info!("subscribed to topic: {}", topic);
                Ok(())
            }
            Err(e) => {
                warn!("failed to subscribe to {} ({})", topic, e);
                // Anything but a broker refusal leaves the stream unusable.
                if e != Error::ConnectionRefused {
                    self.drop_session(e);
                }
                Err(PublishError::Rejected(e))
            }
        }
    }

    /// Installs the handler for inbound messages, replacing any previous one.
    pub fn set_message_handler(&mut self, handler: MessageHandler) {
        self.handler = Some(handler);
    }

    /// Ends the session with DISCONNECT, so the broker discards the will.
    pub fn disconnect(&mut self) {
        if let Some(client) = self.client.take() {
            match client.disconnect() {
                Ok(()) => info!("MQTT disconnected"),
                Err(e) => warn!("MQTT disconnect incomplete ({})", e),
            }
        }
        self.state = SessionState::Disconnected;
    }

    /// Borrow the connector.
    pub fn network(&self) -> &N {
        &self.network
    }

    /// Mutably borrow the connector.
    pub fn network_mut(&mut self) -> &mut N {
        &mut self.network
    }

    fn open(&mut self) -> Result<(), ConnectError> {
        let Some(broker) = self.broker.as_ref() else {
            return Err(ConnectError::NotConfigured);
        };
        if !self.network.is_ready() {
            return Err(ConnectError::LinkDown);
        }

        if let Some(stale) = self.client.take() {
            stale.abandon();
        }
        self.state = SessionState::Connecting;

        let mut remote = RemoteAddress::new();
        write!(remote, "{}:{}", broker.host.as_str(), broker.port)
            .map_err(|_| ConnectError::Transport(Error::InvalidAddress))?;
        info!("connecting to MQTT broker {}", remote.as_str());

        let connection = self
            .network
            .connect(&remote)
            .map_err(|e| ConnectError::Transport(e.into()))?;

        let credentials = self.credentials.as_ref();
        let options = Options::new(&broker.client_id)
            .keep_alive(broker.keep_alive_seconds)
            .will(self.will.as_ref().map(LastWill::as_will))
            .credentials(
                credentials.map(|c| c.username.as_str()),
                credentials.map(|c| c.password.as_str()),
            );

        self.client = Some(Client::connect(connection, options)?);
        Ok(())
    }

    fn drop_session(&mut self, reason: Error) {
        warn!("MQTT session lost ({})", reason);
        if let Some(client) = self.client.take() {
            client.abandon();
        }
        self.state = SessionState::Disconnected;
    }
}

impl<N: Connect> fmt::Debug for SessionManager<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("broker", &self.broker)
            .field("will", &self.will)
            .field("state", &self.state)
            .field("has_handler", &self.handler.is_some())
            .finish_non_exhaustive()
    }
}
