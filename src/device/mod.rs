//! Device bring-up.
//!
//! A node is only allowed onto the network once it knows its name. The name
//! comes from an [`IdentityStore`] (a provisioning file on flash, typically),
//! and everything downstream, from the topic to the MQTT client id, is derived
//! from it. [`boot`] performs the one-time startup sequence and hands back a
//! [`Scheduler`] ready to tick.

use core::fmt;

use heapless::String;
use serde::Deserialize;

use crate::network::application::mqtt::QoS;
use crate::network::error::{CapacityError, Error};
use crate::network::link::{LinkConfig, LinkSupervisor};
use crate::network::{Connect, Station};
use crate::session::{BrokerConfig, LastWill, SessionManager, WillError};
use crate::telemetry::{
    EncodeError, JsonSerializer, Scheduler, SchedulerConfig, StartupMessage, TelemetryMessage,
    to_payload, topic_for,
};
use crate::time::Clock;

/// Longest accepted thing name.
pub const MAX_THING_NAME_LEN: usize = 16;
/// Pause between two identity lookups while unprovisioned.
pub const IDENTITY_RETRY_MS: u32 = 5_000;

/// Unique, non-empty device name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThingName(String<MAX_THING_NAME_LEN>);

impl ThingName {
    /// Rejects empty and overlong names.
    pub fn new(name: &str) -> Result<Self, CapacityError> {
        if name.is_empty() {
            return Err(CapacityError);
        }
        String::try_from(name).map(Self).map_err(|_| CapacityError)
    }

    /// The name as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThingName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ThingName {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}", self.0.as_str())
    }
}

/// Persistent storage of the device identity.
pub trait IdentityStore {
    /// The provisioned name, or `None` while unprovisioned.
    fn read_thing_name(&mut self) -> Option<ThingName>;
}

/// Blocks until the store yields a name, logging a diagnostic every
/// [`IDENTITY_RETRY_MS`].
pub fn wait_for_identity<I: IdentityStore, C: Clock>(store: &mut I, clock: &mut C) -> ThingName {
    loop {
        if let Some(name) = store.read_thing_name() {
            info!("thing name: {}", name.as_str());
            return name;
        }
        warn!("thing name not configured - upload 'thing_info' file to continue");
        clock.delay_ms(IDENTITY_RETRY_MS);
    }
}

/// Provisioning data for one node.
///
/// ```json
/// {
///   "link": {"ssid": "plant-floor", "secret": "hunter22"},
///   "broker": {"host": "192.168.1.10", "port": 1883},
///   "telemetry": {"tick_interval_ms": 500, "heartbeat_ms": 5000}
/// }
/// ```
///
/// An empty or absent `broker.client_id` is replaced by the thing name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceConfig {
    /// Station link.
    pub link: LinkConfig,
    /// Broker coordinates.
    pub broker: BrokerConfig,
    /// Telemetry loop timing.
    #[serde(default)]
    pub telemetry: SchedulerConfig,
}

impl DeviceConfig {
    /// Default telemetry timing.
    pub fn new(link: LinkConfig, broker: BrokerConfig) -> Self {
        Self {
            link,
            broker,
            telemetry: SchedulerConfig::default(),
        }
    }

    /// Parses a JSON provisioning blob.
    pub fn from_json(json: &[u8]) -> Result<Self, DeviceError> {
        serde_json_core::from_slice(json)
            .map(|(config, _)| config)
            .map_err(|_| DeviceError::Config)
    }
}

/// Why bring-up failed.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum DeviceError {
    /// The provisioning blob is malformed or a field exceeds its capacity.
    Config,
    /// A name derived from the thing name does not fit.
    Capacity,
    /// The last-will message could not be encoded.
    Encode(EncodeError),
    /// The session refused the last will.
    Will(WillError),
}

impl From<CapacityError> for DeviceError {
    fn from(_: CapacityError) -> Self {
        DeviceError::Capacity
    }
}

impl From<EncodeError> for DeviceError {
    fn from(e: EncodeError) -> Self {
        DeviceError::Encode(e)
    }
}

impl From<WillError> for DeviceError {
    fn from(e: WillError) -> Self {
        DeviceError::Will(e)
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Config => f.write_str("invalid device configuration"),
            DeviceError::Capacity => f.write_str("name too long"),
            DeviceError::Encode(e) => write!(f, "encode: {}", e),
            DeviceError::Will(e) => write!(f, "last will: {}", e),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for DeviceError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            DeviceError::Config => defmt::write!(f, "Config"),
            DeviceError::Capacity => defmt::write!(f, "Capacity"),
            DeviceError::Encode(e) => defmt::write!(f, "Encode({})", e),
            DeviceError::Will(e) => defmt::write!(f, "Will({})", e),
        }
    }
}

/// One-time startup.
///
/// In order: wait for an identity, derive the topic, configure the broker
/// with the thing name as client id, register the last will, bring the link
/// up, connect and announce the device. A failed connect is not fatal; the
/// scheduler reconnects on the first pending publish.
pub fn boot<S, N, C, I>(
    config: DeviceConfig,
    station: S,
    network: N,
    mut clock: C,
    identity: &mut I,
) -> Result<Scheduler<S, N, C, JsonSerializer>, DeviceError>
where
    S: Station,
    N: Connect,
    N::Error: Into<Error>,
    C: Clock,
    I: IdentityStore,
{
    let thing_name = wait_for_identity(identity, &mut clock);
    let topic = topic_for(thing_name.as_str())?;
    info!("MQTT topic: {}", topic.as_str());

    let mut broker = config.broker;
    if broker.client_id.is_empty() {
        broker.client_id = String::try_from(thing_name.as_str()).map_err(|_| CapacityError)?;
    }

    let mut link = LinkSupervisor::new(station, config.link);
    let mut session = SessionManager::new(network);
    session.configure(broker);

    let will = to_payload(&TelemetryMessage::last_will(thing_name.as_str()))?;
    session.set_last_will(LastWill::new(&topic, &will, QoS::AtMostOnce, true)?)?;

    link.ensure_up(&mut clock);

    match session.connect(None) {
        Ok(()) => {
            info!("connected to MQTT broker");
            let startup = to_payload(&StartupMessage::new(thing_name.as_str()))?;
            session.publish(&topic, &startup, QoS::AtMostOnce, false);
        }
        Err(e) => warn!("could not connect to MQTT broker ({})", e),
    }

    Scheduler::new(
        link,
        session,
        clock,
        JsonSerializer,
        config.telemetry,
        thing_name,
    )
    .map_err(DeviceError::from)
}

#[cfg(test)]
mod tests;
