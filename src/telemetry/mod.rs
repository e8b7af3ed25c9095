//! Sensor readings and their wire representation.
//!
//! Every telemetry message is a flat JSON object published on
//! `sensors/<thing_name>`:
//!
//! ```json
//! {"sensor":"porch","value":1,"alive":true,"timestamp":52311}
//! ```
//!
//! The last will uses the same schema with `value` 0, `alive` false and
//! `timestamp` 0, so subscribers need a single decoder for both.

use core::fmt;

use heapless::{String, Vec};
use serde::Serialize;

use crate::network::error::CapacityError;

pub mod scheduler;

pub use scheduler::{HeartbeatPolicy, Scheduler, SchedulerConfig, TickOutcome};

/// Upper bound of an encoded message.
pub const MAX_MESSAGE_LEN: usize = 256;
/// Upper bound of a telemetry topic.
pub const MAX_TOPIC_LEN: usize = crate::session::MAX_TOPIC_LEN;
/// Topic prefix shared by all sensor nodes.
pub const TOPIC_PREFIX: &str = "sensors";

/// An encoded message ready for publishing.
pub type Payload = Vec<u8, MAX_MESSAGE_LEN>;
/// A telemetry topic.
pub type Topic = String<MAX_TOPIC_LEN>;

/// Builds `sensors/<thing_name>`.
pub fn topic_for(thing_name: &str) -> Result<Topic, CapacityError> {
    let mut topic = Topic::new();
    topic.push_str(TOPIC_PREFIX).map_err(|_| CapacityError)?;
    topic.push('/').map_err(|_| CapacityError)?;
    topic.push_str(thing_name).map_err(|_| CapacityError)?;
    Ok(topic)
}

/// Serializes any message into a [`Payload`].
pub fn to_payload<T: Serialize + ?Sized>(message: &T) -> Result<Payload, EncodeError> {
    let mut buf = [0u8; MAX_MESSAGE_LEN];
    let len = serde_json_core::to_slice(message, &mut buf).map_err(|_| EncodeError::TooLarge)?;
    Payload::from_slice(&buf[..len]).map_err(|_| EncodeError::TooLarge)
}

/// Why a message could not be encoded.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum EncodeError {
    /// The encoded form exceeds [`MAX_MESSAGE_LEN`].
    TooLarge,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::TooLarge => f.write_str("message too large"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for EncodeError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            EncodeError::TooLarge => defmt::write!(f, "TooLarge"),
        }
    }
}

/// A sampled value.
///
/// Floats compare with IEEE semantics, so a NaN reading always counts as a
/// change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorValue {
    /// Digital level.
    Bool(bool),
    /// Integer reading, e.g. a raw GPIO level of 0 or 1.
    Int(i32),
    /// Analog reading.
    Float(f32),
}

impl From<bool> for SensorValue {
    fn from(value: bool) -> Self {
        SensorValue::Bool(value)
    }
}

impl From<i32> for SensorValue {
    fn from(value: i32) -> Self {
        SensorValue::Int(value)
    }
}

impl From<f32> for SensorValue {
    fn from(value: f32) -> Self {
        SensorValue::Float(value)
    }
}

// Untagged on the wire: `1`, `true` or `21.5`.
impl Serialize for SensorValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            SensorValue::Bool(v) => serializer.serialize_bool(v),
            SensorValue::Int(v) => serializer.serialize_i32(v),
            SensorValue::Float(v) => serializer.serialize_f32(v),
        }
    }
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorValue::Bool(v) => write!(f, "{}", v),
            SensorValue::Int(v) => write!(f, "{}", v),
            SensorValue::Float(v) => write!(f, "{}", v),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SensorValue {
    fn format(&self, f: defmt::Formatter) {
        match self {
            SensorValue::Bool(v) => defmt::write!(f, "{}", v),
            SensorValue::Int(v) => defmt::write!(f, "{}", v),
            SensorValue::Float(v) => defmt::write!(f, "{}", v),
        }
    }
}

/// One sample and when it was taken.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    /// The sampled value.
    pub value: SensorValue,
    /// Milliseconds since boot.
    pub timestamp_ms: u64,
}

impl SensorReading {
    /// Pairs a value with its sample time.
    pub fn new(value: impl Into<SensorValue>, timestamp_ms: u64) -> Self {
        Self {
            value: value.into(),
            timestamp_ms,
        }
    }
}

/// Telemetry record as published.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TelemetryMessage<'a> {
    /// Name of the reporting device.
    pub sensor: &'a str,
    /// Sampled value.
    pub value: SensorValue,
    /// `false` only in the last will.
    pub alive: bool,
    /// Milliseconds since boot of the sample.
    pub timestamp: u64,
}

impl<'a> TelemetryMessage<'a> {
    /// A live report of `reading`.
    pub fn reading(sensor: &'a str, reading: &SensorReading) -> Self {
        Self {
            sensor,
            value: reading.value,
            alive: true,
            timestamp: reading.timestamp_ms,
        }
    }

    /// The message the broker publishes when the device vanishes.
    pub fn last_will(sensor: &'a str) -> Self {
        Self {
            sensor,
            value: SensorValue::Int(0),
            alive: false,
            timestamp: 0,
        }
    }
}

/// Announcement published once after the first successful connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StartupMessage<'a> {
    /// Always `device started`.
    pub message: &'a str,
    /// Name of the device.
    pub thing_name: &'a str,
    /// Always `true`.
    pub alive: bool,
}

impl<'a> StartupMessage<'a> {
    /// The announcement for `thing_name`.
    pub fn new(thing_name: &'a str) -> Self {
        Self {
            message: "device started",
            thing_name,
            alive: true,
        }
    }
}

/// Source of sensor readings.
pub trait Sampler {
    /// Takes one sample. Sampling cannot fail; a broken sensor reads as
    /// whatever level the input floats to.
    fn read(&mut self) -> SensorReading;
}

/// Turns telemetry records into publishable bytes.
pub trait Serializer {
    /// Encodes `message`, failing if it does not fit [`MAX_MESSAGE_LEN`].
    fn encode(&self, message: &TelemetryMessage<'_>) -> Result<Payload, EncodeError>;
}

/// Compact JSON encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn encode(&self, message: &TelemetryMessage<'_>) -> Result<Payload, EncodeError> {
        to_payload(message)
    }
}
