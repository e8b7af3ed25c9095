//! Scripted platform doubles shared by the integration tests.
//!
//! Station, connector and connections all record into one [`World`], so a
//! test can assert on the exact order of station and transport calls.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use sensornode::device::{IdentityStore, ThingName};
use sensornode::network::error::Error;
use sensornode::network::link::{LinkConfig, LinkSupervisor};
use sensornode::network::{Close, Connect, Connection, Read, Station, Write};
use sensornode::ota::{UpdateEvent, UpdatePoller};
use sensornode::session::{BrokerConfig, SessionManager};
use sensornode::telemetry::{Sampler, SensorReading, SensorValue};
use sensornode::time::Clock;

pub const CONNACK_ACCEPTED: u8 = 0x00;
pub const CONNACK_SERVER_UNAVAILABLE: u8 = 0x03;
pub const CONNACK_BAD_CREDENTIALS: u8 = 0x04;

/// Everything a mock call touches or records.
#[derive(Debug, PartialEq, Clone)]
pub enum Call {
    StationStatus,
    StationBegin { ssid: String, secret: String },
    StationDisconnect,
    Connect(String),
    Write(Vec<u8>),
    Close,
}

#[derive(Debug, Default)]
pub struct World {
    pub calls: Vec<Call>,
    pub link_up: bool,
    /// 1-based `begin` after which association can succeed; 0 never.
    pub associate_on_begin: u32,
    /// Status polls needed after a successful `begin`.
    pub polls_to_associate: u32,
    pub begin_fails: bool,
    pub connect_fails: bool,
    pub write_fails: bool,
    /// CONNACK return codes handed out per connect; accepted when empty.
    pub connack_codes: VecDeque<u8>,
    /// Bytes readable by the current connection.
    pub inbound: VecDeque<u8>,
    begins: u32,
    associating: bool,
    polls: u32,
}

pub type Shared = Rc<RefCell<World>>;

pub fn world() -> Shared {
    Rc::new(RefCell::new(World::default()))
}

pub fn link_up_world() -> Shared {
    let world = world();
    world.borrow_mut().link_up = true;
    world
}

impl World {
    pub fn transport_calls(&self) -> Vec<&Call> {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::Connect(_) | Call::Write(_) | Call::Close))
            .collect()
    }

    pub fn station_calls(&self) -> Vec<&Call> {
        self.calls
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    Call::StationStatus | Call::StationBegin { .. } | Call::StationDisconnect
                )
            })
            .collect()
    }

    pub fn written(&self) -> Vec<&[u8]> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Write(bytes) => Some(bytes.as_slice()),
                _ => None,
            })
            .collect()
    }

    pub fn connect_packets(&self) -> Vec<ConnectPacket> {
        self.written()
            .into_iter()
            .filter(|p| p[0] == 0x10)
            .map(ConnectPacket::decode)
            .collect()
    }

    pub fn publishes(&self) -> Vec<Published> {
        self.written()
            .into_iter()
            .filter(|p| p[0] & 0xF0 == 0x30)
            .map(Published::decode)
            .collect()
    }

    pub fn connect_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::Connect(_)))
            .count()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().copied());
    }
}

/// Station whose association is scripted through [`World`].
#[derive(Debug)]
pub struct MockStation(pub Shared);

impl Station for MockStation {
    type Error = ();

    fn is_connected(&mut self) -> bool {
        let mut w = self.0.borrow_mut();
        w.calls.push(Call::StationStatus);
        if !w.link_up && w.associating {
            w.polls += 1;
            if w.associate_on_begin > 0
                && w.begins >= w.associate_on_begin
                && w.polls >= w.polls_to_associate
            {
                w.link_up = true;
            }
        }
        w.link_up
    }

    fn begin(&mut self, ssid: &str, secret: &str) -> Result<(), ()> {
        let mut w = self.0.borrow_mut();
        w.calls.push(Call::StationBegin {
            ssid: ssid.to_string(),
            secret: secret.to_string(),
        });
        if w.begin_fails {
            return Err(());
        }
        w.begins += 1;
        w.associating = true;
        w.polls = 0;
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut w = self.0.borrow_mut();
        w.calls.push(Call::StationDisconnect);
        w.link_up = false;
        w.associating = false;
    }
}

/// Connector that is ready exactly when the mock link is up.
#[derive(Debug)]
pub struct MockConnector(pub Shared);

impl Connect for MockConnector {
    type Connection = MockConnection;
    type Error = Error;

    fn connect(&mut self, remote: &str) -> Result<MockConnection, Error> {
        let mut w = self.0.borrow_mut();
        w.calls.push(Call::Connect(remote.to_string()));
        if w.connect_fails {
            return Err(Error::ConnectionRefused);
        }
        let code = w.connack_codes.pop_front().unwrap_or(CONNACK_ACCEPTED);
        w.inbound.clear();
        w.feed(&[0x20, 0x02, 0x00, code]);
        Ok(MockConnection(self.0.clone()))
    }

    fn is_ready(&self) -> bool {
        self.0.borrow().link_up
    }
}

#[derive(Debug)]
pub struct MockConnection(pub Shared);

impl Read for MockConnection {
    type Error = Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let mut w = self.0.borrow_mut();
        let len = buf.len().min(w.inbound.len());
        for slot in buf.iter_mut().take(len) {
            *slot = w.inbound.pop_front().unwrap_or_default();
        }
        Ok(len)
    }
}

impl Write for MockConnection {
    type Error = Error;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        let mut w = self.0.borrow_mut();
        if w.write_fails {
            return Err(Error::WriteError);
        }
        w.calls.push(Call::Write(buf.to_vec()));
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

impl Close for MockConnection {
    type Error = Error;

    fn close(self) -> Result<(), Error> {
        self.0.borrow_mut().calls.push(Call::Close);
        Ok(())
    }
}

impl Connection for MockConnection {}

/// Decoded CONNECT packet.
#[derive(Debug, Default, PartialEq)]
pub struct ConnectPacket {
    pub client_id: String,
    pub keep_alive: u16,
    pub will: Option<(String, Vec<u8>, u8, bool)>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ConnectPacket {
    fn decode(packet: &[u8]) -> Self {
        let mut pos = skip_fixed_header(packet);
        pos += 7; // protocol name and level
        let flags = packet[pos];
        let keep_alive = u16::from_be_bytes([packet[pos + 1], packet[pos + 2]]);
        pos += 3;

        let client_id = string(&take_field(packet, &mut pos));
        let will = (flags & 0x04 != 0).then(|| {
            let topic = string(&take_field(packet, &mut pos));
            let payload = take_field(packet, &mut pos);
            (topic, payload, (flags >> 3) & 0x03, flags & 0x20 != 0)
        });
        let username = (flags & 0x80 != 0).then(|| string(&take_field(packet, &mut pos)));
        let password = (flags & 0x40 != 0).then(|| string(&take_field(packet, &mut pos)));

        Self {
            client_id,
            keep_alive,
            will,
            username,
            password,
        }
    }
}

/// Decoded PUBLISH packet.
#[derive(Debug, PartialEq)]
pub struct Published {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

impl Published {
    fn decode(packet: &[u8]) -> Self {
        let mut pos = skip_fixed_header(packet);
        let topic = string(&take_field(packet, &mut pos));
        if (packet[0] >> 1) & 0x03 > 0 {
            pos += 2;
        }
        Self {
            topic,
            payload: packet[pos..].to_vec(),
            retain: packet[0] & 0x01 != 0,
        }
    }

    pub fn text(&self) -> String {
        string(&self.payload)
    }
}

fn skip_fixed_header(packet: &[u8]) -> usize {
    let mut pos = 1;
    while packet[pos] & 0x80 != 0 {
        pos += 1;
    }
    pos + 1
}

fn take_field(packet: &[u8], pos: &mut usize) -> Vec<u8> {
    let len = u16::from_be_bytes([packet[*pos], packet[*pos + 1]]) as usize;
    let field = packet[*pos + 2..*pos + 2 + len].to_vec();
    *pos += 2 + len;
    field
}

fn string(bytes: &[u8]) -> String {
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Clock that only moves when someone sleeps.
#[derive(Debug, Default)]
pub struct ManualClock {
    pub now: u64,
    pub delays: Vec<u32>,
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delays.push(ms);
        self.now += u64::from(ms);
    }
}

/// Replays a list of values, then repeats the last one.
#[derive(Debug)]
pub struct ScriptedSampler {
    values: VecDeque<SensorValue>,
    last: SensorValue,
    pub reads: u32,
}

impl ScriptedSampler {
    pub fn new<V: Into<SensorValue> + Copy>(values: &[V]) -> Self {
        Self {
            values: values.iter().map(|v| (*v).into()).collect(),
            last: SensorValue::Int(0),
            reads: 0,
        }
    }
}

impl Sampler for ScriptedSampler {
    fn read(&mut self) -> SensorReading {
        if let Some(value) = self.values.pop_front() {
            self.last = value;
        }
        self.reads += 1;
        SensorReading {
            value: self.last,
            timestamp_ms: u64::from(self.reads) * 1_000,
        }
    }
}

/// Update source that counts polls and replays queued events.
#[derive(Debug, Default)]
pub struct CountingUpdates {
    pub polls: u32,
    pub events: VecDeque<UpdateEvent>,
}

impl UpdatePoller for CountingUpdates {
    fn poll(&mut self) -> Option<UpdateEvent> {
        self.polls += 1;
        self.events.pop_front()
    }
}

/// Identity store that stays empty for a while and records how much
/// station and transport activity had happened at each lookup.
#[derive(Debug)]
pub struct DelayedIdentity {
    pub world: Shared,
    pub misses: u32,
    pub name: &'static str,
    pub calls_seen: Vec<usize>,
}

impl IdentityStore for DelayedIdentity {
    fn read_thing_name(&mut self) -> Option<ThingName> {
        self.calls_seen.push(self.world.borrow().calls.len());
        if self.misses > 0 {
            self.misses -= 1;
            return None;
        }
        ThingName::new(self.name).ok()
    }
}

pub fn link_config() -> LinkConfig {
    LinkConfig::new("plant-floor", "hunter22").unwrap()
}

pub fn broker_config() -> BrokerConfig {
    BrokerConfig::new("10.0.0.2", 1883, "porch").unwrap()
}

pub fn supervisor(world: &Shared) -> LinkSupervisor<MockStation> {
    LinkSupervisor::new(MockStation(world.clone()), link_config())
}

pub fn configured_session(world: &Shared) -> SessionManager<MockConnector> {
    let mut session = SessionManager::new(MockConnector(world.clone()));
    session.configure(broker_config());
    session
}
