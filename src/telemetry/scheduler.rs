//! The per-tick telemetry loop.
//!
//! A tick keeps the link up, services the session, samples the sensor and
//! publishes when the value changed or a heartbeat is due. A missing session
//! gets exactly one reconnect attempt per pending publish; if that fails the
//! change stays pending and the next tick tries again.

use core::fmt;

use serde::Deserialize;

use crate::device::ThingName;
use crate::network::application::mqtt::QoS;
use crate::network::error::{CapacityError, ConnectError, Error};
use crate::network::link::LinkSupervisor;
use crate::network::{Connect, Station};
use crate::ota::{self, UpdatePoller};
use crate::session::SessionManager;
use crate::telemetry::{
    EncodeError, JsonSerializer, Sampler, SensorValue, Serializer, TelemetryMessage, Topic,
    topic_for,
};
use crate::time::Clock;

/// Pause between two ticks.
pub const DEFAULT_TICK_INTERVAL_MS: u32 = 500;
/// Heartbeat interval used when heartbeats are enabled without one.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u32 = 5_000;

fn default_tick_interval_ms() -> u32 {
    DEFAULT_TICK_INTERVAL_MS
}

/// Whether unchanged values are re-published periodically.
///
/// Parsed from an optional interval: absent or `null` disables heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "Option<u32>")]
pub enum HeartbeatPolicy {
    /// Publish on change only.
    #[default]
    Disabled,
    /// Also publish once this many milliseconds passed since the last publish.
    Every(u32),
}

impl HeartbeatPolicy {
    /// Heartbeats at [`DEFAULT_HEARTBEAT_INTERVAL_MS`].
    pub const fn every_default() -> Self {
        HeartbeatPolicy::Every(DEFAULT_HEARTBEAT_INTERVAL_MS)
    }
}

impl From<Option<u32>> for HeartbeatPolicy {
    fn from(interval_ms: Option<u32>) -> Self {
        match interval_ms {
            Some(ms) => HeartbeatPolicy::Every(ms),
            None => HeartbeatPolicy::Disabled,
        }
    }
}

/// Timing of the telemetry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SchedulerConfig {
    /// Pause after each tick.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u32,
    /// Heartbeat policy, `heartbeat_ms` in JSON.
    #[serde(default, rename = "heartbeat_ms")]
    pub heartbeat: HeartbeatPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            heartbeat: HeartbeatPolicy::Disabled,
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing to publish.
    Idle,
    /// A message went out.
    Published,
    /// The session refused or failed the single publish attempt.
    PublishRejected,
    /// The session was down and could not be re-established; the change
    /// stays pending.
    ReconnectFailed(ConnectError),
    /// The message could not be encoded and was dropped.
    EncodeFailed(EncodeError),
}

/// Drives link, session and sensor.
pub struct Scheduler<S, N, C, E = JsonSerializer>
where
    S: Station,
    N: Connect,
    C: Clock,
    E: Serializer,
{
    link: LinkSupervisor<S>,
    session: SessionManager<N>,
    clock: C,
    serializer: E,
    config: SchedulerConfig,
    thing_name: ThingName,
    topic: Topic,
    last_published_value: Option<SensorValue>,
    last_publish_time: Option<u64>,
}

impl<S, N, C, E> Scheduler<S, N, C, E>
where
    S: Station,
    N: Connect,
    N::Error: Into<Error>,
    C: Clock,
    E: Serializer,
{
    /// Publishes as `thing_name` on `sensors/<thing_name>`.
    pub fn new(
        link: LinkSupervisor<S>,
        session: SessionManager<N>,
        clock: C,
        serializer: E,
        config: SchedulerConfig,
        thing_name: ThingName,
    ) -> Result<Self, CapacityError> {
        let topic = topic_for(thing_name.as_str())?;
        Ok(Self {
            link,
            session,
            clock,
            serializer,
            config,
            thing_name,
            topic,
            last_published_value: None,
            last_publish_time: None,
        })
    }

    /// Runs one tick without the trailing pause.
    pub fn tick<P: Sampler>(&mut self, sampler: &mut P) -> TickOutcome {
        self.link.ensure_up(&mut self.clock);

        let now = self.clock.now_ms();
        self.session.pump(now);

        let reading = sampler.read();
        debug!(
            "time: {} sensor value: {}",
            reading.timestamp_ms,
            reading.value
        );

        let changed = self.last_published_value != Some(reading.value);
        let heartbeat_due = self.heartbeat_due(now);
        if !changed && !heartbeat_due {
            return TickOutcome::Idle;
        }
        if changed {
            info!("sensor value changed, sending MQTT message");
        } else {
            info!("heartbeat due, sending MQTT message");
        }

        let message = TelemetryMessage::reading(self.thing_name.as_str(), &reading);
        let payload = match self.serializer.encode(&message) {
            Ok(payload) => payload,
            Err(e) => {
                error!("dropping sensor value {} ({})", reading.value, e);
                self.record(reading.value, now);
                return TickOutcome::EncodeFailed(e);
            }
        };

        if !self.session.is_connected() {
            warn!("MQTT not connected, attempting reconnect");
            if let Err(e) = self.session.reconnect(None) {
                return TickOutcome::ReconnectFailed(e);
            }
        }

        let published = self
            .session
            .publish(&self.topic, &payload, QoS::AtMostOnce, false);
        self.record(reading.value, now);

        if published {
            TickOutcome::Published
        } else {
            TickOutcome::PublishRejected
        }
    }

    /// One full loop iteration: tick, firmware-update poll, pause.
    pub fn run_once<P: Sampler, U: UpdatePoller>(
        &mut self,
        sampler: &mut P,
        updates: &mut U,
    ) -> TickOutcome {
        let outcome = self.tick(sampler);
        if let Some(event) = updates.poll() {
            ota::log_event(&event);
        }
        self.clock.delay_ms(self.config.tick_interval_ms);
        outcome
    }

    /// Ticks forever.
    pub fn run<P: Sampler, U: UpdatePoller>(&mut self, sampler: &mut P, updates: &mut U) -> ! {
        loop {
            self.run_once(sampler, updates);
        }
    }

    /// Value of the last publish attempt, `None` before the first.
    pub fn last_published_value(&self) -> Option<SensorValue> {
        self.last_published_value
    }

    /// Time of the last publish attempt, `None` before the first.
    pub fn last_publish_time(&self) -> Option<u64> {
        self.last_publish_time
    }

    /// Topic telemetry is published on.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Loop timing.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// The link supervisor.
    pub fn link(&self) -> &LinkSupervisor<S> {
        &self.link
    }

    /// Mutable link supervisor.
    pub fn link_mut(&mut self) -> &mut LinkSupervisor<S> {
        &mut self.link
    }

    /// The session manager.
    pub fn session(&self) -> &SessionManager<N> {
        &self.session
    }

    /// Mutable session manager.
    pub fn session_mut(&mut self) -> &mut SessionManager<N> {
        &mut self.session
    }

    /// The clock.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Mutable clock.
    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    fn heartbeat_due(&self, now: u64) -> bool {
        match self.config.heartbeat {
            HeartbeatPolicy::Disabled => false,
            HeartbeatPolicy::Every(interval) => match self.last_publish_time {
                Some(last) => now.saturating_sub(last) >= u64::from(interval),
                None => true,
            },
        }
    }

    fn record(&mut self, value: SensorValue, now: u64) {
        self.last_published_value = Some(value);
        self.last_publish_time = Some(now);
    }
}

impl<S, N, C, E> fmt::Debug for Scheduler<S, N, C, E>
where
    S: Station,
    N: Connect,
    C: Clock,
    E: Serializer,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("session", &self.session)
            .field("config", &self.config)
            .field("topic", &self.topic)
            .field("last_published_value", &self.last_published_value)
            .field("last_publish_time", &self.last_publish_time)
            .finish_non_exhaustive()
    }
}
