//! Station-mode link supervision.
//!
//! The device is useless without its network, so [`LinkSupervisor::ensure_up`]
//! never gives up: it runs fixed-length attempt windows back to back until
//! the station reports a connection. Each window starts from a clean slate
//! (stale association dropped, fresh `begin`) and polls the station at a fixed
//! interval, yielding through the [`Clock`] between polls.

use core::fmt;

use heapless::String;
use serde::Deserialize;

use crate::network::Station;
use crate::network::error::{CapacityError, LinkError};
use crate::time::Clock;

/// Maximum SSID length defined by 802.11.
pub const MAX_SSID_LEN: usize = 32;
/// Maximum WPA2 passphrase length.
pub const MAX_SECRET_LEN: usize = 64;
/// Length of one attempt window.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u32 = 10_000;
/// Delay between two status polls inside an attempt window.
pub const DEFAULT_POLL_INTERVAL_MS: u32 = 1_000;

fn default_connect_timeout_ms() -> u32 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_poll_interval_ms() -> u32 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Network identity and timing for the station link.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct LinkConfig {
    /// Network name to associate with.
    pub ssid: String<MAX_SSID_LEN>,
    /// Opaque network credential.
    pub secret: String<MAX_SECRET_LEN>,
    /// Wall-clock length of a single attempt window.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u32,
    /// Delay between status polls within a window.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u32,
}

impl LinkConfig {
    /// Builds a config with the default timing.
    pub fn new(ssid: &str, secret: &str) -> Result<Self, CapacityError> {
        Ok(Self {
            ssid: String::try_from(ssid).map_err(|_| CapacityError)?,
            secret: String::try_from(secret).map_err(|_| CapacityError)?,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        })
    }

    /// Overrides the attempt window and poll interval.
    pub fn with_timing(mut self, connect_timeout_ms: u32, poll_interval_ms: u32) -> Self {
        self.connect_timeout_ms = connect_timeout_ms;
        self.poll_interval_ms = poll_interval_ms;
        self
    }
}

// The secret stays out of logs and panic messages.
impl fmt::Debug for LinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkConfig")
            .field("ssid", &self.ssid)
            .field("secret", &"<redacted>")
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .finish()
    }
}

/// Keeps the station link up.
#[derive(Debug)]
pub struct LinkSupervisor<S: Station> {
    station: S,
    config: LinkConfig,
    attempts: u32,
}

impl<S: Station> LinkSupervisor<S> {
    /// Takes ownership of the station; nothing is started until the first
    /// [`ensure_up`](Self::ensure_up).
    pub fn new(station: S, config: LinkConfig) -> Self {
        Self {
            station,
            config,
            attempts: 0,
        }
    }

    /// The immutable link configuration.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Borrow the underlying station.
    pub fn station(&self) -> &S {
        &self.station
    }

    /// Mutably borrow the underlying station.
    pub fn station_mut(&mut self) -> &mut S {
        &mut self.station
    }

    /// Number of attempt windows started since construction.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Current link status as reported by the station.
    pub fn is_up(&mut self) -> bool {
        self.station.is_connected()
    }

    /// Blocks until the station reports a connection.
    ///
    /// Returns immediately, without touching the station beyond the status
    /// query, when the link is already up. Otherwise runs attempt windows of
    /// `connect_timeout_ms` back to back, forever.
    pub fn ensure_up<C: Clock>(&mut self, clock: &mut C) {
        if self.station.is_connected() {
            return;
        }

        loop {
            match self.attempt(clock) {
                Ok(()) => return,
                Err(e) => warn!(
                    "could not connect to {} ({}), retrying",
                    self.config.ssid.as_str(),
                    e
                ),
            }
        }
    }

    /// Runs at most one attempt window.
    ///
    /// This is the non-blocking building block of [`ensure_up`](Self::ensure_up)
    /// for callers that would rather interleave other duties between windows.
    pub fn try_connect<C: Clock>(&mut self, clock: &mut C) -> Result<(), LinkError> {
        if self.station.is_connected() {
            return Ok(());
        }
        self.attempt(clock)
    }

    fn attempt<C: Clock>(&mut self, clock: &mut C) -> Result<(), LinkError> {
        self.attempts = self.attempts.wrapping_add(1);
        let poll_interval = self.config.poll_interval_ms.max(1);
        // Every window polls the station at least once.
        let window = u64::from(self.config.connect_timeout_ms.max(poll_interval));
        let started = clock.now_ms();

        self.station.disconnect();
        if self
            .station
            .begin(self.config.ssid.as_str(), self.config.secret.as_str())
            .is_err()
        {
            // Wait out one poll so a driver that keeps refusing cannot spin.
            clock.delay_ms(poll_interval);
            return Err(LinkError::Station);
        }
        info!(
            "attempting to connect to SSID {} (attempt {})",
            self.config.ssid.as_str(),
            self.attempts
        );

        while clock.elapsed_since(started) < window {
            clock.delay_ms(poll_interval);
            trace!(".");
            if self.station.is_connected() {
                info!(
                    "connected to {} after {} ms",
                    self.config.ssid.as_str(),
                    clock.elapsed_since(started)
                );
                return Ok(());
            }
        }

        Err(LinkError::Timeout)
    }
}
