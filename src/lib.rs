//! # sensornode - connectivity and telemetry core for sensor devices
//!
//! Everything a single-sensor IoT node needs between "the firmware booted" and
//! "the broker has my readings": a station link that is kept up forever, one
//! MQTT 3.1.1 session with a last will, and a tick loop that publishes on
//! change (and optionally on a heartbeat). The crate is `no_std`, allocates
//! nothing and talks to the platform only through small traits.
//!
//! ## Layers
//!
//! - [`network::link`]: the [`LinkSupervisor`](network::link::LinkSupervisor)
//!   blocks in bounded attempt windows until the station is associated.
//! - [`session`]: the [`SessionManager`](session::SessionManager) owns broker
//!   coordinates, the last will and credentials, and opens the session on
//!   request. It never reconnects on its own.
//! - [`telemetry`]: the [`Scheduler`](telemetry::Scheduler) samples, decides
//!   whether to publish and triggers reconnects.
//! - [`device`]: identity gating, provisioning config and the boot sequence.
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! sensornode = "0.1.0"
//! ```
//!
//! ```rust,ignore
//! use sensornode::device::{self, DeviceConfig};
//! use sensornode::ota::NoUpdates;
//!
//! let config = DeviceConfig::from_json(PROVISIONING)?;
//! let mut scheduler = device::boot(config, wifi, tcp, clock, &mut flash)?;
//! scheduler.run(&mut gpio_sampler, &mut NoUpdates);
//! ```
//!
//! ## Optional Features
//!
//! - `std`: TCP transport and system clock for hosted builds
//! - `log` (default): log through the `log` facade
//! - `defmt`: log through `defmt` for embedded debugging

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

#[macro_use]
mod fmt;

/// Network abstraction layer: transport traits, link supervision and MQTT.
pub mod network;

/// The broker session with last will and credentials.
pub mod session;

/// Readings, their encoding and the telemetry loop.
pub mod telemetry;

/// Identity, provisioning and startup.
pub mod device;

/// Firmware-update event hook.
pub mod ota;

/// Clock abstraction.
pub mod time;
