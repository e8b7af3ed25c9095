#![deny(unsafe_code)]

//! # Firmware update hook
//!
//! The update transport itself (ArduinoOTA-style push, HTTP pull, ...) lives
//! outside this crate. The telemetry loop polls it once per tick through
//! [`UpdatePoller`] and reports the returned [`UpdateEvent`]s; it never acts on
//! them. A device without updates plugs in [`NoUpdates`].

use core::fmt;

/// What an update replaces.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum UpdateTarget {
    /// Application image.
    Firmware,
    /// Data partition.
    Filesystem,
}

impl fmt::Display for UpdateTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateTarget::Firmware => f.write_str("sketch"),
            UpdateTarget::Filesystem => f.write_str("filesystem"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for UpdateTarget {
    fn format(&self, f: defmt::Formatter) {
        match self {
            UpdateTarget::Firmware => defmt::write!(f, "sketch"),
            UpdateTarget::Filesystem => defmt::write!(f, "filesystem"),
        }
    }
}

/// Stage at which an update failed.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum UpdateError {
    /// The uploader was not authorized.
    Auth,
    /// The target partition could not be prepared.
    Begin,
    /// The upload connection could not be opened.
    Connect,
    /// The transfer broke off.
    Receive,
    /// The image could not be finalized.
    End,
}

impl UpdateError {
    /// Numeric code as reported by common update agents.
    pub fn code(&self) -> u8 {
        match self {
            UpdateError::Auth => 0,
            UpdateError::Begin => 1,
            UpdateError::Connect => 2,
            UpdateError::Receive => 3,
            UpdateError::End => 4,
        }
    }
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateError::Auth => f.write_str("auth failed"),
            UpdateError::Begin => f.write_str("begin failed"),
            UpdateError::Connect => f.write_str("connect failed"),
            UpdateError::Receive => f.write_str("receive failed"),
            UpdateError::End => f.write_str("end failed"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for UpdateError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            UpdateError::Auth => defmt::write!(f, "Auth"),
            UpdateError::Begin => defmt::write!(f, "Begin"),
            UpdateError::Connect => defmt::write!(f, "Connect"),
            UpdateError::Receive => defmt::write!(f, "Receive"),
            UpdateError::End => defmt::write!(f, "End"),
        }
    }
}

/// Progress report of an update in flight.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum UpdateEvent {
    /// An update started.
    Started(UpdateTarget),
    /// `done` of `total` bytes received.
    Progress {
        /// Bytes received so far.
        done: u32,
        /// Image size.
        total: u32,
    },
    /// The image was written; the agent reboots next.
    Finished,
    /// The update was aborted.
    Failed(UpdateError),
}

impl UpdateEvent {
    /// Completion in percent, for `Progress` events with a known total.
    pub fn percent(&self) -> Option<u8> {
        match *self {
            UpdateEvent::Progress { done, total } if total > 0 => {
                let pct = u64::from(done.min(total)) * 100 / u64::from(total);
                Some(pct as u8)
            }
            _ => None,
        }
    }
}

/// Source of update events, polled once per tick.
pub trait UpdatePoller {
    /// Services the update transport and returns what happened, if anything.
    fn poll(&mut self) -> Option<UpdateEvent>;
}

/// Update source that never has anything to report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUpdates;

impl UpdatePoller for NoUpdates {
    fn poll(&mut self) -> Option<UpdateEvent> {
        None
    }
}

/// Writes `event` to the log.
pub fn log_event(event: &UpdateEvent) {
    match *event {
        UpdateEvent::Started(target) => info!("start updating {}", target),
        UpdateEvent::Progress { .. } => {
            if let Some(pct) = event.percent() {
                debug!("update progress: {}%", pct);
            }
        }
        UpdateEvent::Finished => info!("update finished"),
        UpdateEvent::Failed(e) => error!("update error[{}]: {}", e.code(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percent() {
        let event = UpdateEvent::Progress {
            done: 512,
            total: 1024,
        };
        assert_eq!(event.percent(), Some(50));
        assert_eq!(
            UpdateEvent::Progress { done: 5, total: 0 }.percent(),
            None
        );
        assert_eq!(
            UpdateEvent::Progress {
                done: 4096,
                total: 1024
            }
            .percent(),
            Some(100)
        );
        assert_eq!(UpdateEvent::Finished.percent(), None);
    }

    #[test]
    fn test_no_updates_is_silent() {
        assert_eq!(NoUpdates.poll(), None);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(UpdateError::Auth.code(), 0);
        assert_eq!(UpdateError::End.code(), 4);
    }
}
