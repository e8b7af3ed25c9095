//! Boot-relative time and cooperative sleeping.

/// Monotonic millisecond clock plus the delay primitive used to yield between
/// polls and ticks.
///
/// On a microcontroller `now_ms` is usually a hardware timer since reset and
/// `delay_ms` a busy-wait or RTOS sleep. Tests drive a manual clock whose
/// `delay_ms` simply advances `now_ms`.
pub trait Clock {
    /// Milliseconds since boot.
    fn now_ms(&self) -> u64;

    /// Block the caller for roughly `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32);

    /// Milliseconds elapsed since `earlier`, saturating at zero if the clock
    /// was reset underneath us.
    fn elapsed_since(&self, earlier: u64) -> u64 {
        self.now_ms().saturating_sub(earlier)
    }
}

/// Wall clock backed by [`std::time::Instant`].
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    boot: std::time::Instant,
}

#[cfg(feature = "std")]
impl SystemClock {
    /// Starts counting from now.
    pub fn new() -> Self {
        Self {
            boot: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.boot.elapsed().as_millis() as u64
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }
}
