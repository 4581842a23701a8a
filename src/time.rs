//! Time source and reconnection backoff.
//!
//! The client measures keep-alive intervals, acknowledgement timeouts and
//! reconnection delays against a [`Clock`] supplied by the platform. On a
//! microcontroller this is usually a hardware timer; on hosted targets the
//! `std` feature provides [`StdClock`].

/// A monotonic millisecond clock with a bounded delay.
pub trait Clock {
    /// Milliseconds since an arbitrary, fixed origin. Must never go backwards.
    fn now_ms(&self) -> u64;

    /// Suspend the caller for roughly `ms` milliseconds.
    ///
    /// Used only while waiting for a broker acknowledgement and between
    /// blocking run-loop ticks.
    fn delay_ms(&mut self, ms: u32);
}

/// Reconnection schedule settings.
///
/// Delays start at `initial_ms`, grow by `multiplier` after every failed
/// attempt and never exceed `max_ms`. Every delay is at least
/// [`MIN_DELAY_MS`], even with zero settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial_ms: u32,
    /// Upper bound for any single delay.
    pub max_ms: u32,
    /// Growth factor applied per failed attempt. Values below 1 are treated as 1.
    pub multiplier: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: 1_000,
            max_ms: 60_000,
            multiplier: 2,
        }
    }
}

/// Floor applied to every reconnection delay.
pub const MIN_DELAY_MS: u32 = 1;

/// Exponential backoff state: non-decreasing delays, capped.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Option<u32>,
}

impl Backoff {
    /// Create a fresh schedule.
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            current: None,
        }
    }

    /// The delay to wait before the next attempt; advances the schedule.
    pub fn next_delay(&mut self) -> u32 {
        let cap = self.config.max_ms;
        let delay = match self.current {
            None => self.config.initial_ms.min(cap),
            Some(previous) => previous
                .saturating_mul(self.config.multiplier.max(1))
                .min(cap),
        }
        .max(MIN_DELAY_MS);
        self.current = Some(delay);
        delay
    }

    /// Restart the schedule after a successful connection.
    pub fn reset(&mut self) {
        self.current = None;
    }

    /// The settings this schedule was built from.
    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }
}

/// Wall-clock implementation for hosted targets.
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    /// Start a clock whose origin is "now".
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for StdClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }
}
