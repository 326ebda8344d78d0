//! Monotonic instant used by the detector on the MCU.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::ops::Add;

use detect_core::telemetry::TelemetryInstant;
use embassy_time::{Duration, Instant};

/// Wraps [`embassy_time::Instant`] so `core::time::Duration` arithmetic from
/// the detector applies directly.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct FirmwareInstant(Instant);

impl FirmwareInstant {
    pub fn now() -> Self {
        Self(Instant::now())
    }

    pub const fn from_micros(micros: u64) -> Self {
        Self(Instant::from_micros(micros))
    }

    pub const fn into_embassy(self) -> Instant {
        self.0
    }

    pub fn as_micros(self) -> u64 {
        self.0.as_micros()
    }
}

impl From<Instant> for FirmwareInstant {
    fn from(value: Instant) -> Self {
        Self(value)
    }
}

impl Add<core::time::Duration> for FirmwareInstant {
    type Output = Self;

    fn add(self, rhs: core::time::Duration) -> Self::Output {
        Self(self.0.checked_add(to_embassy(rhs)).unwrap_or(Instant::MAX))
    }
}

impl TelemetryInstant for FirmwareInstant {
    fn saturating_duration_since(&self, earlier: Self) -> core::time::Duration {
        let micros = self.0.saturating_duration_since(earlier.0).as_micros();
        core::time::Duration::from_micros(micros)
    }
}

/// Converts a core duration to embassy ticks, saturating on overflow.
pub fn to_embassy(duration: core::time::Duration) -> Duration {
    let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
    Duration::from_micros(micros)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_durations_advance_the_instant() {
        let start = FirmwareInstant::from_micros(1_000);
        let later = start + core::time::Duration::from_millis(20);
        assert_eq!(later.as_micros(), 21_000);
        assert_eq!(
            later.saturating_duration_since(start),
            core::time::Duration::from_millis(20)
        );
        assert_eq!(
            start.saturating_duration_since(later),
            core::time::Duration::ZERO
        );
    }

    #[test]
    fn far_deadlines_saturate() {
        let start = FirmwareInstant::from_micros(5);
        let never = start + core::time::Duration::MAX;
        assert!(never > start);
    }
}
