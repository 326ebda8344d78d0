//! Tunables for the boot detector.
//!
//! The defaults capture the timing observed on retail targets: the command
//! phase answers within 20 ms, slower board revisions need up to 250 ms
//! between the two boot-block reads, and the hardware needs ~50 ms to settle
//! after a teardown.

use core::time::Duration;

use crate::hardware::{BusPins, ChannelMask, PinId};

/// Outer attempts before the detector gives up and halts.
pub const DEFAULT_MAX_ATTEMPTS: u8 = 4;
/// Target resets allowed per attempt when the command phase stalls.
pub const DEFAULT_MAX_PHASE_RESETS: u8 = 5;
/// Window in which the command phase must complete once started.
pub const DEFAULT_COMMAND_PHASE_WINDOW: Duration = Duration::from_millis(20);
/// Overall deadline granted after the first boot block is read.
pub const DEFAULT_READ_ZERO_EXTENSION: Duration = Duration::from_millis(250);
/// Pause between a teardown and the next attempt.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(50);
/// Stage count encoded in the halt signal.
pub const DEFAULT_TOTAL_STAGES: u8 = 3;

/// Bus clock through data, plus the glitch trigger.
pub const DEFAULT_BUS_PINS: BusPins = BusPins::new(PinId(0), PinId(2), PinId(3));

/// Detector configuration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DetectConfig {
    /// Zero still runs one attempt.
    pub max_attempts: u8,
    pub max_phase_resets: u8,
    pub command_phase_window: Duration,
    pub read_zero_extension: Duration,
    pub settle_delay: Duration,
    pub total_stages: u8,
    pub capture_channels: ChannelMask,
    pub pins: BusPins,
}

impl DetectConfig {
    pub const DEFAULT: Self = Self {
        max_attempts: DEFAULT_MAX_ATTEMPTS,
        max_phase_resets: DEFAULT_MAX_PHASE_RESETS,
        command_phase_window: DEFAULT_COMMAND_PHASE_WINDOW,
        read_zero_extension: DEFAULT_READ_ZERO_EXTENSION,
        settle_delay: DEFAULT_SETTLE_DELAY,
        total_stages: DEFAULT_TOTAL_STAGES,
        capture_channels: ChannelMask::ALL,
        pins: DEFAULT_BUS_PINS,
    };

    /// Default configuration wired to a board-specific pin map.
    #[must_use]
    pub const fn for_pins(pins: BusPins) -> Self {
        Self {
            pins,
            ..Self::DEFAULT
        }
    }

    /// Overrides the outer attempt budget. Zero is clamped to one attempt.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u8) -> Self {
        self.max_attempts = if attempts == 0 { 1 } else { attempts };
        self
    }

    #[must_use]
    pub const fn with_max_phase_resets(mut self, resets: u8) -> Self {
        self.max_phase_resets = resets;
        self
    }

    #[must_use]
    pub const fn with_command_phase_window(mut self, window: Duration) -> Self {
        self.command_phase_window = window;
        self
    }

    #[must_use]
    pub const fn with_read_zero_extension(mut self, extension: Duration) -> Self {
        self.read_zero_extension = extension;
        self
    }

    #[must_use]
    pub const fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_boot_timing() {
        let config = DetectConfig::default();
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.max_phase_resets, 5);
        assert_eq!(config.command_phase_window, Duration::from_millis(20));
        assert_eq!(config.read_zero_extension, Duration::from_millis(250));
        assert_eq!(config.settle_delay, Duration::from_millis(50));
        assert_eq!(config.total_stages, 3);
        assert_eq!(config.capture_channels, ChannelMask::ALL);
    }

    #[test]
    fn zero_attempt_override_still_runs_once() {
        let config = DetectConfig::DEFAULT.with_max_attempts(0);
        assert_eq!(config.max_attempts, 1);
    }

    #[test]
    fn pin_map_override_keeps_timing() {
        let pins = BusPins::new(PinId(10), PinId(12), PinId(20));
        let config = DetectConfig::for_pins(pins);
        assert_eq!(config.pins, pins);
        assert_eq!(config.settle_delay, DEFAULT_SETTLE_DELAY);
    }
}
