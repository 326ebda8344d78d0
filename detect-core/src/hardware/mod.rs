//! Hardware seams consumed by the boot detector.
//!
//! The capture engine, bus pins, target reset line, and status indicator all
//! live outside this crate. Firmware and emulator targets implement the
//! traits below so the observer and controller can run unchanged on either.

use core::ops::{Add, RangeInclusive};
use core::time::Duration;

/// Sampled bus word delivered by the capture engine.
pub type Word = u32;

/// GPIO number as understood by the platform pin controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct PinId(pub u8);

impl PinId {
    pub const fn number(self) -> u8 {
        self.0
    }
}

/// Pins touched by the detection procedure: a contiguous bus range (clock
/// through data) plus the dedicated glitch-trigger output.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BusPins {
    pub first: PinId,
    pub last: PinId,
    pub trigger: PinId,
}

impl BusPins {
    pub const fn new(first: PinId, last: PinId, trigger: PinId) -> Self {
        Self {
            first,
            last,
            trigger,
        }
    }

    /// Iterates the bus pins in ascending order.
    pub fn bus(&self) -> impl Iterator<Item = PinId> + use<> {
        let range: RangeInclusive<u8> = self.first.number()..=self.last.number();
        range.map(PinId)
    }

    /// Number of pins in the bus range.
    pub fn bus_len(&self) -> usize {
        usize::from(self.last.number().saturating_sub(self.first.number())) + 1
    }
}

/// Bitmask selecting capture-engine channels (bit `n` == channel `n`).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct ChannelMask(u8);

impl ChannelMask {
    pub const NONE: Self = Self(0);
    /// Every channel used by the detection procedure: clock, command, data.
    pub const ALL: Self = Self(0b111);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, channel: u8) -> bool {
        channel < 8 && self.0 & (1 << channel) != 0
    }

    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }
}

/// Control surface of the external sampling peripheral.
pub trait CaptureEngine {
    /// Starts sampling the bus and feeding the capture queue.
    fn arm(&mut self);

    /// Stops sampling while leaving pin configuration untouched.
    fn quiesce(&mut self);

    /// Disables the selected capture channels.
    fn disable_channels(&mut self, mask: ChannelMask);
}

/// Consumer side of the sampled word stream.
pub trait CaptureQueue {
    /// Returns `true` when no word is waiting.
    fn is_empty(&self) -> bool;

    /// Pops the oldest word. Only called after [`is_empty`](Self::is_empty)
    /// reported `false`.
    fn dequeue(&mut self) -> Word;

    /// Non-blocking dequeue.
    fn try_dequeue(&mut self) -> Option<Word> {
        if self.is_empty() {
            None
        } else {
            Some(self.dequeue())
        }
    }
}

/// Reset line of the device under test.
pub trait TargetControl {
    fn reset_target(&mut self);
}

/// Per-pin teardown primitives.
pub trait PinControl {
    fn disable(&mut self, pin: PinId);
    fn clear_pulls(&mut self, pin: PinId);
    fn release_direction(&mut self, pin: PinId);

    /// Fully returns a pin to its unconfigured state.
    fn deinit(&mut self, pin: PinId) {
        self.disable(pin);
        self.clear_pulls(pin);
        self.release_direction(pin);
    }
}

/// Monotonic time source.
pub trait Clock {
    type Instant: Copy + Ord + Add<Duration, Output = Self::Instant>;

    fn now(&self) -> Self::Instant;

    /// Blocks for at least `duration`.
    fn sleep(&mut self, duration: Duration);
}

/// Terminal failure indicator.
pub trait FatalHalt {
    /// Signals `code` out of `total_stages` and never returns.
    fn halt_with_error(&mut self, code: u8, total_stages: u8) -> !;
}

/// Everything the boot detector needs from a board.
pub trait DetectorHardware:
    CaptureEngine + CaptureQueue + TargetControl + PinControl + Clock + FatalHalt
{
}

impl<T> DetectorHardware for T where
    T: CaptureEngine + CaptureQueue + TargetControl + PinControl + Clock + FatalHalt
{
}
